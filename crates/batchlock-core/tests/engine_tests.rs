//! End-to-end engine tests
//!
//! Randomized workloads through the full pipeline: admission, scheduling,
//! ordered merges, round barrier, execution and lock release.

use batchlock_core::{
    Action, ActionRef, ActionState, BatchAction, BatchEngine, EngineConfig, ExecutorConfig,
    SchedulingConfig,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Observes every record while actions run
struct Observer {
    access: Vec<AtomicI64>,
    violation: AtomicBool,
    write_order: Mutex<HashMap<u64, Vec<u64>>>,
}

impl Observer {
    fn new(records: u64) -> Arc<Self> {
        Arc::new(Self {
            access: (0..records).map(|_| AtomicI64::new(0)).collect(),
            violation: AtomicBool::new(false),
            write_order: Mutex::new(HashMap::new()),
        })
    }

    fn run(&self, action: &Action) {
        for key in action.write_set() {
            let slot = &self.access[key.as_u64() as usize];
            if slot.compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire).is_err() {
                self.violation.store(true, Ordering::SeqCst);
            }
            self.write_order
                .lock()
                .entry(key.as_u64())
                .or_default()
                .push(action.id().as_u64());
        }
        for key in action.read_set() {
            let slot = &self.access[key.as_u64() as usize];
            if slot
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n >= 0).then_some(n + 1))
                .is_err()
            {
                self.violation.store(true, Ordering::SeqCst);
            }
        }

        std::thread::yield_now();

        for key in action.read_set() {
            self.access[key.as_u64() as usize].fetch_sub(1, Ordering::AcqRel);
        }
        for key in action.write_set() {
            self.access[key.as_u64() as usize].store(0, Ordering::Release);
        }
    }
}

fn workload(seed: u64, count: u64, records: u64, observer: &Arc<Observer>) -> Vec<ActionRef> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let mut writes = HashSet::new();
            let mut reads = HashSet::new();
            for _ in 0..rng.gen_range(0..=2) {
                writes.insert(rng.gen_range(0..records));
            }
            for _ in 0..rng.gen_range(0..=3) {
                let key = rng.gen_range(0..records);
                if !writes.contains(&key) {
                    reads.insert(key);
                }
            }
            let observer = Arc::clone(observer);
            Action::new(id)
                .with_writes(writes)
                .with_reads(reads)
                .with_work(move |action| observer.run(action))
                .into_ref()
        })
        .collect()
}

fn drain(engine: &BatchEngine, expected: usize) -> Vec<ActionRef> {
    let started = Instant::now();
    let mut done = Vec::new();
    while done.len() < expected && started.elapsed() < Duration::from_secs(30) {
        let batch = engine.try_get_done_batch();
        if batch.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        done.extend(batch);
    }
    done
}

fn config(scheduler_threads: usize, batch_size: usize, executors: usize) -> EngineConfig {
    EngineConfig {
        scheduling: SchedulingConfig::new(scheduler_threads, batch_size),
        executor: ExecutorConfig::with_threads(executors),
        ..EngineConfig::default()
    }
}

/// Run a seeded workload to completion and return the per-record writer order
fn run_pipeline(config: EngineConfig, seed: u64, count: u64, records: u64) -> HashMap<u64, Vec<u64>> {
    let observer = Observer::new(records);
    let actions = workload(seed, count, records, &observer);

    let engine = BatchEngine::new(config).unwrap();
    engine.start().unwrap();
    engine.submit_all(actions.iter().cloned()).unwrap();
    engine.flush();

    let done = drain(&engine, actions.len());
    engine.stop();

    assert_eq!(done.len(), actions.len(), "not every action finished");
    let unique: HashSet<u64> = done.iter().map(|a| a.id().as_u64()).collect();
    assert_eq!(unique.len(), actions.len(), "an action finished twice");
    assert!(!observer.violation.load(Ordering::SeqCst), "record accessed under a conflicting lock");
    assert!(actions.iter().all(|a| a.state() == ActionState::Done));
    assert!(engine.lock_table().is_idle());
    assert_eq!(engine.executed(), count);

    let order = observer.write_order.lock().clone();
    order
}

// ==================== Pipeline Tests ====================

#[test]
fn test_random_workload_low_contention() {
    init_tracing();
    run_pipeline(config(2, 64, 4), 1, 2_000, 4_096);
}

#[test]
fn test_random_workload_high_contention() {
    init_tracing();
    run_pipeline(config(3, 32, 4), 2, 1_500, 8);
}

#[test]
fn test_single_threaded_pipeline() {
    init_tracing();
    run_pipeline(config(1, 10, 1), 3, 300, 16);
}

#[test]
fn test_writer_order_is_deterministic() {
    init_tracing();
    let first = run_pipeline(config(3, 20, 4), 42, 800, 24);
    let second = run_pipeline(config(3, 20, 2), 42, 800, 24);
    assert_eq!(first, second);
}

#[test]
fn test_batch_timeout_drains_without_flush() {
    init_tracing();
    let observer = Observer::new(4);
    let actions = workload(9, 5, 4, &observer);

    let mut config = config(2, 1_000, 2);
    config.scheduling.batch_timeout_ms = Some(5);
    let engine = BatchEngine::new(config).unwrap();
    engine.start().unwrap();
    engine.submit_all(actions).unwrap();

    let done = drain(&engine, 5);
    engine.stop();
    assert_eq!(done.len(), 5);
    assert!(engine.rounds_signaled() >= 1);
}

#[test]
fn test_engine_from_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{
            "scheduling": { "scheduler_threads": 2, "batch_size": 8 },
            "lock_table": { "expected_records": 64 },
            "executor": { "threads": 2, "cpu_affinity": [0] }
        }"#,
    )
    .unwrap();

    let config = EngineConfig::from_file(&path).unwrap();
    assert_eq!(config.executor.cpu_affinity, vec![0]);
    run_pipeline(config, 5, 100, 32);
}

#[test]
fn test_blocking_get_done_batch() {
    init_tracing();
    let engine = BatchEngine::new(config(1, 1, 1)).unwrap();
    engine.start().unwrap();
    engine
        .submit(Action::new(7u64).with_writes([1u64]).into_ref())
        .unwrap();

    let batch = engine.get_done_batch();
    engine.stop();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id().as_u64(), 7);
}
