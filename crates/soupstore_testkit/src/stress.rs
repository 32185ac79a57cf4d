//! Stress tests for SoupStore.
//!
//! These tests verify behavior under heavy load and concurrent access to
//! one shared store.

use crate::fixtures::scenarios::PEOPLE;
use serde_json::json;
use soupstore_core::{QuerySpec, SmartStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of entries to seed.
    pub entry_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entry_count: 1_000,
        }
    }
}

/// Run a sequential create stress test against the people soup.
pub fn stress_sequential_creates(store: &SmartStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match store.create(PEOPLE, json!({"name": format!("p{i}"), "age": i % 100})) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent metadata lookups and translations from many threads.
///
/// Every thread starts on a cold cache, so the first lookups race to fill
/// it. An operation fails if it errors or sees metadata other than what
/// the first thread saw.
pub fn stress_concurrent_lookups(store: Arc<SmartStore>, config: &StressConfig) -> StressTestResult {
    store.reset_all();
    let expected = match (
        store.get_soup_table_name(PEOPLE),
        store.get_soup_index_specs(PEOPLE),
    ) {
        (Ok(table), Ok(specs)) => (table, specs),
        _ => return StressTestResult::new(0, config.operations, Duration::ZERO),
    };
    store.reset_all();

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let expected = Arc::new(expected);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let expected = Arc::clone(&expected);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let ok = match (t + i) % 3 {
                        0 => store.get_soup_table_name(PEOPLE).is_ok_and(|table| table == expected.0),
                        1 => store.get_soup_index_specs(PEOPLE).is_ok_and(|specs| specs == expected.1),
                        _ => store
                            .translate("SELECT {people:name} FROM {people}")
                            .is_ok_and(|sql| sql.contains(&expected.0)),
                    };
                    let counter = if ok { &successful } else { &failed };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run counts on some threads while another keeps invalidating the soup.
///
/// Counts must stay correct whatever the cache state.
pub fn stress_invalidation_churn(store: Arc<SmartStore>, config: &StressConfig) -> StressTestResult {
    let all = QuerySpec::all(PEOPLE).build();
    let Ok(expected) = store.count_query(&all) else {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    };

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let invalidator = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..ops_per_thread {
                if i % 2 == 0 {
                    store.invalidate(PEOPLE);
                } else {
                    store.reset_all();
                }
            }
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let all = all.clone();

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let counter = if store.count_query(&all).is_ok_and(|n| n == expected) {
                        &successful
                    } else {
                        &failed
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    invalidator.join().expect("Thread panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
