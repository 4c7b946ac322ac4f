//! Stress helpers for concurrent collection access.

use docudb_core::{Collection, Document, Query};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
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
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
        }
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T, E>(&self, result: Result<T, E>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn run_threads<F>(collection: &Collection, config: &StressConfig, work: F) -> StressTestResult
where
    F: Fn(&Collection, usize, usize, &Tally) + Send + Sync + 'static,
{
    let tally = Arc::new(Tally::default());
    let work = Arc::new(work);
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let collection = collection.clone();
            let tally = Arc::clone(&tally);
            let work = Arc::clone(&work);
            let operations = config.operations;
            thread::spawn(move || {
                for i in 0..operations {
                    work(&collection, t, i, &tally);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    tally.finish(start)
}

/// Every thread inserts `operations` documents `{"t": thread, "i": n}`.
pub fn stress_concurrent_inserts(collection: &Collection, config: &StressConfig) -> StressTestResult {
    run_threads(collection, config, |c, t, i, tally| {
        let doc = Document::new().with("t", t as i64).with("i", i as i64);
        tally.record(c.insert(doc));
    })
}

/// Threads alternate between increments and counting queries on a shared
/// counter document `{"counter": true, "n": ...}`.
pub fn stress_concurrent_increments(
    collection: &Collection,
    config: &StressConfig,
) -> StressTestResult {
    let increment = Query::parse_json(r#"{"counter": true, "$inc": {"n": 1}}"#)
        .expect("Invalid increment query");
    let probe = Query::parse_json(r#"{"counter": true}"#).expect("Invalid probe query");
    run_threads(collection, config, move |c, _, i, tally| {
        if i % 2 == 0 {
            tally.record(c.update(&increment));
        } else {
            tally.record(c.count_matching(&probe));
        }
    })
}

/// Each thread runs small transactions that insert two documents and
/// commit on even iterations, abort on odd ones.
pub fn stress_transactions(collection: &Collection, config: &StressConfig) -> StressTestResult {
    run_threads(collection, config, |c, t, i, tally| {
        // begin fails while another thread's transaction is active; retry.
        let guard = loop {
            match c.begin_scoped() {
                Ok(guard) => break guard,
                Err(_) => thread::yield_now(),
            }
        };
        let result = c
            .insert(Document::new().with("t", t as i64).with("i", i as i64))
            .and_then(|_| c.insert(Document::new().with("t", t as i64).with("i", i as i64)));
        if i % 2 == 0 {
            tally.record(result.and_then(|_| guard.commit()));
        } else {
            tally.record(result.and_then(|_| guard.abort()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::Database;

    fn config() -> StressConfig {
        StressConfig {
            operations: 50,
            threads: 4,
        }
    }

    #[test]
    fn concurrent_inserts_all_land() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_collection("stress", None).unwrap();
        let result = stress_concurrent_inserts(&c, &config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(c.count().unwrap(), 200);
    }

    #[test]
    fn increments_are_not_lost() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_collection("stress", None).unwrap();
        c.insert(Document::new().with("counter", true).with("n", 0)).unwrap();
        let result = stress_concurrent_increments(&c, &config());
        assert_eq!(result.failed_ops, 0);
        let counter = c
            .find_one(&Query::parse_json(r#"{"counter": true}"#).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(counter.get("n").and_then(docudb_core::Value::as_i64), Some(100));
    }

    #[test]
    fn only_committed_transactions_remain() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_collection("stress", None).unwrap();
        let result = stress_transactions(&c, &config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(c.count().unwrap(), 4 * 25 * 2);
        assert!(!c.is_transaction_active());
    }
}
