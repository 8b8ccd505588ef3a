//! Stress helpers for the environment layer.
//!
//! These exercise the concurrency-sensitive paths: positional reads
//! shared across threads, independent appenders on one file, and a
//! flood of scheduled jobs.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use stratum_env::{Env, EnvExt, RandomAccessFile};

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

    /// Prints a one-line summary labelled `name`.
    pub fn print_summary(&self, name: &str) {
        println!("{name}: {self}");
    }
}

impl fmt::Display for StressTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ok in {:?} ({:.0} ops/sec)",
            self.successful_ops, self.total_ops, self.duration, self.ops_per_second
        )
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of each read or append in bytes.
    pub record_size: usize,
    /// Size of the file read by concurrent readers.
    pub file_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            record_size: 256,
            file_size: 1 << 20,
        }
    }
}

/// The byte stored at `offset` in files written by these helpers.
fn pattern_byte(offset: usize) -> u8 {
    (offset % 251) as u8
}

/// Reads random offsets of one shared random-access file from many
/// threads, verifying every byte.
///
/// A read counts as failed if it errors or returns the wrong bytes.
pub fn stress_concurrent_random_reads(
    env: &dyn Env,
    fname: &str,
    config: &StressConfig,
) -> StressTestResult {
    let data: Vec<u8> = (0..config.file_size).map(pattern_byte).collect();
    env.write_string_to_file(&data, fname, false)
        .expect("Failed to write stress file");
    let file: Arc<dyn RandomAccessFile> = Arc::from(
        env.new_random_access_file(fname)
            .expect("Failed to open stress file"),
    );

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let span = config.file_size.saturating_sub(config.record_size).max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let file = Arc::clone(&file);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let (operations, record_size) = (config.operations, config.record_size);

            thread::spawn(move || {
                let mut scratch = vec![0u8; record_size];
                for i in 0..operations {
                    let offset = (t * 7_919 + i * 104_729) % span;
                    let ok = match file.read(offset as u64, record_size, &mut scratch) {
                        Ok(got) => got
                            .iter()
                            .enumerate()
                            .all(|(j, &b)| b == pattern_byte(offset + j)),
                        Err(_) => false,
                    };
                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
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

/// Appends fixed-size records to one file through a separate appendable
/// handle per thread, then checks that no record was lost or torn.
///
/// Returns the result and the final file size.
pub fn stress_concurrent_appends(
    env: &dyn Env,
    fname: &str,
    config: &StressConfig,
) -> (StressTestResult, u64) {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let (successful, failed) = (&successful, &failed);
            scope.spawn(move || {
                let mut file = env
                    .new_appendable_file(fname)
                    .expect("Failed to open appender");
                let record = vec![b'a' + (t % 26) as u8; config.record_size];
                for _ in 0..config.operations {
                    match file.append(&record) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    let duration = start.elapsed();
    let contents = env.read_file_to_vec(fname).expect("Failed to read back");
    let torn = contents
        .chunks(config.record_size)
        .filter(|chunk| chunk.len() != config.record_size || chunk.iter().any(|&b| b != chunk[0]))
        .count();
    let size = env.get_file_size(fname).expect("Failed to stat");

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed) - torn.min(successful.load(Ordering::Relaxed)),
        failed.load(Ordering::Relaxed) + torn,
        duration,
    );
    (result, size)
}

/// Submits `jobs` scheduled jobs and waits for all of them to run.
pub fn stress_schedule(env: &dyn Env, jobs: usize, timeout: Duration) -> StressTestResult {
    fn ack(tx: mpsc::Sender<()>) {
        let _ = tx.send(());
    }

    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    for _ in 0..jobs {
        env.schedule_fn(ack, tx.clone());
    }
    drop(tx);

    let mut completed = 0usize;
    let deadline = start + timeout;
    while completed < jobs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(()) => completed += 1,
            Err(_) => break,
        }
    }

    StressTestResult::new(completed, jobs - completed, start.elapsed())
}
