//! Background work: a worker pool for scheduled jobs and detached threads.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// A unit of background work.
///
/// The closure owns its argument; ownership moves into the scheduler on
/// submission and the argument is dropped when the closure returns.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Builds a [`Job`] from a callback and the argument it consumes.
pub fn task<A>(callback: fn(A), arg: A) -> Job
where
    A: Send + 'static,
{
    Box::new(move || callback(arg))
}

/// A lazily started pool of worker threads.
///
/// Jobs run at most once, in no particular order. Workers are detached:
/// dropping the pool closes the queue and each worker exits once the
/// queued jobs are drained.
#[derive(Debug)]
pub struct ThreadPool {
    name: String,
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
}

impl ThreadPool {
    /// Creates a pool of `size` workers named after `name`.
    ///
    /// No threads are started until the first job is submitted.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: size.max(1),
            sender: Mutex::new(None),
        }
    }

    /// Returns the number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues `job` for execution on a worker.
    pub fn execute(&self, job: Job) {
        let mut sender = self.sender.lock();
        if sender.is_none() {
            *sender = Some(self.start());
        }
        if let Some(tx) = sender.as_ref() {
            if tx.send(job).is_err() {
                tracing::error!(pool = %self.name, "worker pool queue is closed, job dropped");
            }
        }
    }

    fn start(&self) -> Sender<Job> {
        let (tx, rx) = unbounded::<Job>();
        let mut started = 0;
        for id in 0..self.size {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{id}", self.name))
                .spawn(move || worker_loop(id, rx));
            match spawned {
                Ok(_) => started += 1,
                Err(e) => tracing::error!(pool = %self.name, id, error = %e, "failed to start worker"),
            }
        }
        tracing::debug!(pool = %self.name, workers = started, "started worker pool");
        tx
    }
}

fn worker_loop(id: usize, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(worker = id, "scheduled job panicked");
        }
    }
    tracing::debug!(worker = id, "worker disconnected");
}

static THREAD_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Runs `job` once on a new detached thread.
///
/// No handle is returned; the job manages its own lifetime.
pub fn spawn_detached(prefix: &str, job: Job) {
    let seq = THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
    let spawned = thread::Builder::new()
        .name(format!("{prefix}-bg-{seq}"))
        .spawn(job);
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to start background thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pool_runs_every_job() {
        let pool = ThreadPool::new("test", 4);
        let (tx, rx) = mpsc::channel();

        for i in 0..100 {
            let tx = tx.clone();
            pool.execute(Box::new(move || tx.send(i).unwrap()));
        }

        let mut seen: Vec<i32> = (0..100)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn pool_survives_panicking_job() {
        let pool = ThreadPool::new("test", 1);
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(|| panic!("boom")));
        pool.execute(Box::new(move || tx.send("after").unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
    }

    #[test]
    fn task_moves_argument_into_job() {
        fn callback(arg: (Arc<()>, mpsc::Sender<usize>)) {
            let (token, tx) = arg;
            tx.send(Arc::strong_count(&token)).unwrap();
        }

        let token = Arc::new(());
        let (tx, rx) = mpsc::channel();
        let pool = ThreadPool::new("test", 2);
        pool.execute(task(callback, (Arc::clone(&token), tx)));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        // The job dropped its argument after the callback returned.
        for _ in 0..100 {
            if Arc::strong_count(&token) == 1 {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("scheduled argument was not released");
    }

    #[test]
    fn pool_size_is_at_least_one() {
        assert_eq!(ThreadPool::new("test", 0).size(), 1);
    }

    #[test]
    fn detached_thread_runs() {
        let (tx, rx) = mpsc::channel();
        spawn_detached("test", Box::new(move || tx.send(thread::current().name().map(String::from)).unwrap()));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("test-bg-"));
    }
}
