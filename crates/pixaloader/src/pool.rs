//! Fixed-size worker pools

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send>;

/// A fixed number of worker threads draining one unbounded queue.
///
/// Dropping the sender on [`shutdown`](WorkerPool::shutdown) lets workers
/// finish what is queued and exit; queued tasks notice the engine's stopped
/// flag at their first checkpoint and bail out quickly.
pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(name: &str, threads: usize) -> Self {
        assert!(threads > 0, "Thread count must be greater than 0");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || loop {
                    let job = receiver.lock().recv();
                    match job {
                        Ok(job) => job(),
                        Err(_) => break, // Pool shut down.
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(pool = name, error = %err, "failed to spawn worker"),
            }
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job. Returns false if the pool has been shut down.
    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &*self.sender.lock() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs, drain the queue, and join the workers
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run() {
        let pool = WorkerPool::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            assert!(pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_execute_after_shutdown_is_rejected() {
        let pool = WorkerPool::new("test", 1);
        pool.shutdown();

        assert!(!pool.execute(|| {}));
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let pool = WorkerPool::new("test", 1);
        pool.shutdown();
        pool.shutdown();
    }
}
