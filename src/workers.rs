//! Bounded worker pool for alert sinks.
//!
//! Notifier and archiver jobs run here instead of one spawned thread per
//! accepted alert. The pool has a fixed number of worker threads and an
//! explicit bounded submission queue; under an alert burst, submissions
//! beyond the queue depth are rejected (and logged by the caller) rather
//! than allowed to exhaust the process.

use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    label: &'static str,
    job: Job,
}

pub struct WorkerPool {
    sender: Option<SyncSender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers sharing one submission queue of `queue_depth`
    /// pending jobs.
    pub fn new(threads: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<QueuedJob>(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..threads.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                std::thread::spawn(move || run_worker(index, receiver))
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a job without blocking.
    ///
    /// Returns an error when the queue is full; the job is dropped and the
    /// caller decides how loudly to log it. Submission never waits, so a slow
    /// sink cannot stall the dispatch path.
    pub fn submit(&self, label: &'static str, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("worker pool stopped"))?;
        let queued = QueuedJob {
            label,
            job: Box::new(job),
        };
        match sender.try_send(queued) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(dropped)) => Err(anyhow!(
                "worker queue full, dropping '{}' job",
                dropped.label
            )),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("worker pool stopped")),
        }
    }

    /// Drain the queue and join the workers. Queued jobs run to completion.
    pub fn stop(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_worker(index: usize, receiver: Arc<Mutex<Receiver<QueuedJob>>>) {
    loop {
        let queued = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    log::error!("worker {}: queue lock poisoned, exiting", index);
                    return;
                }
            };
            guard.recv()
        };
        let Ok(queued) = queued else {
            // Channel closed: pool is shutting down.
            return;
        };
        // Sink isolation: a panicking job must not take the worker (or the
        // process) down with it.
        let label = queued.label;
        if std::panic::catch_unwind(AssertUnwindSafe(queued.job)).is_err() {
            log::error!("worker {}: '{}' job panicked", index, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn jobs_run_to_completion() {
        let pool = WorkerPool::new(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = counter.clone();
            pool.submit("count", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn full_queue_rejects_instead_of_blocking() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = channel::<()>();

        // Occupy the single worker until released.
        pool.submit("block", move || {
            let _ = release_rx.recv();
        })
        .unwrap();
        // Give the worker a moment to pick the blocking job up, then fill the
        // one queue slot.
        std::thread::sleep(Duration::from_millis(50));
        pool.submit("queued", || {}).unwrap();

        // Queue is now full: the next submission is rejected immediately.
        let rejected = pool.submit("burst", || {});
        assert!(rejected.is_err());

        release_tx.send(()).unwrap();
        pool.stop();
    }

    #[test]
    fn panicking_job_does_not_kill_the_pool() {
        let pool = WorkerPool::new(1, 4);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit("panic", || panic!("sink blew up")).unwrap();
        let counter_clone = counter.clone();
        pool.submit("after", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
