//! Parallel worker pool
//!
//! Runs queued execution tasks on a fixed number of threads. Tasks are queued
//! during a build phase; `start` hands the queue to the workers, which drain
//! it and exit. There is no rebalancing: a worker with nothing left to take
//! simply stops.

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Worker pool usage errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Thread count must be at least 1, got {0}")]
    InvalidThreadCount(i32),

    #[error("Cannot enqueue tasks after the pool has started")]
    AlreadyStarted,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A unit of work run by the pool
pub trait TestExecutionTask: Send {
    fn execute(&mut self);
}

impl<F> TestExecutionTask for F
where
    F: FnMut() + Send,
{
    fn execute(&mut self) {
        self()
    }
}

/// Number of live workers, signalled when it drops to zero
struct ActiveWorkers {
    count: Mutex<usize>,
    all_done: Condvar,
}

/// Decrements the live count even when a task panics
struct WorkerGuard(Arc<ActiveWorkers>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.all_done.notify_all();
        }
    }
}

/// Fixed-size pool draining a prebuilt task queue
pub struct ParallelWorkerPool {
    thread_count: usize,
    queue: Vec<Box<dyn TestExecutionTask>>,
    active: Option<Arc<ActiveWorkers>>,
    handles: Vec<JoinHandle<()>>,
}

impl ParallelWorkerPool {
    /// Create a pool; zero or negative counts are rejected
    pub fn new(thread_count: i32) -> Result<Self, PoolError> {
        if thread_count < 1 {
            return Err(PoolError::InvalidThreadCount(thread_count));
        }

        Ok(Self {
            thread_count: thread_count as usize,
            queue: Vec::new(),
            active: None,
            handles: Vec::new(),
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Tasks waiting for `start`
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue a task; only allowed before `start`
    pub fn enqueue(&mut self, task: impl TestExecutionTask + 'static) -> Result<(), PoolError> {
        if self.is_started() {
            return Err(PoolError::AlreadyStarted);
        }
        self.queue.push(Box::new(task));
        Ok(())
    }

    /// Spawn the workers and hand them the queue
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_started() {
            return Err(PoolError::AlreadyStarted);
        }

        let task_count = self.queue.len();
        let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn TestExecutionTask>>();
        for task in self.queue.drain(..) {
            // The receiver is alive, so an unbounded send cannot fail
            let _ = tx.send(task);
        }
        drop(tx);

        let active = Arc::new(ActiveWorkers {
            count: Mutex::new(0),
            all_done: Condvar::new(),
        });
        self.active = Some(Arc::clone(&active));

        for i in 0..self.thread_count {
            *active.count.lock() += 1;

            let rx = rx.clone();
            let guard = WorkerGuard(Arc::clone(&active));
            let spawned = thread::Builder::new()
                .name(format!("pool-worker-{i}"))
                .spawn(move || {
                    let _guard = guard;
                    let mut executed = 0usize;
                    while let Ok(mut task) = rx.recv() {
                        task.execute();
                        executed += 1;
                    }
                    debug!("Worker {} exiting after {} tasks", i, executed);
                });

            match spawned {
                Ok(handle) => self.handles.push(handle),
                // The guard moved into the failed closure has already been dropped
                Err(e) => return Err(PoolError::Spawn(e)),
            }
        }

        info!(
            "Started {} workers for {} queued tasks",
            self.thread_count, task_count
        );
        Ok(())
    }

    /// Wait up to `timeout` for every worker to exit; callers may poll
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let Some(active) = &self.active else {
            return self.queue.is_empty();
        };

        let deadline = Instant::now() + timeout;
        let mut count = active.count.lock();
        while *count > 0 {
            if active.all_done.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_rejects_non_positive_thread_counts() {
        assert!(matches!(
            ParallelWorkerPool::new(0),
            Err(PoolError::InvalidThreadCount(0))
        ));
        assert!(matches!(
            ParallelWorkerPool::new(-1),
            Err(PoolError::InvalidThreadCount(-1))
        ));
        assert!(ParallelWorkerPool::new(1).is_ok());
    }

    #[test]
    fn test_enqueue_after_start_is_rejected() {
        let mut pool = ParallelWorkerPool::new(1).unwrap();
        pool.start().unwrap();
        assert!(matches!(pool.enqueue(|| {}), Err(PoolError::AlreadyStarted)));
        assert!(matches!(pool.start(), Err(PoolError::AlreadyStarted)));
        assert!(pool.wait_all(Duration::from_secs(5)));
    }

    #[test]
    fn test_single_worker_runs_one_task() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut pool = ParallelWorkerPool::new(1).unwrap();
        let r = ran.clone();
        pool.enqueue(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.start().unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_single_worker_runs_tasks_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pool = ParallelWorkerPool::new(1).unwrap();
        for i in 0..2 {
            let log = log.clone();
            pool.enqueue(move || log.lock().push(i)).unwrap();
        }

        pool.start().unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
        assert_eq!(*log.lock(), vec![0, 1]);
    }

    #[test]
    fn test_second_task_waits_for_the_only_worker() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded::<usize>();
        let (release1_tx, release1_rx) = crossbeam_channel::bounded::<()>(0);
        let (release2_tx, release2_rx) = crossbeam_channel::bounded::<()>(0);

        let mut pool = ParallelWorkerPool::new(1).unwrap();
        for (task, release) in [(1, release1_rx), (2, release2_rx)] {
            let started = started_tx.clone();
            pool.enqueue(move || {
                started.send(task).unwrap();
                let _ = release.recv();
            })
            .unwrap();
        }
        pool.start().unwrap();

        // Task 1 executes, task 2 is still queued behind it
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert!(started_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!pool.wait_all(Duration::from_millis(20)));

        release1_tx.send(()).unwrap();
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)), Ok(2));
        assert!(!pool.wait_all(Duration::from_millis(20)));

        release2_tx.send(()).unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
        assert!(started_rx.try_recv().is_err());
    }

    #[test]
    fn test_many_workers_run_every_task_once() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut pool = ParallelWorkerPool::new(4).unwrap();
        for _ in 0..50 {
            let r = ran.clone();
            pool.enqueue(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(pool.queued(), 50);

        pool.start().unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_wait_all_times_out_then_succeeds() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let mut pool = ParallelWorkerPool::new(1).unwrap();
        pool.enqueue(move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        pool.start().unwrap();
        assert!(!pool.wait_all(Duration::from_millis(20)));

        release_tx.send(()).unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
    }

    #[test]
    fn test_panicking_task_still_lets_wait_all_finish() {
        let mut pool = ParallelWorkerPool::new(1).unwrap();
        pool.enqueue(|| panic!("task blew up")).unwrap();
        pool.start().unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
    }

    #[test]
    fn test_custom_task_type() {
        struct Counter {
            hits: Arc<AtomicUsize>,
        }

        impl TestExecutionTask for Counter {
            fn execute(&mut self) {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let mut pool = ParallelWorkerPool::new(2).unwrap();
        pool.enqueue(Counter { hits: hits.clone() }).unwrap();
        pool.enqueue(Counter { hits: hits.clone() }).unwrap();
        pool.start().unwrap();
        assert!(pool.wait_all(Duration::from_secs(5)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
