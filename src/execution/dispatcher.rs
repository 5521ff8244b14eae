//! Work item dispatchers
//!
//! A dispatcher decides where a work item runs. Suites always run inline on
//! the calling thread since they spend their life waiting on children;
//! leaves may be handed to worker threads.
//!
//! Non-parallelizable leaves go to a single worker of their own and run in an
//! exclusive shift: while one executes, no other leaf does.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::executor::PoolError;

use super::context::ExecutionContext;
use super::work_item::WorkItem;

/// Chooses where a work item executes
pub trait WorkItemDispatcher: Send + Sync {
    fn dispatch(&self, item: WorkItem, parent: ExecutionContext);
}

/// Runs every item inline on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleWorkItemDispatcher;

impl WorkItemDispatcher for SimpleWorkItemDispatcher {
    fn dispatch(&self, item: WorkItem, parent: ExecutionContext) {
        item.execute(&parent);
    }
}

struct Job {
    item: WorkItem,
    parent: ExecutionContext,
}

/// Runs leaf items on a fixed set of worker threads
pub struct ParallelWorkItemDispatcher {
    sender: Mutex<Option<Sender<Job>>>,
    non_parallel_sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

/// Which side of the shift lock a worker takes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shift {
    Parallel,
    Exclusive,
}

impl ParallelWorkItemDispatcher {
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::InvalidThreadCount(0));
        }

        let shift = Arc::new(RwLock::new(()));
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(worker_count + 1);
        for i in 0..worker_count {
            let rx = rx.clone();
            let shift = Arc::clone(&shift);
            let handle = thread::Builder::new()
                .name(format!("test-worker-{i}"))
                .spawn(move || worker_loop(rx, shift, Shift::Parallel))
                .map_err(PoolError::Spawn)?;
            workers.push(handle);
        }

        let (non_parallel_tx, non_parallel_rx) = crossbeam_channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name("test-worker-nonparallel".to_string())
            .spawn(move || worker_loop(non_parallel_rx, shift, Shift::Exclusive))
            .map_err(PoolError::Spawn)?;
        workers.push(handle);
        debug!("Started {} test workers and a non-parallel worker", worker_count);

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            non_parallel_sender: Mutex::new(Some(non_parallel_tx)),
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stops accepting work, lets workers drain the queue and joins them
    pub fn shutdown(&self) {
        self.sender.lock().take();
        self.non_parallel_sender.lock().take();

        let current = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Test worker panicked");
            }
        }
    }
}

impl WorkItemDispatcher for ParallelWorkItemDispatcher {
    fn dispatch(&self, item: WorkItem, parent: ExecutionContext) {
        if item.is_composite() {
            item.execute(&parent);
            return;
        }

        let sender = if item.test().is_non_parallelizable() {
            self.non_parallel_sender.lock().clone()
        } else {
            self.sender.lock().clone()
        };
        let job = Job { item, parent };
        let job = match sender {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => job,
        };

        debug!(
            "Dispatcher is shut down, running {} inline",
            job.item.test().full_name()
        );
        job.item.execute(&job.parent);
    }
}

impl Drop for ParallelWorkItemDispatcher {
    fn drop(&mut self) {
        // Workers exit once the channel closes; joining here could join the current thread.
        self.sender.lock().take();
        self.non_parallel_sender.lock().take();
    }
}

fn worker_loop(rx: Receiver<Job>, shift: Arc<RwLock<()>>, side: Shift) {
    while let Ok(Job { item, parent }) = rx.recv() {
        match side {
            Shift::Parallel => {
                let _shift = shift.read();
                item.execute(&parent);
            }
            Shift::Exclusive => {
                let _shift = shift.write();
                item.execute(&parent);
            }
        }
    }
}
