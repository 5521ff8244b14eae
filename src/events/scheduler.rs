//! Event schedulers
//!
//! A scheduler is a FIFO sink for delivery tasks. `EventPump` delivers on a
//! dedicated thread; `ManualScheduler` only delivers when driven, which is
//! what tests want.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Unit of work queued on a scheduler
pub type ScheduledTask = Box<dyn FnOnce() + Send>;

/// FIFO task queue
pub trait TestScheduler: Send + Sync {
    /// Queues a task and returns without running it
    fn schedule(&self, task: ScheduledTask);
}

/// Delivers tasks in submission order on one background thread
pub struct EventPump {
    sender: Mutex<Option<Sender<ScheduledTask>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventPump {
    pub fn start(name: &str) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<ScheduledTask>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut delivered = 0u64;
                while let Ok(task) = rx.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        error!("Event delivery task panicked");
                    }
                    delivered += 1;
                }
                debug!("Event pump stopped after {} deliveries", delivered);
            })?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Delivers everything already queued, then stops the thread
    pub fn stop(&self) {
        self.sender.lock().take();

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("Event pump thread panicked");
        }
    }
}

impl TestScheduler for EventPump {
    fn schedule(&self, task: ScheduledTask) {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(task).is_err() {
                    debug!("Event pump is gone, dropping event");
                }
            }
            None => debug!("Event pump is stopped, dropping event"),
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Holds tasks until the owner runs them
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<ScheduledTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the oldest task; false when nothing was queued
    pub fn run_next(&self) -> bool {
        let task = self.queue.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks until the queue is empty, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl TestScheduler for ManualScheduler {
    fn schedule(&self, task: ScheduledTask) {
        self.queue.lock().push_back(task);
    }
}
