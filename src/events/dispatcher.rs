//! Test event dispatcher
//!
//! Producers call [`TestEventDispatcher::on_test_event`] from any thread and
//! return immediately. Delivery to listeners happens inside a task queued on
//! the scheduler, so listeners see reports in submission order and never on
//! the producer's thread. The listener list is snapshotted when each task
//! runs; a listener added mid-run sees only the reports delivered after it
//! was added.

use parking_lot::RwLock;
use std::sync::Arc;

use super::scheduler::TestScheduler;

/// Consumer of progress reports
pub trait TestEventHandler: Send + Sync {
    fn on_test_event(&self, report: &str);
}

/// Fans reports out to registered listeners through a scheduler
pub struct TestEventDispatcher {
    listeners: Arc<RwLock<Vec<Arc<dyn TestEventHandler>>>>,
    scheduler: Arc<dyn TestScheduler>,
}

impl TestEventDispatcher {
    pub fn new(scheduler: Arc<dyn TestScheduler>) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            scheduler,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn TestEventHandler>) {
        self.listeners.write().push(listener);
    }

    /// Removes a listener by identity; true if it was registered
    pub fn remove_listener(&self, listener: &Arc<dyn TestEventHandler>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl TestEventHandler for TestEventDispatcher {
    fn on_test_event(&self, report: &str) {
        let listeners = Arc::clone(&self.listeners);
        let report = report.to_string();
        self.scheduler.schedule(Box::new(move || {
            let snapshot: Vec<Arc<dyn TestEventHandler>> = listeners.read().clone();
            for listener in snapshot {
                listener.on_test_event(&report);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ManualScheduler;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl TestEventHandler for Recorder {
        fn on_test_event(&self, report: &str) {
            self.0.lock().push(report.to_string());
        }
    }

    #[test]
    fn test_delivery_waits_for_scheduler() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = TestEventDispatcher::new(scheduler.clone());
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        dispatcher.add_listener(first.clone());
        dispatcher.add_listener(second.clone());

        dispatcher.on_test_event("abc");

        assert!(first.0.lock().is_empty());
        assert!(second.0.lock().is_empty());
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_pending();

        assert_eq!(*first.0.lock(), vec!["abc".to_string()]);
        assert_eq!(*second.0.lock(), vec!["abc".to_string()]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_reports_delivered_in_order() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = TestEventDispatcher::new(scheduler.clone());
        let recorder = Arc::new(Recorder::default());
        dispatcher.add_listener(recorder.clone());

        for report in ["one", "two", "three"] {
            dispatcher.on_test_event(report);
        }
        scheduler.run_pending();

        assert_eq!(*recorder.0.lock(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_listener_snapshot_taken_at_delivery() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = TestEventDispatcher::new(scheduler.clone());
        let late = Arc::new(Recorder::default());

        dispatcher.on_test_event("early");
        dispatcher.add_listener(late.clone());
        scheduler.run_pending();

        assert_eq!(*late.0.lock(), vec!["early".to_string()]);
    }

    #[test]
    fn test_remove_listener() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = TestEventDispatcher::new(scheduler.clone());
        let recorder: Arc<dyn TestEventHandler> = Arc::new(Recorder::default());

        dispatcher.add_listener(recorder.clone());
        assert_eq!(dispatcher.listener_count(), 1);
        assert!(dispatcher.remove_listener(&recorder));
        assert!(!dispatcher.remove_listener(&recorder));
        assert_eq!(dispatcher.listener_count(), 0);
    }
}
