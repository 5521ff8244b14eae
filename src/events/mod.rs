//! Progress events
//!
//! Test threads emit JSON progress reports; the dispatcher hands them to a
//! scheduler which delivers them to every registered handler in order.

mod dispatcher;
mod report;
mod scheduler;

pub use dispatcher::{TestEventDispatcher, TestEventHandler};
pub use report::{EventReportingListener, TestEvent};
pub use scheduler::{EventPump, ManualScheduler, ScheduledTask, TestScheduler};
