//! Report engines. Each engine is a synchronous function over a
//! [`RecordSource`](crate::source::RecordSource); the first failing query
//! aborts the whole report.

pub mod exceptions;
pub mod performance;
pub mod roster;
pub mod tasks;
pub mod types;

pub use exceptions::exception_report;
pub use performance::{sales_performance, MeetingKey, PerformanceOptions};
pub use roster::company_roster;
pub use tasks::sales_tasks;
pub use types::*;
