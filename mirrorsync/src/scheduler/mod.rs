//! Cron-driven export scheduling with bounded retries.

mod retry;
mod task;

pub use retry::run_with_retry;
pub use task::{ScheduledRun, TaskScheduler, parse_schedule};
