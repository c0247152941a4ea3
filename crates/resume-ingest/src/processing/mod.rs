//! Background processing: retries, bounded scheduling and the job lifecycle

mod job_manager;
mod retry;
mod scheduler;

pub use job_manager::JobManager;
pub use retry::{RetryDecision, RetryOutcome, RetryPolicy, RetryState};
pub use scheduler::{ConcurrencyScheduler, ScheduleSummary, TaskCompletion};
