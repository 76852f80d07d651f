pub mod cron;
pub mod engine;

// Re-export common types
pub use self::cron::{ScheduleStatus, Scheduler};
pub use self::engine::run_scheduler_loop;
