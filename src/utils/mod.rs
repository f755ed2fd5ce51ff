//! Shared utilities: logging, timing and retry policy.

pub mod logger;
pub mod retry;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use retry::{Backoff, RetryPolicy};
pub use timer::Timer;
