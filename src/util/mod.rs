//! Utility modules: retry, backoff, polling.

pub mod retry;

pub use retry::{Backoff, BackoffPolicy, PollPolicy, RetryPolicy};
