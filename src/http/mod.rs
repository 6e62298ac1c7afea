//! HTTP access to package mirrors, with retries.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable, classify_error};
