//! Classification of mirror errors into retryable and final ones.

use reqwest::StatusCode;

/// Maximum number of attempts per download.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Errors that will not go away by asking the mirror again.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429, or a 403 that mentions throttling
    RateLimited(String),
    /// HTTP 404: wrong branch, architecture or repository name
    NotFound(String),
    /// HTTP 401 or 403
    Forbidden(String),
    /// Any other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimited(msg) => {
                write!(f, "Mirror is rate limiting: {}. Try again later or pick another mirror.", msg)
            }
            NonRetryableError::NotFound(msg) => {
                write!(f, "Not found: {}. Check the mirror layout, branch and repository names.", msg)
            }
            NonRetryableError::Forbidden(msg) => write!(f, "Access forbidden: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Ok(()) when the request may succeed on another attempt.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        // connection errors and timeouts
        return Ok(());
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimited(url)),
        StatusCode::FORBIDDEN if error.to_string().contains("rate limit") => {
            Err(NonRetryableError::RateLimited(url))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} for {}",
            s.as_u16(),
            url
        ))),
        // 5xx
        _ => Ok(()),
    }
}

/// Wrap an `error_for_status()` failure, typed as [`NonRetryableError`] when
/// retrying is pointless.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
