//! Retry with exponential backoff for remote calls

use std::time::Duration;

use crate::http::{HttpError, http_config};

/// Longest single wait between attempts, in seconds
const MAX_BACKOFF_SECS: u64 = 300;

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...), capped at five minutes
pub const fn backoff_duration(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt);
    Duration::from_secs(if secs > MAX_BACKOFF_SECS { MAX_BACKOFF_SECS } else { secs })
}

/// Retry a fallible remote call with exponential backoff.
///
/// Retries transient errors up to `max_retries` (from the global
/// [`HttpConfig`](crate::http::HttpConfig)). Returns the first success, or the
/// final error on exhaustion / non-retryable error.
pub fn retry_with_backoff<T>(
    label: &str,
    attempt_fn: impl FnMut() -> Result<T, HttpError>,
) -> Result<T, HttpError> {
    retry_with(label, http_config().max_retries, backoff_duration, attempt_fn)
}

/// Same as [`retry_with_backoff`] with explicit retry count and delay schedule.
pub fn retry_with<T>(
    label: &str,
    max_retries: u32,
    delay: impl Fn(u32) -> Duration,
    mut attempt_fn: impl FnMut() -> Result<T, HttpError>,
) -> Result<T, HttpError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                log::warn!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(delay(attempt));
            }
            Err(e) => {
                log::debug!("{label}: giving up: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> HttpError {
        HttpError::Http {
            status: Some(503),
            message: "unavailable".into(),
        }
    }

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(1), Duration::from_secs(2));
        assert_eq!(backoff_duration(2), Duration::from_secs(4));
        assert_eq!(backoff_duration(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped_for_large_retry_counts() {
        assert_eq!(backoff_duration(9), Duration::from_secs(MAX_BACKOFF_SECS));
        assert_eq!(backoff_duration(64), Duration::from_secs(MAX_BACKOFF_SECS));
        assert_eq!(backoff_duration(u32::MAX), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[test]
    fn retries_transient_then_succeeds() {
        let mut calls = 0;
        let result = retry_with("t", 3, |_| Duration::ZERO, || {
            calls += 1;
            if calls < 3 { Err(transient()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with("t", 2, |_| Duration::ZERO, || {
            calls += 1;
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_error_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with("t", 5, |_| Duration::ZERO, || {
            calls += 1;
            Err(HttpError::Http {
                status: Some(404),
                message: "nope".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
