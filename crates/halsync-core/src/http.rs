//! Shared HTTP client, runtime and error type.
//!
//! Uses async reqwest internally but presents a sync interface: callers
//! `block_on` the shared runtime. The pipeline issues one request at a time.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

/// HTTP tuning shared by all remote calls.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Per-request timeout (whole request, including body)
    pub request_timeout: Duration,
    /// Retries for transient failures (429, 5xx, network)
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the process-wide HTTP config. First call wins.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring override");
    }
}

/// Current HTTP config (defaults if never set).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Error types for remote calls
#[derive(Debug)]
pub enum HttpError {
    /// HTTP error with optional status code (None = transport failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Response body did not have the expected shape
    Decode(String),
    /// Local I/O error (reading an upload, etc.)
    Io(std::io::Error),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    /// Create HTTP error from reqwest error.
    ///
    /// The URL is stripped so endpoints and tokens don't leak into logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.without_url().to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }

    /// Rate limiting, server errors and transport failures are transient.
    /// Other 4xx, decode errors and local I/O are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => match status {
                None => true,
                Some(429) => true,
                Some(s) => (500..=599).contains(s),
            },
            Self::Decode(_) => false,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// One pooled client for every store request.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(http_config().connect_timeout)
        .timeout(http_config().request_timeout)
        .pool_max_idle_per_host(2)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("HTTP client builder failed ({e}), using defaults");
            reqwest::Client::new()
        })
});

/// The pooled client, built on first use.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Runtime the blocking store calls run on.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> HttpError {
        HttpError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn http_404_not_retryable() {
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn http_422_not_retryable() {
        assert!(!http_err(422).is_retryable());
    }

    #[test]
    fn http_429_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn http_503_retryable() {
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn transport_failure_retryable() {
        let err = HttpError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn decode_not_retryable() {
        assert!(!HttpError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = HttpError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        assert!(err.is_retryable());
    }

    #[test]
    fn io_not_found_not_retryable() {
        let err = HttpError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn status_accessor() {
        assert_eq!(http_err(500).status(), Some(500));
        assert_eq!(HttpError::Decode("x".into()).status(), None);
    }
}
