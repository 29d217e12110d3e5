//! halsync core - shared infrastructure for the catalog sync pipeline
//!
//! Logging, the shared HTTP client and runtime, retry policy, progress
//! display and the shutdown flag used by every other crate.

pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use http::{HttpConfig, HttpError, SHARED_RUNTIME, http_client, http_config, set_http_config};
pub use logging::{filter_for, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{backoff_duration, retry_with, retry_with_backoff};
pub use shutdown::{is_shutdown_requested, shutdown_flag};
