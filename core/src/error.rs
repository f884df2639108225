//! Error taxonomy for the guarded forwarder.
//!
//! # Design
//! The set of failure kinds is closed and each kind maps to exactly one HTTP
//! status. `PolicyDenied` and `ConnectionError` carry a detail string for
//! logging only: the caller-facing message is fixed so resolved addresses
//! and internal topology never leak.

use thiserror::Error;

/// Response ceiling used in the caller-facing size message.
pub const MIB: usize = 1024 * 1024;

/// Errors returned by the forwarder.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Missing or malformed fields, or an unsupported method.
    #[error("{0}")]
    InvalidInput(String),

    /// The destination was rejected by the SSRF policy.
    #[error("destination denied: {0}")]
    PolicyDenied(String),

    /// The upstream call did not finish within its timeout.
    #[error("upstream request timed out")]
    Timeout,

    /// The upstream could not be reached, or the connection broke mid-call.
    #[error("upstream connection failed: {0}")]
    ConnectionError(String),

    /// The upstream body exceeded the size ceiling.
    #[error("upstream response exceeded {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl ForwardError {
    /// HTTP status of the envelope carrying this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ForwardError::InvalidInput(_) | ForwardError::PolicyDenied(_) => 400,
            ForwardError::Timeout => 408,
            ForwardError::PayloadTooLarge { .. } => 413,
            ForwardError::ConnectionError(_) => 503,
            ForwardError::Unexpected(_) => 500,
        }
    }

    /// Message reported to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ForwardError::InvalidInput(msg) | ForwardError::Unexpected(msg) => msg.clone(),
            ForwardError::PolicyDenied(_) => "URL not allowed".to_string(),
            ForwardError::Timeout => "Request timeout".to_string(),
            ForwardError::ConnectionError(_) => "Connection error".to_string(),
            ForwardError::PayloadTooLarge { limit } => {
                if *limit >= MIB && limit % MIB == 0 {
                    format!("Response too large (>{}MB)", limit / MIB)
                } else {
                    format!("Response too large (>{limit} bytes)")
                }
            }
        }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidInput(_) => "invalid_input",
            ForwardError::PolicyDenied(_) => "policy_denied",
            ForwardError::Timeout => "timeout",
            ForwardError::ConnectionError(_) => "connection_error",
            ForwardError::PayloadTooLarge { .. } => "payload_too_large",
            ForwardError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() {
            ForwardError::ConnectionError(e.to_string())
        } else {
            ForwardError::Unexpected(e.to_string())
        }
    }
}
