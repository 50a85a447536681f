// src/error.rs
//! Error taxonomy shared by the relay core.
//!
//! Only the publish scheduler and the top-level driver branch on the kind;
//! everything else just propagates with `?`.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Destination asked us to back off for an explicit duration.
    #[error("throttled by destination for {}s", .wait.as_secs())]
    Throttled { wait: Duration },

    /// Network or filesystem hiccup; worth a bounded number of retries.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Destination refused the content; retrying will not help.
    #[error("destination rejected content: {0}")]
    PermanentReject(String),

    /// Settings missing or invalid; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RelayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::TransientIo(_))
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "throttled",
            Self::TransientIo(_) => "transient_io",
            Self::PermanentReject(_) => "permanent_reject",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        Self::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::TransientIo(e.to_string())
        } else {
            Self::Configuration(format!("malformed JSON: {e}"))
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        Self::TransientIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
