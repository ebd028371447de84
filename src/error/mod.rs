//! Error types for httptrail.
//!
//! Two families live here. [`HttpTrailError`] is what the crate's own API
//! returns. The failure kinds in [`kinds`] describe what went wrong on the
//! wire; [`classify`] turns any of them into a stable [`ErrorCode`].

pub mod classify;
pub mod codes;
pub mod kinds;
pub mod transport;

pub use classify::classify;
pub use codes::ErrorCode;
pub use kinds::{
    BlockedHostnameError, BlockedIpError, CertificateError, ClassifiedError, DnsError,
    DnsErrorKind, Http2Error, Http2ErrorKind, NetOp, NetOpError, Network, OpCause, SyscallError,
    TlsRecordHeaderError, UrlError,
};

use std::sync::Arc;

use thiserror::Error;

/// A transport failure shared between the caller and the metric pipeline.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for all httptrail operations.
#[derive(Error, Debug)]
pub enum HttpTrailError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A round trip failed and the request definition asked to throw.
    ///
    /// `cause` is kept out of the `source()` chain; classify it directly.
    #[error("Request failed ({code}): {message}")]
    Request {
        code: ErrorCode,
        message: String,
        cause: SharedError,
    },
}

impl HttpTrailError {
    /// Build a request error from a transport failure, classifying it.
    pub fn request(cause: SharedError) -> Self {
        let (code, message) = classify(cause.as_ref());
        Self::Request {
            code,
            message,
            cause,
        }
    }

    /// The numeric code, when this error carries one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The raw transport failure behind a [`HttpTrailError::Request`].
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            Self::Request { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Whether this error came out of a round trip.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Transport(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HttpTrailError>;
