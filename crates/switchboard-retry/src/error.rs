//! Error types for outbound message sends.
//!
//! Every transport failure is a [`SendError`]. The retry policy reads
//! [`SendError::is_retryable`] to decide whether an item stays pending or is
//! exhausted immediately.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for send operations.
pub type Result<T> = std::result::Result<T, SendError>;

/// Failure reported by a message transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendError {
    /// The gateway could not be reached.
    #[error("network connection failed: {message}")]
    Network {
        /// Underlying failure
        message: String,
    },

    /// The gateway did not answer in time.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Client timeout that elapsed
        timeout_seconds: u64,
    },

    /// The gateway rejected the message (4xx).
    #[error("message rejected: HTTP {status_code}")]
    Rejected {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body
        body: String,
    },

    /// The gateway failed (5xx).
    #[error("gateway error: HTTP {status_code}")]
    GatewayError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body
        body: String,
    },

    /// The gateway asked us to slow down.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after_seconds: u64,
    },

    /// The sending WhatsApp instance is not connected to the gateway.
    #[error("instance {instance_id} is disconnected")]
    InstanceDisconnected {
        /// Instance that is offline
        instance_id: String,
    },

    /// Transport is misconfigured.
    #[error("transport configuration error: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// Unexpected failure inside the transport.
    #[error("internal send error: {message}")]
    Internal {
        /// Internal error message
        message: String,
    },
}

impl SendError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a rejection from a 4xx response.
    pub fn rejected(status_code: u16, body: impl Into<String>) -> Self {
        Self::Rejected { status_code, body: body.into() }
    }

    /// Creates a gateway error from a 5xx response.
    pub fn gateway_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::GatewayError { status_code, body: body.into() }
    }

    /// Creates a rate limit error.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates a disconnected-instance error.
    pub fn instance_disconnected(instance_id: impl Into<String>) -> Self {
        Self::InstanceDisconnected { instance_id: instance_id.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether a later attempt could succeed.
    ///
    /// Network problems, timeouts, 5xx, rate limits and disconnected
    /// instances are transient. Rejections and configuration or internal
    /// errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::GatewayError { .. }
            | Self::RateLimited { .. }
            | Self::InstanceDisconnected { .. } => true,

            Self::Rejected { .. } | Self::Configuration { .. } | Self::Internal { .. } => false,
        }
    }

    /// Delay requested by the gateway, if any.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Category for logging.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from(self)
    }
}

/// Coarse classification of send errors for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connectivity or timeout.
    Network,
    /// 4xx rejections.
    Rejected,
    /// 5xx gateway failures.
    Gateway,
    /// Rate limiting.
    RateLimit,
    /// Instance offline.
    Instance,
    /// Configuration problems.
    Configuration,
    /// Internal errors.
    Internal,
}

impl From<&SendError> for ErrorCategory {
    fn from(error: &SendError) -> Self {
        match error {
            SendError::Network { .. } | SendError::Timeout { .. } => Self::Network,
            SendError::Rejected { .. } => Self::Rejected,
            SendError::GatewayError { .. } => Self::Gateway,
            SendError::RateLimited { .. } => Self::RateLimit,
            SendError::InstanceDisconnected { .. } => Self::Instance,
            SendError::Configuration { .. } => Self::Configuration,
            SendError::Internal { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Rejected => write!(f, "rejected"),
            Self::Gateway => write!(f, "gateway"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Instance => write!(f, "instance"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
