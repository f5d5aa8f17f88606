//! Notifier error types

use std::time::Duration;
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Per-symbol fetch failure.
///
/// Cloneable so every waiter on a single-flight fetch receives the same
/// failure. Never cached: a failed fetch leaves any previous entry in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch for {symbol} timed out after {timeout:?}")]
    Timeout { symbol: String, timeout: Duration },

    #[error("upstream error for {symbol}: {message}")]
    Upstream { symbol: String, message: String },

    #[error("malformed quote data for {symbol}: {message}")]
    Malformed { symbol: String, message: String },
}

impl FetchError {
    /// Symbol the failure applies to.
    pub fn symbol(&self) -> &str {
        match self {
            FetchError::Timeout { symbol, .. }
            | FetchError::Upstream { symbol, .. }
            | FetchError::Malformed { symbol, .. } => symbol,
        }
    }
}

/// Transport delivery failure. Logged by the caller; never affects cache or
/// schedule state.
#[derive(Error, Debug, Clone)]
#[error("delivery to channel {channel} failed: {message}")]
pub struct DeliveryError {
    pub channel: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, NotifierError>;
