//! The module contains the errors the engine can throw.
//!
//! The errors are:
//!
//! - [`Configuration`] thrown at startup for an invalid configuration.
//! - [`Remote`] thrown when one of the external services fails.
//! - [`Cache`] thrown when the on-disk cache cannot be read or written.
//! - [`InvalidAmount`] thrown when a balance string is malformed.
//! - [`NotImplemented`] thrown for expenses the engine refuses to approximate.
//!
//!  [`Configuration`]: EngineError::Configuration
//!  [`Remote`]: EngineError::Remote
//!  [`Cache`]: EngineError::Cache
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`NotImplemented`]: EngineError::NotImplemented
use reqwest::StatusCode;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("remote fetch failed: {0}")]
    Remote(#[from] ApiError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("no budget id configured and no default budget found")]
    NoDefaultBudget,
    #[error("authorization callback state mismatch")]
    StateMismatch,
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("timed out waiting for the authorization callback")]
    AuthorizationTimeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a remote call to one of the external services.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Failure of the keyed cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("\"{0}\" key not found!")]
    NotFound(String),
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::NotImplemented(a), Self::NotImplemented(b)) => a == b,
            (Self::Authorization(a), Self::Authorization(b)) => a == b,
            (Self::NoDefaultBudget, Self::NoDefaultBudget)
            | (Self::StateMismatch, Self::StateMismatch)
            | (Self::AuthorizationTimeout, Self::AuthorizationTimeout)
            | (Self::Cancelled, Self::Cancelled)
            | (Self::DeadlineExceeded, Self::DeadlineExceeded) => true,
            (Self::Remote(a), Self::Remote(b)) => a.to_string() == b.to_string(),
            (Self::Cache(a), Self::Cache(b)) => a.to_string() == b.to_string(),
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind(),
            (Self::Json(a), Self::Json(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
