//! Error types for JoinMarket wallet client operations
//!
//! The crate uses a layered error model: narrow domain errors
//! ([`LockdateError`], [`ApiError`], [`SagaError`]) that callers can match
//! on, and a top-level [`JmWalletError`] umbrella that all public entry
//! points return via [`JmWalletResult`].

use thiserror::Error;

/// Result type alias for wallet client operations
pub type JmWalletResult<T> = Result<T, JmWalletError>;

/// Top-level error type for the wallet client libraries
#[derive(Debug, Error)]
pub enum JmWalletError {
    /// Lockdate parsing or conversion failed
    #[error("Lockdate error: {0}")]
    Lockdate(#[from] LockdateError),

    /// A backend API call failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// A saga step could not be carried out
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),
}

/// Errors produced by the [`Lockdate`](crate::data_structures::Lockdate)
/// value type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockdateError {
    /// The input timestamp cannot be represented as a lockdate
    #[error("Unsupported input: {0}")]
    InvalidInput(String),

    /// The input string does not match the `YYYY-MM` format
    #[error("Unsupported format: {0}")]
    InvalidFormat(String),
}

impl LockdateError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        LockdateError::InvalidInput(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        LockdateError::InvalidFormat(msg.into())
    }
}

/// Errors surfaced by calls against the jmwalletd REST API
///
/// Every call yields a distinguishable failure: HTTP status plus the
/// optional JSON error payload, a transport problem, or an undecodable
/// response body. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status code
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request could not be completed at the transport level
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ApiError::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        ApiError::Decode(msg.into())
    }

    /// The HTTP status code, if the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised at the saga boundary
///
/// Each network-facing saga step wraps the underlying [`ApiError`] in a
/// step-specific variant so the UI can render a message naming the
/// operation that failed. Restoration failures never appear here: they are
/// logged and swallowed (a cleanup failure must not mask the
/// primary result).
#[derive(Debug, Error)]
pub enum SagaError {
    /// A forward transition was attempted without its guard being satisfied
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The fidelity bond is still time-locked and cannot be spent
    #[error("Fidelity bond is still locked")]
    BondStillLocked,

    /// The UTXOs handed to the saga do not all belong to the source jar
    #[error("Precondition failed: UTXOs must be from the same jar")]
    WrongJar,

    /// Freezing sibling UTXOs failed
    #[error("Error freezing UTXOs: {0}")]
    Freeze(#[source] ApiError),

    /// Unfreezing the UTXOs about to be spent failed
    #[error("Error unfreezing UTXOs: {0}")]
    Unfreeze(#[source] ApiError),

    /// The sweep/direct-send call failed
    #[error("Error sending funds: {0}")]
    Send(#[source] ApiError),

    /// Deriving the destination address failed
    #[error("Error loading address: {0}")]
    AddressDerivation(#[source] ApiError),

    /// Reloading the wallet snapshot failed while awaiting confirmation
    #[error("Error reloading wallet: {0}")]
    WalletReload(#[source] ApiError),

    /// The operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,
}

impl SagaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SagaError::Validation(msg.into())
    }
}
