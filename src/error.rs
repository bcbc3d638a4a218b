//! Error types for the ledger-reconstruction core.
//!
//! This module provides a unified error type [`LedgerError`] covering every
//! failure mode the scheduler, retry wrapper, cache, explorer client, price
//! resolver, and ledger engine can surface.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`LedgerError::ConfigurationError`]: missing/invalid configuration
//! - [`LedgerError::TransientProviderError`]: exhausted-retry transient failures
//! - [`LedgerError::ExplorerApiError`]: non-retryable explorer HTTP/semantic errors
//! - [`LedgerError::DecodeError`]: malformed raw log payloads
//! - [`LedgerError::NotFound`]: a required row (position/pool/token) is absent
//! - [`LedgerError::InvariantViolated`]: an event would break a ledger invariant
//! - [`LedgerError::DatabaseError`]: persistence-layer failures
//!
//! All errors implement [`std::error::Error`] and include rich context via
//! the source error chain.
//!
//! # Example
//!
//! ```
//! use clp_ledger::error::{LedgerError, LedgerResult};
//!
//! fn validate_liquidity(liquidity: u128) -> LedgerResult<()> {
//!     if liquidity == 0 {
//!         return Err(LedgerError::invariant("liquidity cannot be zero"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`LedgerError`].
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Unified error type for the ledger-reconstruction core.
#[derive(Debug)]
pub enum LedgerError {
    /// Missing API key, unsupported chain, missing NFT-manager address, or any
    /// other invalid configuration.
    ConfigurationError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retries against a provider were exhausted on 429/5xx, a network error,
    /// or a provider-specific "rate limit" payload carried in a 200 response.
    /// The caller may retry at a higher level.
    TransientProviderError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Non-retryable HTTP status or a semantic explorer error (invalid
    /// parameters, unknown method, etc).
    ExplorerApiError {
        /// Human-readable error message
        message: String,
        /// HTTP status code, when one was returned
        status_code: Option<u16>,
    },

    /// A raw log payload was malformed: fewer than three 32-byte data chunks,
    /// or a required topic was missing.
    DecodeError {
        /// Human-readable error message
        message: String,
    },

    /// A position, pool, or required token row was absent.
    NotFound {
        /// Human-readable error message
        message: String,
    },

    /// Appending or folding an event would break a ledger invariant: nftId
    /// mismatch, non-monotonic timestamp on append, DECREASE before any
    /// INCREASE, etc.
    InvariantViolated {
        /// Human-readable error message
        message: String,
    },

    /// Persistence-layer failure (connection, query, migration, constraint).
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LedgerError {
    /// Create a new configuration error.
    #[must_use]
    pub fn config(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            source,
        }
    }

    /// Create a new transient-provider error.
    #[must_use]
    pub fn transient(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::TransientProviderError {
            message: message.into(),
            source,
        }
    }

    /// Create a new explorer API error.
    #[must_use]
    pub fn explorer_api(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::ExplorerApiError {
            message: message.into(),
            status_code,
        }
    }

    /// Create a new decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError {
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new invariant-violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolated {
            message: message.into(),
        }
    }

    /// Create a new database error.
    #[must_use]
    pub fn database(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationError { message, .. } => write!(f, "configuration error: {message}"),
            Self::TransientProviderError { message, .. } => {
                write!(f, "transient provider error: {message}")
            }
            Self::ExplorerApiError {
                message,
                status_code,
            } => match status_code {
                Some(code) => write!(f, "explorer API error ({code}): {message}"),
                None => write!(f, "explorer API error: {message}"),
            },
            Self::DecodeError { message } => write!(f, "decode error: {message}"),
            Self::NotFound { message } => write!(f, "not found: {message}"),
            Self::InvariantViolated { message } => write!(f, "invariant violated: {message}"),
            Self::DatabaseError { message, .. } => write!(f, "database error: {message}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigurationError { source, .. }
            | Self::TransientProviderError { source, .. }
            | Self::DatabaseError { source, .. } => {
                source.as_ref().map(|e| e.as_ref() as &dyn std::error::Error)
            }
            Self::ExplorerApiError { .. }
            | Self::DecodeError { .. }
            | Self::NotFound { .. }
            | Self::InvariantViolated { .. } => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::database("sqlite operation failed", Some(Box::new(err)))
    }
}
