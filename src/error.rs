//! Error taxonomy shared by the registry, the drivers and the manager.
//!
//! Infrastructure failures (no session, connect failure, missing backend) are
//! raised as `DriverError`. SQL-level failures are data: they travel inside
//! `QueryResult::error` and never show up here.

use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::traits::BackendType;

/// Errors raised by the driver contract and the connection manager.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Network, authentication or TLS negotiation failed while connecting.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The operation targeted an identifier without a live session.
    #[error("No active connection for {0}")]
    NoActiveConnection(String),

    /// No constructor is registered for the requested backend.
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(BackendType),

    /// A statement inside a transaction failed; the transaction was rolled back.
    #[error("Transaction aborted at statement {index}: {message}")]
    TransactionAborted {
        /// Zero-based position of the failing statement.
        index: usize,
        /// Error reported by the backend.
        message: String,
    },

    /// The connection profile cannot be used by this backend.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catalog or diagnostic round trip failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl DriverError {
    /// Error for a driver instance that was never connected (or was closed).
    pub fn not_connected() -> Self {
        Self::NoActiveConnection("driver is not connected".to_string())
    }

    /// Error for a connection id missing from the manager.
    pub fn no_session(id: Uuid) -> Self {
        Self::NoActiveConnection(id.to_string())
    }

    /// Whether this error belongs to the infrastructure class (connection,
    /// session or registry problems) rather than a rolled-back transaction.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::TransactionAborted { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Attach what the backend was doing to a `Backend` error.
///
/// Other variants pass through untouched so their class survives.
pub(crate) trait BackendContext<T> {
    fn backend_context<C, F>(self, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> BackendContext<T> for Result<T> {
    fn backend_context<C, F>(self, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| match err {
            DriverError::Backend(inner) => DriverError::Backend(inner.context(context())),
            other => other,
        })
    }
}
