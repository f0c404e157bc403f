//! Core connection trait.
//!
//! `DatabaseConnection` covers session lifecycle, statement execution,
//! transactions and cancellation. One value of an implementing type owns at
//! most one backend session; methods that touch that session take `&mut self`,
//! so a single statement is in flight per session by construction.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::row::{Row, Value};
use super::types::{BackendType, ConnectionProfile};
use crate::error::{DriverError, Result};

/// Normalized result of one statement.
///
/// A result with `error` set carries no columns and no rows; SQL failures are
/// reported this way instead of as a `DriverError`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Number of rows returned
    pub row_count: usize,
    /// Rows changed by INSERT/UPDATE/DELETE style statements
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u128,
    pub error: Option<String>,
}

impl QueryResult {
    /// Result of a statement that returned rows
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>, execution_time_ms: u128) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            rows_affected: None,
            execution_time_ms,
            error: None,
        }
    }

    /// Result of a statement that only changed rows
    pub fn modified(rows_affected: u64, execution_time_ms: u128) -> Self {
        Self {
            rows_affected: Some(rows_affected),
            execution_time_ms,
            ..Default::default()
        }
    }

    /// Result of a statement the backend rejected
    pub fn failed(message: impl Into<String>, execution_time_ms: u128) -> Self {
        Self {
            execution_time_ms,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

/// Backend-specific way to abort the statement running on one session.
#[async_trait]
pub trait QueryCanceller: Send + Sync {
    async fn cancel(&self) -> Result<()>;
}

/// Cloneable handle that cancels the in-flight statement of one session.
///
/// Tokens are handed out after connect and can be used without holding the
/// session, so cancellation reaches a statement that is still running.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<dyn QueryCanceller>,
}

impl CancelToken {
    pub fn new(canceller: impl QueryCanceller + 'static) -> Self {
        Self {
            inner: Arc::new(canceller),
        }
    }

    pub async fn cancel(&self) -> Result<()> {
        self.inner.cancel().await
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").finish_non_exhaustive()
    }
}

/// Core trait for all backend sessions.
///
/// # Example
///
/// ```ignore
/// use querydesk::traits::DatabaseConnection;
///
/// async fn example(conn: &mut dyn DatabaseConnection) -> querydesk::Result<()> {
///     if conn.is_connected() {
///         let result = conn.execute_query("SELECT ?", &[1.into()]).await?;
///         // Process result...
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Get the backend family of this driver
    fn backend_type(&self) -> BackendType;

    /// Establish exactly one backend session.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Connection` when network, authentication or TLS
    /// negotiation fails. The driver stays unconnected in that case.
    async fn connect(&mut self, profile: &ConnectionProfile) -> Result<()>;

    /// Close the session. Calling this on a closed driver is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Open a throwaway session, ping it, and close it.
    ///
    /// Never touches this driver's own session. The throwaway handle is
    /// released on every path.
    async fn test_connection(&self, profile: &ConnectionProfile) -> Result<bool>;

    /// Local state only, no network round trip.
    fn is_connected(&self) -> bool;

    /// Execute one statement with positional parameters.
    ///
    /// SQL-level failures come back as a `QueryResult` with `error` set.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures, e.g. `NoActiveConnection` when the
    /// driver is not connected.
    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    async fn begin_transaction(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Run `statements` in one transaction, all or nothing.
    ///
    /// Commits only if every statement succeeds. On the first failure the
    /// transaction is rolled back and the failure is returned; results of the
    /// statements that ran before it are discarded.
    async fn execute_transaction(&mut self, statements: &[String]) -> Result<Vec<QueryResult>> {
        if !self.is_connected() {
            return Err(DriverError::not_connected());
        }

        self.begin_transaction().await?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, sql) in statements.iter().enumerate() {
            let failure = match self.execute_query(sql, &[]).await {
                Ok(result) => match result.error.clone() {
                    None => {
                        results.push(result);
                        continue;
                    }
                    Some(message) => DriverError::TransactionAborted { index, message },
                },
                Err(err) => err,
            };

            tracing::warn!(statement = index, error = %failure, "Rolling back transaction");
            if let Err(rollback_err) = self.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            return Err(failure);
        }

        if let Err(err) = self.commit().await {
            if let Err(rollback_err) = self.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback after failed commit failed");
            }
            return Err(DriverError::TransactionAborted {
                index: statements.len(),
                message: format!("commit failed: {}", err),
            });
        }

        Ok(results)
    }

    /// Token for out-of-band cancellation; `None` when not connected.
    fn cancel_token(&self) -> Option<CancelToken>;

    /// Best-effort abort of the statement currently running on this session.
    async fn cancel_query(&self) -> Result<()> {
        match self.cancel_token() {
            Some(token) => token.cancel().await,
            None => Ok(()),
        }
    }
}
