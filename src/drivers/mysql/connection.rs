//! MySQL connection implementation.
//!
//! This module implements the `DatabaseConnection` trait for MySQL using a
//! single SQLx `MySqlConnection`, so every statement of a transaction runs on
//! the same server session.

use anyhow::Context as _;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{ConnectOptions, Connection, Either, Executor, MySqlConnection, Row as _, Statement};
use std::future::Future;
use std::time::{Duration, Instant};

use super::types::MySqlValueConverter;
use crate::config::DriverSettings;
use crate::error::{DriverError, Result};
use crate::traits::connection::elapsed_ms;
use crate::traits::{
    BackendType, CancelToken, ConnectionProfile, DatabaseConnection, QueryCanceller, QueryResult,
    Row, Value,
};

/// One open server session and what is needed to reach it out of band.
pub(super) struct Session {
    pub(super) conn: MySqlConnection,
    pub(super) database: String,
    thread_id: u64,
    options: MySqlConnectOptions,
}

/// MySQL backend driver.
///
/// Created unconnected; `connect` opens exactly one server session.
pub struct MySqlDriver {
    settings: DriverSettings,
    pub(super) session: Option<Session>,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("settings", &self.settings)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl MySqlDriver {
    /// Create a new, unconnected driver.
    pub fn new(settings: DriverSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    /// Build MySqlConnectOptions from a profile.
    pub(crate) fn build_connect_options(
        profile: &ConnectionProfile,
        settings: &DriverSettings,
    ) -> Result<MySqlConnectOptions> {
        if profile.backend != BackendType::MySql {
            return Err(DriverError::InvalidConfig(format!(
                "{} profile given to the MySQL driver",
                profile.backend
            )));
        }
        profile.validate()?;

        let mut options = MySqlConnectOptions::new()
            .host(&profile.host)
            .port(profile.port)
            .username(&profile.username)
            .password(&profile.password)
            .charset(&settings.charset)
            .ssl_mode(MySqlValueConverter::map_ssl_mode(profile.ssl));

        if !profile.database.is_empty() {
            options = options.database(&profile.database);
        }

        Ok(options)
    }

    /// Skip whitespace and any leading `--`, `#` or `/* */` comments.
    fn strip_leading_comments(sql: &str) -> &str {
        let mut rest = sql.trim_start();
        loop {
            if rest.starts_with("--") || rest.starts_with('#') {
                rest = rest.find('\n').map_or("", |pos| &rest[pos + 1..]);
            } else if let Some(body) = rest.strip_prefix("/*") {
                rest = body.find("*/").map_or("", |pos| &body[pos + 2..]);
            } else {
                return rest;
            }
            rest = rest.trim_start();
        }
    }

    /// Check if the statement can produce a result set.
    ///
    /// Only decides whether an empty result is worth describing; rows the
    /// server sends are always collected.
    pub(crate) fn is_select_query(sql: &str) -> bool {
        const ROW_KEYWORDS: &[&str] = &[
            "select", "with", "show", "describe", "desc", "explain", "call", "values", "table",
            "check", "analyze", "optimize", "repair", "checksum", "help",
        ];

        let statement = Self::strip_leading_comments(sql);
        if statement.starts_with('(') {
            return true;
        }
        let keyword: String = statement
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();
        ROW_KEYWORDS.contains(&keyword.as_str())
    }

    pub(super) fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(DriverError::not_connected)
    }

    /// Translate a backend error, dropping the session if the wire is gone.
    pub(super) fn fail(&mut self, err: sqlx::Error) -> DriverError {
        if MySqlValueConverter::is_session_lost(&err) {
            tracing::warn!(error = %err, "MySQL session lost");
            self.session = None;
            DriverError::Connection(err.to_string())
        } else {
            DriverError::Backend(err.into())
        }
    }

    /// Run a catalog query and return its raw rows.
    ///
    /// Without arguments the statement goes over the text protocol, which
    /// also accepts statements the server cannot prepare.
    pub(super) async fn fetch_catalog(
        &mut self,
        sql: &str,
        args: &[&str],
    ) -> Result<Vec<MySqlRow>> {
        let session = self.session_mut()?;
        let fetched = if args.is_empty() {
            (&mut session.conn).fetch_all(sql).await
        } else {
            args.iter()
                .fold(sqlx::query(sql), |query, arg| query.bind(arg.to_string()))
                .fetch_all(&mut session.conn)
                .await
        };
        fetched.map_err(|err| self.fail(err))
    }

    /// Run one statement, keeping every row and completion the server sends.
    async fn run_statement(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Value],
    ) -> sqlx::Result<QueryResult> {
        let mut rows: Vec<MySqlRow> = Vec::new();
        let mut rows_affected = 0;
        {
            let mut stream = if params.is_empty() {
                (&mut *conn).fetch_many(sql)
            } else {
                (&mut *conn).fetch_many(MySqlValueConverter::bind_all(sql, params))
            };
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => rows.push(row),
                }
            }
        }

        if rows.is_empty() && !Self::is_select_query(sql) {
            return Ok(QueryResult::modified(rows_affected, 0));
        }

        let columns = match rows.first() {
            Some(first) => MySqlValueConverter::column_names(first.columns()),
            None => Self::describe_columns(conn, sql).await,
        };
        let rows: Vec<Row> = rows.iter().map(MySqlValueConverter::convert_row).collect();
        Ok(QueryResult::with_rows(columns, rows, 0))
    }

    /// Column names of a statement that returned no rows.
    async fn describe_columns(conn: &mut MySqlConnection, sql: &str) -> Vec<String> {
        match (&mut *conn).prepare(sql).await {
            Ok(statement) => MySqlValueConverter::column_names(statement.columns()),
            Err(err) => {
                tracing::debug!(error = %err, "Could not describe empty result");
                Vec::new()
            }
        }
    }

    async fn run_control(&mut self, sql: &'static str) -> Result<()> {
        let session = self.session_mut()?;
        match session.conn.execute(sql).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }
}

/// Open one session, bounded by `timeout`.
async fn open_session(options: &MySqlConnectOptions, timeout: Duration) -> Result<MySqlConnection> {
    with_timeout(timeout, async {
        options
            .connect()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))
    })
    .await
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let message = format!("timed out after {}s", timeout.as_secs());
    smol::future::or(fut, async move {
        smol::Timer::after(timeout).await;
        Err(DriverError::Connection(message))
    })
    .await
}

/// Aborts the running statement of one server thread via `KILL QUERY`.
struct KillQuery {
    options: MySqlConnectOptions,
    thread_id: u64,
    timeout: Duration,
}

#[async_trait]
impl QueryCanceller for KillQuery {
    async fn cancel(&self) -> Result<()> {
        let mut conn = open_session(&self.options, self.timeout).await?;
        let sql = format!("KILL QUERY {}", self.thread_id);
        let outcome = conn.execute(sql.as_str()).await;
        if let Err(err) = conn.close().await {
            tracing::debug!(error = %err, "Closing cancel connection failed");
        }
        outcome
            .with_context(|| format!("KILL QUERY {} failed", self.thread_id))
            .map_err(DriverError::Backend)?;

        tracing::info!(thread_id = self.thread_id, "Sent KILL QUERY");
        Ok(())
    }
}

#[async_trait]
impl DatabaseConnection for MySqlDriver {
    fn backend_type(&self) -> BackendType {
        BackendType::MySql
    }

    async fn connect(&mut self, profile: &ConnectionProfile) -> Result<()> {
        self.disconnect().await?;

        let options = Self::build_connect_options(profile, &self.settings)?;
        let mut conn = open_session(&options, self.settings.connect_timeout()).await?;

        let thread_id = match sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
            .fetch_one(&mut conn)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(error = %close_err, "Closing half-open session failed");
                }
                return Err(DriverError::Connection(err.to_string()));
            }
        };

        tracing::info!(
            host = %profile.host,
            port = profile.port,
            database = %profile.database,
            thread_id,
            "Connected to MySQL"
        );

        self.session = Some(Session {
            conn,
            database: profile.database.clone(),
            thread_id,
            options,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.conn.close().await {
                tracing::warn!(error = %err, "Error closing MySQL session");
            }
            tracing::debug!(thread_id = session.thread_id, "Disconnected from MySQL");
        }
        Ok(())
    }

    async fn test_connection(&self, profile: &ConnectionProfile) -> Result<bool> {
        let options = Self::build_connect_options(profile, &self.settings)?;
        let timeout = self.settings.test_timeout();

        let mut conn = open_session(&options, timeout).await?;
        let ping = with_timeout(timeout, async {
            conn.ping()
                .await
                .map_err(|e| DriverError::Connection(e.to_string()))
        })
        .await;
        if let Err(err) = conn.close().await {
            tracing::debug!(error = %err, "Closing test connection failed");
        }
        ping?;

        tracing::debug!(host = %profile.host, "MySQL test connection succeeded");
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let session = self.session_mut()?;

        let sql = sql.trim();
        if sql.is_empty() {
            return Ok(QueryResult::failed("Empty query", 0));
        }

        let start = Instant::now();
        let outcome = Self::run_statement(&mut session.conn, sql, params).await;
        let execution_time_ms = elapsed_ms(start);

        match outcome {
            Ok(mut result) => {
                result.execution_time_ms = execution_time_ms;
                tracing::debug!(
                    rows = result.row_count,
                    elapsed_ms = execution_time_ms as u64,
                    "Query executed"
                );
                Ok(result)
            }
            Err(err) if MySqlValueConverter::is_session_lost(&err) => Err(self.fail(err)),
            Err(err) => {
                tracing::debug!(error = %err, "Query failed");
                Ok(QueryResult::failed(
                    err.as_database_error()
                        .map(|db| db.message().to_string())
                        .unwrap_or_else(|| err.to_string()),
                    execution_time_ms,
                ))
            }
        }
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.run_control("START TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_control("ROLLBACK").await
    }

    fn cancel_token(&self) -> Option<CancelToken> {
        self.session.as_ref().map(|session| {
            CancelToken::new(KillQuery {
                options: session.options.clone(),
                thread_id: session.thread_id,
                timeout: self.settings.connect_timeout(),
            })
        })
    }
}
