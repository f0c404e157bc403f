//! Connection manager.
//!
//! The manager owns the map from connection id to live session and is the
//! only component that calls a driver's `connect` or `disconnect`. Every id
//! gets its own slot with its own lock, so statements against one id run one
//! at a time while different ids proceed independently.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use querydesk::{ConnectionManager, DriverRegistry, DriverSettings};
//!
//! let registry = Arc::new(DriverRegistry::with_defaults(DriverSettings::default()));
//! let manager = ConnectionManager::new(registry);
//!
//! manager.open(&profile).await?;
//! let result = manager.execute_query(profile.id, "SELECT 1", Vec::new()).await?;
//! manager.close(profile.id).await?;
//! ```

use async_lock::Mutex;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crate::drivers::DriverRegistry;
use crate::error::{DriverError, Result};
use crate::traits::connection::elapsed_ms;
use crate::traits::{
    BackendType, CancelToken, ColumnInfo, ConnectionId, ConnectionProfile, DatabaseDriver,
    QueryResult, SchemaSnapshot, ServerInfo, TableInfo, Value,
};

/// Lifecycle state of one connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No live session
    Absent,
    /// `open` is establishing a session
    Connecting,
    /// A live session is stored
    Open,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Absent => 0,
            Self::Connecting => 1,
            Self::Open => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            _ => Self::Absent,
        }
    }
}

/// An opened driver stored under its connection id.
struct LiveSession {
    driver: Box<dyn DatabaseDriver>,
    backend: BackendType,
    opened_at: DateTime<Utc>,
}

/// Per-id lock plus the state that must be readable without it.
struct SessionSlot {
    live: Mutex<Option<LiveSession>>,
    state: AtomicU8,
    cancel: Mutex<Option<CancelToken>>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            live: Mutex::new(None),
            state: AtomicU8::new(SessionState::Absent.as_u8()),
            cancel: Mutex::new(None),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Forget the session held in `live`; the caller holds the slot lock.
    async fn clear(&self, live: &mut Option<LiveSession>) -> Option<LiveSession> {
        *self.cancel.lock().await = None;
        self.set_state(SessionState::Absent);
        live.take()
    }
}

/// Resets a slot to `Absent` unless disarmed, so an `open` that fails or
/// is dropped mid-connect never leaves the id `Connecting`.
struct ConnectingGuard<'a> {
    slot: &'a SessionSlot,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(slot: &'a SessionSlot) -> Self {
        slot.set_state(SessionState::Connecting);
        Self { slot, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.set_state(SessionState::Absent);
        }
    }
}

/// Owns the live sessions, keyed by connection id.
///
/// Slots are created on first use and kept for the lifetime of the manager;
/// an empty slot is the `Absent` state. Keeping them avoids a race where a
/// waiter holds a slot that was already unlinked from the map.
pub struct ConnectionManager {
    registry: Arc<DriverRegistry>,
    slots: Mutex<HashMap<ConnectionId, Arc<SessionSlot>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager that builds drivers from `registry`.
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    async fn slot(&self, id: ConnectionId) -> Arc<SessionSlot> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(id)
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .clone()
    }

    async fn existing_slot(&self, id: ConnectionId) -> Option<Arc<SessionSlot>> {
        self.slots.lock().await.get(&id).cloned()
    }

    /// Open a session for `profile`, unless one is already open for its id.
    ///
    /// # Errors
    ///
    /// `UnsupportedBackend` if the registry has no driver for the profile's
    /// backend, or the driver's connect error. The id stays `Absent` on error.
    pub async fn open(&self, profile: &ConnectionProfile) -> Result<()> {
        let slot = self.slot(profile.id).await;
        let mut live = slot.live.lock().await;

        if live.is_some() {
            tracing::debug!(connection_id = %profile.id, "Session already open");
            return Ok(());
        }

        let connecting = ConnectingGuard::new(&slot);
        let start = Instant::now();

        let mut driver = self.registry.create(profile.backend)?;

        if let Err(err) = driver.connect(profile).await {
            tracing::warn!(
                connection_id = %profile.id,
                backend = %profile.backend,
                error = %err,
                "Failed to open session"
            );
            return Err(err);
        }

        *slot.cancel.lock().await = driver.cancel_token();
        *live = Some(LiveSession {
            driver,
            backend: profile.backend,
            opened_at: Utc::now(),
        });
        slot.set_state(SessionState::Open);
        connecting.disarm();

        tracing::info!(
            connection_id = %profile.id,
            backend = %profile.backend,
            elapsed_ms = elapsed_ms(start) as u64,
            "Session opened"
        );
        Ok(())
    }

    /// Close the session for `id`. Closing an absent id does nothing.
    ///
    /// The session is forgotten even if the driver reports a disconnect error.
    pub async fn close(&self, id: ConnectionId) -> Result<()> {
        let Some(slot) = self.existing_slot(id).await else {
            return Ok(());
        };
        let mut live = slot.live.lock().await;

        let Some(mut session) = slot.clear(&mut live).await else {
            return Ok(());
        };
        session.driver.disconnect().await?;

        tracing::info!(
            connection_id = %id,
            backend = %session.backend,
            opened_for_secs = (Utc::now() - session.opened_at).num_seconds(),
            "Session closed"
        );
        Ok(())
    }

    /// Close every open session, returning the first error.
    pub async fn close_all(&self) -> Result<()> {
        let ids: Vec<ConnectionId> = self.slots.lock().await.keys().copied().collect();
        let mut first_error = None;

        for id in ids {
            if let Err(err) = self.close(id).await {
                tracing::warn!(connection_id = %id, error = %err, "Failed to close session");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether a live session is stored for `id`.
    pub async fn is_active(&self, id: ConnectionId) -> bool {
        self.state(id).await == SessionState::Open
    }

    /// Whether an operation currently holds the lock of `id`.
    ///
    /// The per-id lock is the session's busy flag: it is held for the whole
    /// of `open`, `close` and every routed statement.
    pub async fn is_busy(&self, id: ConnectionId) -> bool {
        match self.existing_slot(id).await {
            Some(slot) => slot.live.try_lock().is_none(),
            None => false,
        }
    }

    pub async fn state(&self, id: ConnectionId) -> SessionState {
        match self.existing_slot(id).await {
            Some(slot) => slot.state(),
            None => SessionState::Absent,
        }
    }

    /// Ids with a live session.
    pub async fn active_ids(&self) -> Vec<ConnectionId> {
        self.slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.state() == SessionState::Open)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Run `op` against the live session of `id`, holding that id's lock.
    ///
    /// If the driver reports itself disconnected afterwards (its session was
    /// lost mid-call), the session is dropped and the id becomes `Absent`.
    ///
    /// # Errors
    ///
    /// `NoActiveConnection` if `id` has no live session, otherwise whatever
    /// `op` returns.
    pub async fn with_session<T, F>(&self, id: ConnectionId, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut dyn DatabaseDriver) -> BoxFuture<'a, Result<T>>,
    {
        let slot = self
            .existing_slot(id)
            .await
            .ok_or_else(|| DriverError::no_session(id))?;
        let mut live = slot.live.lock().await;

        let session = live.as_mut().ok_or_else(|| DriverError::no_session(id))?;
        let result = op(session.driver.as_mut()).await;

        if !session.driver.is_connected() {
            tracing::warn!(connection_id = %id, "Session lost, dropping it");
            slot.clear(&mut live).await;
        }

        result
    }

    /// Execute one statement on the session of `id`.
    pub async fn execute_query(
        &self,
        id: ConnectionId,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<QueryResult> {
        let sql = sql.to_string();
        let result = self
            .with_session(id, move |driver| {
                Box::pin(async move { driver.execute_query(&sql, &params).await })
            })
            .await?;

        tracing::debug!(
            connection_id = %id,
            elapsed_ms = result.execution_time_ms as u64,
            failed = result.is_error(),
            "Query finished"
        );
        Ok(result)
    }

    /// Run `statements` in one transaction on the session of `id`.
    pub async fn execute_transaction(
        &self,
        id: ConnectionId,
        statements: Vec<String>,
    ) -> Result<Vec<QueryResult>> {
        self.with_session(id, move |driver| {
            Box::pin(async move { driver.execute_transaction(&statements).await })
        })
        .await
    }

    pub async fn get_schema(&self, id: ConnectionId) -> Result<SchemaSnapshot> {
        let start = Instant::now();
        let snapshot = self
            .with_session(id, |driver| Box::pin(async move { driver.get_schema().await }))
            .await?;

        tracing::info!(
            connection_id = %id,
            databases = snapshot.databases.len(),
            elapsed_ms = elapsed_ms(start) as u64,
            "Schema loaded"
        );
        Ok(snapshot)
    }

    pub async fn get_databases(&self, id: ConnectionId) -> Result<Vec<String>> {
        self.with_session(id, |driver| Box::pin(async move { driver.get_databases().await }))
            .await
    }

    pub async fn get_tables(
        &self,
        id: ConnectionId,
        database: Option<String>,
    ) -> Result<Vec<String>> {
        self.with_session(id, move |driver| {
            Box::pin(async move { driver.get_tables(database.as_deref()).await })
        })
        .await
    }

    pub async fn get_table_info(
        &self,
        id: ConnectionId,
        table: String,
        database: Option<String>,
    ) -> Result<TableInfo> {
        self.with_session(id, move |driver| {
            Box::pin(async move { driver.get_table_info(&table, database.as_deref()).await })
        })
        .await
    }

    pub async fn get_columns(
        &self,
        id: ConnectionId,
        table: String,
        database: Option<String>,
    ) -> Result<Vec<ColumnInfo>> {
        self.with_session(id, move |driver| {
            Box::pin(async move { driver.get_columns(&table, database.as_deref()).await })
        })
        .await
    }

    pub async fn format_query(&self, id: ConnectionId, sql: &str) -> Result<String> {
        let sql = sql.to_string();
        self.with_session(id, move |driver| {
            Box::pin(async move { Ok(driver.format_query(&sql)) })
        })
        .await
    }

    pub async fn get_query_plan(&self, id: ConnectionId, sql: &str) -> Result<serde_json::Value> {
        let sql = sql.to_string();
        self.with_session(id, move |driver| {
            Box::pin(async move { driver.get_query_plan(&sql).await })
        })
        .await
    }

    pub async fn get_server_info(&self, id: ConnectionId) -> Result<ServerInfo> {
        self.with_session(id, |driver| Box::pin(async move { driver.get_server_info().await }))
            .await
    }

    /// Ask the backend to abort the statement running on `id`.
    ///
    /// Does not take the per-id lock, so it reaches a statement that is still
    /// executing. Requests queued behind that statement are not affected.
    pub async fn cancel(&self, id: ConnectionId) -> Result<()> {
        let slot = self
            .existing_slot(id)
            .await
            .ok_or_else(|| DriverError::no_session(id))?;
        let token = slot
            .cancel
            .lock()
            .await
            .clone()
            .ok_or_else(|| DriverError::no_session(id))?;

        tracing::info!(connection_id = %id, "Cancelling running statement");
        token.cancel().await
    }

    /// Check that `profile` is reachable, using a throwaway driver.
    ///
    /// Never touches stored sessions or their locks.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> Result<bool> {
        let driver = self.registry.create(profile.backend)?;
        let reachable = driver.test_connection(profile).await?;
        tracing::info!(
            connection_id = %profile.id,
            backend = %profile.backend,
            reachable,
            "Connection test finished"
        );
        Ok(reachable)
    }
}
