//! Scripted in-memory driver for exercising the contract and the manager.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DriverError, Result};
use crate::traits::{
    BackendType, CancelToken, ColumnInfo, ConnectionProfile, DatabaseConnection, Diagnostics,
    DriverCapabilities, DriverFeature, QueryCanceller, QueryResult, Row, SchemaIntrospection,
    ServerInfo, TableInfo, Value,
};

#[derive(Default)]
struct ScriptState {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    cancels: AtomicUsize,
    executed: AtomicUsize,
    in_flight: AtomicUsize,
    interleaved: AtomicBool,
    fail_connect: AtomicBool,
    fail_commit: AtomicBool,
    delay: Mutex<Option<Duration>>,
    failing: Mutex<Vec<String>>,
    losing: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
}

/// Shared behaviour and counters for every `MockDriver` built from it.
#[derive(Clone, Default)]
pub(crate) struct MockScript {
    state: Arc<ScriptState>,
}

impl MockScript {
    /// Profile whose database is `app`.
    pub fn profile() -> ConnectionProfile {
        ConnectionProfile::new(
            "mock".to_string(),
            BackendType::MySql,
            "localhost".to_string(),
            3306,
            "app".to_string(),
            "root".to_string(),
            "secret".to_string(),
        )
    }

    pub fn fail_statements_containing(&self, pattern: &str) {
        self.state.failing.lock().unwrap().push(pattern.to_string());
    }

    /// Statements containing `pattern` drop the session, like a reset socket.
    pub fn lose_session_on(&self, pattern: &str) {
        self.state.losing.lock().unwrap().push(pattern.to_string());
    }

    pub fn fail_connect(&self) {
        self.state.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_commit(&self) {
        self.state.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Make connect and every statement take `delay`.
    pub fn with_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.state.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.state.executed.load(Ordering::SeqCst)
    }

    /// Whether two statements were ever in flight at once.
    pub fn interleaved(&self) -> bool {
        self.state.interleaved.load(Ordering::SeqCst)
    }

    /// Statements that ran outside a transaction or inside a committed one.
    pub fn committed_statements(&self) -> Vec<String> {
        self.state.committed.lock().unwrap().clone()
    }

    async fn pause(&self) {
        let delay = *self.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            smol::Timer::after(delay).await;
        }
    }

    fn fails(&self, sql: &str) -> bool {
        Self::matches(&self.state.failing, sql)
    }

    fn loses(&self, sql: &str) -> bool {
        Self::matches(&self.state.losing, sql)
    }

    fn matches(patterns: &Mutex<Vec<String>>, sql: &str) -> bool {
        patterns
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| sql.contains(pattern.as_str()))
    }
}

struct MockCanceller {
    script: MockScript,
}

#[async_trait]
impl QueryCanceller for MockCanceller {
    async fn cancel(&self) -> Result<()> {
        self.script.state.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockDriver {
    script: MockScript,
    database: Option<String>,
    pending: Option<Vec<String>>,
}

impl MockDriver {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            database: None,
            pending: None,
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.database.is_none() {
            return Err(DriverError::not_connected());
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseConnection for MockDriver {
    fn backend_type(&self) -> BackendType {
        BackendType::MySql
    }

    async fn connect(&mut self, profile: &ConnectionProfile) -> Result<()> {
        self.script.state.connects.fetch_add(1, Ordering::SeqCst);
        self.script.pause().await;
        if self.script.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("Access denied".to_string()));
        }
        self.database = Some(profile.database.clone());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.database.take().is_some() {
            self.script.state.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        self.pending = None;
        Ok(())
    }

    async fn test_connection(&self, _profile: &ConnectionProfile) -> Result<bool> {
        Ok(!self.script.state.fail_connect.load(Ordering::SeqCst))
    }

    fn is_connected(&self) -> bool {
        self.database.is_some()
    }

    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_connected()?;
        if self.script.loses(sql) {
            self.database = None;
            return Err(DriverError::Connection("Connection reset by peer".to_string()));
        }

        let state = &self.script.state;
        if state.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            state.interleaved.store(true, Ordering::SeqCst);
        }
        self.script.pause().await;
        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        state.executed.fetch_add(1, Ordering::SeqCst);

        if self.script.fails(sql) {
            return Ok(QueryResult::failed(
                format!("You have an error in your SQL syntax near '{sql}'"),
                0,
            ));
        }

        match self.pending.as_mut() {
            Some(pending) => pending.push(sql.to_string()),
            None => state.committed.lock().unwrap().push(sql.to_string()),
        }

        let mut row = Row::new();
        row.insert("sql".to_string(), Value::Text(sql.to_string()));
        row.insert("params".to_string(), Value::UInt(params.len() as u64));
        Ok(QueryResult::with_rows(
            vec!["sql".to_string(), "params".to_string()],
            vec![row],
            0,
        ))
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.script.state.begins.fetch_add(1, Ordering::SeqCst);
        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_connected()?;
        if self.script.state.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("Lost connection during COMMIT".to_string()));
        }
        self.script.state.commits.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.pending.take() {
            self.script.state.committed.lock().unwrap().extend(pending);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.script.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.pending = None;
        Ok(())
    }

    fn cancel_token(&self) -> Option<CancelToken> {
        self.database.as_ref().map(|_| {
            CancelToken::new(MockCanceller {
                script: self.script.clone(),
            })
        })
    }
}

#[async_trait]
impl SchemaIntrospection for MockDriver {
    fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn get_databases(&mut self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        Ok(vec!["app".to_string(), "audit".to_string()])
    }

    async fn get_tables(&mut self, database: Option<&str>) -> Result<Vec<String>> {
        self.ensure_connected()?;
        let database = self.resolve_database(database)?;
        Ok(match database.as_str() {
            "app" => vec!["users".to_string()],
            _ => Vec::new(),
        })
    }

    async fn get_table_info(&mut self, table: &str, _database: Option<&str>) -> Result<TableInfo> {
        self.ensure_connected()?;
        Ok(TableInfo {
            name: table.to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "int".to_string(),
                    is_primary_key: true,
                    is_auto_increment: true,
                    ..Default::default()
                },
                ColumnInfo {
                    name: "email".to_string(),
                    data_type: "varchar".to_string(),
                    nullable: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        })
    }
}

#[async_trait]
impl Diagnostics for MockDriver {
    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            name: "Mock".to_string(),
            version: "1".to_string(),
            supported_versions: vec!["1".to_string()],
            features: vec![DriverFeature::Transactions],
        }
    }

    async fn get_query_plan(&mut self, sql: &str) -> Result<serde_json::Value> {
        self.ensure_connected()?;
        Ok(serde_json::json!([{ "query": sql }]))
    }

    async fn get_server_info(&mut self) -> Result<ServerInfo> {
        self.ensure_connected()?;
        Ok(ServerInfo {
            version: Some("mock-1".to_string()),
            max_connections: Some(10),
            capabilities: self.capabilities(),
        })
    }
}
