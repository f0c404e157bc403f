//! Diagnostic capabilities: formatting, query plans, server information.
//!
//! None of these outputs are normalized across backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::connection::DatabaseConnection;
use crate::error::Result;

/// Optional features a backend may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverFeature {
    Transactions,
    StoredProcedures,
    Views,
    Triggers,
    ForeignKeys,
    Indexes,
    Ssl,
    Pooling,
}

/// Static description of what a driver supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    pub name: String,
    /// Server version the driver is written against
    pub version: String,
    pub supported_versions: Vec<String>,
    pub features: Vec<DriverFeature>,
}

impl DriverCapabilities {
    pub fn supports(&self, feature: DriverFeature) -> bool {
        self.features.contains(&feature)
    }
}

/// Live server diagnostics plus the static capability descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub max_connections: Option<u64>,
    pub capabilities: DriverCapabilities,
}

/// Trait for backend diagnostics.
#[async_trait]
pub trait Diagnostics: DatabaseConnection {
    /// Static capability descriptor, available without a session.
    fn capabilities(&self) -> DriverCapabilities;

    /// Cosmetic reformatting; no semantic guarantee.
    fn format_query(&self, sql: &str) -> String {
        sqlformat::format(
            sql,
            &sqlformat::QueryParams::None,
            &sqlformat::FormatOptions::default(),
        )
    }

    /// Backend-native execution plan of `sql`.
    async fn get_query_plan(&mut self, sql: &str) -> Result<serde_json::Value>;

    async fn get_server_info(&mut self) -> Result<ServerInfo>;
}
