//! Backend type definitions and connection profiles.
//!
//! This module contains:
//! - `BackendType` - Closed set of database families a profile can target
//! - `ConnectionProfile` - Durable description of how to reach one database
//! - `ProfileUpdate` - The explicit update operation for a profile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DriverError, Result};

/// Identifier of a connection profile, stable across restarts.
pub type ConnectionId = Uuid;

/// Supported database families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    MySql,
    PostgreSql,
    Sqlite,
    SqlServer,
}

impl BackendType {
    /// Get the display name for this backend type
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::PostgreSql => "PostgreSQL",
            Self::Sqlite => "SQLite",
            Self::SqlServer => "SQL Server",
        }
    }

    /// Get the default port for server-based databases
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::PostgreSql => Some(5432),
            Self::Sqlite => None,
            Self::SqlServer => Some(1433),
        }
    }

    /// Get all backend types
    pub fn all() -> Vec<BackendType> {
        vec![Self::MySql, Self::PostgreSql, Self::Sqlite, Self::SqlServer]
    }

    /// Parse from a string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "postgresql" | "postgres" | "pg" => Some(Self::PostgreSql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            _ => None,
        }
    }

    /// Convert to the string used by the profile store
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlserver",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Durable description of how to reach one database.
///
/// The core only borrows a profile for the duration of a connect or test call;
/// storing it is the job of a [`ProfileStore`](crate::storage::ProfileStore).
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: ConnectionId,
    pub name: String,
    #[serde(rename = "type")]
    pub backend: BackendType,
    pub host: String,
    pub port: u16,
    /// Target database, also reported as the snapshot's current database
    pub database: String,
    pub username: String,
    pub password: String,
    /// Negotiate TLS with the server
    #[serde(default)]
    pub ssl: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl ConnectionProfile {
    /// Create a new profile with a fresh id and both timestamps set to now
    pub fn new(
        name: String,
        backend: BackendType,
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            backend,
            host,
            port,
            database,
            username,
            password,
            ssl: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enable or disable TLS
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Apply an update and bump `updated_at`.
    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            name,
            backend,
            host,
            port,
            database,
            username,
            password,
            ssl,
        } = update;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(backend) = backend {
            self.backend = backend;
        }
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(username) = username {
            self.username = username;
        }
        if let Some(password) = password {
            self.password = password;
        }
        if let Some(ssl) = ssl {
            self.ssl = ssl;
        }

        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Check the fields every server backend needs
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DriverError::InvalidConfig("Host is required".to_string()));
        }
        if self.port == 0 {
            return Err(DriverError::InvalidConfig("Port is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(DriverError::InvalidConfig("Username is required".to_string()));
        }
        Ok(())
    }

    /// `user@host:port/database`, without the secret
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// Partial update of a [`ConnectionProfile`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub backend: Option<BackendType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new(
            "local".to_string(),
            BackendType::MySql,
            "localhost".to_string(),
            3306,
            "app".to_string(),
            "root".to_string(),
            "secret".to_string(),
        )
    }

    #[test]
    fn test_backend_type_round_trip_names() {
        for backend in BackendType::all() {
            assert_eq!(BackendType::from_str(backend.to_db_str()), Some(backend));
        }
        assert_eq!(BackendType::from_str("MariaDB"), Some(BackendType::MySql));
        assert_eq!(BackendType::from_str("oracle"), None);
    }

    #[test]
    fn test_backend_type_default_ports() {
        assert_eq!(BackendType::MySql.default_port(), Some(3306));
        assert_eq!(BackendType::PostgreSql.default_port(), Some(5432));
        assert_eq!(BackendType::Sqlite.default_port(), None);
        assert_eq!(BackendType::SqlServer.default_port(), Some(1433));
    }

    #[test]
    fn test_new_profile_timestamps() {
        let profile = profile();
        assert_eq!(profile.created_at, profile.updated_at);
        assert!(!profile.ssl);
    }

    #[test]
    fn test_apply_bumps_updated_at() {
        let mut profile = profile();
        let created = profile.created_at;

        profile.apply(ProfileUpdate {
            name: Some("renamed".to_string()),
            port: Some(3307),
            ..Default::default()
        });

        assert_eq!(profile.name, "renamed");
        assert_eq!(profile.port, 3307);
        assert_eq!(profile.host, "localhost");
        assert_eq!(profile.created_at, created);
        assert!(profile.updated_at >= created);
    }

    #[test]
    fn test_validate() {
        assert!(profile().validate().is_ok());

        let mut missing_host = profile();
        missing_host.host = "  ".to_string();
        assert!(matches!(
            missing_host.validate(),
            Err(DriverError::InvalidConfig(_))
        ));

        let mut missing_port = profile();
        missing_port.port = 0;
        assert!(missing_port.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", profile());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_profile_serialization() {
        let profile = profile().with_ssl(true);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["type"], "mysql");
        assert_eq!(json["ssl"], true);

        let back: ConnectionProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, profile.id);
        assert_eq!(back.backend, BackendType::MySql);
    }
}
