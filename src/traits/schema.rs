//! Schema introspection traits.
//!
//! This module defines the normalized schema model and the
//! `SchemaIntrospection` trait every backend implements on top of its own
//! catalog queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::connection::DatabaseConnection;
use crate::error::{DriverError, Result};

/// Normalized structure of every database visible to a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub databases: Vec<DatabaseInfo>,
    /// The profile's configured database at snapshot time
    pub current_database: String,
}

impl SchemaSnapshot {
    /// Get a database by name
    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.iter().find(|db| db.name == name)
    }
}

/// One database (catalog/schema) and its objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub tables: Vec<TableInfo>,
    pub views: Vec<ViewInfo>,
    pub procedures: Vec<ProcedureInfo>,
}

impl DatabaseInfo {
    /// Get a table by name
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Structure of one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// Columns in ordinal-position order
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableInfo {
    /// Names of the primary key columns, in column order
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// One column of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Type string as the backend reports it
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
}

/// An index and its key columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Columns in index key order
    pub columns: Vec<String>,
    pub is_unique: bool,
}

/// A single-column foreign key reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
}

impl ParameterDirection {
    /// Parse the catalog's `PARAMETER_MODE` column
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode.to_uppercase().as_str() {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "INOUT" => Some(Self::InOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParameter {
    pub name: String,
    pub data_type: String,
    pub direction: ParameterDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureInfo {
    pub name: String,
    pub parameters: Vec<ProcedureParameter>,
    pub definition: String,
}

/// Trait for backends that can describe their structure.
///
/// The narrow accessors are usable on their own; `get_schema` composes them
/// into a full snapshot.
#[async_trait]
pub trait SchemaIntrospection: DatabaseConnection {
    /// Database named by the connected profile, if any.
    fn current_database(&self) -> Option<&str>;

    /// Resolve an optional database argument against the current database.
    fn resolve_database(&self, database: Option<&str>) -> Result<String> {
        database
            .or_else(|| self.current_database())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DriverError::InvalidConfig("No database specified".to_string()))
    }

    /// Names of all databases visible to the session.
    async fn get_databases(&mut self) -> Result<Vec<String>>;

    /// Names of the base tables of `database` (current database when `None`).
    async fn get_tables(&mut self, database: Option<&str>) -> Result<Vec<String>>;

    /// Columns, indexes and foreign keys of one table.
    async fn get_table_info(&mut self, table: &str, database: Option<&str>) -> Result<TableInfo>;

    /// Columns of one table, in ordinal order.
    async fn get_columns(&mut self, table: &str, database: Option<&str>) -> Result<Vec<ColumnInfo>> {
        Ok(self.get_table_info(table, database).await?.columns)
    }

    /// Views of `database`. Backends without view enumeration return nothing.
    async fn get_views(&mut self, _database: &str) -> Result<Vec<ViewInfo>> {
        Ok(Vec::new())
    }

    /// Stored procedures of `database`. Backends without routine enumeration
    /// return nothing.
    async fn get_procedures(&mut self, _database: &str) -> Result<Vec<ProcedureInfo>> {
        Ok(Vec::new())
    }

    /// Walk every database and table serially and build a snapshot.
    ///
    /// Costs one round trip per database plus three per table.
    async fn get_schema(&mut self) -> Result<SchemaSnapshot> {
        if !self.is_connected() {
            return Err(DriverError::not_connected());
        }

        let current_database = self.current_database().unwrap_or_default().to_string();
        let mut databases = Vec::new();

        for name in self.get_databases().await? {
            let mut tables = Vec::new();
            for table in self.get_tables(Some(&name)).await? {
                tables.push(self.get_table_info(&table, Some(&name)).await?);
            }
            let views = self.get_views(&name).await?;
            let procedures = self.get_procedures(&name).await?;

            tracing::debug!(database = %name, tables = tables.len(), "Introspected database");
            databases.push(DatabaseInfo {
                name,
                tables,
                views,
                procedures,
            });
        }

        Ok(SchemaSnapshot {
            databases,
            current_database,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockDriver, MockScript};

    #[test]
    fn test_table_primary_key() {
        let table = TableInfo {
            name: "users".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    is_primary_key: true,
                    ..Default::default()
                },
                ColumnInfo {
                    name: "email".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(table.primary_key(), vec!["id"]);
    }

    #[test]
    fn test_parameter_direction_from_mode() {
        assert_eq!(ParameterDirection::from_mode("in"), Some(ParameterDirection::In));
        assert_eq!(ParameterDirection::from_mode("INOUT"), Some(ParameterDirection::InOut));
        assert_eq!(ParameterDirection::from_mode(""), None);
    }

    #[test]
    fn test_get_schema_walks_databases_and_tables() {
        smol::block_on(async {
            let script = MockScript::default();
            let mut driver = MockDriver::new(script.clone());
            driver.connect(&MockScript::profile()).await.unwrap();

            let snapshot = driver.get_schema().await.unwrap();

            assert_eq!(snapshot.current_database, "app");
            let names: Vec<_> = snapshot.databases.iter().map(|d| d.name.as_str()).collect();
            assert_eq!(names, vec!["app", "audit"]);

            let app = snapshot.database("app").unwrap();
            assert_eq!(app.tables.len(), 1);
            assert!(app.views.is_empty());
            assert!(app.procedures.is_empty());
            assert_eq!(app.table("users").unwrap().columns.len(), 2);
        });
    }

    #[test]
    fn test_get_schema_requires_connection() {
        smol::block_on(async {
            let mut driver = MockDriver::new(MockScript::default());
            assert!(matches!(
                driver.get_schema().await,
                Err(DriverError::NoActiveConnection(_))
            ));
        });
    }

    #[test]
    fn test_get_columns_delegates_to_table_info() {
        smol::block_on(async {
            let mut driver = MockDriver::new(MockScript::default());
            driver.connect(&MockScript::profile()).await.unwrap();

            let columns = driver.get_columns("users", None).await.unwrap();
            let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["id", "email"]);
        });
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SchemaSnapshot {
            databases: vec![DatabaseInfo {
                name: "app".to_string(),
                ..Default::default()
            }],
            current_database: "app".to_string(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["current_database"], "app");
        assert_eq!(json["databases"][0]["views"], serde_json::json!([]));
    }
}
