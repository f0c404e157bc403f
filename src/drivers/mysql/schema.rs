//! MySQL schema introspection and diagnostics.
//!
//! This module implements the `SchemaIntrospection` and `Diagnostics` traits
//! for MySQL on top of `information_schema`.

use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::mysql::MySqlRow;

use super::connection::MySqlDriver;
use super::types::MySqlValueConverter;
use crate::error::{BackendContext, DriverError, Result};
use crate::schema::{self, CatalogColumn, CatalogForeignKey, CatalogIndexColumn};
use crate::traits::{
    Diagnostics, DriverCapabilities, DriverFeature, ParameterDirection, ProcedureInfo,
    ProcedureParameter, SchemaIntrospection, ServerInfo, TableInfo, ViewInfo,
};

const COLUMNS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME AS column_name,
        DATA_TYPE AS data_type,
        IS_NULLABLE AS is_nullable,
        COLUMN_DEFAULT AS column_default,
        COLUMN_KEY AS column_key,
        EXTRA AS extra
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        INDEX_NAME AS index_name,
        COLUMN_NAME AS column_name,
        CAST(NON_UNIQUE AS SIGNED) AS non_unique
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        CONSTRAINT_NAME AS constraint_name,
        COLUMN_NAME AS column_name,
        REFERENCED_TABLE_NAME AS referenced_table,
        REFERENCED_COLUMN_NAME AS referenced_column
    FROM information_schema.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        AND REFERENCED_TABLE_NAME IS NOT NULL
"#;

const TABLES_QUERY: &str = r#"
    SELECT TABLE_NAME AS table_name
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const VIEWS_QUERY: &str = r#"
    SELECT
        TABLE_NAME AS view_name,
        VIEW_DEFINITION AS definition
    FROM information_schema.VIEWS
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME
"#;

const PROCEDURES_QUERY: &str = r#"
    SELECT
        ROUTINE_NAME AS routine_name,
        ROUTINE_DEFINITION AS definition
    FROM information_schema.ROUTINES
    WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'PROCEDURE'
    ORDER BY ROUTINE_NAME
"#;

const PARAMETERS_QUERY: &str = r#"
    SELECT
        SPECIFIC_NAME AS routine_name,
        PARAMETER_NAME AS parameter_name,
        DATA_TYPE AS data_type,
        PARAMETER_MODE AS parameter_mode
    FROM information_schema.PARAMETERS
    WHERE SPECIFIC_SCHEMA = ? AND ROUTINE_TYPE = 'PROCEDURE'
    ORDER BY SPECIFIC_NAME, ORDINAL_POSITION
"#;

fn text(row: &MySqlRow, column: &str) -> String {
    MySqlValueConverter::text(row, column).unwrap_or_default()
}

/// Decode one `information_schema.COLUMNS` row.
fn catalog_column(row: &MySqlRow) -> CatalogColumn {
    CatalogColumn {
        name: text(row, "column_name"),
        data_type: text(row, "data_type"),
        nullable: text(row, "is_nullable") == "YES",
        default_value: MySqlValueConverter::text(row, "column_default"),
        is_primary_key: text(row, "column_key") == "PRI",
        is_auto_increment: text(row, "extra").contains("auto_increment"),
    }
}

/// Attach parameter rows to their procedures, in parameter order.
///
/// Rows without a name are function return values and carry no direction.
fn attach_parameters(
    procedures: &mut [ProcedureInfo],
    rows: impl IntoIterator<Item = (String, ProcedureParameter)>,
) {
    for (routine, parameter) in rows {
        if let Some(procedure) = procedures.iter_mut().find(|p| p.name == routine) {
            procedure.parameters.push(parameter);
        }
    }
}

#[async_trait]
impl SchemaIntrospection for MySqlDriver {
    fn current_database(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.database.as_str())
    }

    async fn get_databases(&mut self) -> Result<Vec<String>> {
        let rows = self
            .fetch_catalog("SHOW DATABASES", &[])
            .await
            .backend_context(|| "Failed to list databases")?;
        Ok(rows
            .iter()
            .filter_map(|row| MySqlValueConverter::text(row, "Database"))
            .collect())
    }

    async fn get_tables(&mut self, database: Option<&str>) -> Result<Vec<String>> {
        self.session_mut()?;
        let database = self.resolve_database(database)?;
        let rows = self
            .fetch_catalog(TABLES_QUERY, &[database.as_str()])
            .await
            .backend_context(|| format!("Failed to list tables of `{database}`"))?;
        Ok(rows.iter().map(|row| text(row, "table_name")).collect())
    }

    async fn get_table_info(&mut self, table: &str, database: Option<&str>) -> Result<TableInfo> {
        self.session_mut()?;
        let database = self.resolve_database(database)?;
        let args = [database.as_str(), table];

        let describe = || format!("Failed to describe `{database}`.`{table}`");
        let columns = self
            .fetch_catalog(COLUMNS_QUERY, &args)
            .await
            .backend_context(describe)?;
        let indexes = self
            .fetch_catalog(INDEXES_QUERY, &args)
            .await
            .backend_context(describe)?;
        let foreign_keys = self
            .fetch_catalog(FOREIGN_KEYS_QUERY, &args)
            .await
            .backend_context(describe)?;

        let columns = columns.iter().map(catalog_column).collect();
        let indexes = indexes
            .iter()
            .map(|row| CatalogIndexColumn {
                index_name: text(row, "index_name"),
                column_name: text(row, "column_name"),
                is_unique: MySqlValueConverter::integer(row, "non_unique") == Some(0),
            })
            .collect();
        let foreign_keys = foreign_keys
            .iter()
            .map(|row| CatalogForeignKey {
                constraint_name: text(row, "constraint_name"),
                column_name: text(row, "column_name"),
                referenced_table: MySqlValueConverter::text(row, "referenced_table"),
                referenced_column: MySqlValueConverter::text(row, "referenced_column"),
            })
            .collect();

        Ok(schema::build_table_info(table, columns, indexes, foreign_keys))
    }

    async fn get_views(&mut self, database: &str) -> Result<Vec<ViewInfo>> {
        let rows = self
            .fetch_catalog(VIEWS_QUERY, &[database])
            .await
            .backend_context(|| format!("Failed to list views of `{database}`"))?;
        Ok(rows
            .iter()
            .map(|row| ViewInfo {
                name: text(row, "view_name"),
                definition: text(row, "definition"),
            })
            .collect())
    }

    async fn get_procedures(&mut self, database: &str) -> Result<Vec<ProcedureInfo>> {
        let rows = self
            .fetch_catalog(PROCEDURES_QUERY, &[database])
            .await
            .backend_context(|| format!("Failed to list procedures of `{database}`"))?;
        let mut procedures: Vec<ProcedureInfo> = rows
            .iter()
            .map(|row| ProcedureInfo {
                name: text(row, "routine_name"),
                parameters: Vec::new(),
                definition: text(row, "definition"),
            })
            .collect();

        if procedures.is_empty() {
            return Ok(procedures);
        }

        let rows = self
            .fetch_catalog(PARAMETERS_QUERY, &[database])
            .await
            .backend_context(|| format!("Failed to list procedure parameters of `{database}`"))?;
        let parameters = rows.iter().filter_map(|row| {
            let direction =
                ParameterDirection::from_mode(&MySqlValueConverter::text(row, "parameter_mode")?)?;
            Some((
                text(row, "routine_name"),
                ProcedureParameter {
                    name: text(row, "parameter_name"),
                    data_type: text(row, "data_type"),
                    direction,
                },
            ))
        });
        attach_parameters(&mut procedures, parameters);

        Ok(procedures)
    }
}

#[async_trait]
impl Diagnostics for MySqlDriver {
    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            name: "MySQL".to_string(),
            version: "8.0".to_string(),
            supported_versions: vec!["5.7".to_string(), "8.0".to_string()],
            features: vec![
                DriverFeature::Transactions,
                DriverFeature::StoredProcedures,
                DriverFeature::Views,
                DriverFeature::Triggers,
                DriverFeature::ForeignKeys,
                DriverFeature::Indexes,
                DriverFeature::Ssl,
                DriverFeature::Pooling,
            ],
        }
    }

    async fn get_query_plan(&mut self, sql: &str) -> Result<serde_json::Value> {
        let explain = format!("EXPLAIN {}", sql.trim().trim_end_matches(';'));
        let rows = self
            .fetch_catalog(&explain, &[])
            .await
            .backend_context(|| "Failed to explain query")?;
        let plan = rows
            .iter()
            .map(|row| serde_json::to_value(MySqlValueConverter::convert_row(row)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to serialize query plan")
            .map_err(DriverError::Backend)?;
        Ok(serde_json::Value::Array(plan))
    }

    async fn get_server_info(&mut self) -> Result<ServerInfo> {
        let version = self
            .fetch_catalog("SELECT VERSION() AS version", &[])
            .await
            .backend_context(|| "Failed to read server version")?
            .first()
            .and_then(|row| MySqlValueConverter::text(row, "version"));

        let max_connections = self
            .fetch_catalog("SHOW VARIABLES LIKE 'max_connections'", &[])
            .await
            .backend_context(|| "Failed to read max_connections")?
            .first()
            .and_then(|row| MySqlValueConverter::text(row, "Value"))
            .and_then(|value| value.parse().ok());

        Ok(ServerInfo {
            version,
            max_connections,
            capabilities: self.capabilities(),
        })
    }
}
