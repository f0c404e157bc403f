//! MySQL type conversion utilities.
//!
//! This module handles conversion between MySQL-specific types (from SQLx)
//! and the generic `Value` type, in both directions: decoding result cells and
//! binding positional parameters.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlColumn, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row, TypeInfo, ValueRef};

use crate::traits::{Row as TraitRow, Value};

/// Converter between MySQL values and the unified `Value` type.
pub struct MySqlValueConverter;

impl MySqlValueConverter {
    /// Convert a MySQL row to a trait Row, keeping column order.
    pub fn convert_row(mysql_row: &MySqlRow) -> TraitRow {
        TraitRow::from_pairs(mysql_row.columns().iter().enumerate().map(|(idx, col)| {
            (
                col.name().to_string(),
                Self::extract_value(mysql_row, col, idx),
            )
        }))
    }

    /// Column names of a result set, in result order.
    pub fn column_names(columns: &[MySqlColumn]) -> Vec<String> {
        columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Extract a value from a MySQL row at the given column index.
    fn extract_value(row: &MySqlRow, column: &MySqlColumn, index: usize) -> Value {
        match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            _ => {}
        }

        let type_name = column.type_info().name();
        Self::decode_by_type(row, index, type_name)
    }

    /// Decode a value based on its MySQL type name.
    fn decode_by_type(row: &MySqlRow, index: usize, type_name: &str) -> Value {
        match type_name {
            // MySQL uses TINYINT(1) for booleans
            "BOOLEAN" | "BOOL" => row
                .try_get::<bool, _>(index)
                .map(Value::Bool)
                .unwrap_or(Value::Null),

            "TINYINT" => row
                .try_get::<i8, _>(index)
                .map(|v| Value::Int(v as i64))
                .unwrap_or(Value::Null),

            "SMALLINT" | "YEAR" => row
                .try_get::<i16, _>(index)
                .map(|v| Value::Int(v as i64))
                .unwrap_or(Value::Null),

            "MEDIUMINT" | "INT" | "INTEGER" => row
                .try_get::<i32, _>(index)
                .map(|v| Value::Int(v as i64))
                .unwrap_or(Value::Null),

            "BIGINT" => row
                .try_get::<i64, _>(index)
                .map(Value::Int)
                .unwrap_or(Value::Null),

            "TINYINT UNSIGNED" => row
                .try_get::<u8, _>(index)
                .map(|v| Value::UInt(v as u64))
                .unwrap_or(Value::Null),

            "SMALLINT UNSIGNED" => row
                .try_get::<u16, _>(index)
                .map(|v| Value::UInt(v as u64))
                .unwrap_or(Value::Null),

            "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "INTEGER UNSIGNED" => row
                .try_get::<u32, _>(index)
                .map(|v| Value::UInt(v as u64))
                .unwrap_or(Value::Null),

            "BIGINT UNSIGNED" => row
                .try_get::<u64, _>(index)
                .map(Value::UInt)
                .unwrap_or(Value::Null),

            "FLOAT" => row
                .try_get::<f32, _>(index)
                .map(|v| Value::Float(v as f64))
                .unwrap_or(Value::Null),

            "DOUBLE" | "DOUBLE PRECISION" | "REAL" => row
                .try_get::<f64, _>(index)
                .map(Value::Float)
                .unwrap_or(Value::Null),

            "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => row
                .try_get::<Decimal, _>(index)
                .map(Value::Decimal)
                .unwrap_or(Value::Null),

            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => row
                .try_get::<String, _>(index)
                .map(Value::Text)
                .unwrap_or(Value::Null),

            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                row.try_get::<Vec<u8>, _>(index)
                    .map(Value::Bytes)
                    .unwrap_or(Value::Null)
            }

            "DATE" => row
                .try_get::<NaiveDate, _>(index)
                .map(Value::Date)
                .unwrap_or(Value::Null),

            "TIME" => row
                .try_get::<NaiveTime, _>(index)
                .map(Value::Time)
                .unwrap_or(Value::Null),

            "DATETIME" => row
                .try_get::<NaiveDateTime, _>(index)
                .map(Value::DateTime)
                .unwrap_or(Value::Null),

            "TIMESTAMP" => row
                .try_get::<DateTime<Utc>, _>(index)
                .map(Value::DateTimeTz)
                .or_else(|_| row.try_get::<NaiveDateTime, _>(index).map(Value::DateTime))
                .unwrap_or(Value::Null),

            "JSON" => row
                .try_get::<serde_json::Value, _>(index)
                .map(Value::Json)
                .unwrap_or(Value::Null),

            // ENUM and SET come back as strings
            _ if type_name.starts_with("ENUM") || type_name.starts_with("SET") => row
                .try_get::<String, _>(index)
                .map(Value::Text)
                .unwrap_or(Value::Null),

            _ => Self::decode_as_string_fallback(row, index, type_name),
        }
    }

    /// Fallback for unknown types: keep a string representation.
    fn decode_as_string_fallback(row: &MySqlRow, index: usize, type_name: &str) -> Value {
        let display = if let Ok(s) = row.try_get::<String, _>(index) {
            s
        } else if let Ok(v) = row.try_get::<i64, _>(index) {
            v.to_string()
        } else if let Ok(v) = row.try_get::<f64, _>(index) {
            v.to_string()
        } else if let Ok(bytes) = row.try_get::<Vec<u8>, _>(index) {
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            "<unknown>".to_string()
        };

        Value::Other {
            type_name: type_name.to_string(),
            display,
        }
    }

    /// Read a catalog text column.
    ///
    /// Some servers report `information_schema` columns with a binary
    /// collation, so raw bytes are accepted as well.
    pub fn text(row: &MySqlRow, column: &str) -> Option<String> {
        match row.try_get::<Option<String>, _>(column) {
            Ok(value) => value,
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Read a catalog integer column, whatever width the server picked.
    pub fn integer(row: &MySqlRow, column: &str) -> Option<i64> {
        if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
            return v;
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(column) {
            return v.map(|v| v as i64);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(column) {
            return v.map(i64::from);
        }
        Self::text(row, column).and_then(|s| s.trim().parse().ok())
    }

    /// Bind one positional parameter.
    pub fn bind<'q>(
        query: Query<'q, MySql, MySqlArguments>,
        value: &Value,
    ) -> Query<'q, MySql, MySqlArguments> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::UInt(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Decimal(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
            Value::Date(v) => query.bind(*v),
            Value::Time(v) => query.bind(*v),
            Value::DateTime(v) => query.bind(*v),
            Value::DateTimeTz(v) => query.bind(*v),
            Value::Json(v) => query.bind(sqlx::types::Json(v.clone())),
            Value::Other { display, .. } => query.bind(display.clone()),
        }
    }

    /// Bind every parameter in order.
    pub fn bind_all<'q>(sql: &'q str, params: &[Value]) -> Query<'q, MySql, MySqlArguments> {
        params
            .iter()
            .fold(sqlx::query(sql), |query, value| Self::bind(query, value))
    }

    /// Map the profile's TLS flag to a MySQL SSL mode.
    ///
    /// TLS is required when asked for, without certificate verification;
    /// otherwise it is used opportunistically.
    pub fn map_ssl_mode(ssl: bool) -> MySqlSslMode {
        if ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        }
    }

    /// Whether an error means the session itself is gone.
    pub fn is_session_lost(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::WorkerCrashed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(
            MySqlValueConverter::map_ssl_mode(true),
            MySqlSslMode::Required
        ));
        assert!(matches!(
            MySqlValueConverter::map_ssl_mode(false),
            MySqlSslMode::Preferred
        ));
    }

    #[test]
    fn test_bind_all_keeps_sql() {
        let params = vec![
            Value::Int(1),
            Value::Text("a".to_string()),
            Value::Null,
            Value::Json(serde_json::json!({"k": 1})),
        ];
        let query = MySqlValueConverter::bind_all("SELECT ?, ?, ?, ?", &params);
        assert_eq!(query.sql(), "SELECT ?, ?, ?, ?");
    }

    #[test]
    fn test_session_lost_classification() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(MySqlValueConverter::is_session_lost(&io));
        assert!(MySqlValueConverter::is_session_lost(&sqlx::Error::Protocol(
            "bad packet".to_string()
        )));
        assert!(!MySqlValueConverter::is_session_lost(&sqlx::Error::RowNotFound));
        assert!(!MySqlValueConverter::is_session_lost(&sqlx::Error::ColumnNotFound(
            "x".to_string()
        )));
    }
}
