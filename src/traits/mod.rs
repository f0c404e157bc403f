//! Driver contract and data model.
//!
//! This module provides the interface every backend implements. It defines:
//!
//! - **Types** (`types`): backend enum, connection profiles
//! - **Row/Value** (`row`): backend-agnostic value representation
//! - **Connection** (`connection`): session lifecycle, queries, transactions,
//!   cancellation
//! - **Schema** (`schema`): schema introspection trait and the snapshot model
//! - **Diagnostics** (`diagnostics`): formatting, plans, server information
//!
//! A backend is usable by the manager once it implements all three traits;
//! `DatabaseDriver` names that union.

pub mod connection;
pub mod diagnostics;
pub mod row;
pub mod schema;
pub mod types;

pub use connection::{CancelToken, DatabaseConnection, QueryCanceller, QueryResult};

pub use diagnostics::{Diagnostics, DriverCapabilities, DriverFeature, ServerInfo};

pub use row::{Row, Value};

pub use schema::{
    ColumnInfo, DatabaseInfo, ForeignKeyInfo, IndexInfo, ParameterDirection, ProcedureInfo,
    ProcedureParameter, SchemaIntrospection, SchemaSnapshot, TableInfo, ViewInfo,
};

pub use types::{BackendType, ConnectionId, ConnectionProfile, ProfileUpdate};

/// Full capability set of one backend instance.
pub trait DatabaseDriver: SchemaIntrospection + Diagnostics {}

impl<T: SchemaIntrospection + Diagnostics> DatabaseDriver for T {}

/// A boxed driver trait object, as produced by the registry.
pub type BoxedDriver = Box<dyn DatabaseDriver>;
