//! Backend driver implementations.
//!
//! - **MySQL**: MySQL/MariaDB support via SQLx
//!
//! Each driver implements `DatabaseConnection`, `SchemaIntrospection` and
//! `Diagnostics`, and is reached through the [`DriverRegistry`].

mod factory;
pub mod mysql;

#[cfg(test)]
pub(crate) mod mock;

pub use factory::{DriverConstructor, DriverRegistry};
pub use mysql::MySqlDriver;
