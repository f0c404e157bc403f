//! MySQL database driver implementation.
//!
//! This module provides a MySQL driver that implements the
//! `DatabaseConnection`, `SchemaIntrospection` and `Diagnostics` traits using
//! SQLx.
//!
//! # Example
//!
//! ```ignore
//! use querydesk::drivers::MySqlDriver;
//! use querydesk::traits::{BackendType, ConnectionProfile, DatabaseConnection};
//! use querydesk::DriverSettings;
//!
//! let profile = ConnectionProfile::new(
//!     "My MySQL".to_string(),
//!     BackendType::MySql,
//!     "localhost".to_string(),
//!     3306,
//!     "mydb".to_string(),
//!     "user".to_string(),
//!     "password".to_string(),
//! );
//!
//! let mut driver = MySqlDriver::new(DriverSettings::default());
//! driver.connect(&profile).await?;
//! ```

mod connection;
mod schema;
mod types;

pub use connection::MySqlDriver;
pub use types::MySqlValueConverter;
