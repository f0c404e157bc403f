//! Driver abstraction and connection-lifecycle core of a desktop SQL client.
//!
//! The crate is organised leaf-first:
//!
//! - **Traits** (`traits`): the contract every backend satisfies, plus the
//!   profile, value and schema data model
//! - **Drivers** (`drivers`): the backend registry and one module per
//!   supported database family
//! - **Schema** (`schema`): folds flat catalog rows into the normalized model
//! - **Manager** (`manager`): owns live sessions and serializes access to them
//! - **Service** (`service`): success/error envelopes for the UI layer
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use querydesk::{BackendType, ConnectionManager, ConnectionProfile, DriverRegistry};
//!
//! let registry = Arc::new(DriverRegistry::with_defaults(Default::default()));
//! let manager = ConnectionManager::new(registry);
//!
//! let profile = ConnectionProfile::new(
//!     "Local MySQL".to_string(),
//!     BackendType::MySql,
//!     "localhost".to_string(),
//!     3306,
//!     "app".to_string(),
//!     "root".to_string(),
//!     "secret".to_string(),
//! );
//!
//! manager.open(&profile).await?;
//! let result = manager.execute_query(profile.id, "SELECT 1", Vec::new()).await?;
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod manager;
pub mod schema;
pub mod service;
pub mod storage;
pub mod traits;

pub use config::DriverSettings;
pub use drivers::{DriverConstructor, DriverRegistry};
pub use error::{DriverError, Result};
pub use manager::{ConnectionManager, SessionState};
pub use service::DatabaseService;
pub use storage::{MemoryProfileStore, ProfileStore};
pub use traits::{
    BackendType, BoxedDriver, CancelToken, ConnectionId, ConnectionProfile, DatabaseConnection,
    DatabaseDriver, Diagnostics, QueryResult, Row, SchemaIntrospection, SchemaSnapshot, Value,
};
