//! Caller-facing service with success/error envelopes.
//!
//! Every response carries a `success` flag plus either a payload or a
//! human-readable error (with its full cause chain), never both and never
//! neither. Envelopes are built from a `Result`, which makes that exclusive
//! by construction.

use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;

use crate::manager::ConnectionManager;
use crate::storage::ProfileStore;
use crate::traits::{ConnectionId, ConnectionProfile, QueryResult, SchemaSnapshot, Value};

macro_rules! envelope {
    ($(#[$meta:meta])* $name:ident { $field:ident: $ty:ty }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize)]
        pub struct $name {
            pub success: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            pub $field: Option<$ty>,
            #[serde(skip_serializing_if = "Option::is_none")]
            pub error: Option<String>,
        }

        impl<E: Display> From<std::result::Result<$ty, E>> for $name {
            fn from(result: std::result::Result<$ty, E>) -> Self {
                match result {
                    Ok(value) => Self {
                        success: true,
                        $field: Some(value),
                        error: None,
                    },
                    Err(err) => Self {
                        success: false,
                        $field: None,
                        error: Some(format!("{err:#}")),
                    },
                }
            }
        }
    };
}

envelope!(
    /// Result of a statement. SQL errors are inside `result`, so `success`
    /// is only false for infrastructure failures.
    QueryResponse { result: QueryResult }
);

envelope!(
    /// Results of a committed transaction
    TransactionResponse { results: Vec<QueryResult> }
);

envelope!(SchemaResponse { schema: SchemaSnapshot });

envelope!(ProfilesResponse { profiles: Vec<ConnectionProfile> });

/// Outcome of an operation without a payload.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: Display> From<std::result::Result<(), E>> for Ack {
    fn from(result: std::result::Result<(), E>) -> Self {
        Self {
            success: result.is_ok(),
            error: result.err().map(|e| format!("{e:#}")),
        }
    }
}

/// Outcome of a connection test.
#[derive(Debug, Clone, Serialize)]
pub struct TestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: Display> From<std::result::Result<bool, E>> for TestResponse {
    fn from(result: std::result::Result<bool, E>) -> Self {
        match result {
            Ok(true) => Self {
                success: true,
                error: None,
            },
            Ok(false) => Self {
                success: false,
                error: Some("Connection test failed".to_string()),
            },
            Err(err) => Self {
                success: false,
                error: Some(format!("{err:#}")),
            },
        }
    }
}

/// Entry point for the presentation layer.
///
/// Wraps a [`ConnectionManager`] and a [`ProfileStore`]; every method returns
/// an envelope instead of a `Result`.
#[derive(Clone)]
pub struct DatabaseService {
    manager: Arc<ConnectionManager>,
    store: Arc<dyn ProfileStore>,
}

impl DatabaseService {
    pub fn new(manager: Arc<ConnectionManager>, store: Arc<dyn ProfileStore>) -> Self {
        Self { manager, store }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub async fn test_connection(&self, profile: &ConnectionProfile) -> TestResponse {
        self.manager.test_connection(profile).await.into()
    }

    /// Open a session for `profile`.
    pub async fn connect(&self, profile: &ConnectionProfile) -> Ack {
        self.manager.open(profile).await.into()
    }

    /// Open a session for a stored profile.
    pub async fn connect_saved(&self, id: ConnectionId) -> Ack {
        let profile = match self.store.get(id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return Err::<(), _>(format!("Connection profile {id} not found")).into();
            }
            Err(err) => return Err::<(), _>(err).into(),
        };
        self.connect(&profile).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Ack {
        self.manager.close(id).await.into()
    }

    pub async fn execute_query(
        &self,
        id: ConnectionId,
        sql: &str,
        params: Vec<Value>,
    ) -> QueryResponse {
        self.manager.execute_query(id, sql, params).await.into()
    }

    pub async fn execute_transaction(
        &self,
        id: ConnectionId,
        statements: Vec<String>,
    ) -> TransactionResponse {
        self.manager.execute_transaction(id, statements).await.into()
    }

    pub async fn get_schema(&self, id: ConnectionId) -> SchemaResponse {
        self.manager.get_schema(id).await.into()
    }

    pub async fn cancel_query(&self, id: ConnectionId) -> Ack {
        self.manager.cancel(id).await.into()
    }

    pub async fn list_profiles(&self) -> ProfilesResponse {
        self.store.load_all().await.into()
    }

    pub async fn save_profile(&self, profile: &ConnectionProfile) -> Ack {
        self.store.save(profile).await.into()
    }

    /// Close any session for `id`, then forget the stored profile.
    pub async fn delete_profile(&self, id: ConnectionId) -> Ack {
        if let Err(err) = self.manager.close(id).await {
            tracing::warn!(connection_id = %id, error = %err, "Closing session before delete failed");
        }
        self.store.delete_by_id(id).await.map(|_| ()).into()
    }
}
