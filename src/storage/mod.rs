//! Connection profile persistence.
//!
//! The core never persists profiles itself; callers keep them in a
//! [`ProfileStore`] and hand them to the manager when opening a session.

mod profiles;

pub use profiles::MemoryProfileStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::traits::{BackendType, ConnectionId, ConnectionProfile, ProfileUpdate};

/// Repository for connection profile CRUD operations.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// All profiles, newest `created_at` first.
    async fn load_all(&self) -> Result<Vec<ConnectionProfile>>;

    /// Profiles of one backend, newest first.
    async fn load_by_backend(&self, backend: BackendType) -> Result<Vec<ConnectionProfile>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|p| p.backend == backend)
            .collect())
    }

    async fn get(&self, id: ConnectionId) -> Result<Option<ConnectionProfile>>;

    /// Insert a profile, replacing any stored profile with the same id.
    async fn save(&self, profile: &ConnectionProfile) -> Result<()>;

    /// Apply `update` to the stored profile and return the new version.
    async fn update(
        &self,
        id: ConnectionId,
        update: ProfileUpdate,
    ) -> Result<Option<ConnectionProfile>>;

    /// Delete a profile; returns whether one was removed.
    async fn delete_by_id(&self, id: ConnectionId) -> Result<bool>;

    async fn delete_all(&self) -> Result<()>;

    async fn count_all(&self) -> Result<usize>;

    /// Keep only the most recently updated entry per id; returns how many
    /// entries were dropped.
    async fn deduplicate_by_id(&self) -> Result<usize>;
}
