//! In-memory profile store.

use anyhow::Result;
use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::HashMap;

use super::ProfileStore;
use crate::traits::{ConnectionId, ConnectionProfile, ProfileUpdate};

/// Profile store kept in process memory.
///
/// Entries are kept in insertion order. `import` appends without replacing,
/// so snapshots restored from elsewhere can carry duplicate ids until
/// `deduplicate_by_id` runs.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<Vec<ConnectionProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append profiles as-is, without replacing existing ids.
    pub async fn import(&self, profiles: impl IntoIterator<Item = ConnectionProfile>) {
        let mut guard = self.profiles.write().await;
        guard.extend(profiles);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load_all(&self) -> Result<Vec<ConnectionProfile>> {
        let mut profiles = self.profiles.read().await.clone();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn get(&self, id: ConnectionId) -> Result<Option<ConnectionProfile>> {
        let guard = self.profiles.read().await;
        Ok(guard.iter().find(|p| p.id == id).cloned())
    }

    async fn save(&self, profile: &ConnectionProfile) -> Result<()> {
        profile.validate()?;

        let mut guard = self.profiles.write().await;
        guard.retain(|p| p.id != profile.id);
        guard.push(profile.clone());

        tracing::debug!(connection_id = %profile.id, name = %profile.name, "Saved profile");
        Ok(())
    }

    async fn update(
        &self,
        id: ConnectionId,
        update: ProfileUpdate,
    ) -> Result<Option<ConnectionProfile>> {
        let mut guard = self.profiles.write().await;
        let Some(profile) = guard.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };

        let mut updated = profile.clone();
        updated.apply(update);
        updated.validate()?;
        *profile = updated.clone();

        Ok(Some(updated))
    }

    async fn delete_by_id(&self, id: ConnectionId) -> Result<bool> {
        let mut guard = self.profiles.write().await;
        let before = guard.len();
        guard.retain(|p| p.id != id);
        Ok(guard.len() != before)
    }

    async fn delete_all(&self) -> Result<()> {
        self.profiles.write().await.clear();
        Ok(())
    }

    async fn count_all(&self) -> Result<usize> {
        Ok(self.profiles.read().await.len())
    }

    async fn deduplicate_by_id(&self) -> Result<usize> {
        let mut guard = self.profiles.write().await;
        let before = guard.len();

        let mut latest: HashMap<ConnectionId, usize> = HashMap::new();
        for (idx, profile) in guard.iter().enumerate() {
            latest
                .entry(profile.id)
                .and_modify(|kept| {
                    if profile.updated_at >= guard[*kept].updated_at {
                        *kept = idx;
                    }
                })
                .or_insert(idx);
        }

        let mut idx = 0;
        guard.retain(|profile| {
            let keep = latest.get(&profile.id) == Some(&idx);
            idx += 1;
            keep
        });

        let removed = before - guard.len();
        if removed > 0 {
            tracing::info!(removed, "Removed duplicate profiles");
        }
        Ok(removed)
    }
}
