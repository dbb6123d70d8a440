//! In-memory issuer store backed by a concurrent map.

use async_trait::async_trait;
use caissuer_core::{Issuer, IssuerStatus, ResourceKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::traits::IssuerStore;
use crate::types::StoreEvent;

/// Default buffer size for the change event channel.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Issuer store that keeps everything in process memory.
///
/// Every write bumps `resource_version`; status writes are rejected with
/// `Conflict` when the caller's version is stale.
pub struct InMemoryIssuerStore {
    issuers: DashMap<ResourceKey, Issuer>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryIssuerStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_BUFFER);
        Self {
            issuers: DashMap::new(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryIssuerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssuerStore for InMemoryIssuerStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Issuer>, StorageError> {
        Ok(self.issuers.get(key).map(|entry| entry.value().clone()))
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        status: &IssuerStatus,
    ) -> Result<Issuer, StorageError> {
        let mut entry = self
            .issuers
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found(key))?;

        let stored = entry.value_mut();
        if stored.metadata.resource_version != resource_version {
            return Err(StorageError::conflict(
                resource_version,
                stored.metadata.resource_version,
            ));
        }

        stored.status = status.clone();
        stored.metadata.resource_version += 1;

        tracing::debug!(
            issuer = %key,
            resource_version = stored.metadata.resource_version,
            "issuer status updated"
        );

        Ok(stored.clone())
    }

    async fn apply(&self, issuer: Issuer) -> Result<Issuer, StorageError> {
        let key = issuer.key();
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(StorageError::invalid_resource(
                "issuer name and namespace must not be empty",
            ));
        }

        let (stored, spec_changed) = match self.issuers.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                let spec_changed = existing.spec != issuer.spec;
                if spec_changed {
                    existing.spec = issuer.spec;
                    existing.metadata.generation += 1;
                    existing.metadata.resource_version += 1;
                }
                (existing.clone(), spec_changed)
            }
            Entry::Vacant(vacant) => {
                let mut created = issuer;
                created.metadata.generation = 1;
                created.metadata.resource_version = 1;
                (vacant.insert(created).value().clone(), true)
            }
        };

        if spec_changed {
            tracing::debug!(
                issuer = %key,
                generation = stored.metadata.generation,
                "issuer spec applied"
            );
            self.publish(StoreEvent::applied(key, stored.metadata.generation));
        }

        Ok(stored)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StorageError> {
        self.issuers
            .remove(key)
            .ok_or_else(|| StorageError::not_found(key))?;
        self.publish(StoreEvent::deleted(key.clone()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Issuer>, StorageError> {
        let mut issuers: Vec<Issuer> = self
            .issuers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        issuers.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(issuers)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
