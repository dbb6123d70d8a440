//! Store trait for issuer resources.

use async_trait::async_trait;
use caissuer_core::{Issuer, IssuerStatus, ResourceKey};
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::types::StoreEvent;

/// Persistence contract for issuers.
///
/// Implementations must be thread-safe (`Send + Sync`) and safe to use from
/// concurrent reconciles of distinct keys.
///
/// # Example
///
/// ```ignore
/// use caissuer_storage::{IssuerStore, StorageError};
///
/// async fn require(store: &dyn IssuerStore, key: &ResourceKey) -> Result<Issuer, StorageError> {
///     store
///         .get(key)
///         .await?
///         .ok_or_else(|| StorageError::not_found(key))
/// }
/// ```
#[async_trait]
pub trait IssuerStore: Send + Sync {
    /// Reads an issuer by key.
    ///
    /// Returns `None` if the issuer does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing issuers.
    async fn get(&self, key: &ResourceKey) -> Result<Option<Issuer>, StorageError>;

    /// Replaces the status of an issuer.
    ///
    /// `resource_version` is the version the caller read; the write only
    /// succeeds if the stored issuer is still at that version. The spec and
    /// generation are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the issuer changed since it was read.
    /// Returns `StorageError::NotFound` if the issuer was deleted.
    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        status: &IssuerStatus,
    ) -> Result<Issuer, StorageError>;

    /// Creates an issuer or replaces its spec.
    ///
    /// Existing status is kept. The generation is bumped when the spec
    /// changed, and an `Applied` event is published in that case.
    async fn apply(&self, issuer: Issuer) -> Result<Issuer, StorageError>;

    /// Deletes an issuer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the issuer does not exist.
    async fn delete(&self, key: &ResourceKey) -> Result<(), StorageError>;

    /// Lists all issuers ordered by key.
    async fn list(&self) -> Result<Vec<Issuer>, StorageError>;

    /// Subscribes to spec-level change events.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
