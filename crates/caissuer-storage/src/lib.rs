//! # caissuer-storage
//!
//! Resource store abstraction for the CA issuer controller.
//!
//! The controller only needs two things from a store: fetch an issuer by key,
//! and write its status back under optimistic concurrency. Hosts and tests
//! additionally apply and delete issuers and watch for spec changes.
//!
//! ## Example
//!
//! ```ignore
//! use caissuer_storage::{IssuerStore, StorageError};
//!
//! async fn mark(store: &dyn IssuerStore, key: &ResourceKey) -> Result<(), StorageError> {
//!     let issuer = store.get(key).await?.ok_or_else(|| StorageError::not_found(key))?;
//!     let mut status = issuer.status.clone();
//!     status.certificate = None;
//!     store
//!         .update_status(key, issuer.metadata.resource_version, &status)
//!         .await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod memory;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use memory::InMemoryIssuerStore;
pub use traits::IssuerStore;
pub use types::{StoreEvent, StoreEventKind};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynIssuerStore = std::sync::Arc<dyn IssuerStore>;
