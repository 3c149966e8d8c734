//! Platform boundary for Warden.
//!
//! Everything the reconciliation engine consumes from or produces to the
//! container-orchestration platform goes through the traits in this crate:
//!
//! - [`ObjectStore`] - CRUD with conditional-write semantics on managed
//!   resources and the versioned state blob
//! - [`TargetClient`] - typed access to target specs, status and annotations
//! - [`DependencyReader`] - ready-replica/phase lookups for the start quorum
//! - [`EventRecorder`] - structured observability events attached to targets
//!
//! Each trait ships an in-memory implementation for tests and embedding,
//! plus (where useful) a tracing decorator in the same shape.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod deps;
pub mod error;
pub mod events;
pub mod object;
pub mod store;
pub mod target_client;

// Re-export main types
pub use deps::{DependencyReader, DependencyStatus, InMemoryDependencyReader};
pub use error::{ApiError, Result};
pub use events::{Event, EventRecorder, EventType, InMemoryEventRecorder, TracingEventRecorder};
pub use object::{ObjectKey, StoredObject};
pub use store::{InMemoryObjectStore, ObjectStore, TracingObjectStore};
pub use target_client::{InMemoryTargetClient, TargetClient};
