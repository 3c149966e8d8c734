//! Core types for Warden.
//!
//! This crate holds the domain model shared by every other Warden crate:
//!
//! - **Identities**: [`TargetId`], [`TargetUid`], [`OwnerReference`]
//! - **Resources**: [`ResourceKind`], [`ManagedResource`], [`ResourceSet`]
//! - **Targets**: [`TargetSpec`], [`TargetStatus`], [`Target`] and the
//!   phase/condition machinery
//! - **Merge patches**: RFC 7386 application in [`merge_patch`]
//!
//! Everything here is pure data and pure functions. Platform I/O lives in
//! `warden-platform`; the reconciliation engine lives in `warden-engine`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod ids;
pub mod merge_patch;
pub mod resource;
pub mod target;

// Re-export main types
pub use error::{Error, Result};
pub use ids::{OwnerReference, TargetId, TargetUid};
pub use resource::{ManagedResource, ResourceKind, ResourceSet, CURRENT_PROTOCOL};
pub use target::{
    BatchSpec, Condition, ConditionStatus, QuorumDependency, Target, TargetPhase, TargetSpec,
    TargetStatus,
};

/// Annotation key carrying the content hash of a managed resource.
pub const ANNOTATION_RESOURCE_HASH: &str = "warden.sh/resource-hash";

/// Annotation key carrying the consecutive reconcile error count for a target.
pub const ANNOTATION_ERROR_COUNT: &str = "warden.sh/reconcile-error-count";

/// Annotation key carrying the timestamp of the last recovery attempt.
pub const ANNOTATION_LAST_RECOVERY: &str = "warden.sh/last-recovery-attempt";
