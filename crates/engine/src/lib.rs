//! Generic reconciliation engine for Warden-managed workloads.
//!
//! This crate implements the control-loop machinery shared by every
//! resource-kind-specific controller:
//!
//! - **Lock manager**: per-target mutual exclusion within the process
//! - **Versioned state store**: the two most recent desired resource sets
//! - **Change detector**: fingerprint-based skip/recompute decisions
//! - **Three-way patch engine**: minimal mutations that preserve live drift
//! - **Secondary-resource pipeline**: ordered create/update/delete per kind
//! - **Start-quorum gate**: dependency readiness before primary creation
//! - **Error classifier & retry controller**: differentiated backoff/recovery
//!
//! # Control flow
//!
//! An external event source invokes [`Reconciler::reconcile`] with a target
//! identity. The reconciler acquires per-target exclusivity, expands the
//! specification into a full resource set, short-circuits when nothing
//! changed, rotates the versioned state, gates primary creation on the
//! start quorum, runs each kind's reconciler in declared order, and
//! classifies any failure into a requeue/backoff/recovery action. Waits are
//! always expressed as requeue delays, never blocking sleeps.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_engine::{ReconcilerBuilder, ReconcilerConfig};
//! use warden_platform::{
//!     InMemoryDependencyReader, InMemoryObjectStore, InMemoryTargetClient,
//!     TracingEventRecorder,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_objects(InMemoryObjectStore::new_arc())
//!         .with_targets(InMemoryTargetClient::new_arc())
//!         .with_deps(InMemoryDependencyReader::new_arc())
//!         .with_recorder(TracingEventRecorder::new_arc())
//!         .with_config(ReconcilerConfig::default())
//!         .build();
//!
//!     // Wire `reconciler.reconcile(&id)` into the platform's event source.
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod classify;
pub mod detector;
pub mod error;
pub mod expand;
pub mod lock;
pub mod patch;
pub mod pipeline;
pub mod quorum;
pub mod reconciler;
pub mod retry;
pub mod store;

// Re-export main types
pub use classify::{classify, ErrorCategory};
pub use detector::{decide, Decision, DetectInput, RecomputeReason, LEGACY_PROTOCOL_MAX};
pub use error::{Error, Result};
pub use expand::expand;
pub use lock::LockManager;
pub use patch::{apply_if_changed, is_noop_patch, strip_volatile, three_way, two_way, PatchOutcome};
pub use pipeline::{default_stages, KindReconciler, Pipeline, PipelineReport};
pub use quorum::{QuorumVerdict, StartQuorumGate};
pub use reconciler::{Outcome, Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use retry::{BackoffPolicy, Remediation, RetryAction, RetryController};
pub use store::VersionedStateStore;
