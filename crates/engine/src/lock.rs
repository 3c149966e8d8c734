//! Per-target reconciliation locks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use warden_core::TargetId;

/// Process-wide exclusion keyed by target identity.
///
/// Guarantees at most one in-flight reconciliation per target within this
/// process; cross-process exclusion is delegated to leader election.
/// Always injected as an `Arc`, never a package-level singleton, so tests
/// can run concurrently with isolated state.
#[derive(Default)]
pub struct LockManager {
    held: Mutex<HashSet<TargetId>>,
}

impl LockManager {
    /// Create a new lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new lock manager wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Try to acquire the lock for a target.
    ///
    /// Returns false without blocking when the target is already held; the
    /// caller must re-queue rather than wait.
    pub fn acquire(&self, target: &TargetId) -> bool {
        match self.held.lock() {
            Ok(mut held) => held.insert(target.clone()),
            // A poisoned mutex means another reconciliation panicked while
            // holding it; refuse the lock and let redelivery retry.
            Err(_) => false,
        }
    }

    /// Release the lock for a target. Idempotent.
    pub fn release(&self, target: &TargetId) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(target);
        }
    }

    /// Check if a target is currently held.
    pub fn is_held(&self, target: &TargetId) -> bool {
        match self.held.lock() {
            Ok(held) => held.contains(target),
            Err(_) => true,
        }
    }

    /// Number of targets currently held.
    pub fn held_count(&self) -> usize {
        match self.held.lock() {
            Ok(held) => held.len(),
            Err(_) => 0,
        }
    }
}
