//! Start-quorum gating for primary workload creation.

use std::sync::Arc;

use itertools::Itertools;
use warden_core::QuorumDependency;
use warden_platform::DependencyReader;

use crate::error::Result;

/// Verdict of one quorum check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumVerdict {
    /// Every dependency is ready; creation may proceed.
    Satisfied,
    /// At least one dependency is unmet; creation must wait.
    Blocked {
        /// Human-readable summaries of every unmet dependency.
        unmet: Vec<String>,
    },
}

impl QuorumVerdict {
    /// Check if the quorum is satisfied.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// One-line reason listing every unmet dependency, empty when satisfied.
    pub fn reason(&self) -> String {
        match self {
            Self::Satisfied => String::new(),
            Self::Blocked { unmet } => {
                format!("waiting for start quorum: {}", unmet.iter().join("; "))
            }
        }
    }
}

/// Precondition check consulted before creating a primary workload resource.
///
/// The gate fails closed: a dependency that cannot be found, reports fewer
/// ready replicas than required, or is not in its converged phase blocks
/// creation. Every unmet dependency is listed, not just the first.
pub struct StartQuorumGate {
    reader: Arc<dyn DependencyReader>,
}

impl StartQuorumGate {
    /// Create a gate over a dependency status reader.
    pub fn new(reader: Arc<dyn DependencyReader>) -> Self {
        Self { reader }
    }

    /// Check every dependency, collecting all unmet ones.
    pub async fn check(&self, deps: &[QuorumDependency]) -> Result<QuorumVerdict> {
        let mut unmet = Vec::new();
        for dep in deps {
            match self.reader.status(&dep.target).await? {
                None => {
                    unmet.push(format!("{} not found", dep.target));
                }
                Some(status) => {
                    let required = dep.min_ready.unwrap_or(1);
                    if status.ready_replicas < required {
                        unmet.push(format!(
                            "{} has {}/{} ready replicas",
                            dep.target, status.ready_replicas, required
                        ));
                    } else if !status.phase.is_converged() {
                        unmet.push(format!(
                            "{} is in phase {}",
                            dep.target, status.phase
                        ));
                    }
                }
            }
        }
        if unmet.is_empty() {
            Ok(QuorumVerdict::Satisfied)
        } else {
            Ok(QuorumVerdict::Blocked { unmet })
        }
    }
}
