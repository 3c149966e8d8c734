//! Change detection: decide whether a reconciliation needs to recompute
//! and re-diff the full resource set, or can reuse the stored one.

use warden_core::{ResourceSet, TargetPhase};

/// Highest protocol version still covered by the legacy fingerprint shim.
///
/// Protocol 1 orchestrators computed generation fingerprints with a
/// defective hash, so a mismatch against a v1 set does not imply a real
/// specification change.
pub const LEGACY_PROTOCOL_MAX: u32 = 1;

/// Annotation left on targets by protocol 1 orchestrators recording the
/// target object version they last reconciled.
pub const ANNOTATION_LAST_SEEN_VERSION: &str = "warden.sh/last-seen-target-version";

/// Why a recomputation was forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeReason {
    /// No fingerprint is on record for this target.
    NoStoredSet,
    /// The specification fingerprint changed.
    FingerprintChanged,
    /// The target is not in its converged phase.
    NotConverged,
}

/// Outcome of change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing changed; reuse the stored latest set.
    Skip,
    /// Expand the specification and rotate a new set into the store.
    Recompute(RecomputeReason),
}

impl Decision {
    /// Check if this is a skip decision.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// Inputs to one change-detection decision.
#[derive(Debug, Clone, Copy)]
pub struct DetectInput<'a> {
    /// Content-derived generation of the current specification.
    pub fingerprint: &'a str,
    /// Current phase of the target.
    pub phase: TargetPhase,
    /// The stored latest set, when one exists.
    pub stored: Option<&'a ResourceSet>,
    /// True when the target object was modified while the orchestrator was
    /// not running (version-marker comparison, see [`legacy_skip_override`]).
    pub target_modified_offline: bool,
}

/// Decide whether to skip or recompute.
pub fn decide(input: DetectInput<'_>) -> Decision {
    let Some(stored) = input.stored else {
        return Decision::Recompute(RecomputeReason::NoStoredSet);
    };
    if !input.phase.is_converged() {
        return Decision::Recompute(RecomputeReason::NotConverged);
    }
    if stored.generation == input.fingerprint {
        return Decision::Skip;
    }
    if legacy_skip_override(stored, input.target_modified_offline) {
        return Decision::Skip;
    }
    Decision::Recompute(RecomputeReason::FingerprintChanged)
}

/// Compatibility shim for sets written by the legacy fingerprint protocol.
///
/// Protocol <= [`LEGACY_PROTOCOL_MAX`] sets carry fingerprints from a
/// defective hash, so a mismatch alone is not evidence of a real change.
/// Unless the target was modified while the orchestrator was down, the
/// stored set is trusted over the freshly computed hash. This is a preserved
/// workaround for a historical hashing bug; do not extend it to newer
/// protocol versions without evidence of the original defect recurring.
pub fn legacy_skip_override(stored: &ResourceSet, target_modified_offline: bool) -> bool {
    stored.protocol <= LEGACY_PROTOCOL_MAX && !target_modified_offline
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use warden_core::CURRENT_PROTOCOL;

    fn stored(generation: &str, protocol: u32) -> ResourceSet {
        let mut set = ResourceSet::new(1, generation);
        set.protocol = protocol;
        set
    }

    fn input<'a>(
        fingerprint: &'a str,
        phase: TargetPhase,
        stored: Option<&'a ResourceSet>,
    ) -> DetectInput<'a> {
        DetectInput {
            fingerprint,
            phase,
            stored,
            target_modified_offline: false,
        }
    }

    #[test]
    fn test_no_record_forces_recompute() {
        let decision = decide(input("gen-a", TargetPhase::Running, None));
        assert_eq!(decision, Decision::Recompute(RecomputeReason::NoStoredSet));
    }

    #[test]
    fn test_matching_fingerprint_skips() {
        let set = stored("gen-a", CURRENT_PROTOCOL);
        let decision = decide(input("gen-a", TargetPhase::Running, Some(&set)));
        assert!(decision.is_skip());
    }

    #[test]
    fn test_changed_fingerprint_recomputes() {
        let set = stored("gen-a", CURRENT_PROTOCOL);
        let decision = decide(input("gen-b", TargetPhase::Running, Some(&set)));
        assert_eq!(
            decision,
            Decision::Recompute(RecomputeReason::FingerprintChanged)
        );
    }

    #[test]
    fn test_unconverged_phase_recomputes_even_on_match() {
        let set = stored("gen-a", CURRENT_PROTOCOL);
        for phase in [
            TargetPhase::Pending,
            TargetPhase::Creating,
            TargetPhase::Upgrading,
            TargetPhase::Waiting,
            TargetPhase::Failed,
        ] {
            let decision = decide(input("gen-a", phase, Some(&set)));
            assert_eq!(decision, Decision::Recompute(RecomputeReason::NotConverged));
        }
    }

    #[test]
    fn test_legacy_set_trusted_over_fresh_hash() {
        let set = stored("legacy-gen", LEGACY_PROTOCOL_MAX);
        let decision = decide(input("gen-new", TargetPhase::Running, Some(&set)));
        assert!(decision.is_skip());
    }

    #[test]
    fn test_legacy_set_recomputed_after_offline_modification() {
        let set = stored("legacy-gen", LEGACY_PROTOCOL_MAX);
        let decision = decide(DetectInput {
            fingerprint: "gen-new",
            phase: TargetPhase::Running,
            stored: Some(&set),
            target_modified_offline: true,
        });
        assert_eq!(
            decision,
            Decision::Recompute(RecomputeReason::FingerprintChanged)
        );
    }

    #[test]
    fn test_shim_never_applies_to_current_protocol() {
        let set = stored("gen-a", CURRENT_PROTOCOL);
        assert!(!legacy_skip_override(&set, false));
    }
}
