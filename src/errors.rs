//! Error types for operation resolution and execution.
//!
//! Resolution is all-or-nothing: apart from contingency rejection of a single
//! candidate (which the resolve loop recovers from internally by falling
//! through to the next ranked candidate), every failure propagates to the
//! caller as one of the typed variants below.

use thiserror::Error;

/// Errors surfaced by the resolution pipeline.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested name or capability matched no registered descriptor, or
    /// matched descriptors but none could structurally accept the supplied
    /// arguments. `considered` is empty in the first case and carries a
    /// per-descriptor rejection reason in the second, so callers (and
    /// `help()`) can tell "unknown operation" apart from "wrong arguments".
    #[error("{}", no_candidates_message(target, considered))]
    NoCandidates {
        /// Display form of the requested name or capability.
        target: String,
        /// Why each structurally considered descriptor was eliminated.
        considered: Vec<CandidateStatus>,
    },

    /// Two or more top-ranked candidates tie on every ranking criterion.
    /// Carries the tied descriptors so the caller can disambiguate with a
    /// qualified name or a more specific capability type.
    #[error("ambiguous match for '{target}': {} candidates tie at top rank ({})", tied.len(), tied.join(", "))]
    AmbiguousMatch {
        /// Display form of the requested name or capability.
        target: String,
        /// Display names of the tied descriptors.
        tied: Vec<String>,
    },

    /// A required slot of the selected candidate could not be populated,
    /// including failures of recursive sub-resolution.
    #[error("failed to bind slot '{slot}' of '{candidate}': {reason}")]
    Binding {
        /// Display name of the candidate being bound.
        candidate: String,
        /// Name of the slot that could not be satisfied.
        slot: String,
        /// Human-readable cause.
        reason: String,
        /// The nested resolution failure, when the slot was operation-typed.
        #[source]
        source: Option<Box<ResolveError>>,
    },

    /// Every structurally matching candidate was rejected by its runtime
    /// applicability check: the request had the right shape but the wrong
    /// data.
    #[error("all {rejected} matching candidates for '{target}' declined the supplied values")]
    ContingencyExhausted {
        /// Display form of the requested name or capability.
        target: String,
        /// How many bound candidates vetoed themselves.
        rejected: usize,
    },

    /// The bound instance itself failed while running.
    #[error(transparent)]
    Execution(#[from] OpError),
}

impl ResolveError {
    /// Shorthand for a [`ResolveError::Binding`] without a nested cause.
    pub(crate) fn binding(
        candidate: impl Into<String>,
        slot: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Binding {
            candidate: candidate.into(),
            slot: slot.into(),
            reason: reason.into(),
            source: None,
        }
    }
}

fn no_candidates_message(target: &str, considered: &[CandidateStatus]) -> String {
    if considered.is_empty() {
        format!("no operation registered for '{target}'")
    } else {
        format!(
            "no registered operation matches the supplied arguments for '{target}' ({} considered)",
            considered.len()
        )
    }
}

/// Why a descriptor was eliminated during matching or rejected after binding.
///
/// Collected per request and rendered by `help()` so failed resolutions can
/// explain themselves.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CandidateStatus {
    /// Display name of the descriptor.
    pub descriptor: String,
    /// Human-readable rejection reason.
    pub reason: String,
}

impl CandidateStatus {
    /// Create a status entry for a rejected descriptor.
    pub fn new(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.descriptor, self.reason)
    }
}

/// Errors raised by operation implementations themselves: factory slot
/// extraction and the algorithm's own `run`.
#[derive(Debug, Error)]
pub enum OpError {
    /// A slot value had the wrong payload type for the implementation.
    #[error("slot '{slot}' has wrong payload type: expected {expected}, got {actual}")]
    SlotType {
        /// Name of the offending slot.
        slot: String,
        /// Type the implementation expected.
        expected: String,
        /// Type actually carried by the value.
        actual: String,
    },

    /// A value the implementation requires was not bound.
    #[error("missing value for slot '{slot}'")]
    MissingSlot {
        /// Name of the absent slot.
        slot: String,
    },

    /// The algorithm failed while executing.
    #[error("{message}")]
    Failed {
        /// What went wrong.
        message: String,
    },
}

impl OpError {
    /// Create an execution failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a missing-slot error.
    pub fn missing(slot: impl Into<String>) -> Self {
        Self::MissingSlot { slot: slot.into() }
    }
}
