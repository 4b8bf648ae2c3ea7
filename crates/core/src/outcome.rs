//! Success/failure algebra for the transition pipeline.
//!
//! Every component reports status through [`Outcome`]; panics and other
//! host faults are reserved for the truly unexpected. A [`Failure`] carries
//! the taxonomy kind and a **transient flag**: transient failures are worth
//! redelivering, non-transient failures deterministically fail again and
//! must be dropped.

use thiserror::Error;

/// Result type used across the pipeline.
pub type Outcome<T> = Result<T, Failure>;

/// Failure taxonomy.
///
/// - `InvalidArguments`: malformed envelope, failed schema validation, or
///   structurally invalid data read back from storage.
/// - `InvalidTransition`: the optimistic-concurrency precondition on a
///   guarded write did not hold.
/// - `Unrecognized`: any other storage/transport fault.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidArguments,
    InvalidTransition,
    Unrecognized,
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::InvalidTransition => "invalid_transition",
            FailureKind::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// A reported failure: taxonomy kind, redelivery hint, and cause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {cause}")]
pub struct Failure {
    kind: FailureKind,
    transient: bool,
    cause: String,
}

impl Failure {
    /// General constructor with an explicit transient flag.
    ///
    /// Prefer the kind-specific constructors, which encode the canonical
    /// retry classification for each kind.
    pub fn new(kind: FailureKind, cause: impl Into<String>, transient: bool) -> Self {
        Self {
            kind,
            transient,
            cause: cause.into(),
        }
    }

    /// Non-transient: redelivery cannot fix a structurally invalid input.
    pub fn invalid_arguments(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidArguments, cause, false)
    }

    /// Non-transient: a stale precondition never resolves by retrying.
    pub fn invalid_transition(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidTransition, cause, false)
    }

    /// Transient: storage/transport faults are worth redelivering.
    pub fn unrecognized(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::Unrecognized, cause, true)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn is_kind(&self, kind: FailureKind) -> bool {
        self.kind == kind
    }

    /// Whether redelivery could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}
