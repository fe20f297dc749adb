//! Error taxonomy.
//!
//! Tree and oracle errors are local and surfaced to whoever called them.
//! The relay folds every downstream failure into a [`RejectReason`], which
//! carries only its kind and a short reason string.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Merkle tree is full: capacity of {capacity} leaves reached")]
    CapacityExceeded { capacity: u64 },

    #[error("No leaf at index {index} (tree holds {len} leaves)")]
    UnknownLeaf { index: usize, len: usize },

    #[error("Unsupported tree depth {depth}: must be between 1 and {max}")]
    InvalidDepth { depth: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Identity seed cannot be empty")]
    EmptySeed,

    #[error("Commitment is not a member of the group")]
    NotAMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvingError {
    #[error("Merkle proof does not fold to its stated root")]
    RootMismatch,

    #[error("Merkle proof leaf is not the identity's commitment")]
    LeafMismatch,

    #[error("Merkle proof has depth {got}, oracle expects {expected}")]
    DepthMismatch { expected: usize, got: usize },

    #[error("Signal is {len} bytes, maximum is {max}")]
    SignalTooLong { len: usize, max: usize },

    #[error("Proving backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The (external nullifier, nullifier hash) pair is consumed or in flight.
    #[error("Nullifier has already been used")]
    AlreadyUsed,

    #[error("Failed to append to nullifier journal: {0}")]
    Journal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Ledger refused the proof")]
    InvalidProof,

    #[error("Nullifier already recorded on the ledger")]
    NullifierUsed,

    /// Any other refusal by the ledger's own checks. Terminal.
    #[error("Ledger rejected the signal: {0}")]
    Rejected(String),

    /// Transport or availability failure. The caller may retry.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Why the relay refused a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Merkle root is not recognized")]
    StaleRoot,

    #[error("Invalid proof")]
    InvalidProof,

    #[error("Nullifier has already been used")]
    AlreadyUsed,

    #[error("Proof was made for a different context")]
    ContextMismatch,

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Service unavailable, try again")]
    Unavailable,

    #[error("Internal error")]
    Internal,
}

impl RejectReason {
    /// Short stable name of the rejection kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::StaleRoot => "StaleRoot",
            RejectReason::InvalidProof => "InvalidProof",
            RejectReason::AlreadyUsed => "AlreadyUsed",
            RejectReason::ContextMismatch => "ContextMismatch",
            RejectReason::Malformed(_) => "Malformed",
            RejectReason::Unavailable => "Unavailable",
            RejectReason::Internal => "Internal",
        }
    }

    /// Whether resubmitting the same payload could ever succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectReason::Unavailable)
    }
}

impl From<RegistryError> for RejectReason {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyUsed => RejectReason::AlreadyUsed,
            RegistryError::Journal(_) => RejectReason::Internal,
        }
    }
}
