//! The relay: the trust boundary between anonymous clients and the ledger.
//!
//! A submission is accepted only if, in order:
//! 1. it was made for this deployment's external nullifier and signal,
//! 2. its root is in the group's accepted root window,
//! 3. the oracle verifies the proof,
//! 4. the nullifier can be reserved,
//! 5. the ledger records the signal.
//!
//! The nullifier is committed only after the ledger accepted; any earlier
//! failure releases the reservation.

use crate::error::{LedgerError, RejectReason, TreeError};
use crate::group::GroupState;
use crate::identity::IdentityCommitment;
use crate::ledger::SignalLedger;
use crate::nullifier::NullifierRegistry;
use crate::oracle::ProofOracle;
use crate::types::{signal_hash, GreetRequest, GreetResponse, Proof, PublicOutputs, MAX_SIGNAL_LEN};
use crate::utils::{field_to_hex, FieldElement};
use log::{error, info, warn};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Default upper bound on proof bytes accepted from clients.
pub const DEFAULT_MAX_PROOF_SIZE: usize = 512 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectReceipt {
    pub sequence: u64,
    pub nullifier_hash: FieldElement,
}

pub struct RelayVerifier {
    oracle: Arc<dyn ProofOracle>,
    group: RwLock<GroupState>,
    registry: Arc<NullifierRegistry>,
    ledger: Arc<dyn SignalLedger>,
    external_nullifier: FieldElement,
    max_proof_size: usize,
}

impl RelayVerifier {
    #[must_use]
    pub fn new(
        oracle: Arc<dyn ProofOracle>,
        group: GroupState,
        registry: Arc<NullifierRegistry>,
        ledger: Arc<dyn SignalLedger>,
        external_nullifier: FieldElement,
    ) -> Self {
        Self {
            oracle,
            group: RwLock::new(group),
            registry,
            ledger,
            external_nullifier,
            max_proof_size: DEFAULT_MAX_PROOF_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_proof_size(mut self, max_proof_size: usize) -> Self {
        self.max_proof_size = max_proof_size;
        self
    }

    fn group(&self) -> RwLockReadGuard<'_, GroupState> {
        self.group.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn external_nullifier(&self) -> FieldElement {
        self.external_nullifier
    }

    #[must_use]
    pub fn current_root(&self) -> FieldElement {
        self.group().current_root()
    }

    #[must_use]
    pub fn registry(&self) -> &NullifierRegistry {
        &self.registry
    }

    /// Adds a member to the group. Administrative; the new root becomes the
    /// newest entry of the accepted window.
    ///
    /// # Errors
    /// Returns [`TreeError::CapacityExceeded`] when the group is full.
    pub fn add_member(&self, commitment: IdentityCommitment) -> Result<usize, TreeError> {
        self.group
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_member(commitment)
    }

    /// Verifies a submission and, if it passes, records `signal` on the
    /// ledger and burns the nullifier.
    ///
    /// # Errors
    /// Returns the [`RejectReason`] of the first failed check.
    pub fn submit(
        &self,
        signal: &str,
        proof: &Proof,
        outputs: &PublicOutputs,
    ) -> Result<SideEffectReceipt, RejectReason> {
        if signal.len() > MAX_SIGNAL_LEN {
            return Err(RejectReason::Malformed(format!(
                "greeting longer than {MAX_SIGNAL_LEN} bytes"
            )));
        }
        if outputs.external_nullifier != self.external_nullifier
            || outputs.signal_hash != signal_hash(signal.as_bytes())
        {
            return Err(RejectReason::ContextMismatch);
        }
        if !self.group().is_root_accepted(&outputs.root) {
            warn!("Rejected submission against unknown root {}", field_to_hex(outputs.root));
            return Err(RejectReason::StaleRoot);
        }
        if !self.oracle.verify(proof, outputs) {
            warn!("Rejected invalid proof");
            return Err(RejectReason::InvalidProof);
        }

        let reservation = self
            .registry
            .reserve(outputs.nullifier_hash, outputs.external_nullifier)?;

        let receipt = match self.ledger.record_signal(signal, outputs, proof) {
            Ok(receipt) => receipt,
            Err(LedgerError::NullifierUsed) => {
                // The ledger already burned it; keep our pre-filter in sync.
                warn!(
                    "Ledger reports nullifier {} as used",
                    field_to_hex(outputs.nullifier_hash)
                );
                if let Err(e) = reservation.commit() {
                    error!("Failed to record ledger-burned nullifier: {e}");
                }
                return Err(RejectReason::AlreadyUsed);
            }
            Err(LedgerError::InvalidProof) => return Err(RejectReason::InvalidProof),
            Err(LedgerError::Rejected(reason)) => {
                warn!("Ledger rejected signal: {reason}");
                return Err(RejectReason::Malformed(reason));
            }
            Err(LedgerError::Unavailable(reason)) => {
                error!("Ledger unavailable, nullifier released: {reason}");
                return Err(RejectReason::Unavailable);
            }
        };

        if let Err(e) = reservation.commit() {
            error!(
                "Signal #{} recorded on the ledger but nullifier {} could not be persisted: {e}",
                receipt.sequence,
                field_to_hex(outputs.nullifier_hash)
            );
            return Err(RejectReason::Internal);
        }

        info!(
            "Accepted greeting #{} (nullifier {})",
            receipt.sequence,
            field_to_hex(outputs.nullifier_hash)
        );
        Ok(SideEffectReceipt {
            sequence: receipt.sequence,
            nullifier_hash: outputs.nullifier_hash,
        })
    }

    /// Handles a client request, re-deriving the public context the proof
    /// must match.
    pub fn handle(&self, request: &GreetRequest) -> GreetResponse {
        if request.proof.bytes.len() > self.max_proof_size {
            let reason = RejectReason::Malformed("proof too large".into());
            return GreetResponse::rejected(reason.kind(), reason.to_string());
        }

        let outputs = PublicOutputs {
            root: request.merkle_root.unwrap_or_else(|| self.current_root()),
            nullifier_hash: request.nullifier_hash,
            signal_hash: signal_hash(request.greeting.as_bytes()),
            external_nullifier: self.external_nullifier,
        };

        match self.submit(&request.greeting, &request.proof, &outputs) {
            Ok(_) => GreetResponse::accepted(),
            Err(reason) => GreetResponse::rejected(reason.kind(), reason.to_string()),
        }
    }
}
