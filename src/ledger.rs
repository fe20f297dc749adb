//! The ledger that stores accepted greetings.
//!
//! The relay's checks are only a pre-filter: the ledger re-verifies every
//! proof and enforces nullifier uniqueness on its own before emitting a
//! `NewGreeting` event.

use crate::error::{LedgerError, RegistryError};
use crate::nullifier::NullifierRegistry;
use crate::oracle::ProofOracle;
use crate::types::{format_bytes32, parse_bytes32, signal_hash, Proof, PublicOutputs};
use crate::utils::{field_to_hex, FieldElement};
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub sequence: u64,
}

/// Public event emitted for every accepted greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingEvent {
    pub sequence: u64,
    pub greeting: [u8; 32],
    pub nullifier_hash: FieldElement,
}

impl GreetingEvent {
    /// The greeting text, or `None` if the stored word is not valid text.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        parse_bytes32(&self.greeting).ok()
    }
}

pub trait SignalLedger: Send + Sync {
    /// Records `signal` once per nullifier.
    ///
    /// # Errors
    /// [`LedgerError::Unavailable`] for transport failures (retryable),
    /// any other variant for a terminal rejection.
    fn record_signal(
        &self,
        signal: &str,
        outputs: &PublicOutputs,
        proof: &Proof,
    ) -> Result<LedgerReceipt, LedgerError>;
}

/// Ledger kept in process memory.
pub struct InMemoryLedger {
    oracle: Arc<dyn ProofOracle>,
    nullifiers: NullifierRegistry,
    events: Mutex<Vec<GreetingEvent>>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(oracle: Arc<dyn ProofOracle>) -> Self {
        Self {
            oracle,
            nullifiers: NullifierRegistry::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<GreetingEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decoded greetings in the order they were accepted.
    #[must_use]
    pub fn greetings(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(GreetingEvent::message)
            .collect()
    }
}

impl SignalLedger for InMemoryLedger {
    fn record_signal(
        &self,
        signal: &str,
        outputs: &PublicOutputs,
        proof: &Proof,
    ) -> Result<LedgerReceipt, LedgerError> {
        let greeting =
            format_bytes32(signal).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        if signal_hash(signal.as_bytes()) != outputs.signal_hash {
            return Err(LedgerError::Rejected("signal does not match proof".into()));
        }
        if !self.oracle.verify(proof, outputs) {
            warn!("Ledger refused proof for nullifier {}", field_to_hex(outputs.nullifier_hash));
            return Err(LedgerError::InvalidProof);
        }

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        self.nullifiers
            .check_and_consume(outputs.nullifier_hash, outputs.external_nullifier)
            .map_err(|e| match e {
                RegistryError::AlreadyUsed => LedgerError::NullifierUsed,
                RegistryError::Journal(reason) => LedgerError::Unavailable(reason),
            })?;

        let sequence = events.len() as u64;
        events.push(GreetingEvent {
            sequence,
            greeting,
            nullifier_hash: outputs.nullifier_hash,
        });
        info!("NewGreeting #{sequence}: {signal}");

        Ok(LedgerReceipt { sequence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::merkle::MembershipTree;
    use crate::oracle::testing::DigestOracle;
    use crate::types::external_nullifier;

    fn submit_material(signal: &str) -> (Arc<DigestOracle>, Proof, PublicOutputs) {
        let oracle = Arc::new(DigestOracle::new(3));
        let identity = Identity::from_seed(b"member").unwrap();
        let tree = MembershipTree::from_leaves(3, [identity.commitment()]).unwrap();
        let merkle_proof = tree.prove_membership(0).unwrap();
        let (proof, outputs) = oracle
            .prove(
                &identity,
                &merkle_proof,
                external_nullifier("greet-v1"),
                signal.as_bytes(),
            )
            .unwrap();
        (oracle, proof, outputs)
    }

    #[test]
    fn test_records_and_emits_event() {
        let (oracle, proof, outputs) = submit_material("Hello world");
        let ledger = InMemoryLedger::new(oracle);
        let receipt = ledger.record_signal("Hello world", &outputs, &proof).unwrap();
        assert_eq!(receipt.sequence, 0);
        assert_eq!(ledger.greetings(), vec!["Hello world".to_string()]);
        assert_eq!(ledger.events()[0].nullifier_hash, outputs.nullifier_hash);
    }

    #[test]
    fn test_enforces_own_nullifier_uniqueness() {
        let (oracle, proof, outputs) = submit_material("Hello world");
        let ledger = InMemoryLedger::new(oracle);
        ledger.record_signal("Hello world", &outputs, &proof).unwrap();
        assert_eq!(
            ledger.record_signal("Hello world", &outputs, &proof),
            Err(LedgerError::NullifierUsed)
        );
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_reverifies_proof() {
        let (oracle, mut proof, outputs) = submit_material("Hello world");
        let ledger = InMemoryLedger::new(oracle);
        proof.bytes[0] ^= 1;
        assert_eq!(
            ledger.record_signal("Hello world", &outputs, &proof),
            Err(LedgerError::InvalidProof)
        );
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_rejects_swapped_signal() {
        let (oracle, proof, outputs) = submit_material("Hello world");
        let ledger = InMemoryLedger::new(oracle);
        assert!(matches!(
            ledger.record_signal("Goodbye world", &outputs, &proof),
            Err(LedgerError::Rejected(_))
        ));
    }
}
