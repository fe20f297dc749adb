//! Prove/verify seam over the proving backend.
//!
//! [`ProofOracle`] is all the relay and ledger know about proofs.
//! [`Halo2Oracle`] implements it with [`GreeterCircuit`] over the Vesta IPA
//! commitment scheme; any other backend with the same contract can be
//! swapped in.

use crate::circuit::GreeterCircuit;
use crate::error::ProvingError;
use crate::identity::Identity;
use crate::merkle::MerkleProof;
use crate::types::{signal_hash, Proof, PublicOutputs, MAX_SIGNAL_LEN};
use crate::utils::FieldElement;
use halo2_proofs::{
    plonk::{create_proof, keygen_pk, keygen_vk, verify_proof, ProvingKey, SingleVerifier, VerifyingKey},
    poly::commitment::Params,
    transcript::{Blake2bRead, Blake2bWrite, Challenge255},
};
use log::{debug, info};
use pasta_curves::vesta;
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use std::sync::Arc;

pub trait ProofOracle: Send + Sync {
    /// Proves that `identity` owns the leaf of `merkle_proof` and binds the
    /// proof to `external_nullifier` and `signal`.
    ///
    /// # Errors
    /// Returns a [`ProvingError`] for malformed inputs or a backend failure.
    fn prove(
        &self,
        identity: &Identity,
        merkle_proof: &MerkleProof,
        external_nullifier: FieldElement,
        signal: &[u8],
    ) -> Result<(Proof, PublicOutputs), ProvingError>;

    /// True only if `proof` was made with this oracle's artifacts and
    /// attests to exactly `outputs`.
    fn verify(&self, proof: &Proof, outputs: &PublicOutputs) -> bool;

    /// Content address of the setup artifacts.
    fn artifact_id(&self) -> [u8; 32];
}

/// Input checks every backend applies before proving, returning the
/// public outputs the proof must attest to.
///
/// # Errors
/// See [`ProvingError`].
pub fn prepare_public_outputs(
    depth: usize,
    identity: &Identity,
    merkle_proof: &MerkleProof,
    external_nullifier: FieldElement,
    signal: &[u8],
) -> Result<PublicOutputs, ProvingError> {
    if merkle_proof.depth() != depth {
        return Err(ProvingError::DepthMismatch {
            expected: depth,
            got: merkle_proof.depth(),
        });
    }
    if !merkle_proof.verify() {
        return Err(ProvingError::RootMismatch);
    }
    if merkle_proof.leaf != identity.commitment() {
        return Err(ProvingError::LeafMismatch);
    }
    if signal.len() > MAX_SIGNAL_LEN {
        return Err(ProvingError::SignalTooLong {
            len: signal.len(),
            max: MAX_SIGNAL_LEN,
        });
    }

    Ok(PublicOutputs {
        root: merkle_proof.root,
        nullifier_hash: identity.nullifier_hash(external_nullifier),
        signal_hash: signal_hash(signal),
        external_nullifier,
    })
}

/// Halo2 backend with keys generated once and shared.
#[derive(Clone)]
pub struct Halo2Oracle {
    k: u32,
    depth: usize,
    params: Arc<Params<vesta::Affine>>,
    pk: Arc<ProvingKey<vesta::Affine>>,
    vk: Arc<VerifyingKey<vesta::Affine>>,
    artifact_id: [u8; 32],
}

impl Halo2Oracle {
    /// Generates parameters and keys for trees of `depth` in a circuit of
    /// `2^k` rows.
    ///
    /// # Errors
    /// Returns [`ProvingError::Backend`] if key generation fails, e.g. when
    /// `k` is too small for `depth`.
    pub fn setup(k: u32, depth: usize) -> Result<Self, ProvingError> {
        info!("Generating proving parameters (k={k}, depth={depth})");
        let params = Params::<vesta::Affine>::new(k);
        let circuit = GreeterCircuit::blank(depth);

        let vk = keygen_vk(&params, &circuit)
            .map_err(|e| ProvingError::Backend(format!("verifying key generation: {e:?}")))?;
        let pk = keygen_pk(&params, vk.clone(), &circuit)
            .map_err(|e| ProvingError::Backend(format!("proving key generation: {e:?}")))?;

        let mut hasher = Sha3_256::new();
        hasher.update(k.to_be_bytes());
        hasher.update((depth as u64).to_be_bytes());
        hasher.update(format!("{:?}", vk.pinned()).as_bytes());
        let artifact_id: [u8; 32] = hasher.finalize().into();
        info!("Proving artifacts ready: {}", hex::encode(artifact_id));

        Ok(Self {
            k,
            depth,
            params: Arc::new(params),
            pk: Arc::new(pk),
            vk: Arc::new(vk),
            artifact_id,
        })
    }

    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl ProofOracle for Halo2Oracle {
    fn prove(
        &self,
        identity: &Identity,
        merkle_proof: &MerkleProof,
        external_nullifier: FieldElement,
        signal: &[u8],
    ) -> Result<(Proof, PublicOutputs), ProvingError> {
        let outputs =
            prepare_public_outputs(self.depth, identity, merkle_proof, external_nullifier, signal)?;
        let circuit = GreeterCircuit::new(identity, merkle_proof);
        let instance = outputs.to_instance();
        let instances: &[&[&[FieldElement]]] = &[&[&instance]];

        let mut transcript = Blake2bWrite::<_, vesta::Affine, Challenge255<_>>::init(vec![]);
        create_proof(
            &*self.params,
            &*self.pk,
            &[circuit],
            instances,
            OsRng,
            &mut transcript,
        )
        .map_err(|e| ProvingError::Backend(format!("{e:?}")))?;
        let bytes = transcript.finalize();
        debug!("Generated proof of {} bytes", bytes.len());

        Ok((
            Proof {
                artifact: self.artifact_id,
                bytes,
            },
            outputs,
        ))
    }

    fn verify(&self, proof: &Proof, outputs: &PublicOutputs) -> bool {
        if proof.artifact != self.artifact_id {
            debug!(
                "Proof artifact {} does not match {}",
                hex::encode(proof.artifact),
                hex::encode(self.artifact_id)
            );
            return false;
        }

        let instance = outputs.to_instance();
        let instances: &[&[&[FieldElement]]] = &[&[&instance]];
        let strategy = SingleVerifier::new(&*self.params);
        let mut transcript = Blake2bRead::<_, vesta::Affine, Challenge255<_>>::init(&proof.bytes[..]);
        verify_proof(
            &*self.params,
            &*self.vk,
            strategy,
            instances,
            &mut transcript,
        )
        .is_ok()
    }

    fn artifact_id(&self) -> [u8; 32] {
        self.artifact_id
    }
}
