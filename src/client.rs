//! Client side of a greeting: locate our leaf in the published group,
//! prove membership and package the relay request.

use crate::error::IdentityError;
use crate::identity::Identity;
use crate::merkle::MembershipTree;
use crate::oracle::ProofOracle;
use crate::types::{GreetRequest, PublicOutputs};
use crate::utils::{field_to_hex, FieldElement};
use anyhow::{Context, Result};
use log::{debug, info};

/// Proves membership of `identity` in `tree` and builds the request the
/// relay expects for `greeting`.
///
/// The tree must be rebuilt from the commitment feed in insertion order,
/// otherwise its root will not be one the relay knows.
///
/// # Errors
/// Returns [`IdentityError::NotAMember`] if the identity's commitment is not
/// in the tree, or the oracle's error if proving fails.
pub fn build_greet_request(
    oracle: &dyn ProofOracle,
    identity: &Identity,
    tree: &MembershipTree,
    external_nullifier: FieldElement,
    greeting: &str,
) -> Result<(GreetRequest, PublicOutputs)> {
    let commitment = identity.commitment();
    let index = tree
        .index_of(commitment)
        .ok_or(IdentityError::NotAMember)
        .with_context(|| format!("Commitment {} not found in group", field_to_hex(commitment)))?;
    debug!("Identity found at leaf {index}");

    let merkle_proof = tree
        .prove_membership(index)
        .context("Failed to build Merkle proof")?;
    let (proof, outputs) = oracle
        .prove(identity, &merkle_proof, external_nullifier, greeting.as_bytes())
        .context("Failed to generate proof")?;
    info!(
        "Generated proof for root {} ({} bytes)",
        field_to_hex(outputs.root),
        proof.bytes.len()
    );

    let request = GreetRequest {
        greeting: greeting.to_string(),
        nullifier_hash: outputs.nullifier_hash,
        merkle_root: Some(outputs.root),
        proof,
    };
    Ok((request, outputs))
}
