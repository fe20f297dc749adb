//! Deterministic identities derived from a user-held seed.
//!
//! An [`Identity`] is two field elements (trapdoor and nullifier secret)
//! derived from a seed such as a wallet signature. The same seed always
//! yields the same identity, so nothing has to be stored client-side.

use crate::error::IdentityError;
use crate::utils::{field_to_hex, hash_to_field, poseidon_hash, FieldElement};
use std::fmt;

const TRAPDOOR_DOMAIN: &str = "identity/trapdoor";
const NULLIFIER_DOMAIN: &str = "identity/nullifier";

/// Public commitment to an identity. Published as a Merkle leaf.
pub type IdentityCommitment = FieldElement;

/// Private identity material. Never leaves the client.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    trapdoor: FieldElement,
    nullifier_secret: FieldElement,
}

impl Identity {
    /// Derives an identity from `seed`.
    ///
    /// # Errors
    /// Returns [`IdentityError::EmptySeed`] if `seed` is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use anon_greeter::identity::Identity;
    ///
    /// let a = Identity::from_seed(b"signed message").unwrap();
    /// let b = Identity::from_seed(b"signed message").unwrap();
    /// assert_eq!(a.commitment(), b.commitment());
    /// ```
    pub fn from_seed(seed: &[u8]) -> Result<Self, IdentityError> {
        if seed.is_empty() {
            return Err(IdentityError::EmptySeed);
        }
        Ok(Self {
            trapdoor: hash_to_field(TRAPDOOR_DOMAIN, seed),
            nullifier_secret: hash_to_field(NULLIFIER_DOMAIN, seed),
        })
    }

    #[must_use]
    pub fn trapdoor(&self) -> FieldElement {
        self.trapdoor
    }

    #[must_use]
    pub fn nullifier_secret(&self) -> FieldElement {
        self.nullifier_secret
    }

    /// `poseidon(nullifier_secret, trapdoor)`.
    #[must_use]
    pub fn commitment(&self) -> IdentityCommitment {
        commitment_of(self.nullifier_secret, self.trapdoor)
    }

    /// Nullifier hash of this identity under `external_nullifier`.
    #[must_use]
    pub fn nullifier_hash(&self, external_nullifier: FieldElement) -> FieldElement {
        nullifier_hash_of(self.nullifier_secret, external_nullifier)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &field_to_hex(self.commitment()))
            .finish_non_exhaustive()
    }
}

/// Commitment from raw identity secrets.
#[must_use]
pub fn commitment_of(nullifier_secret: FieldElement, trapdoor: FieldElement) -> IdentityCommitment {
    poseidon_hash(nullifier_secret, trapdoor)
}

/// `poseidon(external_nullifier, nullifier_secret)`.
#[must_use]
pub fn nullifier_hash_of(
    nullifier_secret: FieldElement,
    external_nullifier: FieldElement,
) -> FieldElement {
    poseidon_hash(external_nullifier, nullifier_secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_curves::pallas;

    #[test]
    fn test_same_seed_same_identity() {
        let a = Identity::from_seed(b"seed-1").unwrap();
        let b = Identity::from_seed(b"seed-1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.commitment(), b.commitment());
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = Identity::from_seed(b"seed-1").unwrap();
        let b = Identity::from_seed(b"seed-2").unwrap();
        assert_ne!(a.commitment(), b.commitment());
        assert_ne!(a.trapdoor(), a.nullifier_secret());
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert_eq!(Identity::from_seed(b""), Err(IdentityError::EmptySeed));
    }

    #[test]
    fn test_nullifier_hash_scoped_by_external_nullifier() {
        let id = Identity::from_seed(b"seed").unwrap();
        let v1 = pallas::Base::from(1);
        let v2 = pallas::Base::from(2);
        assert_eq!(id.nullifier_hash(v1), id.nullifier_hash(v1));
        assert_ne!(id.nullifier_hash(v1), id.nullifier_hash(v2));
        assert_ne!(id.nullifier_hash(v1), id.commitment());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let id = Identity::from_seed(b"seed").unwrap();
        let rendered = format!("{id:?}");
        assert!(!rendered.contains(&field_to_hex(id.trapdoor())));
        assert!(!rendered.contains(&field_to_hex(id.nullifier_secret())));
        assert!(rendered.contains(&field_to_hex(id.commitment())));
    }
}
