//! Field encoding, hashing and hex validation helpers.

use anyhow::Result;
use halo2_gadgets::poseidon::primitives::{
    self as poseidon, ConstantLength, P128Pow5T3 as PoseidonSpec,
};
use pasta_curves::group::ff::PrimeField;
use pasta_curves::pallas;
use sha3::{Digest, Sha3_256};

/// The field every protocol value lives in.
pub type FieldElement = pallas::Base;

/// Size in bytes of an encoded field element.
pub const FIELD_SIZE: usize = 32;

fn is_valid_hex_string(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .trim()
        .strip_prefix("0x")
        .or_else(|| input.trim().strip_prefix("0X"))
        .unwrap_or_else(|| input.trim())
}

/// Validates and strips hex prefix from a string.
///
/// # Errors
/// Returns an error if:
/// - The hex string has incorrect length
/// - The hex string contains non-hex characters
///
/// # Examples
///
/// ```
/// use anon_greeter::utils::validate_and_strip_hex;
///
/// let result = validate_and_strip_hex("0x1234abcd", 8).unwrap();
/// assert_eq!(result, "1234abcd");
/// ```
pub fn validate_and_strip_hex(input: &str, expected_len: usize) -> Result<String> {
    let stripped = strip_hex_prefix(input);

    if stripped.len() != expected_len {
        return Err(anyhow::anyhow!(
            "Invalid hex string: must be {} characters (got {})",
            expected_len,
            stripped.len()
        ));
    }

    if !is_valid_hex_string(stripped) {
        return Err(anyhow::anyhow!(
            "Invalid hex string: contains non-hex characters"
        ));
    }

    Ok(stripped.to_string())
}

const BASE_U64: u64 = 256;

/// Interprets 32 bytes as a big-endian base-256 number reduced modulo the
/// field order.
///
/// This is a one-way mapping used to hash arbitrary digests into the field;
/// it is not the inverse of [`field_to_bytes`].
#[inline]
#[must_use]
pub fn bytes_to_field(bytes: &[u8; FIELD_SIZE]) -> FieldElement {
    let mut value = pallas::Base::zero();
    let base = pallas::Base::from(BASE_U64);

    for &byte in bytes.iter() {
        value = value * base + pallas::Base::from(byte as u64);
    }

    value
}

/// Canonical little-endian encoding of a field element.
#[inline]
#[must_use]
pub fn field_to_bytes(field: FieldElement) -> [u8; FIELD_SIZE] {
    let mut bytes = [0u8; FIELD_SIZE];
    let repr = field.to_repr();
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

/// Decodes a canonical little-endian encoding. Returns `None` for values
/// that are not reduced modulo the field order.
#[must_use]
pub fn field_from_bytes(bytes: &[u8; FIELD_SIZE]) -> Option<FieldElement> {
    Option::from(pallas::Base::from_repr(*bytes))
}

/// Lowercase hex of the canonical encoding, without prefix.
#[must_use]
pub fn field_to_hex(field: FieldElement) -> String {
    hex::encode(field_to_bytes(field))
}

/// Parses a field element from hex (optional `0x` prefix).
///
/// # Errors
/// Returns an error if the input is not 64 hex characters or is not a
/// canonical field encoding.
///
/// # Examples
///
/// ```
/// use anon_greeter::utils::{field_from_hex, field_to_hex};
/// use pasta_curves::pallas;
///
/// let value = pallas::Base::from(7);
/// assert_eq!(field_from_hex(&field_to_hex(value)).unwrap(), value);
/// ```
pub fn field_from_hex(input: &str) -> Result<FieldElement> {
    let stripped = validate_and_strip_hex(input, FIELD_SIZE * 2)?;
    let decoded = hex::decode(stripped)?;
    let mut bytes = [0u8; FIELD_SIZE];
    bytes.copy_from_slice(&decoded);
    field_from_bytes(&bytes)
        .ok_or_else(|| anyhow::anyhow!("Value is not a canonical field element encoding"))
}

/// Domain-separated SHA3-256 of `data`, mapped into the field.
#[must_use]
pub fn hash_to_field(domain: &str, data: &[u8]) -> FieldElement {
    let mut hasher = Sha3_256::new();
    hasher.update((domain.len() as u64).to_be_bytes());
    hasher.update(domain.as_bytes());
    hasher.update(data);
    let digest: [u8; FIELD_SIZE] = hasher.finalize().into();
    bytes_to_field(&digest)
}

/// Poseidon hash of two field elements using `P128Pow5T3`, width 3, rate 2.
///
/// The in-circuit hash in [`crate::circuit`] uses the same instantiation,
/// so values computed here match the ones the circuit constrains.
///
/// # Example
///
/// ```
/// use anon_greeter::utils::poseidon_hash;
/// use pasta_curves::pallas;
///
/// let left = pallas::Base::from(1);
/// let right = pallas::Base::from(2);
/// assert_ne!(poseidon_hash(left, right), poseidon_hash(right, left));
/// ```
#[inline]
#[must_use]
pub fn poseidon_hash(left: FieldElement, right: FieldElement) -> FieldElement {
    let inputs = [left, right];
    poseidon::Hash::<_, PoseidonSpec, ConstantLength<2>, 3, 2>::init().hash(inputs)
}

/// Serde adapter encoding a field element as hex.
pub mod field_hex {
    use super::{field_from_hex, field_to_hex, FieldElement};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &FieldElement, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&field_to_hex(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldElement, D::Error> {
        let s = String::deserialize(deserializer)?;
        field_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for an optional hex-encoded field element.
pub mod field_hex_opt {
    use super::{field_from_hex, field_to_hex, FieldElement};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<FieldElement>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&field_to_hex(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<FieldElement>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| field_from_hex(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
