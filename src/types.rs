//! Values that cross the prover/relay/ledger boundaries.

use crate::utils::{field_hex, field_hex_opt, hash_to_field, FieldElement};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Longest signal the ledger can store (one `bytes32` word with a
/// terminating zero byte).
pub const MAX_SIGNAL_LEN: usize = 31;

const SIGNAL_DOMAIN: &str = "signal";
const EXTERNAL_NULLIFIER_DOMAIN: &str = "external-nullifier";

/// Hash a signal is bound to inside the proof.
#[must_use]
pub fn signal_hash(signal: &[u8]) -> FieldElement {
    hash_to_field(SIGNAL_DOMAIN, signal)
}

/// External nullifier for an action label such as `"greet-v1"`.
///
/// # Examples
///
/// ```
/// use anon_greeter::types::external_nullifier;
///
/// assert_ne!(external_nullifier("greet-v1"), external_nullifier("greet-v2"));
/// ```
#[must_use]
pub fn external_nullifier(label: &str) -> FieldElement {
    hash_to_field(EXTERNAL_NULLIFIER_DOMAIN, label.as_bytes())
}

/// Encodes text as a zero-padded 32-byte word.
///
/// # Errors
/// Returns an error if the text is longer than [`MAX_SIGNAL_LEN`] bytes.
pub fn format_bytes32(text: &str) -> Result<[u8; 32]> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_SIGNAL_LEN {
        return Err(anyhow::anyhow!(
            "Text is {} bytes, maximum is {}",
            bytes.len(),
            MAX_SIGNAL_LEN
        ));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(word)
}

/// Decodes a word written by [`format_bytes32`].
///
/// # Errors
/// Returns an error if the word has no terminating zero byte or is not UTF-8.
pub fn parse_bytes32(word: &[u8; 32]) -> Result<String> {
    let end = word
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid bytes32 string: no null terminator"))?;
    Ok(std::str::from_utf8(&word[..end])?.to_string())
}

/// Public values a proof attests to. In-circuit order is
/// `[root, nullifier_hash, signal_hash, external_nullifier]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOutputs {
    #[serde(with = "field_hex")]
    pub root: FieldElement,
    #[serde(with = "field_hex")]
    pub nullifier_hash: FieldElement,
    #[serde(with = "field_hex")]
    pub signal_hash: FieldElement,
    #[serde(with = "field_hex")]
    pub external_nullifier: FieldElement,
}

impl PublicOutputs {
    #[must_use]
    pub fn to_instance(&self) -> Vec<FieldElement> {
        vec![
            self.root,
            self.nullifier_hash,
            self.signal_hash,
            self.external_nullifier,
        ]
    }
}

/// Opaque proof plus the id of the setup artifacts it was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(with = "hex")]
    pub artifact: [u8; 32],
    #[serde(with = "hex")]
    pub bytes: Vec<u8>,
}

/// Body posted by the client to the relay.
///
/// The external nullifier is fixed by the deployment and the signal hash
/// is recomputed from `greeting`, so neither travels on the wire. A missing
/// `merkle_root` means "the current root".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetRequest {
    pub greeting: String,
    #[serde(with = "field_hex")]
    pub nullifier_hash: FieldElement,
    #[serde(default, with = "field_hex_opt", skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<FieldElement>,
    pub proof: Proof,
}

/// Relay answer: success with no payload, or a short reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GreetResponse {
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            ok: true,
            kind: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn rejected(kind: &str, reason: String) -> Self {
        Self {
            ok: false,
            kind: Some(kind.to_string()),
            reason: Some(reason),
        }
    }
}
