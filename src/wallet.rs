//! Wallet-derived identity seeds.
//!
//! A member's identity seed is their Ethereum signature over a fixed
//! message. ECDSA signing here is deterministic, so the same key always
//! yields the same identity and the key alone is enough to recover it.

use crate::identity::Identity;
use crate::utils::validate_and_strip_hex;
use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use ethers::utils::hash_message;

/// Message signed to derive an identity.
pub const IDENTITY_MESSAGE: &str = "Sign this message to create your identity!";

/// Expected length of an Ethereum private key in hex characters (excluding 0x prefix)
/// Ethereum private keys are 32 bytes = 64 hex characters
pub const PRIVATE_KEY_HEX_LENGTH: usize = 64;

/// Validates an Ethereum private key.
///
/// # Errors
///
/// Returns an error if:
/// - The private key is not exactly 64 hex characters (excluding 0x prefix)
/// - The private key contains non-hex characters
/// - The private key is all zeros
///
/// # Examples
///
/// ```
/// use anon_greeter::wallet::validate_private_key;
///
/// // Valid private key (not a real key)
/// assert!(validate_private_key("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318").is_ok());
///
/// // All zeros is invalid
/// assert!(validate_private_key("0x0000000000000000000000000000000000000000000000000000000000000000").is_err());
/// ```
pub fn validate_private_key(private_key: &str) -> Result<()> {
    strip_private_key(private_key).map(drop)
}

/// Returns the bare 64-character key once it passed validation.
fn strip_private_key(private_key: &str) -> Result<String> {
    let stripped = validate_and_strip_hex(private_key, PRIVATE_KEY_HEX_LENGTH)?;

    if stripped.chars().all(|c| c == '0') {
        return Err(anyhow::anyhow!(
            "Private key cannot be all zeros. Please provide a valid private key."
        ));
    }

    Ok(stripped)
}

/// Validates and parses a private key into a wallet.
///
/// # Errors
/// Returns an error if the key is malformed or not a valid secp256k1 scalar.
pub fn parse_wallet(private_key: &str) -> Result<LocalWallet> {
    strip_private_key(private_key)?
        .parse::<LocalWallet>()
        .context("Failed to parse private key")
}

/// Signature over [`IDENTITY_MESSAGE`], used as identity seed.
///
/// # Errors
/// Returns an error if signing fails.
pub fn identity_seed(wallet: &LocalWallet) -> Result<Vec<u8>> {
    let signature = wallet
        .sign_hash(hash_message(IDENTITY_MESSAGE))
        .context("Failed to sign identity message")?;
    Ok(signature.to_vec())
}

/// Identity owned by the holder of `private_key`.
///
/// # Errors
/// Returns an error if the key is invalid.
pub fn identity_from_private_key(private_key: &str) -> Result<Identity> {
    let wallet = parse_wallet(private_key)?;
    let seed = identity_seed(&wallet)?;
    Ok(Identity::from_seed(&seed)?)
}
