//! Anonymous group greetings.
//!
//! Members register an identity commitment in a public group. A member can
//! later post a greeting proving, in zero knowledge, that they belong to the
//! group, without revealing which member they are. A nullifier bound to the
//! action label makes each member's greeting single-use per label.
//!
//! # Components
//!
//! - [`Identity`]: secret identity and its public commitment
//! - [`MembershipTree`]: fixed-depth incremental Merkle tree of commitments
//! - [`GroupState`]: the tree plus the window of accepted roots
//! - [`ProofOracle`]: prove/verify seam, implemented by [`Halo2Oracle`]
//! - [`NullifierRegistry`]: atomic single-use check for nullifiers
//! - [`RelayVerifier`]: verifies submissions and forwards them to a
//!   [`SignalLedger`]
//!
//! # Example
//!
//! ```no_run
//! use anon_greeter::{
//!     client::build_greet_request, types::external_nullifier, GroupState, Halo2Oracle,
//!     Identity, InMemoryLedger, NullifierRegistry, RelayVerifier, CIRCUIT_K,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let alice = Identity::from_seed(b"alice's wallet signature")?;
//! let group = GroupState::from_commitments(3, 30, [alice.commitment()])?;
//! let oracle = Arc::new(Halo2Oracle::setup(CIRCUIT_K, 3)?);
//! let ext = external_nullifier("greet-v1");
//!
//! let (request, _) = build_greet_request(oracle.as_ref(), &alice, group.tree(), ext, "Hello world")?;
//! let ledger = Arc::new(InMemoryLedger::new(oracle.clone()));
//! let registry = Arc::new(NullifierRegistry::new());
//! let relay = RelayVerifier::new(oracle, group, registry, ledger, ext);
//! assert!(relay.handle(&request).ok);
//! # Ok(())
//! # }
//! ```

pub mod circuit;
pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod identity;
pub mod ledger;
pub mod merkle;
pub mod nullifier;
pub mod oracle;
pub mod relay;
pub mod types;
pub mod utils;
pub mod wallet;


pub use circuit::GreeterCircuit;
pub use error::{
    IdentityError, LedgerError, ProvingError, RegistryError, RejectReason, TreeError,
};
pub use group::{GroupState, RootHistory};
pub use identity::{Identity, IdentityCommitment};
pub use ledger::{InMemoryLedger, SignalLedger};
pub use merkle::{MembershipTree, MerkleProof};
pub use nullifier::NullifierRegistry;
pub use oracle::{Halo2Oracle, ProofOracle};
pub use relay::RelayVerifier;
pub use types::{GreetRequest, GreetResponse, Proof, PublicOutputs};
pub use utils::{bytes_to_field, field_to_bytes, poseidon_hash, FieldElement};

/// Circuit parameter for Halo2 proving system.
///
/// The value `k=12` creates a circuit with 2^k = 4096 rows. Each Poseidon
/// hash takes a few dozen rows and the circuit hashes `depth + 2` times, so
/// this fits trees up to depth 32.
///
/// Changing `CIRCUIT_K` requires regenerating all proving and verifying keys.
/// Prover and verifier must use the same value, or verification will fail.
pub const CIRCUIT_K: u32 = 12;

/// Depth of the group tree: up to 2^20 members.
pub const DEFAULT_TREE_DEPTH: usize = 20;
