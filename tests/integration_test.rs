use anon_greeter::{
    client::build_greet_request,
    types::{external_nullifier, GreetResponse},
    GroupState, Halo2Oracle, Identity, InMemoryLedger, NullifierRegistry, ProofOracle,
    RejectReason, RelayVerifier, CIRCUIT_K,
};
use ethers::signers::{LocalWallet, Signer};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;
use tempfile::TempDir;

const DEPTH: usize = 3;

fn oracle() -> Arc<Halo2Oracle> {
    static ORACLE: OnceLock<Arc<Halo2Oracle>> = OnceLock::new();
    ORACLE
        .get_or_init(|| Arc::new(Halo2Oracle::setup(CIRCUIT_K, DEPTH).expect("Failed to set up keys")))
        .clone()
}

fn members() -> Vec<Identity> {
    (0..4u8)
        .map(|i| Identity::from_seed(format!("c{i}").as_bytes()).unwrap())
        .collect()
}

fn relay_for(
    group: GroupState,
    registry: NullifierRegistry,
    label: &str,
) -> (RelayVerifier, Arc<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new(oracle()));
    let relay = relay_sharing(group, Arc::new(registry), ledger.clone(), label);
    (relay, ledger)
}

fn relay_sharing(
    group: GroupState,
    registry: Arc<NullifierRegistry>,
    ledger: Arc<InMemoryLedger>,
    label: &str,
) -> RelayVerifier {
    RelayVerifier::new(oracle(), group, registry, ledger, external_nullifier(label))
}

#[test]
fn test_greeting_once_per_external_nullifier() {
    let members = members();
    let group =
        GroupState::from_commitments(DEPTH, 30, members.iter().map(Identity::commitment)).unwrap();
    let oracle = oracle();
    assert_eq!(group.tree().index_of(members[2].commitment()), Some(2));
    let merkle_proof = group.prove_membership(2).unwrap();
    assert_eq!(merkle_proof.compute_root(), Some(group.current_root()));

    // one deployment: both labels burn into the same registry and ledger
    let registry = Arc::new(NullifierRegistry::new());
    let ledger = Arc::new(InMemoryLedger::new(oracle.clone()));
    let v1_relay = relay_sharing(group.clone(), registry.clone(), ledger.clone(), "greet-v1");
    let v2_relay = relay_sharing(group.clone(), registry.clone(), ledger.clone(), "greet-v2");

    let (request, _) = build_greet_request(
        oracle.as_ref(),
        &members[2],
        group.tree(),
        external_nullifier("greet-v1"),
        "Hello world",
    )
    .unwrap();

    assert_eq!(v1_relay.handle(&request), GreetResponse::accepted());
    assert_eq!(ledger.greetings(), vec!["Hello world".to_string()]);
    assert_eq!(
        ledger.events()[0].nullifier_hash,
        members[2].nullifier_hash(external_nullifier("greet-v1"))
    );

    let replay = v1_relay.handle(&request);
    assert!(!replay.ok);
    assert_eq!(replay.kind.as_deref(), Some(RejectReason::AlreadyUsed.kind()));
    assert_eq!(registry.len(), 1);

    // the same identity can greet once more under another label
    let (request, _) = build_greet_request(
        oracle.as_ref(),
        &members[2],
        group.tree(),
        external_nullifier("greet-v2"),
        "Hello world",
    )
    .unwrap();
    assert_eq!(v2_relay.handle(&request), GreetResponse::accepted());
    assert_eq!(registry.len(), 2);

    let events = ledger.events();
    assert_eq!(events.len(), 2);
    assert_ne!(events[0].nullifier_hash, events[1].nullifier_hash);

    let replay = v2_relay.handle(&request);
    assert_eq!(replay.kind.as_deref(), Some(RejectReason::AlreadyUsed.kind()));
}

#[test]
fn test_proof_for_other_label_rejected() {
    let members = members();
    let group =
        GroupState::from_commitments(DEPTH, 30, members.iter().map(Identity::commitment)).unwrap();
    let (relay, ledger) = relay_for(group.clone(), NullifierRegistry::new(), "greet-v1");

    let (request, _) = build_greet_request(
        oracle().as_ref(),
        &members[0],
        group.tree(),
        external_nullifier("greet-v2"),
        "Hello world",
    )
    .unwrap();

    let response = relay.handle(&request);
    assert!(!response.ok);
    assert_eq!(response.kind.as_deref(), Some("InvalidProof"));
    assert!(ledger.events().is_empty());
    assert!(relay.registry().is_empty());
}

#[test]
fn test_swapped_greeting_rejected() {
    let members = members();
    let group =
        GroupState::from_commitments(DEPTH, 30, members.iter().map(Identity::commitment)).unwrap();
    let (relay, _) = relay_for(group.clone(), NullifierRegistry::new(), "greet-v1");

    let (mut request, _) = build_greet_request(
        oracle().as_ref(),
        &members[1],
        group.tree(),
        external_nullifier("greet-v1"),
        "Hello world",
    )
    .unwrap();
    request.greeting = "Goodbye world".into();

    let response = relay.handle(&request);
    assert_eq!(response.kind.as_deref(), Some("InvalidProof"));

    // the nullifier was not burned by the failed attempt
    request.greeting = "Hello world".into();
    assert!(relay.handle(&request).ok);
}

#[test]
fn test_stale_root_after_window() {
    let members = members();
    let mut group =
        GroupState::from_commitments(DEPTH, 1, members[..3].iter().map(Identity::commitment))
            .unwrap();
    let (request, _) = build_greet_request(
        oracle().as_ref(),
        &members[0],
        group.tree(),
        external_nullifier("greet-v1"),
        "Hello world",
    )
    .unwrap();
    group.add_member(members[3].commitment()).unwrap();

    let (relay, _) = relay_for(group, NullifierRegistry::new(), "greet-v1");
    let response = relay.handle(&request);
    assert_eq!(response.kind.as_deref(), Some("StaleRoot"));
}

#[test]
fn test_journal_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let journal = temp_dir.path().join("nullifiers.txt");
    let members = members();
    let group =
        GroupState::from_commitments(DEPTH, 30, members.iter().map(Identity::commitment)).unwrap();
    let (request, _) = build_greet_request(
        oracle().as_ref(),
        &members[3],
        group.tree(),
        external_nullifier("greet-v1"),
        "gm",
    )
    .unwrap();

    {
        let registry = NullifierRegistry::open(&journal).unwrap();
        let (relay, _) = relay_for(group.clone(), registry, "greet-v1");
        assert!(relay.handle(&request).ok);
    }

    let registry = NullifierRegistry::open(&journal).unwrap();
    assert_eq!(registry.len(), 1);
    let (relay, ledger) = relay_for(group, registry, "greet-v1");
    let response = relay.handle(&request);
    assert_eq!(response.kind.as_deref(), Some("AlreadyUsed"));
    assert!(ledger.events().is_empty());
}

#[test]
fn test_concurrent_submissions_single_winner() {
    let members = members();
    let group =
        GroupState::from_commitments(DEPTH, 30, members.iter().map(Identity::commitment)).unwrap();
    let (request, _) = build_greet_request(
        oracle().as_ref(),
        &members[1],
        group.tree(),
        external_nullifier("greet-v1"),
        "Hello world",
    )
    .unwrap();
    let (relay, ledger) = relay_for(group, NullifierRegistry::new(), "greet-v1");
    let relay = Arc::new(relay);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let relay = Arc::clone(&relay);
            let request = request.clone();
            thread::spawn(move || relay.handle(&request))
        })
        .collect();
    let responses: Vec<GreetResponse> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(responses.iter().filter(|r| r.ok).count(), 1);
    assert!(responses
        .iter()
        .filter(|r| !r.ok)
        .all(|r| r.kind.as_deref() == Some("AlreadyUsed")));
    assert_eq!(ledger.events().len(), 1);
}

#[test]
fn test_wallet_identity_proves_membership() {
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let private_key = hex::encode(wallet.signer().to_bytes());
    let identity = anon_greeter::wallet::identity_from_private_key(&private_key).unwrap();

    let mut commitments: Vec<_> = members().iter().map(Identity::commitment).collect();
    commitments.push(identity.commitment());
    let group = GroupState::from_commitments(DEPTH, 30, commitments).unwrap();

    let (request, outputs) = build_greet_request(
        oracle().as_ref(),
        &identity,
        group.tree(),
        external_nullifier("greet-v1"),
        "from a wallet",
    )
    .unwrap();
    assert!(oracle().verify(&request.proof, &outputs));

    let (relay, _) = relay_for(group, NullifierRegistry::new(), "greet-v1");
    assert!(relay.handle(&request).ok);
}

#[test]
fn test_end_to_end_binaries() {
    let generate_path = PathBuf::from("./target/release/generate_group");
    let prover_path = PathBuf::from("./target/release/prover");
    let relay_path = PathBuf::from("./target/release/relay");

    if !generate_path.exists() || !prover_path.exists() || !relay_path.exists() {
        eprintln!("Skipping integration test: release binaries not found");
        return;
    }

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let commitments_file = temp_dir.path().join("identityCommitments.json");
    let keys_file = temp_dir.path().join("keys.txt");
    let request_file = temp_dir.path().join("greeting.json");
    let config_file = temp_dir.path().join("greeter.toml");

    fs::write(
        &config_file,
        format!(
            "[group]\ndepth = {DEPTH}\ncommitments_file = {:?}\n\n[relay]\nnullifier_journal = {:?}\n",
            commitments_file,
            temp_dir.path().join("nullifiers.txt")
        ),
    )
    .expect("Failed to write config");

    let generate_output = std::process::Command::new(&generate_path)
        .args(["--count", "4", "--seed", "integration"])
        .arg("--output")
        .arg(&commitments_file)
        .arg("--keys-file")
        .arg(&keys_file)
        .output()
        .expect("Failed to execute generate_group");
    assert!(
        generate_output.status.success(),
        "generate_group failed: {}",
        String::from_utf8_lossy(&generate_output.stderr)
    );

    let keys = fs::read_to_string(&keys_file).expect("Failed to read keys file");
    let private_key = keys
        .lines()
        .nth(2)
        .and_then(|line| line.split('|').nth(1))
        .expect("Keys file should hold address|key lines")
        .to_string();

    let prover_output = std::process::Command::new(&prover_path)
        .arg("--config")
        .arg(&config_file)
        .args(["--greeting", "Hello world"])
        .arg("--output")
        .arg(&request_file)
        .env("GREETER_PRIVATE_KEY", &private_key)
        .output()
        .expect("Failed to execute prover");
    assert!(
        prover_output.status.success(),
        "Prover failed: {}",
        String::from_utf8_lossy(&prover_output.stderr)
    );

    let run_relay = || {
        std::process::Command::new(&relay_path)
            .arg("--config")
            .arg(&config_file)
            .arg("--request")
            .arg(&request_file)
            .output()
            .expect("Failed to execute relay")
    };

    let first = run_relay();
    assert!(
        first.status.success(),
        "Relay failed: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    assert!(String::from_utf8_lossy(&first.stdout).contains("NewGreeting #0: Hello world"));

    let replay = run_relay();
    assert!(!replay.status.success(), "Replay should be rejected");
    assert!(String::from_utf8_lossy(&replay.stdout).contains("AlreadyUsed"));
}
