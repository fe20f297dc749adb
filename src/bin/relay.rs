use anon_greeter::{
    config::{load_commitments, Config},
    types::{external_nullifier, GreetRequest},
    utils::field_to_hex,
    GroupState, Halo2Oracle, InMemoryLedger, NullifierRegistry, RelayVerifier,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Default maximum allowed size for the request JSON file (1MB)
/// Can be overridden via `GREETER_MAX_PROOF_FILE_SIZE` environment variable
const DEFAULT_MAX_PROOF_FILE_SIZE: u64 = 1024 * 1024;

fn get_max_proof_file_size() -> u64 {
    std::env::var("GREETER_MAX_PROOF_FILE_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_PROOF_FILE_SIZE)
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Verify a greeting request and record it", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "greeter.toml")]
    config: PathBuf,

    /// Greeting request written by the prover.
    #[arg(short, long)]
    request: PathBuf,

    /// Nullifier journal, overriding `[relay].nullifier_journal`.
    #[arg(short, long)]
    journal: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load_from_file_or_default(&args.config)?;
    debug!("Using config: {config:?}");

    let metadata = fs::metadata(&args.request).with_context(|| {
        format!("Failed to read request file metadata: {}", args.request.display())
    })?;
    let max_proof_file_size = get_max_proof_file_size();
    if metadata.len() > max_proof_file_size {
        return Err(anyhow::anyhow!(
            "Request file too large: {} bytes (max {} bytes). Set GREETER_MAX_PROOF_FILE_SIZE to raise the limit",
            metadata.len(),
            max_proof_file_size
        ));
    }
    let content = fs::read_to_string(&args.request).context("Failed to read request file")?;
    let request: GreetRequest =
        serde_json::from_str(&content).context("Failed to parse request JSON")?;
    info!("Loaded greeting request: {:?}", request.greeting);

    let commitments = load_commitments(&config.group.commitments_file, config.group.max_file_size)?;
    let group = GroupState::from_commitments(
        config.group.depth,
        config.relay.root_history_window,
        commitments,
    )
    .context("Failed to build group")?;

    let registry = match args.journal.or_else(|| config.relay.nullifier_journal.clone()) {
        Some(path) => NullifierRegistry::open(&path)?,
        None => NullifierRegistry::new(),
    };
    let registry = Arc::new(registry);
    info!("Nullifier registry holds {} burned keys", registry.len());

    println!("Generating ZK-SNARK keys...");
    let oracle = Arc::new(
        Halo2Oracle::setup(config.proof.circuit_k, config.group.depth)
            .context("Failed to set up verifying keys")?,
    );
    let ledger = Arc::new(InMemoryLedger::new(oracle.clone()));
    let ext = external_nullifier(&config.relay.external_nullifier);
    info!(
        "Relay for '{}' ({}), k={} depth={}, root {} (window {})",
        config.relay.external_nullifier,
        field_to_hex(ext),
        oracle.k(),
        oracle.depth(),
        field_to_hex(group.current_root()),
        group.history().window()
    );
    for root in group.history().iter() {
        debug!("Accepting root {}", field_to_hex(*root));
    }

    let relay = RelayVerifier::new(oracle, group, registry, ledger.clone(), ext)
        .with_max_proof_size(config.proof.max_proof_size);
    let response = relay.handle(&request);
    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to serialize response")?
    );

    if response.ok {
        if let Some(event) = ledger.events().last() {
            println!(
                "NewGreeting #{}: {}",
                event.sequence,
                event.message().unwrap_or_default()
            );
        }
        Ok(())
    } else {
        let reason = response.reason.unwrap_or_default();
        error!("Greeting rejected: {reason}");
        Err(anyhow::anyhow!("Greeting rejected: {reason}"))
    }
}
