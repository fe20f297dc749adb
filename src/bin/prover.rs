use anon_greeter::{
    client::build_greet_request,
    config::{load_commitments, Config},
    types::external_nullifier,
    utils::field_to_hex,
    wallet::identity_from_private_key,
    Halo2Oracle, MembershipTree,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Prove group membership and build a greeting request", long_about = None)]
struct Args {
    /// TOML config file; defaults apply when absent.
    #[arg(short, long, default_value = "greeter.toml")]
    config: PathBuf,

    /// Commitment feed, overriding `[group].commitments_file`.
    #[arg(short = 'f', long)]
    commitments_file: Option<PathBuf>,

    #[arg(short, long, env = "GREETER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    #[arg(short, long)]
    greeting: String,

    /// Action label, overriding `[relay].external_nullifier`.
    #[arg(short, long)]
    external_nullifier: Option<String>,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load_from_file_or_default(&args.config)?;
    debug!("Using config: {config:?}");

    let commitments_file = args
        .commitments_file
        .unwrap_or_else(|| config.group.commitments_file.clone());
    println!("Loading commitments from: {}", commitments_file.display());
    let commitments = load_commitments(&commitments_file, config.group.max_file_size)?;
    if commitments.is_empty() {
        return Err(anyhow::anyhow!(
            "No commitments found in '{}'",
            commitments_file.display()
        ));
    }
    println!("Loaded {} commitments", commitments.len());

    println!("Deriving identity from wallet...");
    let identity = identity_from_private_key(&args.private_key)?;
    info!("Identity commitment: {}", field_to_hex(identity.commitment()));

    let tree = MembershipTree::from_leaves(config.group.depth, commitments)
        .context("Failed to build membership tree")?;
    println!("Merkle root: {}", field_to_hex(tree.current_root()));

    let label = args
        .external_nullifier
        .unwrap_or_else(|| config.relay.external_nullifier.clone());

    println!("Generating ZK proof (this may take a while)...");
    let oracle = Halo2Oracle::setup(config.proof.circuit_k, config.group.depth)
        .context("Failed to set up proving keys")?;
    let (request, outputs) = build_greet_request(
        &oracle,
        &identity,
        &tree,
        external_nullifier(&label),
        &args.greeting,
    )?;
    println!("ZK proof generated, size: {} bytes", request.proof.bytes.len());

    let output = args
        .output
        .unwrap_or_else(|| config.proof.output_file.clone());
    let json_output =
        serde_json::to_string_pretty(&request).context("Failed to serialize request to JSON")?;
    fs::write(&output, json_output)
        .with_context(|| format!("Failed to write request file: {}", output.display()))?;

    println!("Greeting request saved to: {}", output.display());
    println!("Nullifier hash: {}", field_to_hex(outputs.nullifier_hash));

    Ok(())
}
