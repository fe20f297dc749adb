use anon_greeter::{
    utils::field_to_hex,
    wallet::{identity_from_private_key, PRIVATE_KEY_HEX_LENGTH},
};
use anyhow::{Context, Result};
use clap::Parser;
use ethers::signers::{LocalWallet, Signer};
use log::info;
use sha3::{Digest, Sha3_256};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate test wallets and their identity commitments", long_about = None)]
struct Args {
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Seed for deterministic wallets; omit for random ones.
    #[arg(short, long)]
    seed: Option<String>,

    #[arg(short, long, default_value = "identityCommitments.json")]
    output: PathBuf,

    #[arg(short, long, default_value = "test_keys.txt")]
    keys_file: PathBuf,
}

fn deterministic_wallet(seed: &str, index: usize) -> Result<LocalWallet> {
    let mut counter = 0u32;
    loop {
        let mut hasher = Sha3_256::new();
        hasher.update(seed.as_bytes());
        hasher.update((index as u64).to_be_bytes());
        hasher.update(counter.to_be_bytes());
        // retry the rare digest that is not a valid secp256k1 scalar
        match LocalWallet::from_bytes(&hasher.finalize()) {
            Ok(wallet) => return Ok(wallet),
            Err(_) if counter < 8 => counter += 1,
            Err(e) => return Err(e).context("Failed to derive wallet"),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Generating {} wallets...", args.count);
    let wallets = (0..args.count)
        .map(|i| match &args.seed {
            Some(seed) => deterministic_wallet(seed, i),
            None => Ok(LocalWallet::new(&mut rand::thread_rng())),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut keys = Vec::with_capacity(wallets.len());
    let mut commitments = Vec::with_capacity(wallets.len());
    for wallet in &wallets {
        let key = hex::encode(wallet.signer().to_bytes());
        debug_assert_eq!(key.len(), PRIVATE_KEY_HEX_LENGTH);
        let identity = identity_from_private_key(&key)?;
        commitments.push(field_to_hex(identity.commitment()));
        keys.push(key);
    }

    let unique: HashSet<_> = commitments.iter().collect();
    if unique.len() != commitments.len() {
        return Err(anyhow::anyhow!("Generated duplicate identity commitments"));
    }

    let json = serde_json::to_string_pretty(&commitments)
        .context("Failed to serialize commitments")?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let mut file = File::create(&args.keys_file)
        .with_context(|| format!("Failed to create {}", args.keys_file.display()))?;
    for (wallet, key) in wallets.iter().zip(&keys) {
        writeln!(file, "{:?}|{}", wallet.address(), key)?;
    }
    info!(
        "Wrote {} commitments to {} and keys to {}",
        commitments.len(),
        args.output.display(),
        args.keys_file.display()
    );

    println!("First 5 commitments:");
    for (i, commitment) in commitments.iter().take(5).enumerate() {
        println!("  {}: {}", i, commitment);
    }

    Ok(())
}
