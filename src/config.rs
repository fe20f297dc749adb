//! Configuration file support for the greeter binaries.
//!
//! Every field has a default, so an empty or partial TOML file is valid.

use crate::group::DEFAULT_ROOT_HISTORY_WINDOW;
use crate::relay::DEFAULT_MAX_PROOF_SIZE;
use crate::utils::{field_from_hex, FieldElement};
use crate::{CIRCUIT_K, DEFAULT_TREE_DEPTH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_COMMITMENTS_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_EXTERNAL_NULLIFIER_LABEL: &str = "greet-v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_tree_depth")]
    pub depth: usize,
    #[serde(default = "default_commitments_file")]
    pub commitments_file: PathBuf,
    #[serde(default = "default_max_commitments_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    #[serde(default = "default_circuit_k")]
    pub circuit_k: u32,
    #[serde(default = "default_max_proof_size")]
    pub max_proof_size: usize,
    #[serde(default = "default_proof_output_file")]
    pub output_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_external_nullifier")]
    pub external_nullifier: String,
    #[serde(default = "default_root_history_window")]
    pub root_history_window: usize,
    /// Append-only nullifier journal. Without one, consumed nullifiers are
    /// forgotten when the process exits.
    #[serde(default)]
    pub nullifier_journal: Option<PathBuf>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            commitments_file: default_commitments_file(),
            max_file_size: DEFAULT_MAX_COMMITMENTS_FILE_SIZE,
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            circuit_k: CIRCUIT_K,
            max_proof_size: DEFAULT_MAX_PROOF_SIZE,
            output_file: default_proof_output_file(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            external_nullifier: DEFAULT_EXTERNAL_NULLIFIER_LABEL.to_string(),
            root_history_window: DEFAULT_ROOT_HISTORY_WINDOW,
            nullifier_journal: None,
        }
    }
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

fn default_commitments_file() -> PathBuf {
    PathBuf::from("identityCommitments.json")
}

fn default_max_commitments_file_size() -> u64 {
    DEFAULT_MAX_COMMITMENTS_FILE_SIZE
}

fn default_circuit_k() -> u32 {
    CIRCUIT_K
}

fn default_max_proof_size() -> usize {
    DEFAULT_MAX_PROOF_SIZE
}

fn default_proof_output_file() -> PathBuf {
    PathBuf::from("greeting.json")
}

fn default_external_nullifier() -> String {
    DEFAULT_EXTERNAL_NULLIFIER_LABEL.to_string()
}

fn default_root_history_window() -> usize {
    DEFAULT_ROOT_HISTORY_WINDOW
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Defaults apply only when `path` does not exist; an unreadable or
    /// malformed file is still an error.
    pub fn load_from_file_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// Reads the published commitment feed: a JSON array of hex field
/// elements, in insertion order.
///
/// # Errors
/// Returns an error if the file is larger than `max_file_size`, is not a
/// JSON string array, or holds a value that is not a canonical field element.
pub fn load_commitments(path: &Path, max_file_size: u64) -> Result<Vec<FieldElement>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read commitments file metadata: {}", path.display()))?;
    if metadata.len() > max_file_size {
        return Err(anyhow::anyhow!(
            "Commitments file too large: {} bytes (max {} bytes)",
            metadata.len(),
            max_file_size
        ));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read commitments file: {}", path.display()))?;
    let entries: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse commitments file: {}", path.display()))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            field_from_hex(entry)
                .with_context(|| format!("Invalid commitment at position {i}: '{entry}'"))
        })
        .collect()
}
