//! Registry of consumed nullifiers.
//!
//! Keys are `(external nullifier, nullifier hash)` pairs. A key moves from
//! free to reserved to consumed; only a reservation that is never committed
//! returns to free. Consumed keys are never removed.
//!
//! With a journal path the registry appends one `external:nullifier` hex
//! pair per line and replays the file on open.

use crate::error::RegistryError;
use crate::utils::{field_from_hex, field_to_bytes, field_to_hex, FieldElement, FIELD_SIZE};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NullifierKey {
    external_nullifier: [u8; FIELD_SIZE],
    nullifier_hash: [u8; FIELD_SIZE],
}

impl NullifierKey {
    #[must_use]
    pub fn new(external_nullifier: FieldElement, nullifier_hash: FieldElement) -> Self {
        Self {
            external_nullifier: field_to_bytes(external_nullifier),
            nullifier_hash: field_to_bytes(nullifier_hash),
        }
    }

    fn journal_line(&self) -> String {
        format!(
            "{}:{}",
            hex::encode(self.external_nullifier),
            hex::encode(self.nullifier_hash)
        )
    }

    fn parse_journal_line(line: &str) -> Result<Self> {
        let (ext, nullifier) = line
            .trim()
            .split_once(':')
            .context("Expected '<external nullifier>:<nullifier hash>'")?;
        let ext = field_from_hex(ext).context("Invalid external nullifier")?;
        let nullifier = field_from_hex(nullifier).context("Invalid nullifier hash")?;
        Ok(Self::new(ext, nullifier))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Reserved,
    Consumed,
}

#[derive(Debug, Default)]
pub struct NullifierRegistry {
    slots: Mutex<HashMap<NullifierKey, SlotState>>,
    /// Held for the whole append so concurrent commits never interleave.
    journal: Option<Mutex<PathBuf>>,
}

impl NullifierRegistry {
    /// In-memory registry, empty at genesis.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry backed by an append-only journal file. Existing entries are
    /// replayed; the file is created if missing.
    ///
    /// # Errors
    /// Fails if the journal cannot be read or contains a malformed line.
    pub fn open(journal: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(journal)
            .with_context(|| format!("Failed to open nullifier journal: {}", journal.display()))?;

        let mut slots = HashMap::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read line from nullifier journal")?;
            if line.trim().is_empty() {
                continue;
            }
            let key = NullifierKey::parse_journal_line(&line)
                .with_context(|| format!("Malformed nullifier journal entry at line {}", i + 1))?;
            slots.insert(key, SlotState::Consumed);
        }
        info!(
            "Loaded {} consumed nullifiers from {}",
            slots.len(),
            journal.display()
        );

        Ok(Self {
            slots: Mutex::new(slots),
            journal: Some(Mutex::new(journal.to_path_buf())),
        })
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<NullifierKey, SlotState>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the key for the caller. Concurrent callers for the same key
    /// see [`RegistryError::AlreadyUsed`] until the reservation is dropped
    /// without being committed.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyUsed`] if the key is consumed or reserved.
    pub fn reserve(
        &self,
        nullifier_hash: FieldElement,
        external_nullifier: FieldElement,
    ) -> Result<Reservation<'_>, RegistryError> {
        let key = NullifierKey::new(external_nullifier, nullifier_hash);
        match self.slots().entry(key) {
            Entry::Occupied(_) => {
                debug!("Nullifier {} already used", field_to_hex(nullifier_hash));
                Err(RegistryError::AlreadyUsed)
            }
            Entry::Vacant(slot) => {
                slot.insert(SlotState::Reserved);
                Ok(Reservation {
                    registry: self,
                    key,
                    committed: false,
                })
            }
        }
    }

    /// Atomic check-then-insert.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyUsed`] on replay, [`RegistryError::Journal`]
    /// if the journal write fails (the key is then left free).
    pub fn check_and_consume(
        &self,
        nullifier_hash: FieldElement,
        external_nullifier: FieldElement,
    ) -> Result<(), RegistryError> {
        self.reserve(nullifier_hash, external_nullifier)?.commit()
    }

    /// True if the key is consumed or reserved.
    #[must_use]
    pub fn contains(&self, nullifier_hash: FieldElement, external_nullifier: FieldElement) -> bool {
        self.slots()
            .contains_key(&NullifierKey::new(external_nullifier, nullifier_hash))
    }

    /// Number of consumed nullifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|state| **state == SlotState::Consumed)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append_to_journal(&self, key: &NullifierKey) -> std::io::Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let path = journal.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&*path)?;
        let line = format!("{}\n", key.journal_line());
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }
}

/// A claimed nullifier. Dropping it without [`Reservation::commit`] frees
/// the key again.
#[derive(Debug)]
#[must_use = "a reservation is released when dropped"]
pub struct Reservation<'a> {
    registry: &'a NullifierRegistry,
    key: NullifierKey,
    committed: bool,
}

impl Reservation<'_> {
    /// Burns the nullifier permanently.
    ///
    /// # Errors
    /// Returns [`RegistryError::Journal`] if the journal append fails; the
    /// reservation is then released.
    pub fn commit(mut self) -> Result<(), RegistryError> {
        self.registry
            .append_to_journal(&self.key)
            .map_err(|e| RegistryError::Journal(e.to_string()))?;
        self.registry.slots().insert(self.key, SlotState::Consumed);
        self.committed = true;
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.registry.slots();
        if slots.get(&self.key) == Some(&SlotState::Reserved) {
            slots.remove(&self.key);
            warn!("Released uncommitted nullifier reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_curves::pallas;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn f(v: u64) -> FieldElement {
        pallas::Base::from(v)
    }

    #[test]
    fn test_consume_once() {
        let registry = NullifierRegistry::new();
        assert!(registry.check_and_consume(f(1), f(100)).is_ok());
        assert_eq!(
            registry.check_and_consume(f(1), f(100)),
            Err(RegistryError::AlreadyUsed)
        );
        assert_eq!(
            registry.check_and_consume(f(1), f(100)),
            Err(RegistryError::AlreadyUsed)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_external_nullifier_partitions_keys() {
        let registry = NullifierRegistry::new();
        assert!(registry.check_and_consume(f(1), f(100)).is_ok());
        assert!(registry.check_and_consume(f(1), f(200)).is_ok());
        assert!(registry.check_and_consume(f(2), f(100)).is_ok());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reservation_blocks_then_releases() {
        let registry = NullifierRegistry::new();
        let reservation = registry.reserve(f(1), f(100)).unwrap();
        assert!(registry.contains(f(1), f(100)));
        assert!(matches!(
            registry.reserve(f(1), f(100)),
            Err(RegistryError::AlreadyUsed)
        ));
        drop(reservation);
        assert!(!registry.contains(f(1), f(100)));
        assert!(registry.is_empty());
        assert!(registry.check_and_consume(f(1), f(100)).is_ok());
    }

    #[test]
    fn test_concurrent_consumers_single_winner() {
        let registry = Arc::new(NullifierRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.check_and_consume(f(7), f(100)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_journal_replay() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("greeter.nullifiers.txt");

        {
            let registry = NullifierRegistry::open(&journal).unwrap();
            registry.check_and_consume(f(1), f(100)).unwrap();
            registry.check_and_consume(f(2), f(100)).unwrap();
            let dropped = registry.reserve(f(3), f(100)).unwrap();
            drop(dropped);
        }

        let reopened = NullifierRegistry::open(&journal).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.check_and_consume(f(1), f(100)),
            Err(RegistryError::AlreadyUsed)
        );
        assert!(reopened.check_and_consume(f(3), f(100)).is_ok());
    }

    #[test]
    fn test_concurrent_commits_keep_journal_readable() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("greeter.nullifiers.txt");
        let registry = Arc::new(NullifierRegistry::open(&journal).unwrap());

        let handles: Vec<_> = (0..16u64)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..40u64 {
                        registry.check_and_consume(f(t * 1000 + i), f(100)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 640);

        let content = fs::read_to_string(&journal).unwrap();
        assert_eq!(content.lines().count(), 640);
        assert!(content.lines().all(|line| line.len() == 129));

        let reopened = NullifierRegistry::open(&journal).unwrap();
        assert_eq!(reopened.len(), 640);
        assert_eq!(
            reopened.check_and_consume(f(15_039), f(100)),
            Err(RegistryError::AlreadyUsed)
        );
    }

    #[test]
    fn test_malformed_journal_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("bad.txt");
        fs::write(&journal, "not-a-nullifier\n").unwrap();
        let err = NullifierRegistry::open(&journal).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_journal_write_failure_leaves_key_free() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("journal.txt");
        let registry = NullifierRegistry::open(&journal).unwrap();
        fs::remove_file(&journal).unwrap();
        fs::create_dir(&journal).unwrap();

        assert!(matches!(
            registry.check_and_consume(f(1), f(100)),
            Err(RegistryError::Journal(_))
        ));
        assert!(!registry.contains(f(1), f(100)));
    }
}
