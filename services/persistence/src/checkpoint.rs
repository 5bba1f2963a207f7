//! State checkpoints
//!
//! A checkpoint captures everything needed to resume without replaying
//! the full journal: instruments, ledger balances, orders, trades, and
//! the per-instrument trade sequences, all anchored to the last journal
//! sequence it covers. Stored as zstd-compressed bincode with a CRC32C
//! over the compressed bytes.
//!
//! # File format
//! ```text
//! [magic: u32 = 0x43504B31 "CPK1"]
//! [checksum: u32]   // CRC32C of the compressed payload
//! [payload: zstd(bincode(CheckpointState))]
//! ```

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use ledger::BalanceView;
use types::ids::InstrumentId;
use types::instrument::Instrument;
use types::order::Order;
use types::trade::Trade;

const MAGIC: u32 = 0x4350_4B31;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt checkpoint {path}: {detail}")]
    Corrupt { path: String, detail: String },
}

/// The full recoverable state at one journal sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Last journal sequence covered by this checkpoint
    pub last_sequence: u64,
    pub taken_at: i64,
    pub instruments: Vec<Instrument>,
    pub balances: Vec<BalanceView>,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    /// Next trade sequence per instrument
    pub trade_sequences: Vec<(InstrumentId, u64)>,
}

/// Writes and loads checkpoints in a directory
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a checkpoint; returns the file path
    pub fn write(&self, state: &CheckpointState) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir)?;

        let raw =
            bincode::serialize(state).map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let compressed =
            zstd::encode_all(raw.as_slice(), 0).map_err(CheckpointError::Io)?;
        let checksum = crc32c(&compressed);

        let path = self.path_for(state.last_sequence);
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&MAGIC.to_le_bytes())?;
            file.write_all(&checksum.to_le_bytes())?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        info!(path = %path.display(), sequence = state.last_sequence, "checkpoint written");
        Ok(path)
    }

    /// Load the newest intact checkpoint, if any
    ///
    /// A corrupt newest file is skipped with a warning and the next
    /// newest is tried.
    pub fn load_latest(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let mut candidates = self.checkpoint_files()?;
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in candidates {
            match Self::load(&path) {
                Ok(state) => return Ok(Some(state)),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable checkpoint");
                }
            }
        }
        Ok(None)
    }

    fn load(path: &Path) -> Result<CheckpointState, CheckpointError> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        if data.len() < 8 {
            return Err(CheckpointError::Corrupt {
                path: path.display().to_string(),
                detail: "file too small".into(),
            });
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(CheckpointError::Corrupt {
                path: path.display().to_string(),
                detail: "bad magic".into(),
            });
        }
        let stored_checksum = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let compressed = &data[8..];
        if crc32c(compressed) != stored_checksum {
            return Err(CheckpointError::Corrupt {
                path: path.display().to_string(),
                detail: "checksum mismatch".into(),
            });
        }

        let raw = zstd::decode_all(compressed).map_err(CheckpointError::Io)?;
        bincode::deserialize(&raw).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn path_for(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("checkpoint-{:012}.bin", sequence))
    }

    fn checkpoint_files(&self) -> Result<Vec<(u64, PathBuf)>, CheckpointError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                let seq = name
                    .strip_prefix("checkpoint-")?
                    .strip_suffix(".bin")?
                    .parse::<u64>()
                    .ok()?;
                Some((seq, e.path()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::numeric::{Price, Quantity};

    fn sample_state(sequence: u64) -> CheckpointState {
        CheckpointState {
            last_sequence: sequence,
            taken_at: 1_708_123_456_789_000_000,
            instruments: vec![Instrument::new(
                InstrumentId::new("PROP-0042"),
                Quantity::from_u64(10_000),
                Price::from_str("0.01").unwrap(),
                Quantity::from_u64(1),
                0,
            )],
            balances: Vec::new(),
            orders: Vec::new(),
            trades: Vec::new(),
            trade_sequences: vec![(InstrumentId::new("PROP-0042"), 17)],
        }
    }

    #[test]
    fn test_write_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        let state = sample_state(100);
        store.write(&state).unwrap();

        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_latest_wins() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.write(&sample_state(100)).unwrap();
        store.write(&sample_state(250)).unwrap();

        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded.last_sequence, 250);
    }

    #[test]
    fn test_empty_dir_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_newest_falls_back() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.write(&sample_state(100)).unwrap();
        let newer = store.write(&sample_state(200)).unwrap();

        // Corrupt the newer file's payload
        let mut data = fs::read(&newer).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&newer, data).unwrap();

        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded.last_sequence, 100);
    }
}
