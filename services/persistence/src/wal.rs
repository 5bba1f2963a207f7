//! Write-ahead log: append-only event journal with checksums
//!
//! # Binary format (per frame)
//! ```text
//! [body_len:  u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [kind_len: u16][kind: bytes]
//! [payload_len: u32][payload: bincode bytes]
//! [checksum: u32]  // CRC32C over sequence+timestamp+kind+payload
//! ```
//!
//! Sequences are gapless and monotonic; an append with the wrong
//! sequence is rejected. The reader verifies every checksum and stops
//! at the first torn or corrupt frame, which is how a crash tail is
//! discarded.

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::events::ExchangeEvent;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },

    #[error("Corrupt frame at sequence {sequence}: {detail}")]
    CorruptFrame { sequence: u64, detail: String },
}

// ── Frame ───────────────────────────────────────────────────────────

/// One persisted event frame
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Global monotonic sequence number
    pub sequence: u64,
    /// Unix nanosecond timestamp of the event
    pub timestamp: i64,
    /// Event-kind tag (for diagnostics and filtering)
    pub kind: String,
    /// Bincode-serialized `ExchangeEvent`
    pub payload: Vec<u8>,
    /// CRC32C over (sequence ++ timestamp ++ kind ++ payload)
    pub checksum: u32,
}

impl WalEntry {
    /// Build a frame for an event, computing the checksum
    pub fn for_event(
        sequence: u64,
        timestamp: i64,
        event: &ExchangeEvent,
    ) -> Result<Self, WalError> {
        let payload =
            bincode::serialize(event).map_err(|e| WalError::Serialization(e.to_string()))?;
        let kind = event.kind().to_string();
        let checksum = Self::compute_checksum(sequence, timestamp, &kind, &payload);
        Ok(Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        })
    }

    /// Decode the payload back into an event
    pub fn event(&self) -> Result<ExchangeEvent, WalError> {
        bincode::deserialize(&self.payload).map_err(|e| WalError::Serialization(e.to_string()))
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(8 + 8 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    /// Serialize to the binary wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let kind_bytes = self.kind.as_bytes();
        let kind_len = kind_bytes.len() as u16;
        let payload_len = self.payload.len() as u32;

        let body_len: u32 = 8 + 8 + 2 + (kind_len as u32) + 4 + payload_len + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&kind_len.to_le_bytes());
        buf.extend_from_slice(kind_bytes);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize one frame, returning `(entry, bytes_consumed)`
    ///
    /// Corrupt data yields an error rather than a panic.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), WalError> {
        const MIN_BODY: usize = 8 + 8 + 2 + 4 + 4;

        if data.len() < 4 {
            return Err(WalError::Serialization(
                "not enough data for length prefix".into(),
            ));
        }
        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if body_len > 100_000_000 {
            return Err(WalError::Serialization(format!(
                "implausible body length {}",
                body_len
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Err(WalError::Serialization(format!(
                "incomplete frame: need {} bytes, have {}",
                total,
                data.len()
            )));
        }
        if body_len < MIN_BODY {
            return Err(WalError::Serialization(format!(
                "body too small: {} bytes",
                body_len
            )));
        }

        let body = &data[4..total];
        let mut pos = 0usize;

        let sequence = u64::from_le_bytes(body[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let timestamp = i64::from_le_bytes(body[pos..pos + 8].try_into().unwrap());
        pos += 8;

        let kind_len = u16::from_le_bytes(body[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;
        if pos + kind_len > body.len() {
            return Err(WalError::Serialization("kind overruns frame".into()));
        }
        let kind = String::from_utf8(body[pos..pos + kind_len].to_vec())
            .map_err(|e| WalError::Serialization(e.to_string()))?;
        pos += kind_len;

        if pos + 4 > body.len() {
            return Err(WalError::Serialization("missing payload length".into()));
        }
        let payload_len = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + payload_len + 4 > body.len() {
            return Err(WalError::Serialization("payload overruns frame".into()));
        }
        let payload = body[pos..pos + payload_len].to_vec();
        pos += payload_len;

        let checksum = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap());

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

// ── Policies & configuration ────────────────────────────────────────

/// Controls when buffered data is flushed to the OS
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` is called
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    OnRotation,
}

/// Journal writer configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub dir: PathBuf,
    /// Maximum file size before rotation (default 64 MiB)
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl WalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Writer ──────────────────────────────────────────────────────────

/// Append-only journal writer with rotation and durability policies
pub struct WalWriter {
    config: WalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
}

impl WalWriter {
    /// Open the journal directory, appending to the newest file
    pub fn open(config: WalConfig) -> Result<Self, WalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = latest_file_index(&config.dir);
        let current_file = wal_path(&config.dir, file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence: 1,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
        })
    }

    /// Set the next expected sequence number (after recovery)
    pub fn set_next_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Frame an event and append it, assigning the next sequence
    pub fn append_event(
        &mut self,
        timestamp: i64,
        event: &ExchangeEvent,
    ) -> Result<WalEntry, WalError> {
        let entry = WalEntry::for_event(self.next_sequence, timestamp, event)?;
        self.append(&entry)?;
        Ok(entry)
    }

    /// Append a pre-built frame; validates sequence monotonicity
    pub fn append(&mut self, entry: &WalEntry) -> Result<(), WalError> {
        if entry.sequence != self.next_sequence {
            return Err(WalError::Sequence {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes();
        self.writer.write_all(&bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.next_sequence = entry.sequence + 1;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()?;
        Ok(())
    }

    /// Force flush + fsync (shutdown, checkpoint boundary)
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), WalError> {
        let due = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if due {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), WalError> {
        let due = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if due {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), WalError> {
        self.sync()?;
        self.file_index += 1;
        self.current_file = wal_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// Sequential journal reader with corruption detection
pub struct WalReader {
    dir: PathBuf,
}

impl WalReader {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read every valid frame in sequence order
    ///
    /// Stops cleanly at the first torn or corrupt frame — the tail of an
    /// interrupted write is discarded, everything before it is kept.
    pub fn read_all(&self) -> Result<Vec<WalEntry>, WalError> {
        let mut entries = Vec::new();
        for path in wal_files_sorted(&self.dir)? {
            let mut data = Vec::new();
            File::open(&path)?.read_to_end(&mut data)?;

            let mut pos = 0usize;
            while pos < data.len() {
                match WalEntry::from_bytes(&data[pos..]) {
                    Ok((entry, consumed)) => {
                        if !entry.verify_checksum() {
                            warn!(
                                file = %path.display(),
                                sequence = entry.sequence,
                                "checksum mismatch, discarding journal tail"
                            );
                            return Ok(entries);
                        }
                        pos += consumed;
                        entries.push(entry);
                    }
                    Err(_) => {
                        warn!(
                            file = %path.display(),
                            offset = pos,
                            "torn frame, discarding journal tail"
                        );
                        return Ok(entries);
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Read frames with sequence strictly greater than `after`
    pub fn read_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.sequence > after)
            .collect())
    }
}

// ── Path helpers ────────────────────────────────────────────────────

fn wal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("wal-{:06}.bin", index))
}

fn latest_file_index(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .ok()
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| parse_wal_index(&e.file_name().to_string_lossy()))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

fn parse_wal_index(name: &str) -> Option<u64> {
    name.strip_prefix("wal-")?
        .strip_suffix(".bin")?
        .parse::<u64>()
        .ok()
}

fn wal_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, WalError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut indexed: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            parse_wal_index(&name).map(|i| (i, e.path()))
        })
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, p)| p).collect())
}

// ── Tests ───────────────────────────────────────────────────────────
