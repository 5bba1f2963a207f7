//! Persistence & Replay Service
//!
//! Append-only write-ahead event log with CRC32C checksums, file
//! rotation, and flush/fsync policies; zstd-compressed state
//! checkpoints; and replay-based crash recovery.
//!
//! Orders and trades are durably appended here before the client is
//! acknowledged; the in-memory books, ledger, and statistics are
//! rebuildable by restoring the latest checkpoint and replaying the log
//! tail through an [`recovery::EventApplier`].

pub mod checkpoint;
pub mod events;
pub mod recovery;
pub mod wal;

pub use checkpoint::{CheckpointState, CheckpointStore};
pub use events::{ExchangeEvent, ReservedFunds};
pub use recovery::{EventApplier, RecoveryError, ReplayReport};
pub use wal::{FlushPolicy, FsyncPolicy, WalConfig, WalEntry, WalError, WalReader, WalWriter};
