//! Crash recovery by checkpoint restore + journal replay
//!
//! Boot sequence:
//! 1. Load the newest intact checkpoint (if any) — the caller restores
//!    ledger, books, and order state from it.
//! 2. Replay every journal frame past the checkpoint's sequence through
//!    an [`EventApplier`].
//! 3. Resume the journal at the next sequence.
//!
//! Replay applies events; it never re-runs matching, so recovery is
//! deterministic regardless of wall-clock time.

use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::checkpoint::CheckpointError;
use crate::events::ExchangeEvent;
use crate::wal::{WalError, WalReader};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Journal error: {0}")]
    Wal(#[from] WalError),

    #[error("Replay failed at sequence {sequence}: {detail}")]
    Replay { sequence: u64, detail: String },
}

/// Applies replayed events to live state
///
/// The lifecycle layer implements this to route events into the ledger,
/// books, and statistics.
pub trait EventApplier {
    fn apply(&mut self, event: &ExchangeEvent, sequence: u64) -> Result<(), String>;
}

/// What a replay pass did
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Journal sequence replay started after
    pub started_after: u64,
    /// Number of frames applied
    pub replayed: u64,
    /// Highest sequence seen (== started_after if nothing replayed)
    pub last_sequence: u64,
    pub elapsed_ms: u64,
}

/// Replay all journal frames with sequence > `after` through the applier
pub fn replay(
    reader: &WalReader,
    after: u64,
    applier: &mut dyn EventApplier,
) -> Result<ReplayReport, RecoveryError> {
    let started = Instant::now();
    let entries = reader.read_after(after)?;

    let mut last_sequence = after;
    let mut replayed = 0u64;
    for entry in &entries {
        if entry.sequence <= last_sequence {
            warn!(
                sequence = entry.sequence,
                last = last_sequence,
                "out-of-order journal frame skipped"
            );
            continue;
        }
        let event = entry.event()?;
        applier
            .apply(&event, entry.sequence)
            .map_err(|detail| RecoveryError::Replay {
                sequence: entry.sequence,
                detail,
            })?;
        last_sequence = entry.sequence;
        replayed += 1;
    }

    let report = ReplayReport {
        started_after: after,
        replayed,
        last_sequence,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        after,
        replayed = report.replayed,
        last = report.last_sequence,
        "journal replay complete"
    );
    Ok(report)
}
