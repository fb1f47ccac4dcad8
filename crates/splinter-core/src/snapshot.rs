//! Point-in-time copies of header and slot state for clients and
//! harnesses.
//!
//! The header snapshot is a field-by-field atomic copy: the fields are
//! independent, so no cross-field consistency is promised. The slot
//! snapshot runs the full seqlock reader loop and retries until two
//! consecutive epoch samples match and are even, so everything in it —
//! including the embedding vector, the high-risk area for tearing — is
//! one consistent picture of the slot.

use std::sync::atomic::Ordering;

use serde::Serialize;

use splinter_error::{Result, SplinterError};

use crate::seqlock;
use crate::store::Splinter;

/// Retry bound for the slot-snapshot reader loop; matching the seqlock
/// read bound, this should never be exhausted in practice.
const MAX_SNAPSHOT_RETRIES: u32 = 1_000_000;

/// Non-atomic copy of the header's metadata and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderSnapshot {
    pub magic: u32,
    pub version: u32,
    pub slots: u32,
    pub max_val_sz: u32,
    pub val_sz: u64,
    pub alignment: u32,
    pub epoch: u64,
    pub val_brk: u64,
    pub core_flags: u8,
    pub user_flags: u8,
    pub parse_failures: u64,
    pub last_failure_epoch: u64,
}

/// Consistent copy of one slot's metadata (and embedding, when compiled
/// in), taken under the seqlock reader protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub hash: u64,
    pub epoch: u64,
    pub val_off: u32,
    pub val_len: u32,
    pub type_flag: u8,
    pub user_flag: u8,
    pub watcher_mask: u64,
    pub ctime: u64,
    pub atime: u64,
    pub bloom: u64,
    pub key: String,
    #[cfg(feature = "embeddings")]
    pub embedding: Vec<f32>,
}

impl Splinter {
    /// Copy the atomic header fields into a plain struct, one atomic load
    /// per field. Fields are independent; load order does not matter.
    #[must_use]
    pub fn header_snapshot(&self) -> HeaderSnapshot {
        let header = self.header();
        HeaderSnapshot {
            magic: header.magic,
            version: header.version,
            slots: header.slots,
            max_val_sz: header.max_val_sz,
            val_sz: header.val_sz,
            alignment: header.alignment,
            epoch: header.epoch.load(Ordering::Acquire),
            val_brk: header.val_brk.load(Ordering::Acquire),
            core_flags: header.core_flags.load(Ordering::Acquire),
            user_flags: header.user_flags.load(Ordering::Acquire),
            parse_failures: header.parse_failures.load(Ordering::Relaxed),
            last_failure_epoch: header.last_failure_epoch.load(Ordering::Relaxed),
        }
    }

    /// Take a consistent snapshot of `key`'s slot.
    ///
    /// Loops the seqlock reader protocol until a clean, non-torn read;
    /// returns a transient error only if the retry bound is exhausted.
    pub fn slot_snapshot(&self, key: &str) -> Result<SlotSnapshot> {
        let slot = self.find(key)?;

        let mut retries: u32 = 0;
        loop {
            let Some(start) = seqlock::read_begin(slot) else {
                retries += 1;
                if retries >= MAX_SNAPSHOT_RETRIES {
                    seqlock::note_retry("slot_snapshot");
                    return Err(SplinterError::Busy);
                }
                std::hint::spin_loop();
                continue;
            };

            let snapshot = SlotSnapshot {
                hash: slot.hash.load(Ordering::Acquire),
                epoch: start,
                val_off: slot.val_off.load(Ordering::Relaxed),
                val_len: slot.val_len.load(Ordering::Relaxed),
                type_flag: slot.type_flag.load(Ordering::Acquire),
                user_flag: slot.user_flag.load(Ordering::Acquire),
                watcher_mask: slot.watcher_mask.load(Ordering::Acquire),
                ctime: slot.ctime.load(Ordering::Acquire),
                atime: slot.atime.load(Ordering::Acquire),
                bloom: slot.bloom.load(Ordering::Acquire),
                key: slot.key_string(),
                #[cfg(feature = "embeddings")]
                embedding: {
                    let mut vec = [0f32; splinter_types::EMBED_DIM];
                    slot.embedding_snapshot(&mut vec);
                    vec.to_vec()
                },
            };

            if seqlock::read_validate(slot, start) {
                seqlock::note_read("slot_snapshot");
                return Ok(snapshot);
            }

            retries += 1;
            if retries >= MAX_SNAPSHOT_RETRIES {
                seqlock::note_retry("slot_snapshot");
                return Err(SplinterError::TornRead);
            }
            std::hint::spin_loop();
        }
    }
}
