//! Per-slot seqlock protocol.
//!
//! Each slot's `epoch` counter arbitrates a single writer against any number
//! of readers: even = quiescent, odd = writer active. Writers enter by CAS
//! from an even value to the next odd one and leave by a further increment;
//! readers sample the epoch around their copy and discard torn snapshots.
//! Nothing here blocks: contention surfaces to the caller as a retry
//! condition, and the caller decides whether to spin, back off, or give up.
//!
//! ## Tracing & Metrics
//!
//! - Target `splinter.seqlock` (TRACE): emitted on every validated read.
//! - Level DEBUG when a read observed a writer or a torn snapshot.
//! - Counters: `splinter_seqlock_reads_total`, `splinter_seqlock_retries_total`.

use std::sync::atomic::{AtomicU64, Ordering, fence};

use serde::Serialize;

use crate::layout::Slot;

// ---------------------------------------------------------------------------
// Global metrics (lock-free, Relaxed ordering)
// ---------------------------------------------------------------------------

static SPLINTER_SEQLOCK_READS_TOTAL: AtomicU64 = AtomicU64::new(0);
static SPLINTER_SEQLOCK_RETRIES_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Snapshot of seqlock metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeqlockMetrics {
    pub splinter_seqlock_reads_total: u64,
    pub splinter_seqlock_retries_total: u64,
}

/// Read current seqlock metrics.
#[must_use]
pub fn seqlock_metrics() -> SeqlockMetrics {
    SeqlockMetrics {
        splinter_seqlock_reads_total: SPLINTER_SEQLOCK_READS_TOTAL.load(Ordering::Relaxed),
        splinter_seqlock_retries_total: SPLINTER_SEQLOCK_RETRIES_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset metrics (for tests).
pub fn reset_seqlock_metrics() {
    SPLINTER_SEQLOCK_READS_TOTAL.store(0, Ordering::Relaxed);
    SPLINTER_SEQLOCK_RETRIES_TOTAL.store(0, Ordering::Relaxed);
}

/// Record a validated read.
#[inline]
pub(crate) fn note_read(op: &'static str) {
    SPLINTER_SEQLOCK_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(target: "splinter.seqlock", op, "seqlock_read");
}

/// Record a read that must be retried by the caller.
#[inline]
pub(crate) fn note_retry(op: &'static str) {
    SPLINTER_SEQLOCK_RETRIES_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(target: "splinter.seqlock", op, "seqlock_read contended");
}

// ---------------------------------------------------------------------------
// Writer side
// ---------------------------------------------------------------------------

/// Exclusive write access to one slot, acquired by CAS on its epoch.
///
/// Dropping the guard without [`commit`](SlotWriteGuard::commit) is an
/// abort: the epoch is still advanced by 1 to restore even parity, so a
/// failed validation inside the critical section can simply `?` out.
/// Committed or aborted, the epoch ends at `entry + 2` — observers only see
/// it move forward.
pub(crate) struct SlotWriteGuard<'a> {
    slot: &'a Slot,
    committed: bool,
}

impl<'a> SlotWriteGuard<'a> {
    /// Try to acquire the slot's seqlock.
    ///
    /// Returns `None` if a writer is active or the CAS raced; the caller
    /// maps that onto "probe the next position" (`set`) or a retry
    /// condition (operations scoped to an existing slot).
    #[inline]
    pub(crate) fn try_acquire(slot: &'a Slot) -> Option<Self> {
        let entry = slot.epoch.load(Ordering::Relaxed);
        if entry & 1 == 1 {
            return None;
        }
        slot.epoch
            .compare_exchange(entry, entry + 1, Ordering::AcqRel, Ordering::Relaxed)
            .ok()?;
        Some(Self {
            slot,
            committed: false,
        })
    }

    /// Publish the write: release-increment the epoch back to even.
    #[inline]
    pub(crate) fn commit(mut self) {
        self.committed = true;
        self.slot.epoch.fetch_add(1, Ordering::Release);
    }
}

impl Drop for SlotWriteGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            // Abort: no payload change, but parity must return to even.
            self.slot.epoch.fetch_add(1, Ordering::Release);
        }
    }
}

// ---------------------------------------------------------------------------
// Reader side
// ---------------------------------------------------------------------------

/// Begin an optimistic read: sample the epoch, rejecting an active writer.
#[inline]
pub(crate) fn read_begin(slot: &Slot) -> Option<u64> {
    let start = slot.epoch.load(Ordering::Acquire);
    if start & 1 == 1 { None } else { Some(start) }
}

/// Validate an optimistic read begun at `start`.
///
/// The acquire fence orders the caller's payload copies before the second
/// epoch load, so a clean comparison proves the snapshot was not torn.
#[inline]
pub(crate) fn read_validate(slot: &Slot, start: u64) -> bool {
    fence(Ordering::Acquire);
    let end = slot.epoch.load(Ordering::Acquire);
    start == end && end & 1 == 0
}
