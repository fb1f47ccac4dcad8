//! Header flag control: scrub policy, config bits, user flags, and the
//! client-maintained diagnostics counters.
//!
//! All of these are single atomic bytes or counters in the header; any
//! process may flip them at any time and no higher-level lock coordinates
//! them. Scrub changes take effect on subsequent writes, never
//! retroactively.

use std::sync::atomic::Ordering;

use splinter_error::Result;
use splinter_types::{CoreFlags, SlotUserFlags, UserFlags};

use crate::store::Splinter;

impl Splinter {
    // -- scrub policy ------------------------------------------------------

    /// Set or clear the auto-scrub master bit.
    ///
    /// Clearing the master also clears the hybrid bit in the same atomic
    /// operation, so no write can observe hybrid-without-master.
    pub fn set_av(&self, enabled: bool) {
        if enabled {
            self.config_set(CoreFlags::AUTO_SCRUB);
        } else {
            self.config_clear(CoreFlags::AUTO_SCRUB | CoreFlags::HYBRID_SCRUB);
        }
    }

    /// Engage auto-scrub and hybrid mode in one atomic OR: opens the gate
    /// and selects the cache-line-rounded scrub in a single cycle.
    pub fn set_hybrid_av(&self) {
        self.config_set(CoreFlags::AUTO_SCRUB | CoreFlags::HYBRID_SCRUB);
    }

    /// Whether the auto-scrub master bit is set.
    #[must_use]
    pub fn auto_scrub(&self) -> bool {
        self.config_test(CoreFlags::AUTO_SCRUB)
    }

    /// Whether the hybrid-scrub bit is set.
    #[must_use]
    pub fn hybrid_scrub(&self) -> bool {
        self.config_test(CoreFlags::HYBRID_SCRUB)
    }

    // -- raw config bit helpers -------------------------------------------

    /// OR `mask` into the system config byte.
    pub fn config_set(&self, mask: CoreFlags) {
        self.header()
            .core_flags
            .fetch_or(mask.bits(), Ordering::AcqRel);
    }

    /// Clear `mask` from the system config byte.
    pub fn config_clear(&self, mask: CoreFlags) {
        self.header()
            .core_flags
            .fetch_and(!mask.bits(), Ordering::AcqRel);
    }

    /// Whether any bit of `mask` is set in the system config byte.
    #[must_use]
    pub fn config_test(&self, mask: CoreFlags) -> bool {
        self.header().core_flags.load(Ordering::Acquire) & mask.bits() != 0
    }

    /// Snapshot the system config byte.
    #[must_use]
    pub fn config_snapshot(&self) -> CoreFlags {
        CoreFlags::from_bits_truncate(self.header().core_flags.load(Ordering::Acquire))
    }

    // -- header user flags -------------------------------------------------

    /// OR `mask` into the header's user flag byte.
    pub fn user_flags_set(&self, mask: UserFlags) {
        self.header()
            .user_flags
            .fetch_or(mask.bits(), Ordering::AcqRel);
    }

    /// Clear `mask` from the header's user flag byte.
    pub fn user_flags_clear(&self, mask: UserFlags) {
        self.header()
            .user_flags
            .fetch_and(!mask.bits(), Ordering::AcqRel);
    }

    /// Whether any bit of `mask` is set in the header's user flag byte.
    #[must_use]
    pub fn user_flags_test(&self, mask: UserFlags) -> bool {
        self.header().user_flags.load(Ordering::Acquire) & mask.bits() != 0
    }

    /// Snapshot the header's user flag byte.
    #[must_use]
    pub fn user_flags_snapshot(&self) -> UserFlags {
        UserFlags::from_bits_truncate(self.header().user_flags.load(Ordering::Acquire))
    }

    // -- per-slot user flags -----------------------------------------------

    /// OR `mask` into the slot's user flag byte.
    pub fn slot_user_set(&self, key: &str, mask: SlotUserFlags) -> Result<()> {
        let slot = self.find(key)?;
        slot.user_flag.fetch_or(mask.bits(), Ordering::AcqRel);
        Ok(())
    }

    /// Clear `mask` from the slot's user flag byte.
    pub fn slot_user_clear(&self, key: &str, mask: SlotUserFlags) -> Result<()> {
        let slot = self.find(key)?;
        slot.user_flag.fetch_and(!mask.bits(), Ordering::AcqRel);
        Ok(())
    }

    /// Whether any bit of `mask` is set in the slot's user flag byte.
    pub fn slot_user_test(&self, key: &str, mask: SlotUserFlags) -> Result<bool> {
        let slot = self.find(key)?;
        Ok(slot.user_flag.load(Ordering::Acquire) & mask.bits() != 0)
    }

    /// Snapshot the slot's user flag byte.
    pub fn slot_user_snapshot(&self, key: &str) -> Result<SlotUserFlags> {
        let slot = self.find(key)?;
        Ok(SlotUserFlags::from_bits_truncate(
            slot.user_flag.load(Ordering::Acquire),
        ))
    }

    // -- diagnostics -------------------------------------------------------

    /// Record a client-side parse failure: bump the counter and stamp the
    /// current global epoch. The data plane itself never calls this; the
    /// counters exist for external harnesses.
    pub fn note_parse_failure(&self) {
        let header = self.header();
        header.parse_failures.fetch_add(1, Ordering::Relaxed);
        header
            .last_failure_epoch
            .store(header.epoch.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}
