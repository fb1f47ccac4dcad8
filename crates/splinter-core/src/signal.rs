//! Signal arena: change-notification pulses routed by watcher bits and
//! label masks.
//!
//! Two registration paths coexist. A per-slot watcher sets a bit in the
//! slot's `watcher_mask`; a label watch maps a bloom bit to a group in the
//! header's `bloom_watches` table. At write commit the pulse routine
//! increments one counter per watcher bit and one per matched label bit,
//! so a single write may pulse a group more than once: consumers read
//! counter deltas as "at least one relevant event", never an exact count.
//!
//! Pulsing is pure bitmask traversal over atomics; no syscalls, no waits.
//! Event-driven frontends wrap the counters in their own futex/eventfd
//! machinery.

use std::sync::atomic::Ordering;

use splinter_error::{Result, SplinterError};
use splinter_types::MAX_GROUPS;

use crate::layout::{NO_WATCH, Slot};
use crate::store::Splinter;

fn check_group(group: u8) -> Result<()> {
    if usize::from(group) >= MAX_GROUPS {
        return Err(SplinterError::InvalidGroup { group });
    }
    Ok(())
}

impl Splinter {
    /// Pulse signal group `group` whenever `key`'s slot commits a write.
    pub fn watch_register(&self, key: &str, group: u8) -> Result<()> {
        check_group(group)?;
        let slot = self.find(key)?;
        slot.watcher_mask.fetch_or(1 << group, Ordering::Release);
        Ok(())
    }

    /// Stop pulsing `group` for `key`. Other groups' bits are untouched.
    pub fn watch_unregister(&self, key: &str, group: u8) -> Result<()> {
        check_group(group)?;
        let slot = self.find(key)?;
        slot.watcher_mask
            .fetch_and(!(1u64 << group), Ordering::Release);
        Ok(())
    }

    /// Route every label bit set in `bloom_mask` to `group`.
    ///
    /// Later calls with overlapping masks overwrite earlier routes; there
    /// is one group per label bit.
    pub fn watch_label_register(&self, bloom_mask: u64, group: u8) -> Result<()> {
        check_group(group)?;
        let header = self.header();
        let mut mask = bloom_mask;
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            header.bloom_watches[bit].store(group, Ordering::Release);
            mask &= mask - 1;
        }
        Ok(())
    }

    /// Current pulse count for a signal group.
    ///
    /// Counters are monotonically non-decreasing for the region's
    /// lifetime; consumers detect edges by computing deltas across calls.
    pub fn signal_count(&self, group: u8) -> Result<u64> {
        check_group(group)?;
        Ok(self.header().signal_groups[usize::from(group)].load(Ordering::Acquire))
    }

    /// OR a label mask into `key`'s bloom filter.
    ///
    /// Labels are additive; clearing requires re-creating the slot.
    pub fn set_label(&self, key: &str, mask: u64) -> Result<()> {
        let slot = self.find(key)?;
        slot.bloom.fetch_or(mask, Ordering::Release);
        self.bump_global_epoch();
        Ok(())
    }

    /// Pulse every group watching `slot`, directly or through a label.
    pub(crate) fn pulse_watchers(&self, slot: &Slot) {
        let header = self.header();

        let mut mask = slot.watcher_mask.load(Ordering::Acquire);
        while mask != 0 {
            let group = mask.trailing_zeros() as usize;
            header.signal_groups[group].fetch_add(1, Ordering::Release);
            mask &= mask - 1;
        }

        let mut bloom = slot.bloom.load(Ordering::Acquire);
        while bloom != 0 {
            let bit = bloom.trailing_zeros() as usize;
            let group = header.bloom_watches[bit].load(Ordering::Acquire);
            if group != NO_WATCH && usize::from(group) < MAX_GROUPS {
                header.signal_groups[usize::from(group)].fetch_add(1, Ordering::Release);
            }
            bloom &= bloom - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::store::teststore::store;
    use splinter_error::SplinterError;

    #[test]
    fn group_bounds_are_enforced() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"v").unwrap();

        assert!(matches!(
            store.watch_register("k", 64).unwrap_err(),
            SplinterError::InvalidGroup { group: 64 }
        ));
        assert!(matches!(
            store.watch_label_register(1, 200).unwrap_err(),
            SplinterError::InvalidGroup { group: 200 }
        ));
        assert!(matches!(
            store.signal_count(64).unwrap_err(),
            SplinterError::InvalidGroup { group: 64 }
        ));
        store.watch_register("k", 63).unwrap();
        assert_eq!(store.signal_count(63).unwrap(), 0);
    }

    #[test]
    fn direct_watch_pulses_on_set() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"v").unwrap();
        store.watch_register("k", 5).unwrap();

        let before = store.signal_count(5).unwrap();
        store.set("k", b"v2").unwrap();
        assert_eq!(store.signal_count(5).unwrap(), before + 1);
    }

    #[test]
    fn unregister_round_trip_leaves_mask_unchanged() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"v").unwrap();

        let baseline = store.slot_snapshot("k").unwrap().watcher_mask;
        store.watch_register("k", 9).unwrap();
        assert_eq!(
            store.slot_snapshot("k").unwrap().watcher_mask,
            baseline | (1 << 9)
        );
        store.watch_unregister("k", 9).unwrap();
        assert_eq!(store.slot_snapshot("k").unwrap().watcher_mask, baseline);

        let before = store.signal_count(9).unwrap();
        store.set("k", b"v2").unwrap();
        assert_eq!(store.signal_count(9).unwrap(), before);
    }

    #[test]
    fn label_watch_routes_to_group() {
        let (_dir, store) = store(16, 64);
        store.set("x", b"v").unwrap();
        store.watch_label_register(1 << 7, 3).unwrap();

        let before = store.signal_count(3).unwrap();
        store.set_label("x", 1 << 7).unwrap();
        store.set("x", b"v2").unwrap();
        assert!(store.signal_count(3).unwrap() >= before + 1);
    }

    #[test]
    fn labels_accumulate_with_or() {
        let (_dir, store) = store(16, 64);
        store.set("x", b"v").unwrap();

        store.set_label("x", 0b0011).unwrap();
        store.set_label("x", 0b1000).unwrap();
        assert_eq!(store.slot_snapshot("x").unwrap().bloom, 0b1011);
    }

    #[test]
    fn one_write_may_pulse_a_group_twice() {
        let (_dir, store) = store(16, 64);
        store.set("x", b"v").unwrap();

        // Both the direct watch and a matched label route to group 2.
        store.watch_register("x", 2).unwrap();
        store.watch_label_register(1 << 4, 2).unwrap();
        store.set_label("x", 1 << 4).unwrap();

        let before = store.signal_count(2).unwrap();
        store.set("x", b"v2").unwrap();
        assert_eq!(store.signal_count(2).unwrap(), before + 2);
    }

    #[test]
    fn integer_op_pulses_watchers() {
        let (_dir, store) = store(16, 64);
        store.set("ctr", b"0").unwrap();
        store
            .set_named_type("ctr", splinter_types::TypeFlag::BIGUINT)
            .unwrap();
        store.watch_register("ctr", 11).unwrap();

        let before = store.signal_count(11).unwrap();
        store
            .integer_op("ctr", splinter_types::IntegerOp::Inc, 1)
            .unwrap();
        assert_eq!(store.signal_count(11).unwrap(), before + 1);
    }

    #[test]
    fn unset_clears_watches_and_labels() {
        let (_dir, store) = store(16, 64);
        store.set("x", b"v").unwrap();
        store.watch_register("x", 1).unwrap();
        store.set_label("x", 1 << 3).unwrap();

        store.unset("x").unwrap();
        store.set("x", b"fresh").unwrap();
        let snap = store.slot_snapshot("x").unwrap();
        assert_eq!(snap.watcher_mask, 0);
        assert_eq!(snap.bloom, 0);
    }
}
