//! The store handle and its keyed operations.
//!
//! [`Splinter`] owns the mapped region and exposes the data-plane surface:
//! set/get/unset/list/poll, integer ops on BIGUINT slots, named-type
//! conversion, time metadata, raw-pointer reads, and the purge sweep.
//! Everything is keyed by a string; the hasher produces the slot identity,
//! linear probing finds the slot, and the per-slot seqlock arbitrates the
//! access. No operation retries internally: contention comes back to the
//! caller as a transient error.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{Ordering, fence};
use std::time::{Duration, Instant};

use splinter_error::{Result, SplinterError};
use splinter_types::{CoreFlags, IntegerOp, KEY_MAX, TimeMode, TypeFlag};

use crate::hash::{hash_key, slot_index};
use crate::layout::{HEADER_SIZE, Header, SLOT_SIZE, Slot};
use crate::region::{Backing, Region};
use crate::seqlock::{self, SlotWriteGuard};

/// Sleep quantum for `poll`'s cooperative wait loop.
const POLL_QUANTUM: Duration = Duration::from_millis(10);

/// Longest prefix of a payload considered when parsing a decimal numeral
/// during BIGUINT conversion.
const BIGUINT_PARSE_MAX: usize = 15;

// ---------------------------------------------------------------------------
// Splinter
// ---------------------------------------------------------------------------

/// Handle to an open store.
///
/// The handle owns the mapping; all coordination state lives in the mapped
/// region itself, so any number of handles across unrelated processes may
/// operate on the same backing object concurrently. Dropping the handle
/// unmaps the region; the backing object persists until unlinked.
#[derive(Debug)]
pub struct Splinter {
    region: Region,
    header: NonNull<Header>,
    slots: NonNull<Slot>,
    values: NonNull<u8>,
    slot_count: usize,
    max_val_sz: usize,
    arena_sz: usize,
}

// SAFETY: every mutable field inside the mapping is either an atomic or
// guarded by the per-slot seqlock; the handle's own fields are immutable
// after construction. Concurrent use from many threads is the design.
unsafe impl Send for Splinter {}
unsafe impl Sync for Splinter {}

impl Splinter {
    // -- lifecycle ---------------------------------------------------------

    /// Create a fresh store; fails if the backing object already exists.
    pub fn create(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        Ok(Self::from_region(Region::create(backing, slots, max_val_sz)?))
    }

    /// Open an existing store; fails on missing object or layout mismatch.
    pub fn open(backing: &Backing) -> Result<Self> {
        Ok(Self::from_region(Region::open(backing)?))
    }

    /// Open if present, otherwise create with the supplied geometry.
    pub fn open_or_create(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        Ok(Self::from_region(Region::open_or_create(
            backing, slots, max_val_sz,
        )?))
    }

    /// Create, or open if the object already exists.
    pub fn create_or_open(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        Ok(Self::from_region(Region::create_or_open(
            backing, slots, max_val_sz,
        )?))
    }

    /// Unmap the region. Equivalent to dropping the handle.
    pub fn close(self) {}

    /// The backing object this store was opened from.
    #[must_use]
    pub fn backing(&self) -> &Backing {
        self.region.backing()
    }

    fn from_region(region: Region) -> Self {
        let base = region.base();
        // SAFETY: `Region` validated the header and mapping size; mmap
        // never returns null, and the slot table and arena offsets are in
        // bounds for the validated geometry.
        unsafe {
            let header = NonNull::new_unchecked(base.cast::<Header>());
            let hdr = header.as_ref();
            let slot_count = hdr.slots as usize;
            let max_val_sz = hdr.max_val_sz as usize;
            let slots = NonNull::new_unchecked(base.add(HEADER_SIZE).cast::<Slot>());
            let values =
                NonNull::new_unchecked(base.add(HEADER_SIZE + slot_count * SLOT_SIZE));
            Self {
                region,
                header,
                slots,
                values,
                slot_count,
                max_val_sz,
                arena_sz: slot_count * max_val_sz,
            }
        }
    }

    // -- internal views ----------------------------------------------------

    #[inline]
    pub(crate) fn header(&self) -> &Header {
        // SAFETY: the header lives for as long as the owned mapping.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    pub(crate) fn slot(&self, idx: usize) -> &Slot {
        debug_assert!(idx < self.slot_count);
        // SAFETY: idx is bounded by the slot count validated at open.
        unsafe { &*self.slots.as_ptr().add(idx) }
    }

    /// Pointer into the value arena at byte offset `off`.
    #[inline]
    fn value_ptr(&self, off: u32) -> *mut u8 {
        debug_assert!((off as usize) < self.arena_sz || self.arena_sz == 0);
        // SAFETY: callers bound their access by the arena size.
        unsafe { self.values.as_ptr().add(off as usize) }
    }

    #[inline]
    pub(crate) fn bump_global_epoch(&self) {
        self.header().epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// Walk the probe sequence for `hash`, returning the slot whose
    /// identity and key both match. Free slots do not stop the walk:
    /// deletion may have exposed an earlier probe position for a
    /// different key.
    pub(crate) fn probe(&self, hash: u64, key: &[u8]) -> Option<&Slot> {
        let start = slot_index(hash, self.slot_count as u32);
        for i in 0..self.slot_count {
            let slot = self.slot((start + i) % self.slot_count);
            if slot.hash.load(Ordering::Acquire) == hash && slot.key_matches(key) {
                return Some(slot);
            }
        }
        None
    }

    /// Locate the slot for a key or fail with not-found.
    pub(crate) fn find(&self, key: &str) -> Result<&Slot> {
        let kb = norm_key(key);
        self.probe(hash_key(kb), kb)
            .ok_or_else(|| SplinterError::key_not_found(key))
    }

    // -- set ---------------------------------------------------------------

    /// Bind `val` to `key`, claiming a slot on the key's probe path.
    ///
    /// Accepts a free slot or the slot already bound to this key; the
    /// accept condition is re-checked under the seqlock, and a slot that
    /// stopped qualifying is released and the walk continues. Contended
    /// positions are skipped the same way, so `set` only fails once a full
    /// probe cycle found no home for the payload.
    pub fn set(&self, key: &str, val: &[u8]) -> Result<()> {
        let len = val.len();
        if len == 0 || len > self.max_val_sz {
            return Err(SplinterError::ValueSize {
                len,
                max: self.max_val_sz,
            });
        }

        let kb = norm_key(key);
        let hash = hash_key(kb);
        let start = slot_index(hash, self.slot_count as u32);

        for i in 0..self.slot_count {
            let slot = self.slot((start + i) % self.slot_count);
            let slot_hash = slot.hash.load(Ordering::Acquire);
            let bound_here = slot_hash == hash && slot.key_matches(kb);
            if slot_hash != 0 && !bound_here {
                continue;
            }
            let Some(guard) = SlotWriteGuard::try_acquire(slot) else {
                if bound_here {
                    // The key's own slot is mid-write: rebinding is scoped
                    // to this position, so surface the contention.
                    return Err(SplinterError::Busy);
                }
                // A contended free slot may be claimed for another key;
                // keep walking.
                continue;
            };
            if !accepts(slot, hash, kb) {
                // Lost a race for the position between the probe and the
                // lock; release and keep walking.
                drop(guard);
                continue;
            }

            let off = slot.val_off.load(Ordering::Relaxed) as usize;
            if off >= self.arena_sz || off + len > self.arena_sz {
                // Guard drop aborts the write and restores parity.
                return Err(SplinterError::StoreFull);
            }

            let dst = self.value_ptr(off as u32);
            self.scrub_before_write(dst, off, len);
            // SAFETY: dst..dst+len is inside the arena (checked above) and
            // this writer holds the slot's seqlock.
            unsafe { ptr::copy_nonoverlapping(val.as_ptr(), dst, len) };
            slot.val_len.store(len as u32, Ordering::Release);

            // SAFETY: seqlock held.
            unsafe { slot.store_key(kb) };

            // Publish: payload and key become visible before the identity.
            fence(Ordering::Release);
            slot.hash.store(hash, Ordering::Release);
            guard.commit();

            self.pulse_watchers(slot);
            self.bump_global_epoch();
            tracing::trace!(target: "splinter.store", key, len, "set");
            return Ok(());
        }

        Err(SplinterError::StoreFull)
    }

    /// Apply the scrub policy to a slot's value region before a write.
    ///
    /// Policy is sampled per write from the header flags. Hybrid zeroes the
    /// cache-line-rounded prefix; full zeroes the whole partition. Both are
    /// clamped to the arena for slots whose offset was re-pointed into the
    /// expansion region.
    fn scrub_before_write(&self, dst: *mut u8, off: usize, len: usize) {
        let flags = CoreFlags::from_bits_truncate(self.header().core_flags.load(Ordering::Acquire));
        if !flags.contains(CoreFlags::AUTO_SCRUB) {
            return;
        }
        let limit = self.max_val_sz.min(self.arena_sz - off);
        let scrub_len = if flags.contains(CoreFlags::HYBRID_SCRUB) {
            ((len + 63) & !63).min(limit)
        } else {
            limit
        };
        // SAFETY: scrub_len is clamped to the arena; seqlock held by caller.
        unsafe { ptr::write_bytes(dst, 0, scrub_len) };
    }

    // -- get ---------------------------------------------------------------

    /// Copy the value for `key` into `buf`, returning the value length.
    ///
    /// A transient error (writer active, torn snapshot) is normal under
    /// contention; the caller retries. If `buf` is too small the actual
    /// length travels in the error and `buf` is untouched.
    pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        self.get_impl(key, Some(buf))
    }

    /// The value length for `key`, without copying any payload.
    pub fn value_len(&self, key: &str) -> Result<usize> {
        self.get_impl(key, None)
    }

    fn get_impl(&self, key: &str, buf: Option<&mut [u8]>) -> Result<usize> {
        let slot = self.find(key)?;

        let Some(start) = seqlock::read_begin(slot) else {
            seqlock::note_retry("get");
            return Err(SplinterError::Busy);
        };

        let len = slot.val_len.load(Ordering::Acquire) as usize;
        let off = slot.val_off.load(Ordering::Relaxed);
        if let Some(buf) = buf {
            if buf.len() < len {
                return Err(SplinterError::BufferTooSmall {
                    needed: len,
                    provided: buf.len(),
                });
            }
            // SAFETY: len <= max_val_sz and off was validated by the writer
            // that published it; the epoch check below rejects the copy if
            // the slot moved underneath us.
            unsafe { ptr::copy_nonoverlapping(self.value_ptr(off), buf.as_mut_ptr(), len) };
        }

        if seqlock::read_validate(slot, start) {
            seqlock::note_read("get");
            Ok(len)
        } else {
            seqlock::note_retry("get");
            Err(SplinterError::TornRead)
        }
    }

    // -- unset -------------------------------------------------------------

    /// Remove `key`, returning the length of the value it held.
    ///
    /// The identity is cleared first, making the slot invisible to new
    /// probers before its metadata is reset. With auto-scrub enabled the
    /// value partition and key buffer are zeroed; otherwise the key is
    /// merely NUL-terminated at offset 0.
    pub fn unset(&self, key: &str) -> Result<usize> {
        let slot = self.find(key)?;
        let kb = norm_key(key);
        let hash = hash_key(kb);

        let guard = SlotWriteGuard::try_acquire(slot).ok_or(SplinterError::Busy)?;
        if slot.hash.load(Ordering::Acquire) != hash || !slot.key_matches(kb) {
            // Re-bound or removed while we took the lock.
            drop(guard);
            return Err(SplinterError::key_not_found(key));
        }

        let removed = slot.val_len.load(Ordering::Acquire) as usize;
        slot.hash.store(0, Ordering::Release);

        let flags = CoreFlags::from_bits_truncate(self.header().core_flags.load(Ordering::Acquire));
        if flags.contains(CoreFlags::AUTO_SCRUB) {
            let off = slot.val_off.load(Ordering::Relaxed) as usize;
            let scrub = self.max_val_sz.min(self.arena_sz - off);
            // SAFETY: clamped to the arena; seqlock held.
            unsafe {
                ptr::write_bytes(self.value_ptr(off as u32), 0, scrub);
                slot.store_key(b"");
            }
        } else {
            // SAFETY: seqlock held.
            unsafe { slot.truncate_key() };
        }

        slot.type_flag
            .store(TypeFlag::VOID.bits(), Ordering::Release);
        slot.val_len.store(0, Ordering::Release);
        slot.ctime.store(0, Ordering::Release);
        slot.atime.store(0, Ordering::Release);
        slot.user_flag.store(0, Ordering::Release);
        slot.watcher_mask.store(0, Ordering::Release);
        slot.bloom.store(0, Ordering::Release);

        guard.commit();
        self.bump_global_epoch();
        tracing::trace!(target: "splinter.store", key, removed, "unset");
        Ok(removed)
    }

    // -- list --------------------------------------------------------------

    /// All keys currently bound, best-effort under concurrency.
    ///
    /// The scan takes no locks; concurrent writers may make the result
    /// slightly stale. Keys are returned as owned strings so their
    /// validity does not depend on the slots staying occupied.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        (0..self.slot_count)
            .filter_map(|i| {
                let slot = self.slot(i);
                if slot.hash.load(Ordering::Acquire) != 0
                    && slot.val_len.load(Ordering::Acquire) > 0
                {
                    Some(slot.key_string())
                } else {
                    None
                }
            })
            .collect()
    }

    // -- poll --------------------------------------------------------------

    /// Wait for `key`'s slot epoch to advance, up to `timeout_ms`.
    ///
    /// Cooperative polling with a coarse sleep quantum; not a kernel wait.
    /// Observing an active writer returns a transient error immediately,
    /// at sample time or during the wait.
    pub fn poll(&self, key: &str, timeout_ms: u64) -> Result<()> {
        let slot = self.find(key)?;
        let start = seqlock::read_begin(slot).ok_or(SplinterError::Busy)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let current = slot.epoch.load(Ordering::Acquire);
            if current & 1 == 1 {
                return Err(SplinterError::Busy);
            }
            if current != start {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SplinterError::PollTimeout { timeout_ms });
            }
            std::thread::sleep(POLL_QUANTUM);
        }
    }

    // -- integer ops -------------------------------------------------------

    /// Apply a bitwise or arithmetic operation to a BIGUINT slot in place.
    ///
    /// The value is interpreted as a platform-native unsigned 64-bit
    /// integer. Unlike `set`, this never re-locates the payload.
    pub fn integer_op(&self, key: &str, op: IntegerOp, operand: u64) -> Result<()> {
        let slot = self.find(key)?;

        let type_bits = slot.type_flag.load(Ordering::Relaxed);
        if type_bits & TypeFlag::BIGUINT.bits() == 0 {
            return Err(SplinterError::TypeMismatch { type_bits });
        }

        let guard = SlotWriteGuard::try_acquire(slot).ok_or(SplinterError::Busy)?;

        let off = slot.val_off.load(Ordering::Relaxed);
        let src = self.value_ptr(off);
        let mut word = [0u8; 8];
        // SAFETY: BIGUINT slots always hold exactly 8 value bytes, placed
        // in-arena by `set` or by type conversion; seqlock held.
        unsafe { ptr::copy_nonoverlapping(src, word.as_mut_ptr(), 8) };
        let value = u64::from_ne_bytes(word);

        let value = match op {
            IntegerOp::And => value & operand,
            IntegerOp::Or => value | operand,
            IntegerOp::Xor => value ^ operand,
            IntegerOp::Not => !value,
            IntegerOp::Inc => value.wrapping_add(operand),
            IntegerOp::Dec => value.wrapping_sub(operand),
        };
        // SAFETY: same 8-byte region; seqlock held.
        unsafe { ptr::copy_nonoverlapping(value.to_ne_bytes().as_ptr(), src, 8) };

        fence(Ordering::Release);
        guard.commit();
        self.pulse_watchers(slot);
        self.bump_global_epoch();
        Ok(())
    }

    // -- named types -------------------------------------------------------

    /// Declare a payload type for `key`'s slot.
    ///
    /// Requesting BIGUINT on a slot shorter than 8 bytes relocates the
    /// payload to an 8-byte parcel carved from the expansion bump region:
    /// a leading ASCII digit makes the existing bytes parse as a decimal
    /// numeral, anything else is copied raw and zero-extended. Exhausting
    /// the bump region fails the operation and leaves the slot unchanged.
    pub fn set_named_type(&self, key: &str, mask: TypeFlag) -> Result<()> {
        let slot = self.find(key)?;
        let guard = SlotWriteGuard::try_acquire(slot).ok_or(SplinterError::Busy)?;
        fence(Ordering::Acquire);

        let len = slot.val_len.load(Ordering::Relaxed) as usize;
        if mask.contains(TypeFlag::BIGUINT) {
            if len < 8 {
                let header = self.header();
                let new_off = header.val_brk.fetch_add(8, Ordering::Relaxed);
                if new_off + 8 > header.val_sz {
                    // Guard drop aborts; val_brk only ever grows, so the
                    // failed reservation is simply abandoned.
                    return Err(SplinterError::ArenaExhausted);
                }

                let old = self.value_ptr(slot.val_off.load(Ordering::Relaxed));
                let mut existing = [0u8; BIGUINT_PARSE_MAX];
                let take = len.min(BIGUINT_PARSE_MAX);
                // SAFETY: `take <= len <= max_val_sz`; seqlock held.
                unsafe { ptr::copy_nonoverlapping(old, existing.as_mut_ptr(), take) };

                let converted = convert_to_biguint(&existing[..take], len);
                // new_off fits in u32: val_sz <= u32::MAX by geometry.
                let new_off = new_off as u32;
                // SAFETY: new_off + 8 <= val_sz, checked above.
                unsafe {
                    ptr::copy_nonoverlapping(
                        converted.to_ne_bytes().as_ptr(),
                        self.value_ptr(new_off),
                        8,
                    );
                }
                slot.val_off.store(new_off, Ordering::Relaxed);
                slot.val_len.store(8, Ordering::Relaxed);
            } else if len > 8 {
                // Keep the first 8 bytes in place; BIGUINT slots are
                // always exactly 8 bytes long.
                slot.val_len.store(8, Ordering::Relaxed);
            }
        }

        slot.type_flag.store(mask.bits(), Ordering::Release);
        guard.commit();
        self.bump_global_epoch();
        Ok(())
    }

    // -- time metadata -----------------------------------------------------

    /// Store a client-supplied timestamp (`epoch - offset`) into the
    /// slot's ctime or atime.
    ///
    /// Reader-style epoch check only: the timestamp fields are atomics and
    /// need no exclusive section.
    pub fn set_slot_time(&self, key: &str, mode: TimeMode, epoch: u64, offset: u64) -> Result<()> {
        let slot = self.find(key)?;
        if seqlock::read_begin(slot).is_none() {
            return Err(SplinterError::Busy);
        }
        fence(Ordering::Acquire);
        let stamp = epoch.wrapping_sub(offset);
        match mode {
            TimeMode::Ctime => slot.ctime.store(stamp, Ordering::Release),
            TimeMode::Atime => slot.atime.store(stamp, Ordering::Release),
        }
        Ok(())
    }

    // -- raw and epoch views ----------------------------------------------

    /// Zero-copy view of `key`'s value bytes.
    ///
    /// The view is non-owning and unguarded: the bytes may be rewritten or
    /// zeroed at any moment by another writer. The sampled epoch travels
    /// with the view; callers re-check [`Splinter::slot_epoch`] after
    /// consuming the bytes to detect tearing.
    pub fn raw_value(&self, key: &str) -> Result<RawValue<'_>> {
        let slot = self.find(key)?;
        let epoch = slot.epoch.load(Ordering::Acquire);
        let len = slot.val_len.load(Ordering::Relaxed) as usize;
        let off = slot.val_off.load(Ordering::Relaxed);
        // SAFETY: the arena outlives `self`'s borrow, and value_ptr never
        // returns null.
        let ptr = unsafe { NonNull::new_unchecked(self.value_ptr(off)) };
        Ok(RawValue {
            ptr,
            len,
            epoch,
            _region: PhantomData,
        })
    }

    /// Current seqlock epoch of `key`'s slot, or `None` if absent.
    #[must_use]
    pub fn slot_epoch(&self, key: &str) -> Option<u64> {
        let kb = norm_key(key);
        self.probe(hash_key(kb), kb)
            .map(|slot| slot.epoch.load(Ordering::Acquire))
    }

    /// Current global write epoch.
    #[must_use]
    pub fn global_epoch(&self) -> u64 {
        self.header().epoch.load(Ordering::Relaxed)
    }

    // -- purge -------------------------------------------------------------

    /// Hygiene sweep for idle moments: zero free slots' partitions and the
    /// dirty tail beyond each live payload. Busy slots are skipped, and
    /// live payload bytes are never touched.
    pub fn purge(&self) {
        for i in 0..self.slot_count {
            let slot = self.slot(i);
            let Some(guard) = SlotWriteGuard::try_acquire(slot) else {
                continue;
            };

            let len = slot.val_len.load(Ordering::Relaxed) as usize;
            let off = slot.val_off.load(Ordering::Relaxed) as usize;
            let limit = self.max_val_sz.min(self.arena_sz - off);
            let dst = self.value_ptr(off as u32);

            if slot.hash.load(Ordering::Acquire) == 0 {
                // SAFETY: clamped to the arena; seqlock held.
                unsafe { ptr::write_bytes(dst, 0, limit) };
            } else if len < limit {
                // SAFETY: zeroes only [off+len, off+limit); live payload
                // bytes stay intact.
                unsafe { ptr::write_bytes(dst.add(len), 0, limit - len) };
            }

            guard.commit();
        }
    }
}

// ---------------------------------------------------------------------------
// RawValue
// ---------------------------------------------------------------------------

/// Non-owning view into a slot's value bytes, with the epoch sampled at
/// lookup time. Valid only while the region stays mapped; consistent only
/// while the slot's epoch stays at [`RawValue::epoch`] and even.
#[derive(Debug)]
pub struct RawValue<'a> {
    ptr: NonNull<u8>,
    len: usize,
    epoch: u64,
    _region: PhantomData<&'a Region>,
}

impl<'a> RawValue<'a> {
    /// Raw pointer to the first value byte in shared memory.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Value length sampled at lookup time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot epoch sampled at lookup time. Odd means a writer was active
    /// and the view should be discarded immediately.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Borrow the bytes.
    ///
    /// # Safety
    ///
    /// The caller must treat the slice as volatile shared memory: verify
    /// [`RawValue::epoch`] was even, consume the bytes, then confirm the
    /// slot epoch is unchanged before trusting what was read.
    #[must_use]
    pub unsafe fn as_slice(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Truncate a key to capacity and to its first NUL, mirroring the fixed
/// in-slot buffer semantics.
pub(crate) fn norm_key(key: &str) -> &[u8] {
    let bytes = key.as_bytes();
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len())
        .min(KEY_MAX - 1);
    &bytes[..end]
}

/// `set`'s accept condition: free, or already bound to this exact key.
#[inline]
fn accepts(slot: &Slot, hash: u64, key: &[u8]) -> bool {
    let slot_hash = slot.hash.load(Ordering::Acquire);
    slot_hash == 0 || (slot_hash == hash && slot.key_matches(key))
}

/// Conversion policy for BIGUINT relocation: a leading ASCII digit makes
/// the payload parse as an unsigned decimal numeral; otherwise up to 8 raw
/// bytes are zero-extended into the new word.
fn convert_to_biguint(window: &[u8], val_len: usize) -> u64 {
    if window.first().is_some_and(u8::is_ascii_digit) {
        window
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .fold(0u64, |acc, &b| {
                acc.wrapping_mul(10).wrapping_add(u64::from(b - b'0'))
            })
    } else {
        let mut word = [0u8; 8];
        let take = val_len.min(8).min(window.len());
        word[..take].copy_from_slice(&window[..take]);
        u64::from_ne_bytes(word)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Test-only constructor for a file-backed store in a fresh tempdir.
#[cfg(test)]
pub(crate) mod teststore {
    use super::*;

    pub(crate) fn store(slots: u32, max_val_sz: u32) -> (tempfile::TempDir, Splinter) {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::File(dir.path().join("store.splinter"));
        let store = Splinter::create(&backing, slots, max_val_sz).unwrap();
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::teststore::store;
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let (_dir, store) = store(16, 64);

        store.set("alpha", b"hi").unwrap();
        let mut buf = [0u8; 64];
        let n = store.get("alpha", &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..n], b"hi");
        assert_eq!(store.value_len("alpha").unwrap(), 2);
    }

    #[test]
    fn overwrite_reuses_the_slot() {
        let (_dir, store) = store(16, 64);

        store.set("alpha", b"one").unwrap();
        let epoch_after_first = store.slot_epoch("alpha").unwrap();
        store.set("alpha", b"two").unwrap();
        let epoch_after_second = store.slot_epoch("alpha").unwrap();

        assert_eq!(epoch_after_second, epoch_after_first + 2);
        let mut buf = [0u8; 64];
        let n = store.get("alpha", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"two");
        assert_eq!(store.keys().len(), 1);
    }

    #[test]
    fn set_rejects_bad_lengths() {
        let (_dir, store) = store(16, 64);

        let err = store.set("k", b"").unwrap_err();
        assert!(matches!(err, SplinterError::ValueSize { len: 0, .. }));

        let big = vec![0x55u8; 65];
        let err = store.set("k", &big).unwrap_err();
        assert!(matches!(err, SplinterError::ValueSize { len: 65, .. }));
        assert!(matches!(
            store.get("k", &mut [0u8; 8]).unwrap_err(),
            SplinterError::KeyNotFound { .. }
        ));
    }

    #[test]
    fn get_reports_needed_length() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"0123456789").unwrap();

        let mut small = [0u8; 4];
        let err = store.get("k", &mut small).unwrap_err();
        assert!(matches!(
            err,
            SplinterError::BufferTooSmall {
                needed: 10,
                provided: 4
            }
        ));
        assert_eq!(small, [0u8; 4], "short buffer must stay untouched");
    }

    #[test]
    fn unset_returns_removed_length() {
        let (_dir, store) = store(16, 64);
        store.set("alpha", b"hi").unwrap();

        assert_eq!(store.unset("alpha").unwrap(), 2);
        assert!(matches!(
            store.get("alpha", &mut [0u8; 8]).unwrap_err(),
            SplinterError::KeyNotFound { .. }
        ));
        assert!(matches!(
            store.unset("alpha").unwrap_err(),
            SplinterError::KeyNotFound { .. }
        ));
    }

    #[test]
    fn unset_then_reinsert_lands_in_the_same_slot() {
        let (_dir, store) = store(16, 64);

        store.set("alpha", b"v1").unwrap();
        let before = store.global_epoch();
        store.unset("alpha").unwrap();
        store.set("alpha", b"v2").unwrap();
        assert!(store.global_epoch() >= before + 2);

        let mut buf = [0u8; 64];
        let n = store.get("alpha", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"v2");
    }

    #[test]
    fn keys_lists_live_slots_only() {
        let (_dir, store) = store(16, 64);
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        store.set("c", b"3").unwrap();
        store.unset("b").unwrap();

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn store_full_after_probe_cycle() {
        let (_dir, store) = store(2, 16);
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        let err = store.set("c", b"3").unwrap_err();
        assert!(matches!(err, SplinterError::StoreFull));
    }

    #[test]
    fn long_keys_truncate_to_capacity() {
        let (_dir, store) = store(16, 64);
        let long = "x".repeat(100);
        store.set(&long, b"v").unwrap();

        // The stored identity is the truncated key.
        let truncated = "x".repeat(KEY_MAX - 1);
        let mut buf = [0u8; 8];
        assert_eq!(store.get(&truncated, &mut buf).unwrap(), 1);
        assert_eq!(store.keys(), [truncated]);
    }

    #[test]
    fn poll_times_out_without_a_writer() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"v").unwrap();
        let err = store.poll("k", 30).unwrap_err();
        assert!(matches!(err, SplinterError::PollTimeout { timeout_ms: 30 }));
    }

    #[test]
    fn poll_missing_key_is_not_found() {
        let (_dir, store) = store(16, 64);
        assert!(matches!(
            store.poll("nope", 10).unwrap_err(),
            SplinterError::KeyNotFound { .. }
        ));
    }

    #[test]
    fn integer_op_requires_biguint() {
        let (_dir, store) = store(16, 64);
        store.set("ctr", b"7").unwrap();
        let err = store.integer_op("ctr", IntegerOp::Inc, 1).unwrap_err();
        assert!(matches!(err, SplinterError::TypeMismatch { .. }));
    }

    #[test]
    fn biguint_conversion_parses_decimal() {
        let (_dir, store) = store(16, 64);
        store.set("ctr", b"41").unwrap();
        store.set_named_type("ctr", TypeFlag::BIGUINT).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(store.get("ctr", &mut buf).unwrap(), 8);
        assert_eq!(u64::from_ne_bytes(buf), 41);

        store.integer_op("ctr", IntegerOp::Inc, 1).unwrap();
        store.get("ctr", &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 42);
    }

    #[test]
    fn biguint_conversion_copies_raw_bytes() {
        let (_dir, store) = store(16, 64);
        store.set("blob", b"\xaa\xbb").unwrap();
        store.set_named_type("blob", TypeFlag::BIGUINT).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(store.get("blob", &mut buf).unwrap(), 8);
        let mut expected = [0u8; 8];
        expected[..2].copy_from_slice(b"\xaa\xbb");
        assert_eq!(buf, expected);
    }

    #[test]
    fn biguint_on_wide_value_clamps_length() {
        let (_dir, store) = store(16, 64);
        store.set("wide", &[1u8; 12]).unwrap();
        store.set_named_type("wide", TypeFlag::BIGUINT).unwrap();
        assert_eq!(store.value_len("wide").unwrap(), 8);
    }

    #[test]
    fn integer_op_wrapping() {
        let (_dir, store) = store(16, 64);
        store.set("ctr", b"0").unwrap();
        store.set_named_type("ctr", TypeFlag::BIGUINT).unwrap();

        store.integer_op("ctr", IntegerOp::Dec, 1).unwrap();
        let mut buf = [0u8; 8];
        store.get("ctr", &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), u64::MAX);

        store.integer_op("ctr", IntegerOp::Not, 0).unwrap();
        store.get("ctr", &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 0);
    }

    #[test]
    fn slot_time_modes() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"v").unwrap();

        store.set_slot_time("k", TimeMode::Ctime, 1_000, 25).unwrap();
        store.set_slot_time("k", TimeMode::Atime, 2_000, 0).unwrap();

        let snap = store.slot_snapshot("k").unwrap();
        assert_eq!(snap.ctime, 975);
        assert_eq!(snap.atime, 2_000);
    }

    #[test]
    fn raw_value_epoch_round_trip() {
        let (_dir, store) = store(16, 64);
        store.set("k", b"payload").unwrap();

        let raw = store.raw_value("k").unwrap();
        assert_eq!(raw.len(), 7);
        assert_eq!(raw.epoch() % 2, 0);
        // No writer ran in between, so the view is consistent.
        assert_eq!(store.slot_epoch("k"), Some(raw.epoch()));
        assert_eq!(unsafe { raw.as_slice() }, b"payload");
    }

    #[test]
    fn purge_zeroes_free_and_tail_bytes() {
        let (_dir, store) = store(4, 32);
        store.set("keep", &[0xffu8; 32]).unwrap();
        store.set("drop", &[0xeeu8; 32]).unwrap();
        store.unset("drop").unwrap();

        store.purge();

        // Live payload untouched.
        let mut buf = [0u8; 32];
        store.get("keep", &mut buf).unwrap();
        assert_eq!(buf, [0xffu8; 32]);

        // Now shrink the live value; purge wipes the stale tail.
        store.set("keep", &[0x11u8; 4]).unwrap();
        store.purge();
        let raw = store.raw_value("keep").unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr(), 32) };
        assert_eq!(&bytes[..4], &[0x11u8; 4]);
        assert_eq!(&bytes[4..], &[0u8; 28]);
    }

    #[test]
    fn global_epoch_advances_on_writes() {
        let (_dir, store) = store(16, 64);
        let e0 = store.global_epoch();
        store.set("k", b"v").unwrap();
        let e1 = store.global_epoch();
        assert!(e1 > e0);
        store.unset("k").unwrap();
        assert!(store.global_epoch() > e1);
    }

    #[test]
    fn norm_key_truncates_at_nul_and_capacity() {
        assert_eq!(norm_key("plain"), b"plain");
        assert_eq!(norm_key("nul\0tail"), b"nul");
        assert_eq!(norm_key(&"y".repeat(200)).len(), KEY_MAX - 1);
    }
}
