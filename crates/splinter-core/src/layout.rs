//! Bit-exact layout of the mapped region.
//!
//! The region is three contiguous sections: a fixed [`Header`], a dense
//! array of [`Slot`] records, and a flat value arena of
//! `slots * max_val_sz` bytes. Every offset is derivable from the header's
//! `slots` and `max_val_sz` fields, so unrelated processes can map the same
//! object and agree on addresses without negotiation.
//!
//! All mutable fields are embedded atomics; coordination state lives in the
//! mapping itself and there is no daemon. Layout is `#[repr(C, align(64))]`
//! throughout, with compile-time assertions pinning every offset the
//! cross-process contract depends on.

use std::cell::UnsafeCell;
use std::mem::{align_of, offset_of, size_of};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

#[cfg(feature = "embeddings")]
use splinter_types::EMBED_DIM;
use splinter_types::{KEY_MAX, LAYOUT_VERSION, MAX_GROUPS, SPLINTER_MAGIC, TypeFlag};

/// Cache line size in bytes.
///
/// 64 bytes for x86-64 (Intel/AMD) and AArch64 (Apple M-series, Graviton).
/// Over-aligning on platforms with larger lines is safe.
pub const CACHE_LINE_BYTES: usize = 64;

/// Sentinel in `bloom_watches` meaning "no signal group is watching this
/// label bit".
pub(crate) const NO_WATCH: u8 = 0xff;

// ---------------------------------------------------------------------------
// CacheAligned<T>
// ---------------------------------------------------------------------------

/// Wraps a value so it occupies a whole number of cache lines.
///
/// Used for the signal-group counters: each counter gets its own line so
/// pulses on one group never false-share with reads of another.
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T> {
    value: T,
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Process-global metadata at offset 0 of the mapping.
///
/// The first cache line holds the immutable identity and geometry, written
/// once at creation and read-only thereafter. The second line holds the hot
/// atomic counters and flag bytes. `bloom_watches` occupies one line, and
/// each signal-group counter sits on its own line.
#[repr(C, align(64))]
pub(crate) struct Header {
    // -- line 0: identity and geometry (immutable after creation) --
    pub(crate) magic: u32,
    pub(crate) version: u32,
    pub(crate) slots: u32,
    pub(crate) max_val_sz: u32,
    /// Value-arena byte size: `slots * max_val_sz`.
    pub(crate) val_sz: u64,
    /// Declared alignment of the layout, always 64.
    pub(crate) alignment: u32,
    _pad0: [u8; 36],

    // -- line 1: hot counters and flags --
    /// Global write count; bumped (relaxed) on every successful write.
    pub(crate) epoch: AtomicU64,
    /// Bump pointer for 8-byte expansion parcels carved out of the arena
    /// during BIGUINT conversion. Only ever grows.
    pub(crate) val_brk: AtomicU64,
    /// Client-maintained diagnostics; the data plane never writes these.
    pub(crate) parse_failures: AtomicU64,
    pub(crate) last_failure_epoch: AtomicU64,
    pub(crate) core_flags: AtomicU8,
    pub(crate) user_flags: AtomicU8,
    _pad1: [u8; 30],

    // -- line 2: label-bit to signal-group routing --
    /// `bloom_watches[i]` holds the group id (0..64) pulsed when label bit
    /// `i` is set on a written slot, or [`NO_WATCH`].
    pub(crate) bloom_watches: [AtomicU8; MAX_GROUPS],

    // -- lines 3..66: one pulse counter per signal group --
    pub(crate) signal_groups: [CacheAligned<AtomicU64>; MAX_GROUPS],
}

/// Byte size of [`Header`]: three lines of metadata plus 64 counter lines.
pub(crate) const HEADER_SIZE: usize = 3 * CACHE_LINE_BYTES + MAX_GROUPS * CACHE_LINE_BYTES;

// The cross-process contract: these offsets are what another build of this
// library (or an FFI client) will compute. A failure here is a layout break.
const _: () = assert!(size_of::<Header>() == HEADER_SIZE);
const _: () = assert!(align_of::<Header>() == CACHE_LINE_BYTES);
const _: () = assert!(offset_of!(Header, magic) == 0);
const _: () = assert!(offset_of!(Header, version) == 4);
const _: () = assert!(offset_of!(Header, slots) == 8);
const _: () = assert!(offset_of!(Header, max_val_sz) == 12);
const _: () = assert!(offset_of!(Header, val_sz) == 16);
const _: () = assert!(offset_of!(Header, alignment) == 24);
const _: () = assert!(offset_of!(Header, epoch) == 64);
const _: () = assert!(offset_of!(Header, val_brk) == 72);
const _: () = assert!(offset_of!(Header, parse_failures) == 80);
const _: () = assert!(offset_of!(Header, last_failure_epoch) == 88);
const _: () = assert!(offset_of!(Header, core_flags) == 96);
const _: () = assert!(offset_of!(Header, user_flags) == 97);
const _: () = assert!(offset_of!(Header, bloom_watches) == 128);
const _: () = assert!(offset_of!(Header, signal_groups) == 192);

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One entry of the slot table.
///
/// The metadata fields are atomics; `key` (and `embedding`, when compiled
/// in) are plain byte regions whose consistency is arbitrated by the slot's
/// seqlock `epoch`: readers snapshot them and discard the snapshot if the
/// epoch moved or was odd.
#[repr(C, align(64))]
pub(crate) struct Slot {
    /// FNV-1a identity of the key; 0 marks a free slot.
    pub(crate) hash: AtomicU64,
    /// Seqlock counter: even = quiescent, odd = writer active.
    pub(crate) epoch: AtomicU64,
    /// Byte offset of this slot's payload inside the value arena.
    pub(crate) val_off: AtomicU32,
    /// Current payload length.
    pub(crate) val_len: AtomicU32,
    /// One-hot [`TypeFlag`] bits.
    pub(crate) type_flag: AtomicU8,
    /// User-defined slot flags; opaque to the core.
    pub(crate) user_flag: AtomicU8,
    _pad0: [u8; 6],
    /// Bit `i` set: pulse signal group `i` at write commit.
    pub(crate) watcher_mask: AtomicU64,
    /// Client-supplied timestamps.
    pub(crate) ctime: AtomicU64,
    pub(crate) atime: AtomicU64,
    /// OR-accumulated label mask.
    pub(crate) bloom: AtomicU64,
    /// NUL-terminated key bytes, seqlock-guarded.
    key: UnsafeCell<[u8; KEY_MAX]>,
    /// Fixed-dimension vector, seqlock-guarded. Distinct from the value
    /// arena; does not consume `val_off`/`val_len`.
    #[cfg(feature = "embeddings")]
    embedding: UnsafeCell<[f32; EMBED_DIM]>,
}

// SAFETY: the non-atomic `key`/`embedding` cells are only written while the
// slot's seqlock is held (odd epoch) and only trusted by readers after the
// epoch re-check; every other field is an atomic.
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

/// Byte size of one slot record.
pub(crate) const SLOT_SIZE: usize = size_of::<Slot>();

const _: () = assert!(align_of::<Slot>() == CACHE_LINE_BYTES);
const _: () = assert!(SLOT_SIZE % CACHE_LINE_BYTES == 0);
const _: () = assert!(offset_of!(Slot, hash) == 0);
const _: () = assert!(offset_of!(Slot, epoch) == 8);
const _: () = assert!(offset_of!(Slot, val_off) == 16);
const _: () = assert!(offset_of!(Slot, val_len) == 20);
const _: () = assert!(offset_of!(Slot, type_flag) == 24);
const _: () = assert!(offset_of!(Slot, user_flag) == 25);
const _: () = assert!(offset_of!(Slot, watcher_mask) == 32);
const _: () = assert!(offset_of!(Slot, ctime) == 40);
const _: () = assert!(offset_of!(Slot, atime) == 48);
const _: () = assert!(offset_of!(Slot, bloom) == 56);
const _: () = assert!(offset_of!(Slot, key) == 64);
#[cfg(not(feature = "embeddings"))]
const _: () = assert!(SLOT_SIZE == 128);
#[cfg(feature = "embeddings")]
const _: () = assert!(offset_of!(Slot, embedding) == 128);
#[cfg(feature = "embeddings")]
const _: () = assert!(SLOT_SIZE == 128 + EMBED_DIM * size_of::<f32>());

impl Slot {
    /// Snapshot the key buffer. Callers must validate the slot epoch before
    /// trusting the bytes; a torn snapshot is possible mid-write.
    #[inline]
    pub(crate) fn key_snapshot(&self) -> [u8; KEY_MAX] {
        // Volatile: the buffer may be rewritten concurrently and the copy
        // must not be elided or torn further by the compiler.
        unsafe { self.key.get().read_volatile() }
    }

    /// Compare the stored key (up to its NUL) against `key`.
    ///
    /// Best-effort under concurrency, exactly like the probe itself: the
    /// hash tag is checked first and the seqlock validates the final read.
    #[inline]
    pub(crate) fn key_matches(&self, key: &[u8]) -> bool {
        let snap = self.key_snapshot();
        let end = snap.iter().position(|&b| b == 0).unwrap_or(KEY_MAX);
        &snap[..end] == key
    }

    /// The stored key as an owned string, lossily decoded.
    pub(crate) fn key_string(&self) -> String {
        let snap = self.key_snapshot();
        let end = snap.iter().position(|&b| b == 0).unwrap_or(KEY_MAX);
        String::from_utf8_lossy(&snap[..end]).into_owned()
    }

    /// Overwrite the key buffer with `key`, zero-padded to capacity.
    ///
    /// # Safety
    ///
    /// The caller must hold this slot's seqlock (odd epoch) and `key` must
    /// be at most `KEY_MAX - 1` bytes.
    #[inline]
    pub(crate) unsafe fn store_key(&self, key: &[u8]) {
        debug_assert!(key.len() < KEY_MAX);
        let mut buf = [0u8; KEY_MAX];
        buf[..key.len()].copy_from_slice(key);
        unsafe { self.key.get().write_volatile(buf) };
    }

    /// NUL-terminate the key at offset 0 without clearing the tail.
    ///
    /// # Safety
    ///
    /// The caller must hold this slot's seqlock.
    #[inline]
    pub(crate) unsafe fn truncate_key(&self) {
        unsafe { self.key.get().cast::<u8>().write_volatile(0) };
    }

    /// Copy the embedding vector out. Seqlock validation is the caller's
    /// responsibility, as with [`Slot::key_snapshot`].
    #[cfg(feature = "embeddings")]
    #[inline]
    pub(crate) fn embedding_snapshot(&self, out: &mut [f32; EMBED_DIM]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.embedding.get().cast::<f32>(),
                out.as_mut_ptr(),
                EMBED_DIM,
            );
        }
    }

    /// Overwrite the embedding vector.
    ///
    /// # Safety
    ///
    /// The caller must hold this slot's seqlock.
    #[cfg(feature = "embeddings")]
    #[inline]
    pub(crate) unsafe fn store_embedding(&self, vec: &[f32; EMBED_DIM]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                vec.as_ptr(),
                self.embedding.get().cast::<f32>(),
                EMBED_DIM,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Value-arena byte size for a geometry.
#[inline]
#[must_use]
pub(crate) fn arena_bytes(slots: u32, max_val_sz: u32) -> usize {
    slots as usize * max_val_sz as usize
}

/// Total mapping size: header, slot table, value arena.
#[inline]
#[must_use]
pub(crate) fn total_bytes(slots: u32, max_val_sz: u32) -> usize {
    HEADER_SIZE + slots as usize * SLOT_SIZE + arena_bytes(slots, max_val_sz)
}

/// Check creation geometry: both dimensions nonzero, and the arena
/// addressable by the 32-bit `val_off` fields.
pub(crate) fn geometry_is_valid(slots: u32, max_val_sz: u32) -> bool {
    slots > 0
        && max_val_sz > 0
        && u64::from(slots) * u64::from(max_val_sz) <= u64::from(u32::MAX)
}

/// Write the initial header and slot table into a fresh mapping.
///
/// Slot `i` owns the arena partition starting at `i * max_val_sz`. Fresh
/// mappings are kernel-zeroed, so only nonzero defaults are stored: the
/// global epoch starts at 1, every `bloom_watches` entry at the no-watch
/// sentinel, and every slot at type VOID.
///
/// # Safety
///
/// `base` must point to a zero-initialized, 64-byte-aligned, writable
/// region of at least `total_bytes(slots, max_val_sz)` bytes that no other
/// thread or process is accessing yet.
pub(crate) unsafe fn initialize_region(base: *mut u8, slots: u32, max_val_sz: u32) {
    debug_assert!(geometry_is_valid(slots, max_val_sz));
    unsafe {
        let hdr = base.cast::<Header>();
        (*hdr).magic = SPLINTER_MAGIC;
        (*hdr).version = LAYOUT_VERSION;
        (*hdr).slots = slots;
        (*hdr).max_val_sz = max_val_sz;
        (*hdr).val_sz = arena_bytes(slots, max_val_sz) as u64;
        (*hdr).alignment = CACHE_LINE_BYTES as u32;
        (*hdr).epoch.store(1, Ordering::Relaxed);
        (*hdr).val_brk.store(0, Ordering::Relaxed);
        (*hdr).core_flags.store(0, Ordering::Relaxed);
        (*hdr).user_flags.store(0, Ordering::Relaxed);
        (*hdr).parse_failures.store(0, Ordering::Relaxed);
        (*hdr).last_failure_epoch.store(0, Ordering::Relaxed);
        for watch in &(*hdr).bloom_watches {
            watch.store(NO_WATCH, Ordering::Relaxed);
        }

        let slot_base = base.add(HEADER_SIZE).cast::<Slot>();
        for i in 0..slots as usize {
            let slot = &*slot_base.add(i);
            slot.val_off.store(i as u32 * max_val_sz, Ordering::Relaxed);
            slot.type_flag
                .store(TypeFlag::VOID.bits(), Ordering::Relaxed);
        }
    }
}

/// Test-only stand-in for a mapping: owned, 64-byte-aligned, zeroed memory.
#[cfg(test)]
pub(crate) mod testbuf {
    use super::CACHE_LINE_BYTES;
    use std::alloc::{Layout, alloc_zeroed, dealloc};

    pub(crate) struct AlignedBuf {
        ptr: *mut u8,
        layout: Layout,
    }

    impl AlignedBuf {
        pub(crate) fn new(size: usize) -> Self {
            let layout = Layout::from_size_align(size, CACHE_LINE_BYTES).unwrap();
            let ptr = unsafe { alloc_zeroed(layout) };
            assert!(!ptr.is_null());
            Self { ptr, layout }
        }

        pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
            self.ptr
        }
    }

    impl Drop for AlignedBuf {
        fn drop(&mut self) {
            unsafe { dealloc(self.ptr, self.layout) };
        }
    }
}
