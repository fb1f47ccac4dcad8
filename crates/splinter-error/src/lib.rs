//! Error taxonomy for the splinter shared-memory store.
//!
//! Every failure the data plane can surface is a structured variant of
//! [`SplinterError`], classified by [`ErrorKind`] onto the POSIX `errno`
//! family the C ecosystem expects (`EAGAIN`, `EMSGSIZE`, `EPROTOTYPE`, ...).
//! The core never retries on the caller's behalf: transient conditions are
//! returned as-is and callers decide whether to spin, back off, or propagate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, SplinterError>;

/// Primary error type for splinter store operations.
///
/// Structured variants for each failure path, with an errno-style
/// classification via [`SplinterError::kind`]. Variants carry enough context
/// for a caller to log or react without re-probing the store.
#[derive(Error, Debug)]
pub enum SplinterError {
    // === Region lifecycle ===
    /// Exclusive creation failed because the backing object already exists.
    #[error("store already exists: '{path}'")]
    StoreExists { path: PathBuf },

    /// The backing object does not exist.
    #[error("store not found: '{path}'")]
    StoreNotFound { path: PathBuf },

    /// The mapped region does not begin with the expected magic pattern.
    #[error("invalid store: bad magic 0x{found:08x}")]
    BadMagic { found: u32 },

    /// The region's layout version does not match this library exactly.
    #[error("invalid store: layout version {found} (expected {expected})")]
    BadVersion { found: u32, expected: u32 },

    /// The mapping is smaller than the geometry recorded in its header.
    #[error("invalid store: mapping is {actual} bytes, layout requires {expected}")]
    TruncatedRegion { expected: usize, actual: usize },

    /// Rejected creation geometry (zero slots, zero value capacity, or an
    /// arena that cannot be addressed by 32-bit value offsets).
    #[error("bad geometry: slots={slots}, max_val_sz={max_val_sz}")]
    BadGeometry { slots: u64, max_val_sz: u64 },

    /// Underlying file or shared-memory I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Data plane ===
    /// The key is not present in the store.
    #[error("key not found: '{key}'")]
    KeyNotFound { key: String },

    /// Value length outside `1..=max_val_sz`.
    #[error("value length {len} out of range (1..={max})")]
    ValueSize { len: usize, max: usize },

    /// No free or matching slot within one full probe cycle, or a slot's
    /// arena partition cannot hold the payload.
    #[error("store is full")]
    StoreFull,

    /// A writer holds the slot's seqlock; the caller may retry.
    #[error("slot busy: writer active")]
    Busy,

    /// The slot changed underneath a reader; the caller may retry.
    #[error("torn read: slot changed during read")]
    TornRead,

    /// `poll` reached its deadline without observing a change.
    #[error("poll timed out after {timeout_ms} ms")]
    PollTimeout { timeout_ms: u64 },

    /// Caller-provided buffer cannot hold the value. `needed` carries the
    /// actual value length so the caller can resize and retry.
    #[error("buffer too small: need {needed} bytes, have {provided}")]
    BufferTooSmall { needed: usize, provided: usize },

    /// Integer op on a slot whose type flags lack BIGUINT.
    #[error("type mismatch: slot type flags {type_bits:#04x} lack the required type")]
    TypeMismatch { type_bits: u8 },

    /// The expansion bump region is exhausted; the slot is unchanged.
    #[error("expansion arena exhausted")]
    ArenaExhausted,

    /// Signal group id outside `0..64`.
    #[error("invalid signal group: {group}")]
    InvalidGroup { group: u8 },

    /// Operation not supported by this store or mode.
    #[error("unsupported operation: {detail}")]
    Unsupported { detail: String },
}

/// Errno-style classification of a [`SplinterError`].
///
/// Each kind maps to exactly one POSIX errno value via [`ErrorKind::errno`],
/// so FFI shims and harnesses can translate without matching on variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `EEXIST` — exclusive creation found an existing object.
    Exists,
    /// `ENOENT` — key or backing object absent.
    NotFound,
    /// `EINVAL` — bad argument, bad magic/version, bad geometry.
    InvalidArgument,
    /// `EIO` — underlying I/O failure.
    Io,
    /// `EAGAIN` — transient contention; retry is expected to succeed.
    Retry,
    /// `ETIMEDOUT` — poll deadline elapsed.
    Timeout,
    /// `EMSGSIZE` — caller buffer too small.
    BufferTooSmall,
    /// `EPROTOTYPE` — slot type does not permit the operation.
    TypeMismatch,
    /// `ENOMEM` — expansion arena exhausted.
    OutOfMemory,
    /// `ENOSPC` — slot table or arena partition full.
    StoreFull,
    /// `ENOTSUP` — operation not supported.
    Unsupported,
}

impl ErrorKind {
    /// The POSIX errno value this kind resembles.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Exists => libc::EEXIST,
            Self::NotFound => libc::ENOENT,
            Self::InvalidArgument => libc::EINVAL,
            Self::Io => libc::EIO,
            Self::Retry => libc::EAGAIN,
            Self::Timeout => libc::ETIMEDOUT,
            Self::BufferTooSmall => libc::EMSGSIZE,
            Self::TypeMismatch => libc::EPROTOTYPE,
            Self::OutOfMemory => libc::ENOMEM,
            Self::StoreFull => libc::ENOSPC,
            Self::Unsupported => libc::ENOTSUP,
        }
    }
}

impl SplinterError {
    /// Classify this error onto the errno family.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreExists { .. } => ErrorKind::Exists,
            Self::StoreNotFound { .. } | Self::KeyNotFound { .. } => ErrorKind::NotFound,
            Self::BadMagic { .. }
            | Self::BadVersion { .. }
            | Self::TruncatedRegion { .. }
            | Self::BadGeometry { .. }
            | Self::ValueSize { .. }
            | Self::InvalidGroup { .. } => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::Io,
            Self::Busy | Self::TornRead => ErrorKind::Retry,
            Self::PollTimeout { .. } => ErrorKind::Timeout,
            Self::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ArenaExhausted => ErrorKind::OutOfMemory,
            Self::StoreFull => ErrorKind::StoreFull,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }

    /// The POSIX errno value for this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        self.kind().errno()
    }

    /// Whether retrying the same call is expected to succeed once the
    /// current writer finishes. Only seqlock contention qualifies.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::TornRead)
    }

    /// Convenience constructor for a not-found key.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Convenience constructor for an unsupported operation.
    #[must_use]
    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::Unsupported {
            detail: detail.into(),
        }
    }
}
