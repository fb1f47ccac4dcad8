//! Passive, lock-free, shared-memory key→value store.
//!
//! Multiple unrelated processes map the same backing object — a POSIX
//! shared-memory segment or a regular file — and coordinate entirely
//! through atomic state embedded in the mapping: there is no daemon. Each
//! slot carries a seqlock whose parity arbitrates one writer against any
//! number of readers; torn reads surface as transient errors the caller
//! retries; change notification flows through an arena of per-group pulse
//! counters routed by watcher bits and label masks.
//!
//! The crate is deliberately small in scope: the binary layout, the slot
//! protocol, the keyed operations, and the signal arena. Front-ends,
//! config parsing, and language bindings are clients of this surface.

pub mod hash;
pub mod region;
pub mod seqlock;

mod config;
#[cfg(feature = "embeddings")]
mod embed;
mod layout;
mod signal;
mod snapshot;
mod store;
mod tandem;

pub use layout::CACHE_LINE_BYTES;
pub use region::{Backing, Region};
pub use seqlock::{SeqlockMetrics, reset_seqlock_metrics, seqlock_metrics};
pub use snapshot::{HeaderSnapshot, SlotSnapshot};
pub use store::{RawValue, Splinter};
pub use tandem::ORDER_SEPARATOR;
