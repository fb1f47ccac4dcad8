//! Public API facade for the splinter shared-memory store.
//!
//! Re-exports the stable surface of the workspace crates so applications
//! depend on a single crate. The data plane lives in `splinter-core`; the
//! error taxonomy in `splinter-error`; constants and flag vocabularies in
//! `splinter-types`.
//!
//! ```no_run
//! use splinter::{Backing, Splinter};
//!
//! fn main() -> splinter::Result<()> {
//!     let backing = Backing::parse("/demo-bus");
//!     let store = Splinter::create_or_open(&backing, 1024, 4096)?;
//!     store.set("greeting", b"hello")?;
//!
//!     let mut buf = [0u8; 4096];
//!     let n = store.get("greeting", &mut buf)?;
//!     assert_eq!(&buf[..n], b"hello");
//!     Ok(())
//! }
//! ```

pub use splinter_core::{
    Backing, CACHE_LINE_BYTES, HeaderSnapshot, ORDER_SEPARATOR, RawValue, Region, SeqlockMetrics,
    SlotSnapshot, Splinter, hash, reset_seqlock_metrics, seqlock_metrics,
};
pub use splinter_error::{ErrorKind, Result, SplinterError};
pub use splinter_types::{
    CoreFlags, DEFAULT_MAX_VAL_SZ, DEFAULT_SLOTS, EMBED_DIM, IntegerOp, KEY_MAX, LAYOUT_VERSION,
    MAX_GROUPS, SPLINTER_MAGIC, SlotUserFlags, TimeMode, TypeFlag, UserFlags,
};
