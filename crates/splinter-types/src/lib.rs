//! Shared vocabulary for the splinter shared-memory store.
//!
//! This crate defines (or re-exports) the cross-cutting constants and small
//! enums referenced throughout the workspace: layout identity (magic,
//! version), geometry limits, flag vocabularies, and the integer-operation
//! and time-mode enumerations. It deliberately carries no I/O and no atomics;
//! the data plane lives in `splinter-core`.

pub mod flags;
pub mod limits;

pub use flags::{CoreFlags, SlotUserFlags, TypeFlag, UserFlags};
pub use limits::{
    DEFAULT_MAX_VAL_SZ, DEFAULT_SLOTS, EMBED_DIM, KEY_MAX, LAYOUT_VERSION, MAX_GROUPS,
    SPLINTER_MAGIC,
};

use serde::{Deserialize, Serialize};

/// Arithmetic and bitwise operations permitted on BIGUINT-typed slots.
///
/// `Not` is unary; the operand is ignored. `Inc`/`Dec` wrap on overflow,
/// matching native unsigned arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegerOp {
    /// Bitwise AND with the operand.
    And,
    /// Bitwise OR with the operand.
    Or,
    /// Bitwise XOR with the operand.
    Xor,
    /// Bitwise complement; operand ignored.
    Not,
    /// Wrapping add of the operand.
    Inc,
    /// Wrapping subtract of the operand.
    Dec,
}

/// Which slot timestamp a time update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum TimeMode {
    /// Creation time.
    Ctime = 0,
    /// Last meaningful access time.
    Atime = 1,
}
