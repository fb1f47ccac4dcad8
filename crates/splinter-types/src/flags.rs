//! Flag vocabularies stored in the header and slot atomic bytes.
//!
//! All four sets live in single-byte atomics inside the mapped region, so
//! every type here is `u8`-backed. System bits and user bits are kept in
//! separate bytes; nothing in the core interprets user bits.

bitflags::bitflags! {
    /// System flags in the header's `core_flags` byte.
    ///
    /// The hybrid bit only has effect while the auto-scrub master bit is
    /// also set; clearing the master clears hybrid in the same atomic op.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CoreFlags: u8 {
        /// Auto-scrub master switch: zero value bytes before reuse.
        const AUTO_SCRUB = 1 << 0;
        /// Hybrid scrub: zero only the cache-line-rounded prefix on write.
        const HYBRID_SCRUB = 1 << 1;
        /// Reserved for future system use.
        const RESERVED_2 = 1 << 2;
        /// Reserved for future system use.
        const RESERVED_3 = 1 << 3;
    }
}

bitflags::bitflags! {
    /// User-defined flags in the header's `user_flags` byte.
    ///
    /// Four bits, advisory only. The core stores and returns them verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserFlags: u8 {
        const USR1 = 1 << 0;
        const USR2 = 1 << 1;
        const USR3 = 1 << 2;
        const USR4 = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Named payload types, stored one-hot in a slot's `type_flag` byte.
    ///
    /// Only BIGUINT is enforced (by the integer-op type check); every other
    /// type is an advisory declaration of intent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlag: u8 {
        /// Default for fresh and unset slots.
        const VOID = 1 << 0;
        const BIGINT = 1 << 1;
        /// 64-bit native unsigned integer; `val_len` is always 8.
        const BIGUINT = 1 << 2;
        const JSON = 1 << 3;
        const BINARY = 1 << 4;
        const IMGDATA = 1 << 5;
        const AUDIO = 1 << 6;
        const VARTEXT = 1 << 7;
    }
}

bitflags::bitflags! {
    /// User-defined flags in a slot's `user_flag` byte. Eight bits,
    /// advisory only; reset to empty by `unset`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlotUserFlags: u8 {
        const USR1 = 1 << 0;
        const USR2 = 1 << 1;
        const USR3 = 1 << 2;
        const USR4 = 1 << 3;
        const USR5 = 1 << 4;
        const USR6 = 1 << 5;
        const USR7 = 1 << 6;
        const USR8 = 1 << 7;
    }
}
