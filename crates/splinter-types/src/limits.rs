//! Layout identity and geometry constants.

/// Magic pattern identifying a splinter region: ASCII "SLNT" read as a
/// little-endian `u32` (bytes `53 4c 4e 54` on disk).
pub const SPLINTER_MAGIC: u32 = 0x534c_4e54;

/// Version of the on-memory data format (not the library version). `open`
/// rejects regions whose version does not match exactly.
pub const LAYOUT_VERSION: u32 = 2;

/// Maximum key length in bytes, including the NUL terminator. Longer keys
/// are truncated to `KEY_MAX - 1` bytes.
pub const KEY_MAX: usize = 64;

/// Number of independent signal groups in the pulse arena.
pub const MAX_GROUPS: usize = 64;

/// Dimension of the per-slot embedding vector (OpenAI-style 768), present
/// only when the `embeddings` feature is enabled in `splinter-core`.
pub const EMBED_DIM: usize = 768;

/// Default slot count, so tooling can run without arguments.
pub const DEFAULT_SLOTS: u32 = 1024;

/// Default per-slot value capacity in bytes.
pub const DEFAULT_MAX_VAL_SZ: u32 = 4096;
