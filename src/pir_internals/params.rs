pub const BYTE_BITS: usize = 8;
pub const SHORT_BITS: usize = 16;
pub const INT_BITS: usize = 32;
pub const LONG_BITS: usize = 64;
pub const FLOAT_BITS: usize = 32;
pub const DOUBLE_BITS: usize = 64;
pub const CHAR_BITS: usize = 16;
pub const IPV4_BITS: usize = 32;
pub const DATE_BITS: usize = LONG_BITS;

pub const DEFAULT_STRING_BITS: usize = 64;
pub const DEFAULT_ARRAY_LENGTH: usize = 20;

/// Codecs pack chunks through a 128-bit buffer, so a chunk can't be wider than 64 bits.
pub const MAX_CHUNK_BITS: usize = 64;
/// Exponentiation tables enumerate every power in 0..2^w, which bounds usable `w`.
pub const MAX_EXP_TABLE_PARTITION_BITS: usize = 32;

pub const SELECTOR_DIGEST_BYTE_LEN: usize = 8;
/// Fixed key under which string selectors are digested before being embedded into a record's partitions.
pub const EMBEDDED_SELECTOR_HASH_KEY: &[u8] = b"aux";
