use std::cmp::min;

/// Splits a little-endian byte string of `num_bits` bits into chunks of `chunk_bits` bits each.
///
/// Bytes are pushed into a 128-bit buffer, from which full chunks are drained, least significant chunk first.
/// The last chunk holds whatever is left over i.e. `num_bits % chunk_bits` bits, when `chunk_bits` doesn't divide `num_bits`.
/// Missing trailing bytes are treated as zero, extra bytes are ignored.
///
/// # Arguments
///
/// * `bytes` - Little-endian serialized value.
/// * `num_bits` - Bit width of the value, must be a multiple of 8.
/// * `chunk_bits` - Bit width of each chunk, must be in 1..=64.
///
/// # Returns
///
/// A vector of `ceil(num_bits / chunk_bits)` chunks, each < 2^chunk_bits.
#[inline]
pub fn pack_le_bytes(bytes: &[u8], num_bits: usize, chunk_bits: usize) -> Vec<u64> {
    debug_assert!(num_bits % 8 == 0);
    debug_assert!((1..=64).contains(&chunk_bits));

    let num_bytes = num_bits / 8;
    let num_chunks = num_bits.div_ceil(chunk_bits);
    let chunk_mask = (1u128 << chunk_bits) - 1;

    let mut chunks = vec![0u64; num_chunks];
    let mut chunk_offset = 0;

    let mut buffer = 0u128;
    let mut buf_num_bits = 0usize;

    for byte_idx in 0..num_bytes {
        let byte = bytes.get(byte_idx).copied().unwrap_or(0);

        buffer |= (byte as u128) << buf_num_bits;
        buf_num_bits += 8;

        while buf_num_bits >= chunk_bits {
            chunks[chunk_offset] = (buffer & chunk_mask) as u64;

            buffer >>= chunk_bits;
            buf_num_bits -= chunk_bits;
            chunk_offset += 1;
        }
    }

    if buf_num_bits > 0 {
        chunks[chunk_offset] = buffer as u64;
    }

    chunks
}

/// Inverse of [`pack_le_bytes`]: concatenates chunks of `chunk_bits` bits back into a little-endian byte string of `num_bits` bits.
///
/// Bits of a chunk above its expected width are dropped, so callers must range-check chunks before unpacking.
#[inline]
pub fn unpack_le_bytes(chunks: &[u64], num_bits: usize, chunk_bits: usize) -> Vec<u8> {
    debug_assert!(num_bits % 8 == 0);
    debug_assert!((1..=64).contains(&chunk_bits));

    let mut bytes = vec![0u8; num_bits / 8];
    let mut byte_offset = 0;

    let mut buffer = 0u128;
    let mut buf_num_bits = 0usize;
    let mut remaining_num_bits = num_bits;

    for &chunk in chunks {
        if remaining_num_bits == 0 {
            break;
        }

        let readable_num_bits = min(chunk_bits, remaining_num_bits);
        let selected_bits = (chunk as u128) & ((1u128 << readable_num_bits) - 1);

        buffer |= selected_bits << buf_num_bits;
        buf_num_bits += readable_num_bits;
        remaining_num_bits -= readable_num_bits;

        while buf_num_bits >= 8 {
            bytes[byte_offset] = buffer as u8;

            buffer >>= 8;
            buf_num_bits -= 8;
            byte_offset += 1;
        }
    }

    bytes
}

/// Width of the chunk at `chunk_idx`, when a `num_bits`-bit value is split into `chunk_bits`-bit chunks.
#[inline(always)]
pub fn chunk_width_at(chunk_idx: usize, num_bits: usize, chunk_bits: usize) -> usize {
    min(chunk_bits, num_bits.saturating_sub(chunk_idx * chunk_bits))
}
