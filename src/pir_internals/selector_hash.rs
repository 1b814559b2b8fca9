use super::{branch_opt_util, error::PirEncodeError, params};
use turboshake::TurboShake128;

/// Largest hypercube a 32-bit hash index can address.
pub const MAX_HYPERCUBE_WIDTH: usize = 1usize << 32;

/// Keyed, deterministic mapping of selectors onto cells `0..width` of the query hypercube.
///
/// The key comes from the query artifact, so client and responder derive the same placement for a selector without further
/// coordination. No state is kept between calls.
#[derive(Clone, Debug)]
pub struct SelectorHasher {
    key: Vec<u8>,
    width: usize,
}

/// TurboSHAKE128 over `len(key) || key || message`, first 8 squeezed bytes read as a little-endian word.
#[inline]
fn keyed_digest(key: &[u8], message: &[u8]) -> u64 {
    let mut hasher = TurboShake128::default();
    hasher.absorb(&(key.len() as u64).to_le_bytes());
    hasher.absorb(key);
    hasher.absorb(message);
    hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

    let mut digest = [0u8; params::SELECTOR_DIGEST_BYTE_LEN];
    hasher.squeeze(&mut digest);

    u64::from_le_bytes(digest)
}

impl SelectorHasher {
    pub fn new(key: impl Into<Vec<u8>>, width: usize) -> Result<Self, PirEncodeError> {
        if branch_opt_util::unlikely(width == 0 || width > MAX_HYPERCUBE_WIDTH) {
            return Err(PirEncodeError::MalformedQueryVector(format!("hypercube width must be in 1..=2^32, found {}", width)));
        }

        Ok(Self { key: key.into(), width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Maps a selector to its cell, by multiply-shift range reduction of the keyed digest.
    #[inline]
    pub fn hash(&self, selector: &str) -> u32 {
        let digest = keyed_digest(&self.key, selector.as_bytes());
        ((digest as u128 * self.width as u128) >> 64) as u32
    }
}

/// 32-bit digest of a selector under a fixed key; what gets embedded into a record's partitions in place of a string selector.
pub fn embedded_selector_digest(selector: &str) -> i32 {
    keyed_digest(params::EMBEDDED_SELECTOR_HASH_KEY, selector.as_bytes()) as u32 as i32
}
