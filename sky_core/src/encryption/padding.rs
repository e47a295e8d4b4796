//! Size padding for encrypted files.
//!
//! Sizes are grouped in tiers. Tier `n` covers sizes up to `2^n * 80 KiB` and
//! pads to a multiple of `2^n * 4 KiB`, so the overhead stays below 5% while
//! an observer only learns which block a file falls into.

const KIB: u128 = 1 << 10;

/// Tiers beyond this are never searched.
const MAX_TIERS: u32 = 53;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PaddingError {
    #[error("could not pad file size {0}, overflow detected")]
    Overflow(u64),
}

/// Block size of the smallest tier whose ceiling fits `size`.
fn padding_block(size: u64) -> Option<u128> {
    let size = u128::from(size);
    (0..MAX_TIERS)
        .map(|n| 1u128 << n)
        .find(|scale| size <= scale * 80 * KIB)
        .map(|scale| scale * 4 * KIB)
}

/// Rounds `size` up to the padding block of its tier.
pub fn pad_file_size(size: u64) -> Result<u64, PaddingError> {
    let block = padding_block(size).ok_or(PaddingError::Overflow(size))?;
    let size_wide = u128::from(size);
    let padded = size_wide.div_ceil(block) * block;
    u64::try_from(padded).map_err(|_| PaddingError::Overflow(size))
}

/// Whether `size` is already a multiple of its tier's padding block.
pub fn check_padded_block(size: u64) -> bool {
    padding_block(size).is_some_and(|block| u128::from(size) % block == 0)
}
