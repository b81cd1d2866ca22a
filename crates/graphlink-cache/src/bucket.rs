//! Stable identifier bucketing.
//!
//! Maps an entity identifier to a bucket with no randomness, no clock, and
//! no external state, so derived booleans survive process restarts and cache
//! evictions. The fold is the classic shift-based multiply-by-31 string hash
//! over UTF-16 code units, reduced by absolute value modulo the bucket count.

/// Bucket space used by the derived half-range flags.
pub const FLAG_BUCKETS: u32 = 10;

/// Map `id` to a bucket in `[0, limit)`.
///
/// Pure in `id`: repeated calls always return the same bucket. The empty
/// identifier folds to an accumulator of 0 and lands in bucket 0. A `limit`
/// of 0 has no valid range and returns 0.
#[must_use]
pub fn stable_bucket(id: &str, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    let mut acc: i32 = 0;
    for unit in id.encode_utf16() {
        acc = acc
            .wrapping_shl(5)
            .wrapping_sub(acc)
            .wrapping_add(i32::from(unit));
    }
    acc.unsigned_abs() % limit
}

/// Whether `id` falls in the upper half of the canonical bucket space.
///
/// Defined on the same hash as [`in_lower_half`]; the midpoint bucket
/// belongs to neither half, so the two flags are never both true.
#[must_use]
pub fn in_upper_half(id: &str) -> bool {
    stable_bucket(id, FLAG_BUCKETS) > FLAG_BUCKETS / 2
}

/// Whether `id` falls in the lower half of the canonical bucket space.
#[must_use]
pub fn in_lower_half(id: &str) -> bool {
    stable_bucket(id, FLAG_BUCKETS) < FLAG_BUCKETS / 2
}
