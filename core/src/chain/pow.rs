//! Proof-of-work: the compact `bits` target encoding, difficulty
//! retargeting, and cumulative-work accounting (§4.1, §8).
//!
//! `bits` is Bitcoin's "nBits" compact representation of a 256-bit
//! target: one exponent byte plus a 3-byte mantissa. A header's hash,
//! interpreted as a little-endian 256-bit integer, must be `<= target`.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::crypto::hash::Hash256;

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u32 = 2016;

/// Target number of seconds the retarget interval should have taken.
pub const TARGET_TIMESPAN: u32 = RETARGET_INTERVAL * 10 * 60; // two weeks

/// Decodes the compact `bits` field into a full 256-bit target.
pub fn bits_to_target(bits: u32) -> BigUint {
    let exponent = (bits >> 24) as u32;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 3 {
        BigUint::from(mantissa) >> (8 * (3 - exponent))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Encodes a 256-bit target back into the compact `bits` representation,
/// used after computing a new target at a retarget boundary.
pub fn target_to_bits(target: &BigUint) -> u32 {
    let bytes = target.to_bytes_be();
    let mut bytes = bytes;
    // Strip leading zero bytes; an empty target encodes as zero.
    while bytes.first() == Some(&0) {
        bytes.remove(0);
    }
    if bytes.is_empty() {
        return 0;
    }
    let mut exponent = bytes.len() as u32;
    // The mantissa is interpreted as a signed magnitude; if the high bit
    // of the first byte is set, shift right and bump the exponent so it
    // doesn't appear negative.
    let mut mantissa_bytes = if bytes[0] & 0x80 != 0 {
        let mut padded = vec![0u8];
        padded.extend_from_slice(&bytes);
        exponent += 1;
        padded
    } else {
        bytes
    };
    mantissa_bytes.truncate(3);
    while mantissa_bytes.len() < 3 {
        mantissa_bytes.push(0);
    }
    let mantissa = ((mantissa_bytes[0] as u32) << 16)
        | ((mantissa_bytes[1] as u32) << 8)
        | (mantissa_bytes[2] as u32);
    (exponent << 24) | mantissa
}

/// `true` if `hash`, read as a little-endian 256-bit integer, is `<=`
/// the target implied by `bits` — the proof-of-work check in §4.1 step 2
/// and the invariant tested in §8.
pub fn hash_meets_target(hash: &Hash256, bits: u32) -> bool {
    let value = BigUint::from_bytes_le(hash);
    let target = bits_to_target(bits);
    value <= target
}

/// Work contributed by a single block at `bits`, `2^256 / (target + 1)`
/// per §4.1 step 5. Used to accumulate `cumulative_work`.
pub fn work_for_bits(bits: u32) -> BigUint {
    let target = bits_to_target(bits);
    if target.is_zero() {
        return BigUint::zero();
    }
    let numerator = BigUint::one() << 256;
    numerator / (target + BigUint::one())
}

/// Serializes cumulative work as the 32-byte little-endian integer used
/// in `headers.dat` records (§6).
pub fn work_to_bytes(work: &BigUint) -> [u8; 32] {
    let mut bytes = work.to_bytes_le();
    bytes.resize(32, 0);
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[..32]);
    out
}

pub fn work_from_bytes(bytes: &[u8; 32]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

/// Computes the next `bits` value at a retarget boundary given the
/// timespan actually elapsed over the last [`RETARGET_INTERVAL`] blocks
/// and the previous block's `bits`. Clamps the adjustment to within 4x
/// either direction, matching Bitcoin's consensus rule, and never allows
/// the target to exceed the network's maximum (genesis) target.
pub fn next_work_required(
    prev_bits: u32,
    actual_timespan_secs: i64,
    max_target: &BigUint,
) -> u32 {
    let min_timespan = (TARGET_TIMESPAN / 4) as i64;
    let max_timespan = (TARGET_TIMESPAN as i64) * 4;
    let clamped = actual_timespan_secs.clamp(min_timespan, max_timespan) as u64;

    let prev_target = bits_to_target(prev_bits);
    let mut new_target = (prev_target * BigUint::from(clamped)) / BigUint::from(TARGET_TIMESPAN);
    if &new_target > max_target {
        new_target = max_target.clone();
    }
    target_to_bits(&new_target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_to_target_round_trips_through_target_to_bits() {
        // Canonical mainnet genesis difficulty.
        let bits = 0x1d00ffff;
        let target = bits_to_target(bits);
        assert_eq!(target_to_bits(&target), bits);
    }

    #[test]
    fn higher_bits_exponent_means_larger_target() {
        let easy = bits_to_target(0x1e00ffff);
        let hard = bits_to_target(0x1d00ffff);
        assert!(easy > hard);
    }

    #[test]
    fn hash_meets_target_rejects_hash_above_target() {
        // A hash that is numerically the maximum possible value will
        // exceed any realistic target.
        let hash = [0xFFu8; 32];
        assert!(!hash_meets_target(&hash, 0x1d00ffff));
    }

    #[test]
    fn hash_meets_target_accepts_zero_hash() {
        let hash = [0u8; 32];
        assert!(hash_meets_target(&hash, 0x1d00ffff));
    }

    #[test]
    fn work_for_bits_is_monotonic_in_difficulty() {
        let easy = work_for_bits(0x1e00ffff);
        let hard = work_for_bits(0x1d00ffff);
        assert!(hard > easy, "lower target (harder) must contribute more work");
    }

    #[test]
    fn work_bytes_round_trip() {
        let work = work_for_bits(0x1d00ffff) * BigUint::from(1000u32);
        let bytes = work_to_bytes(&work);
        assert_eq!(work_from_bytes(&bytes), work);
    }

    #[test]
    fn retarget_halves_difficulty_when_blocks_took_twice_as_long() {
        let max_target = bits_to_target(0x1d00ffff);
        let prev_bits = 0x1c00ffff; // harder than max_target
        let doubled_timespan = (TARGET_TIMESPAN as i64) * 2;
        let new_bits = next_work_required(prev_bits, doubled_timespan, &max_target);
        let new_target = bits_to_target(new_bits);
        let prev_target = bits_to_target(prev_bits);
        assert!(new_target > prev_target);
    }

    #[test]
    fn retarget_never_exceeds_max_target() {
        let max_target = bits_to_target(0x1d00ffff);
        // Blocks mined far too slowly would want an even easier target
        // than max_target allows.
        let huge_timespan = (TARGET_TIMESPAN as i64) * 100;
        let new_bits = next_work_required(0x1d00ffff, huge_timespan, &max_target);
        assert!(bits_to_target(new_bits) <= max_target);
    }
}
