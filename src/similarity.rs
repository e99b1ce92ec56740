//! Perceptual-hash similarity under Hamming distance.
//!
//! The remote registry does not yet expose a per-result distance, so the
//! threshold is a configured constant rather than something a caller tunes
//! per query. It is still a runtime value (not a compiled-in literal) so a
//! future registry protocol revision can make it server-controlled without
//! an API break.

/// Default Hamming-distance threshold under which two PHash values are
/// considered a perceptual match.
pub const DEFAULT_THRESHOLD: u32 = 4;

/// Number of differing bits between two 64-bit perceptual hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// True when `a` and `b` are within `threshold` bits of each other.
pub fn similar(a: u64, b: u64, threshold: u32) -> bool {
    hamming_distance(a, b) <= threshold
}
