//! Deterministic utilities for reproducible training
//!
//! Seed derivation for independent random streams and tie-breaking logic,
//! so that forests are identical across runs and thread schedules.

/// Derive the seed of stream `stream` from a base seed
///
/// SplitMix64 finalizer over `base + golden * (stream + 1)`. Neighbouring
/// streams get statistically unrelated seeds.
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

    let mut z = base.wrapping_add(GOLDEN.wrapping_mul(stream.wrapping_add(1)));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Map an `f32` to a `u32` whose unsigned order matches the float order
///
/// NaN is not expected here; callers only pass finite thresholds.
pub fn ordered_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Deterministic tie-breaker for split selection
/// Returns consistent ordering based on (feature_idx, threshold)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold_key: u32,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: f32) -> Self {
        Self {
            feature_idx,
            threshold_key: ordered_bits(threshold),
        }
    }
}
