//! Deterministic RNG utilities for reproducible tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Random vector with every component in `[-extent, extent)`.
pub fn random_offset(rng: &mut impl Rng, extent: f32) -> nalgebra::Vector3<f32> {
    nalgebra::Vector3::from_fn(|_, _| (rng.r#gen::<f32>() * 2.0 - 1.0) * extent)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
