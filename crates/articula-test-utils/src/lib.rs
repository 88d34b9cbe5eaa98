//! Shared test fixtures and utilities for articula crates.
//!
//! Provides deterministic RNG setup, ready-made skeletons, a random tree
//! builder for property tests, and log output for test runs.

pub mod logging;
pub mod rng;
pub mod skeleton;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use logging::init_tracing;
pub use rng::{random_offset, seeded_rng};
pub use skeleton::{RandomTree, Skeleton, humanoid, random_tree, two_bone_arm};
