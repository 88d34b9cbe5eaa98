//! Per-node attachments: effectors, constraints and poles.
//!
//! Attachments hang off a [`Node`](crate::tree::Node) and are shared with
//! flattened solver snapshots through [`Shared`](crate::types::Shared)
//! handles. Constraints and poles are payloads only; they are read by the
//! iterative solve and never interpreted here.

use nalgebra::{UnitQuaternion, UnitVector3, Vector3};

// ---------------------------------------------------------------------------
// Effector
// ---------------------------------------------------------------------------

/// Feature flags that change how an effector's target is blended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EffectorFeatures {
    /// Blend the pull distance (not just the position) when `weight < 1`,
    /// pinning the blended target to the chain base.
    pub weight_nlerp: bool,
}

/// A target a chain tip should reach.
#[derive(Debug, Clone, PartialEq)]
pub struct Effector {
    /// Authored target position in world space.
    pub target_position: Vector3<f32>,
    /// Blend factor between the tip's current position (0) and the target (1).
    pub weight: f32,
    /// Number of ancestors pulled by this effector. Zero means every
    /// ancestor up to the tree root.
    pub chain_length: u32,
    /// Blend features.
    pub features: EffectorFeatures,
    /// Target the iterative solve pulls toward. Written by the update pass.
    pub actual_target: Vector3<f32>,
}

impl Default for Effector {
    fn default() -> Self {
        Self {
            target_position: Vector3::zeros(),
            weight: 1.0,
            chain_length: 0,
            features: EffectorFeatures::default(),
            actual_target: Vector3::zeros(),
        }
    }
}

impl Effector {
    /// Create a full-weight effector aimed at `target_position`.
    pub fn new(target_position: Vector3<f32>) -> Self {
        Self {
            target_position,
            actual_target: target_position,
            ..Self::default()
        }
    }

    /// Set the blend weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Set how many ancestors this effector pulls.
    #[must_use]
    pub fn with_chain_length(mut self, chain_length: u32) -> Self {
        self.chain_length = chain_length;
        self
    }

    /// Enable nlerp weight blending.
    #[must_use]
    pub fn with_nlerp(mut self) -> Self {
        self.features.weight_nlerp = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Constraint
// ---------------------------------------------------------------------------

/// Rotation restriction applied by the iterative solve.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Node keeps a fixed local rotation.
    Stiff { rotation: UnitQuaternion<f32> },
    /// Rotation about a single axis within `[min_angle, max_angle]` (rad).
    Hinge {
        axis: UnitVector3<f32>,
        min_angle: f32,
        max_angle: f32,
    },
    /// Rotation within a cone of half-angle `max_angle` (rad) around `axis`.
    Cone {
        axis: UnitVector3<f32>,
        max_angle: f32,
    },
}

// ---------------------------------------------------------------------------
// Pole
// ---------------------------------------------------------------------------

/// Bias point that orients the plane a chain bends in.
#[derive(Debug, Clone, PartialEq)]
pub struct Pole {
    /// Pole position relative to the node it is attached to.
    pub position: Vector3<f32>,
    /// Twist around the base-to-target axis (rad).
    pub angle: f32,
}

impl Default for Pole {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            angle: 0.0,
        }
    }
}
