//! Analytic two-bone solve.
//!
//! Works on a chain of exactly three nodes in a line (base, mid, tip) whose
//! tip carries an effector. The mid joint is placed with the law of cosines
//! in the plane spanned by the target and a bend hint: the mid node's pole
//! when it has one, otherwise the current mid position. Targets out of reach
//! stretch both bones straight toward the target.
//!
//! ```text
//!   target *--.__  lower
//!           \     --.___ mid (solved)
//!            \      _-
//!    distance \   _-
//!              \-    upper
//!            base
//! ```

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use tracing::debug;

use articula_core::{SolveError, TwoBoneConfig};

use crate::node_data::NodeDataBlock;
use crate::ntf::Ntf;

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// The tip now sits on the target.
    Reached,
    /// The target is out of reach; the tip got as close as the bones allow.
    Stretched,
    /// The target sits on the base; nothing moved.
    Unchanged,
}

/// Two-bone solver bound to one flattened chain.
///
/// Holds a reference to the chain's node data, so the block stays alive for
/// as long as the solver does.
#[derive(Debug)]
pub struct TwoBoneSolver {
    config: TwoBoneConfig,
    node_data: NodeDataBlock,
    base: usize,
    mid: usize,
    tip: usize,
}

impl TwoBoneSolver {
    /// Bind to `ntf`, checking that it has the two-bone shape.
    ///
    /// # Errors
    ///
    /// - [`SolveError::TipCount`] unless the chain has exactly one tip.
    /// - [`SolveError::TooFewBones`] / [`SolveError::TooManyBones`] unless the
    ///   tip's grandparent is the chain root.
    /// - [`SolveError::MissingEffector`] if the tip has no effector.
    /// - [`SolveError::ZeroLengthBone`] if either bone is shorter than
    ///   `config.min_length`.
    pub fn new(ntf: &Ntf, config: TwoBoneConfig) -> Result<Self, SolveError> {
        let tips: Vec<usize> = ntf
            .indices()
            .iter()
            .filter(|e| e.post_child_count == 0)
            .map(|e| e.post as usize)
            .collect();
        let tip = match tips.as_slice() {
            [tip] => *tip,
            other => return Err(SolveError::TipCount(other.len())),
        };

        let slots = ntf.node_data().borrow();
        let tip_guid = slots[tip].guid;
        let mid = slots[tip]
            .parent
            .ok_or(SolveError::TooFewBones { tip: tip_guid })?;
        let base = slots[mid]
            .parent
            .ok_or(SolveError::TooFewBones { tip: tip_guid })?;
        if slots[base].parent.is_some() {
            return Err(SolveError::TooManyBones { tip: tip_guid });
        }
        if slots[tip].effector.is_none() {
            return Err(SolveError::MissingEffector(tip_guid));
        }
        for bone in [mid, tip] {
            if slots[bone].local.translation.vector.norm() <= config.min_length {
                return Err(SolveError::ZeroLengthBone(slots[bone].guid));
            }
        }
        drop(slots);

        Ok(Self {
            config,
            node_data: ntf.share_node_data(),
            base,
            mid,
            tip,
        })
    }

    /// Bind with default tolerances.
    pub fn with_defaults(ntf: &Ntf) -> Result<Self, SolveError> {
        Self::new(ntf, TwoBoneConfig::default())
    }

    /// Slots touched by a solve, base first.
    pub fn node_slots(&self, skip_base: bool) -> impl Iterator<Item = usize> + '_ {
        let base = (!skip_base).then_some(self.base);
        base.into_iter().chain([self.mid, self.tip])
    }

    pub fn effector_slot(&self) -> usize {
        self.tip
    }

    /// Base and mid slots of the upper bone.
    pub fn first_segment(&self) -> (usize, usize) {
        (self.base, self.mid)
    }

    /// Move the mid and tip joints toward the effector's actual target.
    ///
    /// Only world positions and the matching local transforms of the mid and
    /// tip slots change; rotations are left to later stages. Bone lengths are
    /// preserved.
    ///
    /// # Errors
    ///
    /// [`SolveError::MissingEffector`] if the effector was removed from the
    /// snapshot, [`SolveError::EffectorBusy`] if it is mutably borrowed.
    ///
    /// # Panics
    ///
    /// Panics if the node data is already borrowed.
    pub fn solve(&self) -> Result<Reach, SolveError> {
        let mut slots = self.node_data.borrow_mut();
        let tip_guid = slots[self.tip].guid;
        let target = {
            let handle = slots[self.tip]
                .effector
                .as_ref()
                .ok_or(SolveError::MissingEffector(tip_guid))?;
            let effector = handle
                .try_borrow()
                .map_err(|_| SolveError::EffectorBusy(tip_guid))?;
            effector.actual_target
        };

        let base = slots[self.base].position();
        let mid = slots[self.mid].position();
        let tip = slots[self.tip].position();
        let hint = slots[self.mid]
            .pole
            .as_ref()
            .and_then(|pole| pole.try_borrow().ok().map(|p| Point3::from(p.position)))
            .map_or(mid, |local| slots[self.mid].world.transform_point(&local).coords);

        let upper = (mid - base).norm();
        let lower = (tip - mid).norm();
        let eps = self.config.min_length;

        let to_target = target - base;
        let distance = to_target.norm();
        let Some(direction) = to_target.try_normalize(eps) else {
            debug!(tip = tip_guid, "target sits on the chain base");
            return Ok(Reach::Unchanged);
        };

        let (new_mid, outcome) = if distance < upper + lower {
            let cos_base = ((upper * upper + distance * distance - lower * lower)
                / (2.0 * upper * distance))
                .clamp(-1.0, 1.0);
            let axis = Unit::try_new((hint - base).cross(&to_target), eps)
                .or_else(|| Unit::try_new((tip - base).cross(&to_target), eps))
                .unwrap_or_else(|| perpendicular(&direction));
            let bend = UnitQuaternion::from_axis_angle(&axis, -cos_base.acos());
            let outcome = if distance >= (upper - lower).abs() {
                Reach::Reached
            } else {
                Reach::Stretched
            };
            (base + bend * direction * upper, outcome)
        } else {
            (base + direction * upper, Reach::Stretched)
        };
        let lower_direction = (target - new_mid).try_normalize(eps).unwrap_or(direction);
        let new_tip = new_mid + lower_direction * lower;

        slots[self.mid].world.translation.vector = new_mid;
        slots[self.tip].world.translation.vector = new_tip;
        let mid_local = slots[self.base].world.inverse() * slots[self.mid].world;
        slots[self.mid].local = mid_local;
        let tip_local = slots[self.mid].world.inverse() * slots[self.tip].world;
        slots[self.tip].local = tip_local;

        debug!(tip = tip_guid, ?outcome, "two-bone solve");
        Ok(outcome)
    }
}

/// Some unit vector perpendicular to `v`.
fn perpendicular(v: &Vector3<f32>) -> Unit<Vector3<f32>> {
    let helper = if v.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    Unit::new_normalize(v.cross(&helper))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
