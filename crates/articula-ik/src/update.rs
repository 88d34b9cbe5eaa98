//! Per-chain solver update: effector target blending.
//!
//! Before each iterative solve the actual target of every chain tip is
//! recomputed from the authored target, the tip's current position and the
//! effector weight. Only `Effector::actual_target` is written; transforms
//! are left alone.

use nalgebra::Vector3;
use tracing::{trace, warn};

use articula_core::{Effector, UpdateConfig};

use crate::ntf::Ntf;
use crate::ntf_list::NtfList;

/// Runs the update stage over flattened chains.
#[derive(Debug, Clone, Default)]
pub struct UpdatePass {
    config: UpdateConfig,
}

impl UpdatePass {
    /// Create a pass with the given configuration.
    pub const fn new(config: UpdateConfig) -> Self {
        Self { config }
    }

    /// Create a pass with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(UpdateConfig::default())
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Recompute `actual_target` for every tip of `ntf` and return how many
    /// effectors were written.
    ///
    /// Tips are the post-order entries with no descendants. The blend base
    /// of a tip is its parent within the chain, or the tip itself when the
    /// chain is a single node.
    ///
    /// # Panics
    ///
    /// Panics if the chain's node data is mutably borrowed.
    pub fn update_effector_targets(&self, ntf: &Ntf) -> usize {
        let slots = ntf.node_data().borrow();
        let mut written = 0;

        for entry in ntf.indices().iter().filter(|e| e.post_child_count == 0) {
            let tip = &slots[entry.post as usize];
            let Some(handle) = &tip.effector else {
                trace!(guid = tip.guid, "chain tip has no effector");
                continue;
            };
            let Ok(mut effector) = handle.try_borrow_mut() else {
                warn!(guid = tip.guid, "effector is borrowed elsewhere, target not updated");
                continue;
            };

            let base = tip.parent.map_or(tip, |parent| &slots[parent]);
            let blended = self.blend_target(&effector, tip.position(), base.position());
            effector.actual_target = blended;
            written += 1;
        }

        written
    }

    /// Hook for recomputing `dist_to_parent` ahead of the iterative solve.
    /// Currently leaves the chain untouched.
    pub fn update_node_distances(&self, _ntf: &Ntf) {}

    /// Run the whole stage over every chain in `list`, returning the number
    /// of effectors written.
    pub fn update_list(&self, list: &NtfList) -> usize {
        list.iter()
            .map(|ntf| {
                let written = self.update_effector_targets(ntf);
                self.update_node_distances(ntf);
                written
            })
            .sum()
    }

    /// Blend an effector's authored target with the tip's `current`
    /// position.
    ///
    /// The result is `current + (target - current) * weight`, with a weight of
    /// exactly 1 returning the authored target unchanged. The weight is not
    /// clamped: values above 1 overshoot the target and negative values
    /// point away from it. For `weight < 1` with nlerp enabled, the result is
    /// then pushed along the direction from `base` so its distance from
    /// `base` is the weighted mix of the target's and the tip's distances. A
    /// direction shorter than `min_direction_length` leaves the lerped value
    /// in place.
    #[allow(clippy::float_cmp)]
    pub fn blend_target(
        &self,
        effector: &Effector,
        current: Vector3<f32>,
        base: Vector3<f32>,
    ) -> Vector3<f32> {
        let weight = effector.weight;
        let target = effector.target_position;
        if weight == 1.0 {
            return target;
        }

        let lerped = current + (target - current) * weight;
        if !(effector.features.weight_nlerp && weight < 1.0) {
            return lerped;
        }

        let dist_target = (target - base).norm();
        let dist_effector = (current - base).norm();
        let distance = dist_target * weight + dist_effector * (1.0 - weight);

        match (lerped - base).try_normalize(self.config.min_direction_length) {
            Some(direction) => base + direction * distance,
            None => {
                trace!("nlerp direction is degenerate, keeping lerped target");
                lerped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use articula_core::{NodeId, NodeTree, Shared};

    use crate::marked::MarkedNodes;

    /// Root at the origin with one child tip at `tip`, carrying `effector`.
    fn arm(tip: Vector3<f32>, effector: Effector) -> (NodeTree, NodeId, Shared<Effector>) {
        let mut tree = NodeTree::new();
        let root = tree.create_node(0);
        let tip_id = tree.create_child(root, 1).unwrap();
        let node = tree.node_mut(tip_id).unwrap();
        node.position = tip;
        let handle = node.attach_effector(effector);
        (tree, root, handle)
    }

    fn flatten(tree: &NodeTree, root: NodeId) -> Ntf {
        let marked = MarkedNodes::from_effectors(tree, root).unwrap();
        Ntf::new(tree, root, &marked).unwrap()
    }

    #[test]
    fn full_weight_is_exact_target() {
        let pass = UpdatePass::with_defaults();
        let target = Vector3::new(0.1, 0.2, 0.3);
        let effector = Effector::new(target).with_nlerp();
        let out = pass.blend_target(&effector, Vector3::new(7.0, -3.0, 1.0), Vector3::zeros());
        assert_eq!(out, target);
    }

    #[test]
    fn zero_weight_is_exact_current() {
        let pass = UpdatePass::with_defaults();
        let current = Vector3::new(0.7, -0.3, 0.9);
        let effector = Effector::new(Vector3::new(5.0, 5.0, 5.0)).with_weight(0.0);
        assert_eq!(pass.blend_target(&effector, current, Vector3::zeros()), current);
    }

    #[test]
    fn half_weight_is_midpoint() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(2.0, 4.0, -2.0)).with_weight(0.5);
        let out = pass.blend_target(&effector, Vector3::zeros(), Vector3::zeros());
        assert_relative_eq!(out, Vector3::new(1.0, 2.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn weight_above_one_extrapolates() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(2.0, 0.0, 0.0)).with_weight(1.5);
        let out = pass.blend_target(&effector, Vector3::zeros(), Vector3::zeros());
        assert_relative_eq!(out, Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn negative_weight_points_away_from_target() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(1.0, 2.0, 0.0)).with_weight(-1.0);
        let out = pass.blend_target(&effector, Vector3::new(1.0, 1.0, 0.0), Vector3::zeros());
        assert_relative_eq!(out, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn nlerp_is_skipped_above_full_weight() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(0.0, 4.0, 0.0))
            .with_weight(2.0)
            .with_nlerp();
        let out = pass.blend_target(&effector, Vector3::new(2.0, 0.0, 0.0), Vector3::zeros());
        // Plain extrapolation: (2, 0, 0) + 2 * (-2, 4, 0).
        assert_relative_eq!(out, Vector3::new(-2.0, 8.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn nlerp_blends_distance_along_axis() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(4.0, 0.0, 0.0))
            .with_weight(0.5)
            .with_nlerp();
        let out = pass.blend_target(&effector, Vector3::new(2.0, 0.0, 0.0), Vector3::zeros());
        assert_relative_eq!(out, Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn nlerp_keeps_lerp_direction() {
        let pass = UpdatePass::with_defaults();
        let effector = Effector::new(Vector3::new(0.0, 4.0, 0.0))
            .with_weight(0.5)
            .with_nlerp();
        let out = pass.blend_target(&effector, Vector3::new(2.0, 0.0, 0.0), Vector3::zeros());
        // lerp gives (1, 2, 0); blended distance is 3.
        assert_relative_eq!(out.norm(), 3.0, epsilon = 1e-5);
        assert_relative_eq!(out.y / out.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(out.z, 0.0);
    }

    #[test]
    fn nlerp_is_anchored_at_base() {
        let pass = UpdatePass::with_defaults();
        let base = Vector3::new(10.0, 0.0, 0.0);
        let effector = Effector::new(Vector3::new(14.0, 0.0, 0.0))
            .with_weight(0.5)
            .with_nlerp();
        let out = pass.blend_target(&effector, Vector3::new(12.0, 0.0, 0.0), base);
        assert_relative_eq!(out, Vector3::new(13.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn degenerate_nlerp_direction_keeps_lerped_value() {
        let pass = UpdatePass::with_defaults();
        let base = Vector3::new(1.0, 1.0, 1.0);
        let effector = Effector::new(base).with_weight(0.5).with_nlerp();
        // Tip and target both sit on the base.
        assert_eq!(pass.blend_target(&effector, base, base), base);
    }

    #[test]
    fn update_writes_actual_target_through_chain() {
        let effector = Effector::new(Vector3::new(4.0, 0.0, 0.0))
            .with_weight(0.5)
            .with_nlerp();
        let (tree, root, handle) = arm(Vector3::new(2.0, 0.0, 0.0), effector);
        let ntf = flatten(&tree, root);

        let written = UpdatePass::with_defaults().update_effector_targets(&ntf);
        assert_eq!(written, 1);
        assert_relative_eq!(
            handle.borrow().actual_target,
            Vector3::new(3.0, 0.0, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn update_leaves_transforms_alone() {
        let effector = Effector::new(Vector3::new(0.0, 5.0, 0.0)).with_weight(0.25);
        let (tree, root, _handle) = arm(Vector3::new(1.0, 0.0, 0.0), effector);
        let ntf = flatten(&tree, root);
        let before: Vec<_> = ntf.node_data().borrow().iter().map(|d| d.world).collect();

        UpdatePass::with_defaults().update_effector_targets(&ntf);
        let after: Vec<_> = ntf.node_data().borrow().iter().map(|d| d.world).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn tips_without_effectors_are_skipped() {
        let mut tree = NodeTree::new();
        let root = tree.create_node(0);
        tree.create_child(root, 1).unwrap();
        let marked: MarkedNodes = [0, 1].into_iter().collect();
        let ntf = Ntf::new(&tree, root, &marked).unwrap();
        assert_eq!(UpdatePass::with_defaults().update_effector_targets(&ntf), 0);
    }

    #[test]
    fn borrowed_effector_is_skipped() {
        let effector = Effector::new(Vector3::new(4.0, 0.0, 0.0)).with_weight(0.5);
        let (tree, root, handle) = arm(Vector3::new(2.0, 0.0, 0.0), effector);
        let ntf = flatten(&tree, root);

        let guard = handle.borrow_mut();
        assert_eq!(UpdatePass::with_defaults().update_effector_targets(&ntf), 0);
        drop(guard);
        assert_eq!(handle.borrow().actual_target, Vector3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn single_node_chain_uses_tip_as_base() {
        let mut tree = NodeTree::new();
        let root = tree.create_node(0);
        tree.node_mut(root).unwrap().position = Vector3::new(1.0, 0.0, 0.0);
        let handle = tree.node_mut(root).unwrap().attach_effector(
            Effector::new(Vector3::new(3.0, 0.0, 0.0))
                .with_weight(0.5)
                .with_nlerp(),
        );
        let ntf = flatten(&tree, root);
        assert_eq!(ntf.node_count(), 1);

        UpdatePass::with_defaults().update_effector_targets(&ntf);
        assert_relative_eq!(
            handle.borrow().actual_target,
            Vector3::new(2.0, 0.0, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn update_list_covers_every_chain() {
        let mut tree = NodeTree::new();
        let root = tree.create_node(0);
        let mut handles = Vec::new();
        for (arm, tip) in [(1, 11), (2, 21)] {
            let arm = tree.create_child(root, arm).unwrap();
            let tip = tree.create_child(arm, tip).unwrap();
            handles.push(tree.node_mut(tip).unwrap().attach_effector(
                Effector::new(Vector3::new(0.0, 1.0, 0.0))
                    .with_weight(0.0)
                    .with_chain_length(1),
            ));
        }
        let mut list = NtfList::new();
        list.fill(&tree, root).unwrap();
        assert_eq!(list.len(), 2);

        assert_eq!(UpdatePass::with_defaults().update_list(&list), 2);
        for handle in handles {
            assert_eq!(handle.borrow().actual_target, Vector3::zeros());
        }
    }

    #[test]
    fn node_distances_hook_is_inert() {
        let (tree, root, _handle) = arm(Vector3::new(1.0, 0.0, 0.0), Effector::default());
        let ntf = flatten(&tree, root);
        let before: Vec<f32> = ntf.node_data().borrow().iter().map(|d| d.dist_to_parent).collect();
        UpdatePass::with_defaults().update_node_distances(&ntf);
        let after: Vec<f32> = ntf.node_data().borrow().iter().map(|d| d.dist_to_parent).collect();
        assert_eq!(before, after);
    }
}
