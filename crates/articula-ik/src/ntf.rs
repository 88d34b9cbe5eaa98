//! Flattened node tree (NTF).
//!
//! An [`Ntf`] is the contiguous form of one chain: the subtree root plus
//! every node below it that is marked or leads to a marked node, stored
//! once in a shared
//! [`NodeDataBlock`], plus an [`IndexEntry`] per traversal position that
//! maps the position to a slot under both pre-order (parents before
//! children) and post-order (children before parents).
//!
//! Slots are laid out in pre-order, so `indices[i].pre == i`. Each entry
//! also carries the number of descendants of the node visited there: in
//! pre-order they occupy the positions immediately after it, in post-order
//! the positions immediately before it.
//!
//! ```text
//!        a            pre:  a b d e c     post: d e b c a
//!       / \           pre_child_count:    4 2 0 0 0
//!      b   c          post_child_count:   0 0 2 0 4
//!     / \
//!    d   e
//! ```

use std::cell::Ref;
use std::collections::HashSet;

use nalgebra::Isometry3;
use tracing::debug;

use articula_core::{FlattenError, Guid, Node, NodeId, NodeTree};

use crate::marked::MarkedNodes;
use crate::node_data::{NodeData, NodeDataBlock};

/// Slot offsets and subtree sizes at one traversal position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// Slot of the node visited at this position in pre-order.
    pub pre: u32,
    /// Descendants of that node, which follow it in pre-order.
    pub pre_child_count: u32,
    /// Slot of the node visited at this position in post-order.
    pub post: u32,
    /// Descendants of that node, which precede it in post-order.
    pub post_child_count: u32,
}

/// One flattened chain.
#[derive(Debug)]
pub struct Ntf {
    node_data: NodeDataBlock,
    indices: Box<[IndexEntry]>,
}

impl Ntf {
    /// Flatten the chain rooted at `root`.
    ///
    /// The root is always included. Below it a node is included when it is
    /// marked or is an ancestor of a marked node, so unmarked joints that
    /// connect marked ones are kept and unmarked leaves are dropped. Sizes
    /// are counted first and every buffer is reserved exactly once, so a
    /// failure leaves nothing behind.
    ///
    /// # Errors
    ///
    /// - [`FlattenError::StaleRoot`] if `root` is not a live node.
    /// - [`FlattenError::EmptyChain`] if neither `root` nor any node below it
    ///   is marked.
    /// - [`FlattenError::OutOfMemory`] if a buffer cannot be reserved.
    /// - [`FlattenError::TooManyNodes`] if the chain cannot be indexed by `u32`.
    pub fn new(tree: &NodeTree, root: NodeId, marked: &MarkedNodes) -> Result<Self, FlattenError> {
        let root_node = tree.get(root).ok_or(FlattenError::StaleRoot(root))?;
        let root_world = tree
            .world_transform(root)
            .map_err(|_| FlattenError::StaleRoot(root))?;

        let mut included = HashSet::new();
        if !collect_included(tree, root, root_node, marked, &mut included) {
            return Err(FlattenError::EmptyChain {
                root: root_node.guid(),
            });
        }
        // Every included node's parent is included, so this is the chain size.
        let node_count = included.len();
        if u32::try_from(node_count).is_err() {
            return Err(FlattenError::TooManyNodes(node_count));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(node_count)?;
        let mut descendants = Vec::new();
        descendants.try_reserve_exact(node_count)?;
        let mut post = Vec::new();
        post.try_reserve_exact(node_count)?;
        let mut indices = Vec::new();
        indices.try_reserve_exact(node_count)?;

        fill_pre(
            tree,
            Visit {
                id: root,
                node: root_node,
                parent: None,
                world: root_world,
            },
            &included,
            &mut slots,
            &mut descendants,
        );
        fill_post(0, &descendants, &mut post);
        debug_assert_eq!(slots.len(), node_count);
        debug_assert_eq!(post.len(), node_count);

        for (pre, &pre_child_count) in descendants.iter().enumerate() {
            let post_slot = post[pre];
            indices.push(IndexEntry {
                pre: to_index(pre),
                pre_child_count,
                post: to_index(post_slot),
                post_child_count: descendants[post_slot],
            });
        }

        debug!(root = root_node.guid(), node_count, "flattened chain");

        Ok(Self {
            node_data: NodeDataBlock::new(slots),
            indices: indices.into_boxed_slice(),
        })
    }

    /// Number of nodes in the chain.
    pub fn node_count(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[IndexEntry] {
        &self.indices
    }

    pub fn node_data(&self) -> &NodeDataBlock {
        &self.node_data
    }

    /// Add a reference to the node-data block. The storage outlives this
    /// `Ntf` for as long as the returned handle is held.
    pub fn share_node_data(&self) -> NodeDataBlock {
        self.node_data.clone()
    }

    /// Slot of the node at pre-order position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.node_count()`.
    pub fn pre_offset(&self, i: usize) -> usize {
        self.indices[i].pre as usize
    }

    /// Slot of the node at post-order position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.node_count()`.
    pub fn post_offset(&self, i: usize) -> usize {
        self.indices[i].post as usize
    }

    /// # Panics
    ///
    /// Panics if `i >= self.node_count()`.
    pub fn pre_child_count(&self, i: usize) -> u32 {
        self.indices[i].pre_child_count
    }

    /// # Panics
    ///
    /// Panics if `i >= self.node_count()`.
    pub fn post_child_count(&self, i: usize) -> u32 {
        self.indices[i].post_child_count
    }

    /// Node data at pre-order position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.node_count()` or the block is mutably borrowed.
    pub fn pre_node(&self, i: usize) -> Ref<'_, NodeData> {
        let offset = self.pre_offset(i);
        Ref::map(self.node_data.borrow(), |slots| &slots[offset])
    }

    /// Node data at post-order position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.node_count()` or the block is mutably borrowed.
    pub fn post_node(&self, i: usize) -> Ref<'_, NodeData> {
        let offset = self.post_offset(i);
        Ref::map(self.node_data.borrow(), |slots| &slots[offset])
    }

    /// Slot of the chain-internal parent of the node in slot `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= self.node_count()`.
    pub fn parent_of(&self, offset: usize) -> Option<usize> {
        self.node_data.borrow()[offset].parent
    }

    pub fn root_guid(&self) -> Guid {
        self.node_data.borrow()[0].guid
    }

    /// Guids in pre-order.
    pub fn pre_order_guids(&self) -> Vec<Guid> {
        let slots = self.node_data.borrow();
        self.indices.iter().map(|e| slots[e.pre as usize].guid).collect()
    }

    /// Guids in post-order.
    pub fn post_order_guids(&self) -> Vec<Guid> {
        let slots = self.node_data.borrow();
        self.indices.iter().map(|e| slots[e.post as usize].guid).collect()
    }

    /// Largest descendant count of any node, for sizing per-iteration
    /// scratch buffers.
    pub fn find_highest_child_count(&self) -> u32 {
        self.indices
            .iter()
            .map(|e| e.pre_child_count.max(e.post_child_count))
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Construction passes
// ---------------------------------------------------------------------------

struct Visit<'a> {
    id: NodeId,
    node: &'a Node,
    parent: Option<usize>,
    world: Isometry3<f32>,
}

/// Inserts every node of the subtree at `id` that is marked or has a marked
/// descendant, and returns whether `id` itself qualifies.
fn collect_included(
    tree: &NodeTree,
    id: NodeId,
    node: &Node,
    marked: &MarkedNodes,
    included: &mut HashSet<NodeId>,
) -> bool {
    let mut keep = marked.contains(node.guid());
    for (_, child_id) in node.children() {
        if let Some(child) = tree.get(child_id) {
            keep |= collect_included(tree, child_id, child, marked, included);
        }
    }
    if keep {
        included.insert(id);
    }
    keep
}

/// Chain-internal children of `node`, in guid order.
fn selected_children<'a>(
    tree: &'a NodeTree,
    node: &'a Node,
    included: &'a HashSet<NodeId>,
) -> impl Iterator<Item = (NodeId, &'a Node)> + 'a {
    node.children()
        .filter(|(_, id)| included.contains(id))
        .filter_map(|(_, id)| tree.get(id).map(|child| (id, child)))
}

/// Pushes the subtree in pre-order and returns its descendant count.
fn fill_pre(
    tree: &NodeTree,
    visit: Visit<'_>,
    included: &HashSet<NodeId>,
    slots: &mut Vec<NodeData>,
    descendants: &mut Vec<u32>,
) -> u32 {
    let offset = slots.len();
    let node = visit.node;
    slots.push(NodeData {
        guid: node.guid(),
        node: visit.id,
        parent: visit.parent,
        local: node.local_transform(),
        world: visit.world,
        rotation_weight: node.rotation_weight,
        dist_to_parent: node.dist_to_parent,
        effector: node.effector().cloned(),
        constraint: node.constraint().cloned(),
        pole: node.pole().cloned(),
    });
    descendants.push(0);

    let mut count = 0;
    for (id, child) in selected_children(tree, node, included) {
        let child_visit = Visit {
            id,
            node: child,
            parent: Some(offset),
            world: visit.world * child.local_transform(),
        };
        count += 1 + fill_pre(tree, child_visit, included, slots, descendants);
    }
    descendants[offset] = count;
    count
}

/// Pushes slot offsets in post-order, walking the pre-order layout: the
/// children of the node in slot `offset` start at `offset + 1` and each
/// child's subtree spans `descendants[child] + 1` slots.
fn fill_post(offset: usize, descendants: &[u32], post: &mut Vec<usize>) {
    let end = offset + descendants[offset] as usize;
    let mut child = offset + 1;
    while child <= end {
        fill_post(child, descendants, post);
        child += descendants[child] as usize + 1;
    }
    post.push(offset);
}

/// Callers check that the chain's node count fits in a `u32` first.
#[allow(clippy::cast_possible_truncation)]
const fn to_index(offset: usize) -> u32 {
    offset as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use articula_core::Effector;
    use nalgebra::Vector3;

    /// ```text
    /// 0 -> 1 -> 3 (effector)
    ///        -> 4 (effector)
    ///   -> 2 -> 5 (effector)
    ///   -> 6
    /// ```
    fn branching_tree() -> (NodeTree, Vec<NodeId>) {
        let mut tree = NodeTree::new();
        let n0 = tree.create_node(0);
        let n1 = tree.create_child(n0, 1).unwrap();
        let n2 = tree.create_child(n0, 2).unwrap();
        let n3 = tree.create_child(n1, 3).unwrap();
        let n4 = tree.create_child(n1, 4).unwrap();
        let n5 = tree.create_child(n2, 5).unwrap();
        let n6 = tree.create_child(n0, 6).unwrap();
        for id in [n3, n4, n5] {
            tree.node_mut(id).unwrap().attach_effector(Effector::default());
        }
        (tree, vec![n0, n1, n2, n3, n4, n5, n6])
    }

    #[test]
    fn branching_chain_orders() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();

        assert_eq!(ntf.node_count(), 6);
        assert_eq!(ntf.pre_order_guids(), vec![0, 1, 3, 4, 2, 5]);
        assert_eq!(ntf.post_order_guids(), vec![3, 4, 1, 5, 2, 0]);

        let pre_counts: Vec<u32> = ntf.indices().iter().map(|e| e.pre_child_count).collect();
        let post_counts: Vec<u32> = ntf.indices().iter().map(|e| e.post_child_count).collect();
        assert_eq!(pre_counts, vec![5, 2, 0, 0, 1, 0]);
        assert_eq!(post_counts, vec![0, 0, 2, 0, 1, 5]);
        assert_eq!(ntf.find_highest_child_count(), 5);
    }

    #[test]
    fn slots_are_laid_out_in_pre_order() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        for i in 0..ntf.node_count() {
            assert_eq!(ntf.pre_offset(i), i);
        }
        assert_eq!(ntf.post_offset(0), 2);
        assert_eq!(ntf.post_node(0).guid, 3);
        assert_eq!(ntf.pre_node(4).guid, 2);
    }

    #[test]
    fn parent_offsets_follow_chain() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        // pre-order slots: 0 1 3 4 2 5
        let parents: Vec<Option<usize>> = (0..6).map(|slot| ntf.parent_of(slot)).collect();
        assert_eq!(parents, vec![None, Some(0), Some(1), Some(1), Some(0), Some(4)]);
    }

    #[test]
    fn root_only_when_nothing_below_is_marked() {
        let (tree, ids) = branching_tree();
        let marked: MarkedNodes = [1].into_iter().collect();
        let ntf = Ntf::new(&tree, ids[1], &marked).unwrap();
        assert_eq!(ntf.node_count(), 1);
        assert_eq!(ntf.indices()[0], IndexEntry::default());
        assert_eq!(ntf.find_highest_child_count(), 0);
    }

    #[test]
    fn unmarked_root_without_marked_children_fails() {
        let (tree, ids) = branching_tree();
        let marked: MarkedNodes = [5].into_iter().collect();
        let err = Ntf::new(&tree, ids[1], &marked).unwrap_err();
        assert_eq!(err, FlattenError::EmptyChain { root: 1 });
    }

    #[test]
    fn unmarked_root_with_marked_children_is_included() {
        let (tree, ids) = branching_tree();
        let marked: MarkedNodes = [3, 4].into_iter().collect();
        let ntf = Ntf::new(&tree, ids[1], &marked).unwrap();
        assert_eq!(ntf.pre_order_guids(), vec![1, 3, 4]);
        assert_eq!(ntf.root_guid(), 1);
    }

    #[test]
    fn unmarked_ancestors_of_marked_nodes_are_included() {
        let (tree, ids) = branching_tree();
        // 3 is only reachable through unmarked 1; unmarked leaves 4 and 6 stay out.
        let marked: MarkedNodes = [0, 2, 3, 5].into_iter().collect();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        assert_eq!(ntf.pre_order_guids(), vec![0, 1, 3, 2, 5]);
        assert_eq!(ntf.pre_child_count(1), 1);
    }

    #[test]
    fn unmarked_root_above_unmarked_gap_is_kept() {
        let mut tree = NodeTree::new();
        let n0 = tree.create_node(0);
        let n1 = tree.create_child(n0, 1).unwrap();
        tree.create_child(n1, 2).unwrap();
        let marked: MarkedNodes = [2].into_iter().collect();

        let ntf = Ntf::new(&tree, n0, &marked).unwrap();
        assert_eq!(ntf.pre_order_guids(), vec![0, 1, 2]);
        assert_eq!(ntf.post_order_guids(), vec![2, 1, 0]);
        assert_eq!(ntf.pre_child_count(0), 2);
    }

    #[test]
    fn stale_root_fails() {
        let (mut tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        tree.destroy(ids[2]).unwrap();
        let err = Ntf::new(&tree, ids[2], &marked).unwrap_err();
        assert_eq!(err, FlattenError::StaleRoot(ids[2]));
    }

    #[test]
    fn world_transforms_are_accumulated() {
        let (mut tree, ids) = branching_tree();
        tree.node_mut(ids[0]).unwrap().position = Vector3::new(0.0, 0.0, 1.0);
        tree.node_mut(ids[2]).unwrap().position = Vector3::new(1.0, 0.0, 0.0);
        tree.node_mut(ids[5]).unwrap().position = Vector3::new(0.0, 2.0, 0.0);

        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        let tip = ntf.pre_node(5);
        assert_eq!(tip.guid, 5);
        assert_relative_eq!(tip.position().x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(tip.position().y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(tip.position().z, 1.0, epsilon = 1e-6);
        assert_relative_eq!(tip.local.translation.vector.y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn subtree_root_world_includes_authored_ancestors() {
        let (mut tree, ids) = branching_tree();
        tree.node_mut(ids[0]).unwrap().position = Vector3::new(5.0, 0.0, 0.0);
        tree.node_mut(ids[2]).unwrap().position = Vector3::new(0.0, 1.0, 0.0);
        let marked: MarkedNodes = [2, 5].into_iter().collect();
        let ntf = Ntf::new(&tree, ids[2], &marked).unwrap();
        assert_eq!(ntf.pre_node(0).position(), Vector3::new(5.0, 1.0, 0.0));
    }

    #[test]
    fn effector_handles_are_shared_with_tree() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        let authored = tree.node(ids[5]).unwrap().effector().unwrap();
        let snapshot = ntf.pre_node(5);
        assert!(Rc::ptr_eq(authored, snapshot.effector.as_ref().unwrap()));
        assert!(ntf.pre_node(0).effector.is_none());
    }

    #[test]
    fn shared_node_data_outlives_ntf() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        let weak = ntf.node_data().downgrade();
        let held = ntf.share_node_data();
        assert_eq!(held.ref_count(), 2);

        drop(ntf);
        assert!(!weak.is_released());
        assert_eq!(held.ref_count(), 1);
        assert_eq!(held.borrow()[5].guid, 5);

        drop(held);
        assert!(weak.is_released());
    }

    #[test]
    fn dropping_unshared_ntf_releases_block() {
        let (tree, ids) = branching_tree();
        let marked = MarkedNodes::from_effectors(&tree, ids[0]).unwrap();
        let ntf = Ntf::new(&tree, ids[0], &marked).unwrap();
        let weak = ntf.node_data().downgrade();
        drop(ntf);
        assert!(weak.is_released());
    }
}
