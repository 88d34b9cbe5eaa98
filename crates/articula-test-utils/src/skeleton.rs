//! Authored skeletons for tests.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use rand::Rng;

use articula_core::{Effector, Guid, NodeId, NodeTree, Shared};

use crate::rng::random_offset;

/// A built tree plus named handles into it.
#[derive(Debug)]
pub struct Skeleton {
    pub tree: NodeTree,
    pub root: NodeId,
    names: BTreeMap<&'static str, NodeId>,
}

impl Skeleton {
    fn new(root_name: &'static str, guid: Guid) -> Self {
        let mut tree = NodeTree::new();
        let root = tree.create_node(guid);
        let mut names = BTreeMap::new();
        names.insert(root_name, root);
        Self { tree, root, names }
    }

    /// Handle of the joint called `name`.
    ///
    /// # Panics
    ///
    /// Panics if no joint has that name.
    pub fn id(&self, name: &str) -> NodeId {
        self.names[name]
    }

    /// Effector attached to the joint called `name`, if any.
    pub fn effector(&self, name: &str) -> Option<Shared<Effector>> {
        self.tree.get(self.id(name))?.effector().cloned()
    }

    fn joint(
        &mut self,
        parent: &str,
        name: &'static str,
        guid: Guid,
        offset: Vector3<f32>,
    ) -> NodeId {
        let parent = self.id(parent);
        let id = self.tree.create_child(parent, guid).unwrap();
        self.tree.node_mut(id).unwrap().position = offset;
        self.names.insert(name, id);
        id
    }

    fn reach(&mut self, name: &str, effector: Effector) {
        let id = self.id(name);
        self.tree.node_mut(id).unwrap().attach_effector(effector);
    }
}

/// Shoulder, elbow and wrist one unit apart along +Z, with a full-weight
/// effector on the wrist aimed at `(1, 0, 1)`.
pub fn two_bone_arm() -> Skeleton {
    let mut skeleton = Skeleton::new("shoulder", 0);
    skeleton.joint("shoulder", "elbow", 1, Vector3::z());
    skeleton.joint("elbow", "wrist", 2, Vector3::z());
    skeleton.reach("wrist", Effector::new(Vector3::new(1.0, 0.0, 1.0)));
    skeleton
}

/// A small biped.
///
/// ```text
/// pelvis ─ spine ─ chest ─ neck ─ head*
///    │               ├─ l_shoulder ─ l_elbow ─ l_hand*
///    │               └─ r_shoulder ─ r_elbow ─ r_hand*
///    ├─ l_hip ─ l_knee ─ l_foot*
///    └─ r_hip ─ r_knee ─ r_foot*
/// ```
///
/// Every effector (`*`) pulls two ancestors, which splits the marked part
/// into three chains rooted at `chest`, `l_hip` and `r_hip`.
pub fn humanoid() -> Skeleton {
    let mut s = Skeleton::new("pelvis", 0);
    s.joint("pelvis", "spine", 1, Vector3::new(0.0, 0.0, 0.2));
    s.joint("spine", "chest", 2, Vector3::new(0.0, 0.0, 0.2));
    s.joint("chest", "neck", 3, Vector3::new(0.0, 0.0, 0.15));
    s.joint("neck", "head", 4, Vector3::new(0.0, 0.0, 0.1));

    for (side, sign, base) in [("l", 1.0, 10), ("r", -1.0, 20)] {
        let names = arm_names(side);
        s.joint("chest", names[0], base, Vector3::new(0.0, sign * 0.2, 0.1));
        s.joint(names[0], names[1], base + 1, Vector3::new(0.0, sign * 0.3, 0.0));
        s.joint(names[1], names[2], base + 2, Vector3::new(0.0, sign * 0.25, 0.0));
    }
    for (side, sign, base) in [("l", 1.0, 30), ("r", -1.0, 40)] {
        let names = leg_names(side);
        s.joint("pelvis", names[0], base, Vector3::new(0.0, sign * 0.1, 0.0));
        s.joint(names[0], names[1], base + 1, Vector3::new(0.0, 0.0, -0.45));
        s.joint(names[1], names[2], base + 2, Vector3::new(0.0, 0.0, -0.45));
    }

    for tip in ["head", "l_hand", "r_hand", "l_foot", "r_foot"] {
        let world = s.tree.world_transform(s.id(tip)).unwrap().translation.vector;
        s.reach(tip, Effector::new(world).with_chain_length(2));
    }
    s
}

fn arm_names(side: &str) -> [&'static str; 3] {
    if side == "l" {
        ["l_shoulder", "l_elbow", "l_hand"]
    } else {
        ["r_shoulder", "r_elbow", "r_hand"]
    }
}

fn leg_names(side: &str) -> [&'static str; 3] {
    if side == "l" {
        ["l_hip", "l_knee", "l_foot"]
    } else {
        ["r_hip", "r_knee", "r_foot"]
    }
}

/// A randomly shaped tree from [`random_tree`].
#[derive(Debug)]
pub struct RandomTree {
    pub tree: NodeTree,
    pub root: NodeId,
    /// Every node, indexed by guid.
    pub nodes: Vec<NodeId>,
}

/// Build a tree of `count` nodes with guids `0..count`.
///
/// Each node after the root hangs off a uniformly chosen earlier node at a
/// random offset, and carries an effector with probability
/// `effector_probability` (random weight, chain length `0..=3`).
///
/// # Panics
///
/// Panics if `count` is zero.
pub fn random_tree(rng: &mut impl Rng, count: usize, effector_probability: f64) -> RandomTree {
    assert!(count > 0, "a tree needs at least one node");
    let mut tree = NodeTree::new();
    let root = tree.create_node(0);
    let mut nodes = vec![root];

    for guid in 1..count {
        let parent = nodes[rng.gen_range(0..nodes.len())];
        let id = tree.create_child(parent, guid as Guid).unwrap();
        let node = tree.node_mut(id).unwrap();
        node.position = random_offset(rng, 1.0);
        if rng.gen_bool(effector_probability) {
            let target = random_offset(rng, 2.0);
            node.attach_effector(
                Effector::new(target)
                    .with_weight(rng.r#gen::<f32>())
                    .with_chain_length(rng.gen_range(0..=3)),
            );
        }
        nodes.push(id);
    }

    RandomTree { tree, root, nodes }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
