//! Authored joint hierarchy.
//!
//! A [`NodeTree`] is an arena of [`Node`]s addressed by generational
//! [`NodeId`] handles. Each node keeps its parent handle and an ordered map
//! of children keyed by [`Guid`], so child iteration is always in ascending
//! guid order. A tree may hold several disjoint roots; a freshly created node
//! is a root until it is attached somewhere.
//!
//! Destroying a node destroys its whole subtree and bumps the generation of
//! every freed slot, so stale handles are rejected instead of aliasing a
//! reused slot.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::warn;

use crate::attachment::{Constraint, Effector, Pole};
use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::types::{Guid, Shared, shared};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A handle to a node in a [`NodeTree`].
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a node is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    idx: usize,
    generation: u32,
}

impl NodeId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One joint of the authored hierarchy.
///
/// Transform and weight fields are public; topology is only changed through
/// [`NodeTree`] so parent and child links stay consistent.
pub struct Node {
    guid: Guid,
    parent: Option<NodeId>,
    children: BTreeMap<Guid, NodeId>,

    /// Position relative to the parent node.
    pub position: Vector3<f32>,
    /// Rotation relative to the parent node.
    pub rotation: UnitQuaternion<f32>,
    /// How strongly the solve may rotate this node (0..=1).
    pub rotation_weight: f32,
    /// Segment length to the parent, maintained by the iterative solve.
    pub dist_to_parent: f32,

    effector: Option<Shared<Effector>>,
    constraint: Option<Shared<Constraint>>,
    pole: Option<Shared<Pole>>,

    /// Opaque caller payload. Never copied by [`NodeTree::duplicate`].
    pub user_data: Option<Rc<dyn Any>>,
}

impl Node {
    fn new(guid: Guid) -> Self {
        Self {
            guid,
            parent: None,
            children: BTreeMap::new(),
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            rotation_weight: 1.0,
            dist_to_parent: 0.0,
            effector: None,
            constraint: None,
            pole: None,
            user_data: None,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in ascending guid order.
    pub fn children(&self) -> impl Iterator<Item = (Guid, NodeId)> + '_ {
        self.children.iter().map(|(&guid, &id)| (guid, id))
    }

    /// Handle of the direct child with the given guid, if any.
    pub fn child(&self, guid: Guid) -> Option<NodeId> {
        self.children.get(&guid).copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Local transform as an isometry (rotation, then translation).
    pub fn local_transform(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    // -- Attachments --

    pub fn effector(&self) -> Option<&Shared<Effector>> {
        self.effector.as_ref()
    }

    /// Attach an effector, replacing any previous one. Returns the shared
    /// handle so callers can keep editing the target.
    pub fn attach_effector(&mut self, effector: Effector) -> Shared<Effector> {
        let handle = shared(effector);
        self.effector = Some(Rc::clone(&handle));
        handle
    }

    pub fn detach_effector(&mut self) -> Option<Shared<Effector>> {
        self.effector.take()
    }

    pub fn constraint(&self) -> Option<&Shared<Constraint>> {
        self.constraint.as_ref()
    }

    pub fn attach_constraint(&mut self, constraint: Constraint) -> Shared<Constraint> {
        let handle = shared(constraint);
        self.constraint = Some(Rc::clone(&handle));
        handle
    }

    pub fn detach_constraint(&mut self) -> Option<Shared<Constraint>> {
        self.constraint.take()
    }

    pub fn pole(&self) -> Option<&Shared<Pole>> {
        self.pole.as_ref()
    }

    pub fn attach_pole(&mut self, pole: Pole) -> Shared<Pole> {
        let handle = shared(pole);
        self.pole = Some(Rc::clone(&handle));
        handle
    }

    pub fn detach_pole(&mut self) -> Option<Shared<Pole>> {
        self.pole.take()
    }

    /// Copy transforms and weights; attachments are deep-copied when asked.
    fn duplicate(&self, copy_attachments: bool) -> Self {
        let mut copy = Self::new(self.guid);
        copy.position = self.position;
        copy.rotation = self.rotation;
        copy.rotation_weight = self.rotation_weight;
        copy.dist_to_parent = self.dist_to_parent;
        if copy_attachments {
            copy.effector = self.effector.as_ref().map(|e| shared(e.borrow().clone()));
            copy.constraint = self.constraint.as_ref().map(|c| shared(c.borrow().clone()));
            copy.pole = self.pole.as_ref().map(|p| shared(p.borrow().clone()));
        }
        copy
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("guid", &self.guid)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("rotation_weight", &self.rotation_weight)
            .field("dist_to_parent", &self.dist_to_parent)
            .field("effector", &self.effector)
            .field("constraint", &self.constraint)
            .field("pole", &self.pole)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// NodeTree
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena owning every node of one or more authored hierarchies.
#[derive(Debug, Default)]
pub struct NodeTree {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    live: usize,
    config: TreeConfig,
}

impl NodeTree {
    /// Creates an empty tree with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // -- Allocation API --

    /// Creates a standalone node: zero position, identity rotation, no
    /// attachments, no parent.
    pub fn create_node(&mut self, guid: Guid) -> NodeId {
        self.insert(Node::new(guid))
    }

    /// Creates a node and attaches it under `parent`.
    ///
    /// On failure the new node is destroyed before the error is returned.
    pub fn create_child(&mut self, parent: NodeId, guid: Guid) -> Result<NodeId, TreeError> {
        self.node(parent)?;
        let child = self.create_node(guid);
        if let Err(err) = self.add_child(parent, child) {
            self.free_subtree(child);
            return Err(err);
        }
        Ok(child)
    }

    /// Destroys a node and its entire subtree, detaching it from its parent
    /// first. All handles into the subtree become stale.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.unlink(id)?;
        self.free_subtree(id);
        Ok(())
    }

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.idx)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.idx)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Like [`get`](Self::get), but a stale handle is an error.
    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get(id).ok_or(TreeError::StaleNode(id))
    }

    /// Like [`get_mut`](Self::get_mut), but a stale handle is an error.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.get_mut(id).ok_or(TreeError::StaleNode(id))
    }

    // -- Topology API --

    /// Attaches `child` under `parent`, detaching it from any previous parent.
    ///
    /// If `child`'s guid already exists elsewhere in the destination tree the
    /// insert still happens (with a warning, when enabled); [`find`](Self::find)
    /// will then only locate one of the two. A guid collision among
    /// `parent`'s direct children is an error and leaves `child` detached.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent_guid = self.node(parent)?.guid;
        let child_guid = self.node(child)?.guid;
        if parent == child {
            return Err(TreeError::SelfChild(child_guid));
        }
        if self.is_ancestor(child, parent) {
            return Err(TreeError::Cycle {
                parent: parent_guid,
                child: child_guid,
            });
        }

        // May already be part of a tree.
        self.unlink(child)?;

        if self.node(parent)?.children.contains_key(&child_guid) {
            return Err(TreeError::DuplicateChild {
                parent: parent_guid,
                guid: child_guid,
            });
        }

        if self.config.warn_duplicate_guids {
            let root = self.root_of(parent)?;
            if self.find(root, child_guid).is_some() {
                warn!(
                    guid = child_guid,
                    parent = parent_guid,
                    "guid already exists in the tree; it will be inserted, but find() will only locate one of the two"
                );
            }
        }

        self.link(parent, child);
        Ok(())
    }

    /// Detaches a node from its parent. A root is left untouched.
    pub fn unlink(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id)?;
        let Some(parent) = node.parent else {
            return Ok(());
        };
        let guid = node.guid;
        if let Some(parent) = self.get_mut(parent) {
            parent.children.remove(&guid);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Deep-copies a node and its subtree into a new detached root.
    ///
    /// The copy keeps the original guids. Attachments are copied into fresh
    /// handles when `copy_attachments` is set; user data is never copied.
    pub fn duplicate(&mut self, id: NodeId, copy_attachments: bool) -> Result<NodeId, TreeError> {
        let source = self.node(id)?;
        let copy = source.duplicate(copy_attachments);
        let children: Vec<NodeId> = source.children.values().copied().collect();

        let new_id = self.insert(copy);
        for child in children {
            match self.duplicate(child, copy_attachments) {
                Ok(new_child) => self.link(new_id, new_child),
                Err(err) => {
                    self.free_subtree(new_id);
                    return Err(err);
                }
            }
        }
        Ok(new_id)
    }

    /// Finds a node by guid in the subtree rooted at `id`.
    ///
    /// Direct children are checked first, then the node itself, then each
    /// child's subtree in guid order. With duplicate guids the first match in
    /// that order wins.
    pub fn find(&self, id: NodeId, guid: Guid) -> Option<NodeId> {
        let node = self.get(id)?;
        if let Some(&found) = node.children.get(&guid) {
            return Some(found);
        }
        if node.guid == guid {
            return Some(id);
        }
        node.children
            .values()
            .find_map(|&child| self.find(child, guid))
    }

    /// Returns the parent of a node, if any.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.node(id)?.parent)
    }

    /// Returns an iterator over the direct children of a node, in guid order.
    pub fn children(&self, id: NodeId) -> Result<impl Iterator<Item = NodeId> + '_, TreeError> {
        Ok(self.node(id)?.children.values().copied())
    }

    pub fn child_count(&self, id: NodeId) -> Result<usize, TreeError> {
        Ok(self.node(id)?.children.len())
    }

    /// Walks parent links up to the topmost ancestor.
    pub fn root_of(&self, id: NodeId) -> Result<NodeId, TreeError> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Composes local transforms from the root down to `id`.
    pub fn world_transform(&self, id: NodeId) -> Result<Isometry3<f32>, TreeError> {
        let node = self.node(id)?;
        let mut transform = node.local_transform();
        let mut current = node.parent;
        while let Some(parent) = current {
            let node = self.node(parent)?;
            transform = node.local_transform() * transform;
            current = node.parent;
        }
        Ok(transform)
    }

    // -- Internal helpers --

    fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot; its generation was bumped on free.
            let slot = &mut self.slots[idx];
            slot.node = Some(node);
            NodeId {
                idx,
                generation: slot.generation,
            }
        } else {
            let idx = self.slots.len();
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId { idx, generation: 0 }
        }
    }

    /// Links without validation. Both handles must be live and `child`
    /// detached.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        let Some(child_node) = self.get_mut(child) else {
            return;
        };
        child_node.parent = Some(parent);
        let guid = child_node.guid;
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.insert(guid, child);
        }
    }

    /// Whether `ancestor` lies on the parent path above `id`.
    fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|n| n.parent);
        }
        false
    }

    /// Frees every slot in the subtree. Does not touch the parent's child map.
    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.idx) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                stack.extend(node.children.into_values());
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(current.idx);
                self.live -= 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
