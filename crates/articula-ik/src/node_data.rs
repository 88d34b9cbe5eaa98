//! Solver-facing node snapshots and the shared block holding them.
//!
//! One flattened chain stores all of its [`NodeData`] in a single
//! [`NodeDataBlock`]. The block is reference counted as a whole: slots are
//! never released individually, and the storage is freed only when the last
//! holder (the owning [`Ntf`](crate::Ntf) or any stage that called
//! [`share_node_data`](crate::Ntf::share_node_data)) drops its handle.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

use nalgebra::{Isometry3, Vector3};

use articula_core::{Constraint, Effector, Guid, NodeId, Pole, Shared};

/// Snapshot of one participating node.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub guid: Guid,
    /// Handle of the authored node this was taken from.
    pub node: NodeId,
    /// Offset of the parent within the same block; `None` for the chain root.
    pub parent: Option<usize>,
    /// Transform relative to the authored parent.
    pub local: Isometry3<f32>,
    /// Transform in world space.
    pub world: Isometry3<f32>,
    pub rotation_weight: f32,
    pub dist_to_parent: f32,
    pub effector: Option<Shared<Effector>>,
    pub constraint: Option<Shared<Constraint>>,
    pub pole: Option<Shared<Pole>>,
}

impl NodeData {
    /// World-space position.
    pub fn position(&self) -> Vector3<f32> {
        self.world.translation.vector
    }
}

/// Contiguous, reference-counted storage for a chain's [`NodeData`].
///
/// Cloning adds a reference to the same storage; it never copies slots.
#[derive(Debug, Clone)]
pub struct NodeDataBlock(Rc<RefCell<Vec<NodeData>>>);

impl NodeDataBlock {
    pub(crate) fn new(slots: Vec<NodeData>) -> Self {
        Self(Rc::new(RefCell::new(slots)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Shared view of every slot.
    ///
    /// # Panics
    ///
    /// Panics if the block is currently borrowed mutably.
    pub fn borrow(&self) -> Ref<'_, [NodeData]> {
        Ref::map(self.0.borrow(), Vec::as_slice)
    }

    /// Exclusive view of every slot, for stages that write transforms.
    ///
    /// # Panics
    ///
    /// Panics if the block is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, [NodeData]> {
        RefMut::map(self.0.borrow_mut(), Vec::as_mut_slice)
    }

    /// Number of live holders of this block.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle that observes when the storage is freed.
    pub fn downgrade(&self) -> WeakNodeDataBlock {
        WeakNodeDataBlock(Rc::downgrade(&self.0))
    }
}

/// Non-owning handle to a [`NodeDataBlock`].
#[derive(Debug, Clone)]
pub struct WeakNodeDataBlock(Weak<RefCell<Vec<NodeData>>>);

impl WeakNodeDataBlock {
    pub fn upgrade(&self) -> Option<NodeDataBlock> {
        self.0.upgrade().map(NodeDataBlock)
    }

    /// True once every strong holder has released the block.
    pub fn is_released(&self) -> bool {
        self.0.strong_count() == 0
    }
}
