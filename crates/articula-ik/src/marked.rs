//! Set of node guids taking part in a solve.

use std::collections::BTreeSet;

use articula_core::{Guid, NodeId, NodeTree, TreeError};

/// Guids of the nodes a solve touches: effectors and the ancestors they pull.
///
/// Flattening only asks for membership. Because membership is by guid, two
/// nodes sharing a guid are either both marked or both unmarked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkedNodes {
    guids: BTreeSet<Guid>,
}

impl MarkedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every effector below `root` (inclusive) together with the
    /// ancestors its `chain_length` reaches. A chain length of zero marks
    /// every ancestor up to `root`; chains never extend above `root`.
    pub fn from_effectors(tree: &NodeTree, root: NodeId) -> Result<Self, TreeError> {
        let mut marked = Self::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = tree.node(id)?;
            stack.extend(node.children().map(|(_, child)| child));

            let Some(effector) = node.effector() else {
                continue;
            };
            let chain_length = effector.borrow().chain_length;
            marked.insert(node.guid());

            let mut current = id;
            let mut remaining = chain_length;
            while current != root && (chain_length == 0 || remaining > 0) {
                let Some(parent) = tree.node(current)?.parent() else {
                    break;
                };
                marked.insert(tree.node(parent)?.guid());
                current = parent;
                remaining = remaining.saturating_sub(1);
            }
        }
        Ok(marked)
    }

    /// Returns true if the guid was not already marked.
    pub fn insert(&mut self, guid: Guid) -> bool {
        self.guids.insert(guid)
    }

    pub fn remove(&mut self, guid: Guid) -> bool {
        self.guids.remove(&guid)
    }

    pub fn contains(&self, guid: Guid) -> bool {
        self.guids.contains(&guid)
    }

    pub fn len(&self) -> usize {
        self.guids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// Marked guids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Guid> + '_ {
        self.guids.iter().copied()
    }
}

impl FromIterator<Guid> for MarkedNodes {
    fn from_iter<I: IntoIterator<Item = Guid>>(iter: I) -> Self {
        Self {
            guids: iter.into_iter().collect(),
        }
    }
}

impl Extend<Guid> for MarkedNodes {
    fn extend<I: IntoIterator<Item = Guid>>(&mut self, iter: I) {
        self.guids.extend(iter);
    }
}
