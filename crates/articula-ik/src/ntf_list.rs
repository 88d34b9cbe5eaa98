//! The set of independent chains of one authored tree.

use tracing::debug;

use articula_core::{ArticulaError, FlattenError, Node, NodeId, NodeTree};

use crate::marked::MarkedNodes;
use crate::ntf::Ntf;

/// Ordered collection of flattened chains.
///
/// A chain root is a marked node with no marked ancestor below the node the
/// fill started from. Each chain takes in every marked node beneath its root
/// along with the unmarked joints leading to them, so chains never overlap
/// and every marked node belongs to exactly one chain.
#[derive(Debug, Default)]
pub struct NtfList {
    ntfs: Vec<Ntf>,
}

impl NtfList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the list from the effectors found below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ArticulaError::Tree`] if `root` is stale and
    /// [`ArticulaError::Flatten`] if any chain fails to build. In both cases
    /// the list is left empty.
    pub fn fill(&mut self, tree: &NodeTree, root: NodeId) -> Result<(), ArticulaError> {
        self.clear();
        let marked = MarkedNodes::from_effectors(tree, root)?;
        self.fill_with(tree, root, &marked)?;
        Ok(())
    }

    /// Rebuild the list from an explicit marked set.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FlattenError`]; the list is left empty.
    pub fn fill_with(
        &mut self,
        tree: &NodeTree,
        root: NodeId,
        marked: &MarkedNodes,
    ) -> Result<(), FlattenError> {
        self.clear();
        let root_node = tree.get(root).ok_or(FlattenError::StaleRoot(root))?;

        let mut chain_roots = Vec::new();
        collect_chain_roots(tree, root, root_node, marked, &mut chain_roots);

        let mut ntfs = Vec::new();
        ntfs.try_reserve_exact(chain_roots.len())?;
        for chain_root in chain_roots {
            ntfs.push(Ntf::new(tree, chain_root, marked)?);
        }

        debug!(
            root = root_node.guid(),
            chains = ntfs.len(),
            marked = marked.len(),
            "filled chain list"
        );
        self.ntfs = ntfs;
        Ok(())
    }

    /// Drop every chain.
    pub fn clear(&mut self) {
        self.ntfs.clear();
    }

    pub fn len(&self) -> usize {
        self.ntfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ntfs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Ntf> {
        self.ntfs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ntf> {
        self.ntfs.iter()
    }

    /// Largest descendant count across every chain.
    pub fn highest_child_count(&self) -> u32 {
        self.ntfs
            .iter()
            .map(Ntf::find_highest_child_count)
            .max()
            .unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a NtfList {
    type Item = &'a Ntf;
    type IntoIter = std::slice::Iter<'a, Ntf>;

    fn into_iter(self) -> Self::IntoIter {
        self.ntfs.iter()
    }
}

/// Pre-order walk collecting the topmost marked nodes. The walk stops at a
/// chain root, since its chain covers everything marked below it.
fn collect_chain_roots(
    tree: &NodeTree,
    id: NodeId,
    node: &Node,
    marked: &MarkedNodes,
    out: &mut Vec<NodeId>,
) {
    if marked.contains(node.guid()) {
        out.push(id);
        return;
    }
    for (_, child_id) in node.children() {
        if let Some(child) = tree.get(child_id) {
            collect_chain_roots(tree, child_id, child, marked, out);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
