//! Chain flattening and the solver update stage for articula IK.
//!
//! Marks the part of an authored [`NodeTree`](articula_core::NodeTree) that
//! effectors pull on, splits it into independent chains, and flattens each
//! chain into contiguous node data with pre-order and post-order views.
//!
//! # Architecture
//!
//! ```text
//! NodeTree ──► MarkedNodes ──► NtfList (one Ntf per chain) ──► UpdatePass ──► actual targets
//!                                                                    │
//!                                     TwoBoneSolver (three-node chains) ◄┘
//! ```
//!
//! A flattened chain is a snapshot: it is rebuilt whenever the tree or its
//! marked set changes and is never patched in place.

pub mod marked;
pub mod node_data;
pub mod ntf;
pub mod ntf_list;
pub mod two_bone;
pub mod update;

pub use marked::MarkedNodes;
pub use node_data::{NodeData, NodeDataBlock, WeakNodeDataBlock};
pub use ntf::{IndexEntry, Ntf};
pub use ntf_list::NtfList;
pub use two_bone::{Reach, TwoBoneSolver};
pub use update::UpdatePass;
