use std::collections::TryReserveError;

use thiserror::Error;

use crate::tree::NodeId;
use crate::types::Guid;

/// Top-level error type for articula.
#[derive(Debug, Error)]
pub enum ArticulaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Flatten error: {0}")]
    Flatten(#[from] FlattenError),

    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised by topology operations on a [`NodeTree`](crate::tree::NodeTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("stale node handle: {0:?}")]
    StaleNode(NodeId),

    #[error("node {parent} already has a child with guid {guid}")]
    DuplicateChild { parent: Guid, guid: Guid },

    #[error("node {0} cannot be its own child")]
    SelfChild(Guid),

    #[error("node {child} is an ancestor of {parent}")]
    Cycle { parent: Guid, child: Guid },
}

/// Errors raised while flattening a node hierarchy into an NTF.
///
/// Any of these means no NTF was produced; no partial state escapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    #[error("stale subtree root: {0:?}")]
    StaleRoot(NodeId),

    #[error("subtree rooted at {root} has no marked nodes")]
    EmptyChain { root: Guid },

    #[error("out of memory while flattening: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("chain has {0} nodes, more than a u32 index can address")]
    TooManyNodes(usize),
}

/// Errors raised when a chain does not fit a solver's shape, or its
/// effector cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("expected exactly one chain tip, found {0}")]
    TipCount(usize),

    #[error("chain ending at {tip} has fewer than two bones")]
    TooFewBones { tip: Guid },

    #[error("chain ending at {tip} has more than two bones")]
    TooManyBones { tip: Guid },

    #[error("bone ending at {0} has zero length")]
    ZeroLengthBone(Guid),

    #[error("chain tip {0} has no effector")]
    MissingEffector(Guid),

    #[error("effector on {0} is mutably borrowed")]
    EffectorBusy(Guid),
}
