//! articula-core: node hierarchy, attachments, config and errors for articula IK.
//!
//! The authored skeleton lives in a [`NodeTree`]: an arena of joints with
//! ordered, guid-keyed children and optional [`Effector`], [`Constraint`] and
//! [`Pole`] attachments. The `articula-ik` crate flattens marked parts of
//! this tree into solver-friendly arrays.

pub mod attachment;
pub mod config;
pub mod error;
pub mod tree;
pub mod types;

pub use attachment::{Constraint, Effector, EffectorFeatures, Pole};
pub use config::{IkConfig, TreeConfig, TwoBoneConfig, UpdateConfig};
pub use error::{ArticulaError, ConfigError, FlattenError, SolveError, TreeError};
pub use tree::{Node, NodeId, NodeTree};
pub use types::{Guid, Shared, shared};
