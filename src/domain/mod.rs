//! Domain layer: the node store
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod behavior;
pub mod builder;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod nodes;
pub mod options;

pub use arena::{
    ChildList, CopyOptions, FlatCursor, NodeIndex, NodeKind, SiblingCursor, Tree, TreeNode,
    RECURSING_TEXT,
};
pub use behavior::{NodeBehavior, NodeFlags, NodeRegistry, NodeType, SearchTexts};
pub use builder::{TreeBuilder, DEFAULT_ID_ATTEMPTS, DEFAULT_MAX_TICKS};
pub use error::{StructuralRule, TreeError, TreeResult};
pub use id::{IdSource, NodeId, RandomIdSource};
pub use nodes::builtin_registry;
pub use options::{OptionKind, OptionSet, OptionSpec, OptionValue};
