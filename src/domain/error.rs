//! Domain-level errors (no external dependencies)

use std::fmt;

use thiserror::Error;

/// Structural rule a node or insertion violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralRule {
    TextForbidden,
    TextRequired,
    Multiline,
    TopLevelOnly,
    ChildrenOf { parent_type: String },
    AllowedChildren { parent_type: String },
    DuplicateId { id: String },
    InvalidId { id: String },
    AlreadyAttached,
    NotAChild { anchor: String },
    Cycle,
    NoSuchOption { name: String },
    InvalidOptionValue { name: String, value: String },
    ListIntegrity { detail: String },
    Root,
    InvalidDate { text: String },
}

impl fmt::Display for StructuralRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralRule::TextForbidden => write!(f, "node type does not accept text"),
            StructuralRule::TextRequired => write!(f, "node type requires text"),
            StructuralRule::Multiline => write!(f, "node type does not accept multiline text"),
            StructuralRule::TopLevelOnly => write!(f, "node type must be a child of the root"),
            StructuralRule::ChildrenOf { parent_type } => {
                write!(f, "node type cannot be a child of '{parent_type}'")
            }
            StructuralRule::AllowedChildren { parent_type } => {
                write!(f, "'{parent_type}' does not allow this child type")
            }
            StructuralRule::DuplicateId { id } => write!(f, "id '{id}' is already in use"),
            StructuralRule::InvalidId { id } => {
                write!(f, "'{id}' is not a 5 character alphanumeric id")
            }
            StructuralRule::AlreadyAttached => write!(f, "node already has a parent"),
            StructuralRule::NotAChild { anchor } => {
                write!(f, "{anchor} is not a child of the parent")
            }
            StructuralRule::Cycle => write!(f, "node cannot become its own descendant"),
            StructuralRule::NoSuchOption { name } => write!(f, "no such option '{name}'"),
            StructuralRule::InvalidOptionValue { name, value } => {
                write!(f, "invalid value '{value}' for option '{name}'")
            }
            StructuralRule::ListIntegrity { detail } => {
                write!(f, "sibling list is inconsistent: {detail}")
            }
            StructuralRule::Root => write!(f, "the root cannot be detached or discarded"),
            StructuralRule::InvalidDate { text } => write!(f, "'{text}' is not a date"),
        }
    }
}

/// Errors raised by the node store, the query evaluator and the creation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("unknown node type: '{0}'")]
    UnknownType(String),

    #[error("{node}: {rule}")]
    Structural { node: String, rule: StructuralRule },

    #[error("cannot create from query '{query}': {reason}")]
    CantCreate { query: String, reason: String },

    #[error("no node created for query '{query}'")]
    NodeNotCreated { query: String },

    #[error("no match for query '{query}' (segment {segment} matched nothing)")]
    NoMatches { query: String, segment: usize },

    #[error("search exceeded {ticks} ticks")]
    BoundedSearchExceeded { ticks: usize },

    #[error("{node} cannot be started")]
    CantStart { node: String },

    #[error("no free id after {attempts} attempts")]
    IdExhausted { attempts: usize },

    #[error("invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("node handle is no longer in the tree")]
    StaleNode,
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

impl TreeError {
    pub fn structural(node: impl Into<String>, rule: StructuralRule) -> Self {
        TreeError::Structural {
            node: node.into(),
            rule,
        }
    }

    pub fn invalid_query(query: impl fmt::Display, reason: impl Into<String>) -> Self {
        TreeError::InvalidQuery {
            query: query.to_string(),
            reason: reason.into(),
        }
    }

    pub fn cant_create(query: impl fmt::Display, reason: impl Into<String>) -> Self {
        TreeError::CantCreate {
            query: query.to_string(),
            reason: reason.into(),
        }
    }
}
