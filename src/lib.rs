//! lifetree: a personal task tree.
//!
//! Nodes live in an arena and are reached with short path queries such as
//! `** > task: write report`. A query can also create what it does not
//! find, and `reference`/`depends` nodes show another node's subtree as a
//! live mirror.
//!
//! Layers, innermost first: [`domain`] (node store), [`query`] (parse,
//! evaluate, create), [`reference`] (mirrors), [`application`] (outline
//! files), [`infrastructure`] (I/O and wiring), [`cli`].

pub mod application;
pub mod cli;
pub mod config;
pub mod display;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod query;
pub mod reference;
pub mod util;

pub use domain::{NodeIndex, Tree, TreeBuilder, TreeError, TreeResult};
pub use query::{parse_query, Query};
