//! Path queries: AST, text adapter, evaluator and creation engine.

pub mod ast;
pub mod create;
pub mod eval;
pub mod parse;

pub use ast::{
    CreateRel, Matcher, Placement, Plurality, Queries, Query, QueryFilter, Retrieval, Segment,
};
pub use create::{Creator, Creators};
pub use eval::{matches, Search, SearchEvent, TickCounter};
pub use parse::parse_query;
