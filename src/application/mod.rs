//! Application layer: outline snapshots and the services built on them
//!
//! This layer drives the tree through its public operations and depends on
//! I/O boundary traits.

pub mod error;
pub mod error_ext;
pub mod outline;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
pub use outline::{OutlineDocument, OutlineNode};
