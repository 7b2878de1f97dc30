//! Application-level errors (wraps tree errors)

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::TreeError;

/// Tree errors plus the outline file and settings failures around them.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("invalid outline {path}: {message}")]
    Outline { path: PathBuf, message: String },

    #[error("cannot {action} outline {path}")]
    OutlineIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
