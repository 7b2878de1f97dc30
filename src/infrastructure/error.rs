//! Infrastructure-level errors (wraps application errors)

use std::io;

use thiserror::Error;

use crate::application::ApplicationError;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error("{0}")]
    Application(#[from] ApplicationError),

    /// Terminal output could not be written, e.g. a closed pipe.
    #[error("cannot write {what}")]
    Output {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

impl InfraError {
    pub fn output(what: &'static str, source: io::Error) -> Self {
        Self::Output { what, source }
    }
}
