//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::TreeError;
use crate::infrastructure::InfraError;

/// Top-level error, printed by `main` before exiting with [`CliError::exit_code`].
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    /// An argument clap accepted but the command cannot use.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Nothing to do, e.g. no subcommand given.
    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<TreeError> for CliError {
    fn from(e: TreeError) -> Self {
        ApplicationError::from(e).into()
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// sysexits code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => crate::exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Output { .. } => crate::exitcode::IOERR,
                InfraError::Application(app) => match app {
                    ApplicationError::Config { .. } => crate::exitcode::CONFIG,
                    ApplicationError::Outline { .. } => crate::exitcode::DATAERR,
                    ApplicationError::OutlineIo { .. } => crate::exitcode::IOERR,
                    ApplicationError::Tree(tree) => tree_exit_code(tree),
                },
            },
        }
    }
}

fn tree_exit_code(e: &TreeError) -> i32 {
    match e {
        TreeError::NoMatches { .. } | TreeError::NodeNotCreated { .. } => crate::exitcode::NOINPUT,
        TreeError::BoundedSearchExceeded { .. } => crate::exitcode::UNAVAILABLE,
        TreeError::StaleNode | TreeError::IdExhausted { .. } => crate::exitcode::SOFTWARE,
        _ => crate::exitcode::DATAERR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_matches_when_mapping_exit_code_then_noinput() {
        let err = CliError::from(TreeError::NoMatches {
            query: "> task: x".to_string(),
            segment: 0,
        });
        assert_eq!(err.exit_code(), crate::exitcode::NOINPUT);
    }

    #[test]
    fn given_config_error_when_mapping_exit_code_then_config() {
        let err = CliError::from(ApplicationError::Config {
            message: "bad".to_string(),
        });
        assert_eq!(err.exit_code(), crate::exitcode::CONFIG);
    }

    #[test]
    fn given_usage_error_when_mapping_exit_code_then_usage() {
        assert_eq!(
            CliError::Usage("no query".to_string()).exit_code(),
            crate::exitcode::USAGE
        );
    }

    #[test]
    fn given_unwritable_outline_when_mapping_exit_code_then_ioerr() {
        let err = CliError::from(ApplicationError::OutlineIo {
            action: "write",
            path: "/ro/life.toml".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.exit_code(), crate::exitcode::IOERR);
        assert_eq!(err.to_string(), "cannot write outline /ro/life.toml");
    }
}
