//! Attaching outline paths to I/O failures

use std::io;
use std::path::Path;

use crate::application::{ApplicationError, ApplicationResult};

/// Turns a bare `io::Error` into [`ApplicationError::OutlineIo`] naming the
/// step and the file.
pub trait IoResultExt<T> {
    /// ```ignore
    /// fs.read_to_string(path).outline_context("read", path)?;
    /// ```
    fn outline_context(self, action: &'static str, path: &Path) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn outline_context(self, action: &'static str, path: &Path) -> ApplicationResult<T> {
        self.map_err(|source| ApplicationError::OutlineIo {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}
