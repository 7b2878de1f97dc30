//! Storage seam for outline files
//!
//! Services read and replace whole outline files through [`FileSystem`], so
//! tests can point them at a temporary directory or another backend.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whole-file storage used by the outline service.
pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> bool;

    /// Replaces `path` with `content`. Readers see either the old or the
    /// new file, never a partial write.
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// Local disk: writes go to a sibling `<name>.tmp` that is renamed over
/// the target, creating missing parent directories first.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = sibling_tmp(path);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
