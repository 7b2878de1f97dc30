//! Outline file service
//!
//! Loads and saves trees as TOML outline snapshots.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::outline::OutlineDocument;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{RandomIdSource, Tree, TreeBuilder};
use crate::infrastructure::traits::FileSystem;

/// Service reading and writing outline files.
pub struct OutlineService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl OutlineService {
    /// Create a new outline service.
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    /// Empty tree configured from settings.
    pub fn new_tree(&self) -> ApplicationResult<Tree> {
        let mut builder = TreeBuilder::new()
            .max_ticks(self.settings.search.max_ticks)
            .id_attempts(self.settings.ids.attempts);
        if let Some(seed) = self.settings.ids.seed {
            builder = builder.id_source(RandomIdSource::seeded(seed));
        }
        Ok(builder.try_build()?)
    }

    /// Load a tree from an outline file.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> ApplicationResult<Tree> {
        let content = self
            .fs
            .read_to_string(path)
            .outline_context("read", path)?;
        let document =
            OutlineDocument::from_toml(&content).map_err(|e| ApplicationError::Outline {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let mut tree = self.new_tree()?;
        document.load_into(&mut tree)?;
        Ok(tree)
    }

    /// Load a tree, or start an empty one when the file does not exist yet.
    pub fn load_or_new(&self, path: &Path) -> ApplicationResult<Tree> {
        if self.fs.exists(path) {
            self.load(path)
        } else {
            debug!("no outline at {}, starting empty", path.display());
            self.new_tree()
        }
    }

    /// Save a tree; the previous file stays intact if writing fails.
    #[instrument(level = "debug", skip(self, tree))]
    pub fn save(&self, tree: &Tree, path: &Path) -> ApplicationResult<()> {
        let content = OutlineDocument::from_tree(tree)
            .to_toml()
            .map_err(|e| ApplicationError::Outline {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        self.fs
            .write_atomic(path, &content)
            .outline_context("write", path)?;
        debug!("saved {} nodes", tree.id_count());
        Ok(())
    }

    /// Outline file from settings.
    pub fn data_file(&self) -> &Path {
        &self.settings.data_file
    }
}
