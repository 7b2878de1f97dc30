//! Tree builder: registry, id allocation and search limits.

use std::sync::Arc;

use crate::domain::arena::Tree;
use crate::domain::behavior::NodeRegistry;
use crate::domain::error::TreeResult;
use crate::domain::id::{IdSource, RandomIdSource};
use crate::domain::nodes::builtin_registry;

pub const DEFAULT_MAX_TICKS: usize = 3500;
pub const DEFAULT_ID_ATTEMPTS: usize = 10;

/// Constructs trees with a chosen registry and limits.
#[derive(Debug)]
pub struct TreeBuilder {
    registry: Option<Arc<NodeRegistry>>,
    id_source: Option<Box<dyn IdSource>>,
    id_attempts: usize,
    max_ticks: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            id_source: None,
            id_attempts: DEFAULT_ID_ATTEMPTS,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }

    pub fn registry(mut self, registry: Arc<NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn id_source(mut self, source: impl IdSource + 'static) -> Self {
        self.id_source = Some(Box::new(source));
        self
    }

    pub fn id_attempts(mut self, attempts: usize) -> Self {
        self.id_attempts = attempts.max(1);
        self
    }

    pub fn max_ticks(mut self, ticks: usize) -> Self {
        self.max_ticks = ticks;
        self
    }

    /// Builds the tree. Fails if the registry has no root type.
    pub fn try_build(self) -> TreeResult<Tree> {
        Tree::from_parts(
            self.registry.unwrap_or_else(builtin_registry),
            self.id_source
                .unwrap_or_else(|| Box::new(RandomIdSource::new())),
            self.id_attempts,
            self.max_ticks,
        )
    }

    /// Builds a tree with the built-in registry unless another one was given.
    ///
    /// # Panics
    /// If a custom registry lacks the root type; use [`TreeBuilder::try_build`]
    /// for custom registries.
    pub fn build(self) -> Tree {
        match self.try_build() {
            Ok(tree) => tree,
            Err(e) => panic!("tree registry is unusable: {e}"),
        }
    }
}
