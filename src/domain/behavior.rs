//! Node type registry: validation flags, option sets and lifecycle hooks per type.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::domain::arena::{NodeIndex, NodeKind, Tree};
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::options::{resolve_option_sets, OptionSet, ResolvedOptions};
use crate::query::Query;

/// Validation flags of a node type.
#[derive(Debug, Clone, Default)]
pub struct NodeFlags {
    pub textless: bool,
    pub text_required: bool,
    pub multiline: bool,
    /// Only valid as a direct child of the root.
    pub toplevel: bool,
    pub can_activate: bool,
    /// `None` accepts any child type.
    pub allowed_children: Option<&'static [&'static str]>,
    /// `None` accepts any parent type.
    pub children_of: Option<&'static [&'static str]>,
}

/// Lower-cased types and texts a matcher compares against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTexts {
    pub types: BTreeSet<String>,
    pub texts: BTreeSet<String>,
}

impl SearchTexts {
    pub fn new(node_type: &str, text: Option<&str>) -> Self {
        let mut texts = Self::default();
        texts.types.insert(node_type.to_lowercase());
        if let Some(text) = text {
            texts.texts.insert(text.to_lowercase());
        }
        texts
    }
}

/// Behavior attached to a node type.
///
/// Every hook receives the tree and the *real* node it runs for; proxies
/// never reach a behavior directly.
pub trait NodeBehavior: fmt::Debug + Send + Sync {
    fn flags(&self) -> NodeFlags;

    /// Option sets, base first.
    fn option_sets(&self) -> Vec<&'static OptionSet> {
        Vec::new()
    }

    /// Accept any option name as free-form text.
    fn accepts_any_option(&self) -> bool {
        false
    }

    fn init_kind(&self, _text: Option<&str>, _registry: &NodeRegistry) -> TreeResult<NodeKind> {
        Ok(NodeKind::Plain)
    }

    fn can_activate(&self, _tree: &Tree, _node: NodeIndex) -> bool {
        self.flags().can_activate
    }

    fn start(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        if tree.can_activate(node) {
            Ok(())
        } else {
            Err(TreeError::CantStart {
                node: tree.describe(node),
            })
        }
    }

    fn finish(&self, _tree: &mut Tree, _node: NodeIndex) -> TreeResult<()> {
        Ok(())
    }

    /// Returns whether the node is unfinished afterwards.
    fn unfinish(&self, _tree: &mut Tree, _node: NodeIndex) -> TreeResult<bool> {
        Ok(false)
    }

    /// Runs once after the node is first linked into the rooted tree.
    fn load_finished(&self, _tree: &mut Tree, _node: NodeIndex) -> TreeResult<()> {
        Ok(())
    }

    fn search_texts(&self, tree: &Tree, node: NodeIndex) -> SearchTexts {
        SearchTexts::new(tree.node_type(node), tree.text(node))
    }

    fn search_tags(&self, _tree: &Tree, _node: NodeIndex) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Query, evaluated from the creation origin, naming the parent new nodes of
    /// this type are placed under.
    fn preferred_parent(&self) -> Option<Query> {
        None
    }

    /// Places a freshly created node itself; `None` leaves placement to the caller.
    fn auto_add(
        &self,
        tree: &mut Tree,
        node: NodeIndex,
        origin: NodeIndex,
    ) -> TreeResult<Option<NodeIndex>> {
        let Some(query) = self.preferred_parent() else {
            return Ok(None);
        };
        let parent = tree.find_one(origin, &query)?;
        tree.add_child(parent, node).map(Some)
    }
}

/// A registered node type.
#[derive(Debug)]
pub struct NodeType {
    pub name: String,
    pub flags: NodeFlags,
    pub options: ResolvedOptions,
    pub behavior: Box<dyn NodeBehavior>,
}

impl NodeType {
    pub fn new(name: impl Into<String>, behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            name: name.into(),
            flags: behavior.flags(),
            options: resolve_option_sets(&behavior.option_sets()),
            behavior,
        }
    }
}

/// Maps type names and aliases to node types.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, Arc<NodeType>>,
    aliases: HashMap<String, String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, behavior: impl NodeBehavior + 'static) -> &mut Self {
        self.types
            .insert(name.to_string(), Arc::new(NodeType::new(name, Box::new(behavior))));
        self
    }

    pub fn alias(&mut self, alias: &str, name: &str) -> &mut Self {
        self.aliases.insert(alias.to_string(), name.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<NodeType>> {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name) || self.aliases.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
