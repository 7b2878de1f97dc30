//! TOML outline snapshots of a tree.
//!
//! A snapshot stores real nodes only: references keep their `#id` text and
//! their mirrors are rebuilt when the snapshot is loaded. Valued options go
//! to `options`, valueless ones (flags and the active marker) to `flags`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::ApplicationResult;
use crate::domain::{NodeIndex, Tree};

/// Option name marking the active node.
pub const ACTIVE_FLAG: &str = "active";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineDocument {
    #[serde(default)]
    pub nodes: Vec<OutlineNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(node_type: &str, text: Option<&str>) -> Self {
        Self {
            node_type: node_type.to_string(),
            text: text.map(str::to_string),
            id: None,
            flags: Vec::new(),
            options: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_option(mut self, name: &str, value: &str) -> Self {
        self.options.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_flag(mut self, name: &str) -> Self {
        self.flags.push(name.to_string());
        self
    }

    pub fn with_child(mut self, child: OutlineNode) -> Self {
        self.children.push(child);
        self
    }
}

impl OutlineDocument {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Builds the document's nodes under the root of `tree`.
    ///
    /// Completion hooks run once everything is linked, so references may
    /// point forward. The active marker is restored last without starting
    /// anything.
    #[instrument(level = "debug", skip_all)]
    pub fn load_into(&self, tree: &mut Tree) -> ApplicationResult<()> {
        tree.begin_load();
        let mut active = None;
        let root = tree.root();
        let result = self
            .nodes
            .iter()
            .try_for_each(|node| load_node(tree, root, node, &mut active));
        let finished = tree.finish_load();
        result?;
        finished?;
        if let Some(active) = active {
            tree.mark_active(active);
        }
        debug!(nodes = tree.id_count(), "outline loaded");
        Ok(())
    }

    /// Snapshot of every real node below the root.
    pub fn from_tree(tree: &Tree) -> Self {
        let active = persistent_active(tree);
        let nodes = tree
            .real_children(tree.root())
            .into_iter()
            .map(|child| dump_node(tree, child, active))
            .collect();
        Self { nodes }
    }
}

fn load_node(
    tree: &mut Tree,
    parent: NodeIndex,
    outline: &OutlineNode,
    active: &mut Option<NodeIndex>,
) -> ApplicationResult<()> {
    let node = tree.create(
        &outline.node_type,
        outline.text.as_deref(),
        Some(parent),
        outline.id.as_deref(),
    )?;
    for (name, value) in &outline.options {
        tree.set_option(node, name, Some(value))?;
    }
    for flag in &outline.flags {
        if flag == ACTIVE_FLAG {
            *active = Some(node);
        } else {
            tree.set_option(node, flag, None)?;
        }
    }
    let node = tree.add_child(parent, node)?;
    for child in &outline.children {
        load_node(tree, node, child, active)?;
    }
    Ok(())
}

/// Real node carrying the active marker: an active proxy is saved on the
/// reference it was reached through.
fn persistent_active(tree: &Tree) -> NodeIndex {
    let mut active = tree.active();
    while let Some(owner) = tree.proxy_owner(active) {
        active = owner;
    }
    active
}

fn dump_node(tree: &Tree, node: NodeIndex, active: NodeIndex) -> OutlineNode {
    let mut outline = OutlineNode::new(tree.node_type(node), tree.text(node));
    outline.id = tree.id(node).map(ToString::to_string);
    for (name, value) in tree.option_values(node) {
        if name == ACTIVE_FLAG {
            continue;
        }
        match value {
            Some(value) => {
                outline.options.insert(name, value);
            }
            None => outline.flags.push(name),
        }
    }
    if node == active && node != tree.root() {
        outline.flags.push(ACTIVE_FLAG.to_string());
    }
    outline.children = tree
        .real_children(node)
        .into_iter()
        .map(|child| dump_node(tree, child, active))
        .collect();
    outline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_nested_document_when_serialized_then_reads_back_equal() {
        let doc = OutlineDocument {
            nodes: vec![OutlineNode::new("task", Some("A"))
                .with_id("aaaaa")
                .with_option("started", "June 01, 2013 01:00:00 AM")
                .with_child(OutlineNode::new("comment", Some("two\nlines")))],
        };

        let text = doc.to_toml().expect("serialize");
        let back = OutlineDocument::from_toml(&text).expect("parse");

        assert_eq!(back, doc);
        assert!(text.contains("type = \"task\""));
    }

    #[test]
    fn given_empty_text_when_parsed_then_has_no_nodes() {
        let doc = OutlineDocument::from_toml("").expect("parse");
        assert!(doc.nodes.is_empty());
    }
}
