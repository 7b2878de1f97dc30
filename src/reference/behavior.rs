use std::collections::BTreeSet;

use crate::domain::arena::{NodeIndex, NodeKind, Tree};
use crate::domain::behavior::{NodeBehavior, NodeFlags, NodeRegistry, SearchTexts};
use crate::domain::error::TreeResult;
use crate::domain::nodes::lifecycle_tags;
use crate::domain::options::{now, OptionSet, OptionValue, ACTIVE_OPTIONS, TASK_OPTIONS};
use crate::query::parse_query;
use crate::reference::state::{ReferencePolicy, ReferenceState};

/// Node type whose children mirror the node its query resolves to.
#[derive(Debug)]
pub struct ReferenceBehavior {
    policy: ReferencePolicy,
}

impl ReferenceBehavior {
    pub fn new(policy: ReferencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }
}

impl NodeBehavior for ReferenceBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            text_required: true,
            can_activate: true,
            // children always land on the target; an unresolved reference has none
            allowed_children: Some(&[]),
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        vec![&TASK_OPTIONS, &ACTIVE_OPTIONS]
    }

    fn init_kind(&self, text: Option<&str>, registry: &NodeRegistry) -> TreeResult<NodeKind> {
        let query = parse_query(text.unwrap_or_default(), registry)?;
        Ok(NodeKind::Reference(ReferenceState::new(query, self.policy)))
    }

    fn can_activate(&self, tree: &Tree, node: NodeIndex) -> bool {
        tree.option(node, "finished").is_none()
    }

    fn start(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        if tree.option(node, "started").is_none() {
            tree.store_option(node, "started", OptionValue::Time(now()));
        }
        tree.start_reference_target(node)
    }

    fn finish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        tree.store_option(node, "finished", OptionValue::Time(now()));
        tree.finish_reference_target(node)?;
        tree.release_reference(node);
        Ok(())
    }

    fn unfinish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<bool> {
        tree.clear_option(node, "finished");
        tree.unfinish_reference_target(node)?;
        Ok(true)
    }

    fn load_finished(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        tree.sync_loaded_reference(node)
    }

    /// Matches on its own text and on the target's.
    fn search_texts(&self, tree: &Tree, node: NodeIndex) -> SearchTexts {
        let mut texts = SearchTexts::new(tree.node_type(node), tree.text(node));
        if let Some(target) = tree.reference_target(node) {
            texts.texts.extend(tree.search_texts(target).texts);
        }
        texts
    }

    fn search_tags(&self, tree: &Tree, node: NodeIndex) -> BTreeSet<String> {
        lifecycle_tags(tree, node)
    }
}
