//! Activation and start/finish dispatch.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeIndex, NodeKind, Tree};
use crate::domain::behavior::SearchTexts;
use crate::domain::error::{TreeError, TreeResult};

impl Tree {
    pub fn active(&self) -> NodeIndex {
        self.active
    }

    /// Records `node` as active without starting anything, as when a saved
    /// tree is restored.
    pub fn mark_active(&mut self, node: NodeIndex) {
        if self.contains(node) {
            self.active = node;
        }
    }

    pub fn can_activate(&self, node: NodeIndex) -> bool {
        let real = self.real(node);
        match self.arena.get(real) {
            Some(n) => Arc::clone(&n.node_type).behavior.can_activate(self, real),
            None => false,
        }
    }

    pub fn is_started(&self, node: NodeIndex) -> bool {
        self.option(node, "started").is_some()
    }

    pub fn is_finished(&self, node: NodeIndex) -> bool {
        self.option(node, "finished").is_some()
    }

    /// Makes `node` the active node and starts it and its ancestors, root first.
    ///
    /// A node that cannot activate is refused unless `force` manages to
    /// unfinish it. Returns whether the node became active.
    #[instrument(level = "debug", skip(self))]
    pub fn activate(&mut self, node: NodeIndex, force: bool) -> TreeResult<bool> {
        if !self.can_activate(node) {
            if !(force && self.unfinish(node)?) {
                warn!("cannot activate {}", self.describe(node));
                return Ok(false);
            }
        }
        self.active = node;
        let mut chain = self.ancestors(node);
        chain.reverse();
        chain.push(node);
        for current in chain {
            match self.start(current) {
                Err(TreeError::CantStart { .. }) if current != node => {}
                other => other?,
            }
        }
        debug!("activated {}", self.describe(node));
        Ok(true)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self, node: NodeIndex) -> TreeResult<()> {
        if self.is_proxy(node) {
            return self.start_proxy(node);
        }
        let nt = self.node_type_of(node).ok_or(TreeError::StaleNode)?;
        nt.behavior.start(self, node)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn finish(&mut self, node: NodeIndex) -> TreeResult<()> {
        if self.is_proxy(node) {
            return self.finish_proxy(node);
        }
        let nt = self.node_type_of(node).ok_or(TreeError::StaleNode)?;
        nt.behavior.finish(self, node)
    }

    /// Returns whether the node is unfinished afterwards.
    #[instrument(level = "debug", skip(self))]
    pub fn unfinish(&mut self, node: NodeIndex) -> TreeResult<bool> {
        if self.is_proxy(node) {
            return self.unfinish_proxy(node);
        }
        let nt = self.node_type_of(node).ok_or(TreeError::StaleNode)?;
        nt.behavior.unfinish(self, node)
    }

    pub fn search_texts(&self, node: NodeIndex) -> SearchTexts {
        let real = self.real(node);
        match self.node_type_of(real) {
            Some(nt) if !self.is_recursing(node) => nt.behavior.search_texts(self, real),
            _ => SearchTexts::new(self.node_type(node), self.text(node)),
        }
    }

    /// Boolean tags of a handle. `active` is decided per handle, everything
    /// else by the real node.
    pub fn search_tags(&self, node: NodeIndex) -> BTreeSet<String> {
        let real = self.real(node);
        let mut tags = match self.node_type_of(real) {
            Some(nt) => nt.behavior.search_tags(self, real),
            None => BTreeSet::new(),
        };
        let activatable = self.can_activate(node);
        tags.insert(
            if activatable {
                "can_activate"
            } else {
                "cannot_activate"
            }
            .to_string(),
        );
        let active = self.active == node;
        tags.insert(if active { "active" } else { "inactive" }.to_string());
        tags
    }

    pub(crate) fn is_recursing(&self, node: NodeIndex) -> bool {
        matches!(
            self.arena.get(node).map(|n| &n.kind),
            Some(NodeKind::Proxy(proxy)) if proxy.recursing
        )
    }
}
