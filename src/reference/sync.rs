//! Target resolution and life-cycle propagation between mirrors and targets.

use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeIndex, Tree};
use crate::domain::error::{TreeError, TreeResult};
use crate::query::Query;

impl Tree {
    /// Resolves a reference's query from the reference itself.
    ///
    /// A query landing on the reference, or on a chain of references leading
    /// back to it, leaves the reference unresolved.
    #[instrument(level = "debug", skip(self))]
    pub(crate) fn resolve_reference(&mut self, reference: NodeIndex) -> TreeResult<Option<NodeIndex>> {
        let Some(state) = self.reference_state(reference) else {
            return Ok(None);
        };
        if let Some(target) = state.target {
            return Ok(Some(target));
        }
        let query = state.query.clone();
        let found = match self.find_first(reference, &query) {
            Ok(found) => found,
            Err(TreeError::BoundedSearchExceeded { ticks }) => {
                warn!(ticks, "reference query '{query}' gave up");
                None
            }
            Err(e) => return Err(e),
        };
        let Some(found) = found else {
            warn!("reference query '{query}' matched nothing");
            return Ok(None);
        };
        let target = self.real(found);
        if self.content_node(target) == reference {
            warn!("{} refers to itself, left unresolved", self.describe(reference));
            return Ok(None);
        }

        let id = self.id(target).cloned();
        if let Some(state) = self.reference_state_mut(reference) {
            state.target = Some(target);
            if let Some(id) = &id {
                state.query = Query::by_id(id.clone());
            }
        }
        if let Some(id) = id {
            self.node_mut(reference)?.text = Some(format!("#{id}"));
        }
        debug!("{} -> {}", self.describe(reference), self.describe(target));
        Ok(Some(target))
    }

    /// Drops the resolved target and every proxy of a reference.
    pub(crate) fn release_reference(&mut self, reference: NodeIndex) {
        self.release_proxies(reference);
        if let Some(state) = self.reference_state_mut(reference) {
            state.target = None;
        }
    }

    /// Re-points a reference at new query text.
    pub(crate) fn retarget(&mut self, reference: NodeIndex, text: Option<&str>) -> TreeResult<()> {
        let text = text.unwrap_or_default();
        let query = self.parse(text)?;
        self.release_reference(reference);
        if let Some(state) = self.reference_state_mut(reference) {
            state.query = query;
        }
        self.node_mut(reference)?.text = Some(text.to_string());
        if self.is_rooted(reference) && !self.is_loading() && !self.is_finished(reference) {
            self.resolve_reference(reference)?;
        }
        Ok(())
    }

    /// Reconciles a freshly linked reference with its target's state.
    ///
    /// Timestamps are copied, so nothing counts as a transition the
    /// reference made itself.
    pub(crate) fn sync_loaded_reference(&mut self, reference: NodeIndex) -> TreeResult<()> {
        let Some(policy) = self.reference_state(reference).map(|s| s.policy) else {
            return Ok(());
        };
        let finished = self.option(reference, "finished").cloned();
        if finished.is_some() && !policy.propagate_finish {
            return Ok(());
        }
        let Some(target) = self.resolve_reference(reference)? else {
            return Ok(());
        };

        if let Some(started) = self.option(reference, "started").cloned() {
            if !self.is_started(target) && self.accepts_option(target, "started") {
                self.store_option(target, "started", started);
            }
        }
        match finished {
            Some(finished) => {
                if !self.is_finished(target) && self.accepts_option(target, "finished") {
                    self.store_option(target, "finished", finished);
                }
                self.release_reference(reference);
            }
            None => {
                if let Some(target_finished) = self.option(target, "finished").cloned() {
                    self.store_option(reference, "finished", target_finished);
                    self.release_reference(reference);
                }
            }
        }
        Ok(())
    }

    fn accepts_option(&self, node: NodeIndex, name: &str) -> bool {
        self.node_type_of(node)
            .is_some_and(|nt| nt.options.contains_key(name) || nt.behavior.accepts_any_option())
    }

    // ============================================================
    // Reference transitions
    // ============================================================

    pub(crate) fn start_reference_target(&mut self, reference: NodeIndex) -> TreeResult<()> {
        let Some(state) = self.reference_state(reference) else {
            return Ok(());
        };
        let Some(target) = state.target else {
            return Ok(());
        };
        if state.in_transition || self.is_started(target) {
            return Ok(());
        }
        self.guarded(reference, true, |tree| match tree.start(target) {
            Err(TreeError::CantStart { node }) => {
                debug!("{node} does not start with its reference");
                Ok(false)
            }
            other => other.map(|()| true),
        })
    }

    pub(crate) fn finish_reference_target(&mut self, reference: NodeIndex) -> TreeResult<()> {
        let Some(state) = self.reference_state(reference) else {
            return Ok(());
        };
        let Some(target) = state.target else {
            return Ok(());
        };
        if state.in_transition || !state.policy.propagate_finish || self.is_finished(target) {
            return Ok(());
        }
        self.guarded(reference, false, |tree| tree.finish(target).map(|()| true))
    }

    pub(crate) fn unfinish_reference_target(&mut self, reference: NodeIndex) -> TreeResult<()> {
        let Some(target) = self.resolve_reference(reference)? else {
            return Ok(());
        };
        let Some(state) = self.reference_state(reference) else {
            return Ok(());
        };
        if state.in_transition || !state.policy.propagate_unfinish || !self.is_finished(target) {
            return Ok(());
        }
        if let Some(state) = self.reference_state_mut(reference) {
            state.in_transition = true;
            state.transitions.did_finish = false;
        }
        let result = self.unfinish(target);
        if let Some(state) = self.reference_state_mut(reference) {
            state.in_transition = false;
        }
        result.map(|_| ())
    }

    /// Runs a propagation with the reference's re-entrancy flag raised and
    /// records it when `action` reports it happened.
    fn guarded(
        &mut self,
        reference: NodeIndex,
        start: bool,
        action: impl FnOnce(&mut Tree) -> TreeResult<bool>,
    ) -> TreeResult<()> {
        if let Some(state) = self.reference_state_mut(reference) {
            state.in_transition = true;
        }
        let result = action(self);
        if let Some(state) = self.reference_state_mut(reference) {
            state.in_transition = false;
            if let Ok(true) = result {
                if start {
                    state.transitions.did_start = true;
                } else {
                    state.transitions.did_finish = true;
                }
            }
        }
        result.map(|_| ())
    }

    // ============================================================
    // Proxy transitions
    // ============================================================

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn start_proxy(&mut self, proxy: NodeIndex) -> TreeResult<()> {
        let state = self.proxy_state(proxy).ok_or(TreeError::StaleNode)?;
        let target = state.target;
        if state.in_transition || self.is_started(target) {
            return Ok(());
        }
        self.set_proxy_transition(proxy, true);
        let result = self.start(target);
        self.set_proxy_transition(proxy, false);
        result?;
        if let Some(state) = self.proxy_state_mut(proxy) {
            state.transitions.did_start = true;
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn finish_proxy(&mut self, proxy: NodeIndex) -> TreeResult<()> {
        let state = self.proxy_state(proxy).ok_or(TreeError::StaleNode)?;
        let target = state.target;
        if state.in_transition || self.is_finished(target) {
            return Ok(());
        }
        self.set_proxy_transition(proxy, true);
        let result = self.finish(target);
        self.set_proxy_transition(proxy, false);
        result?;
        if let Some(state) = self.proxy_state_mut(proxy) {
            state.transitions.did_finish = true;
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn unfinish_proxy(&mut self, proxy: NodeIndex) -> TreeResult<bool> {
        let state = self.proxy_state(proxy).ok_or(TreeError::StaleNode)?;
        let target = state.target;
        if state.in_transition {
            return Ok(!self.is_finished(target));
        }
        self.set_proxy_transition(proxy, true);
        let result = self.unfinish(target);
        self.set_proxy_transition(proxy, false);
        if let (Ok(true), Some(state)) = (&result, self.proxy_state_mut(proxy)) {
            state.transitions.did_finish = false;
        }
        result
    }

    fn set_proxy_transition(&mut self, proxy: NodeIndex, value: bool) {
        if let Some(state) = self.proxy_state_mut(proxy) {
            state.in_transition = value;
        }
    }
}
