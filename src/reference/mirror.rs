//! Lazy proxy materialization for reference mirrors.

use std::sync::Arc;

use tracing::trace;

use crate::domain::arena::{NodeIndex, NodeKind, Tree, TreeNode};
use crate::reference::state::{ProxyState, ReferenceState, Transitions};

impl Tree {
    pub(crate) fn reference_state(&self, node: NodeIndex) -> Option<&ReferenceState> {
        match &self.arena.get(node)?.kind {
            NodeKind::Reference(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn reference_state_mut(&mut self, node: NodeIndex) -> Option<&mut ReferenceState> {
        match &mut self.arena.get_mut(node)?.kind {
            NodeKind::Reference(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn proxy_state(&self, node: NodeIndex) -> Option<&ProxyState> {
        match &self.arena.get(node)?.kind {
            NodeKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub(crate) fn proxy_state_mut(&mut self, node: NodeIndex) -> Option<&mut ProxyState> {
        match &mut self.arena.get_mut(node)?.kind {
            NodeKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Resolved target of a reference, seen through proxies.
    pub fn reference_target(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.reference_state(self.real(node))?.target
    }

    /// The node one proxy layer below `node`.
    pub fn proxy_target(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.proxy_state(node).map(ProxyState::target)
    }

    /// Reference whose mirror `node` belongs to.
    pub fn proxy_owner(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.proxy_state(node).map(ProxyState::owner)
    }

    /// Number of proxies a reference currently caches.
    pub fn proxy_count(&self, node: NodeIndex) -> usize {
        self.reference_state(self.real(node))
            .map_or(0, ReferenceState::proxy_count)
    }

    /// Transitions a reference or proxy pushed to its target itself.
    pub fn transitions(&self, node: NodeIndex) -> Option<Transitions> {
        match &self.arena.get(node)?.kind {
            NodeKind::Reference(state) => Some(state.transitions),
            NodeKind::Proxy(proxy) => Some(proxy.transitions),
            NodeKind::Plain => None,
        }
    }

    /// Handle for `node` as seen under the reference `owner`.
    ///
    /// The owner's target maps to the owner itself; any other node gets the
    /// cached proxy, created on first use.
    pub(crate) fn wrap(&mut self, owner: NodeIndex, node: NodeIndex) -> NodeIndex {
        let Some(state) = self.reference_state(owner) else {
            return node;
        };
        if state.target == Some(node) {
            return owner;
        }
        if let Some(&proxy) = state.proxies.get(&node) {
            if self.arena.contains(proxy) {
                return proxy;
            }
        }
        let Some(node_type) = self.node_type_of(node) else {
            return node;
        };
        let recursing = self.leads_to(node, owner);
        let proxy = self.arena.insert(TreeNode::new(
            Arc::clone(&node_type),
            None,
            None,
            NodeKind::Proxy(ProxyState::new(node, owner, recursing)),
        ));
        if let Some(state) = self.reference_state_mut(owner) {
            state.proxies.insert(node, proxy);
        }
        self.proxied.entry(node).or_default().push(proxy);
        trace!(?proxy, ?owner, recursing, "materialized proxy");
        proxy
    }

    /// Whether `node` is `owner` or a proxy chain ending at it.
    fn leads_to(&self, node: NodeIndex, owner: NodeIndex) -> bool {
        let mut current = node;
        loop {
            if current == owner {
                return true;
            }
            match self.proxy_state(current) {
                Some(proxy) => current = proxy.target,
                None => return false,
            }
        }
    }

    /// References whose mirrors a handle's children are seen through,
    /// outermost first.
    pub(crate) fn mirror_layers(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut layers = Vec::new();
        let mut current = node;
        for _ in 0..=self.arena.len() {
            match self.arena.get(current).map(|n| &n.kind) {
                Some(NodeKind::Proxy(proxy)) => {
                    layers.push(proxy.owner);
                    current = proxy.target;
                }
                Some(NodeKind::Reference(state)) => match state.target {
                    Some(target) => {
                        layers.push(current);
                        current = target;
                    }
                    None => break,
                },
                _ => break,
            }
        }
        layers
    }

    /// Wraps a real node back into the mirrors named by `layers`.
    pub(crate) fn rewrap(&mut self, layers: &[NodeIndex], node: NodeIndex) -> NodeIndex {
        layers
            .iter()
            .rev()
            .fold(node, |handle, &owner| self.wrap(owner, handle))
    }

    /// Discards the proxies stacked on top of a real node.
    pub(crate) fn drop_proxy_chain(&mut self, node: NodeIndex) {
        let mut current = node;
        while let Some(proxy) = self.proxy_state(current) {
            let target = proxy.target;
            self.remove_proxy(current);
            current = target;
        }
    }

    /// Clears a reference's proxy cache. An active proxy hands activity to
    /// the reference.
    pub(crate) fn release_proxies(&mut self, node: NodeIndex) {
        let Some(state) = self.reference_state_mut(node) else {
            return;
        };
        let proxies: Vec<NodeIndex> = state.proxies.drain().map(|(_, proxy)| proxy).collect();
        for proxy in proxies {
            self.remove_proxy(proxy);
        }
    }

    /// Discards every proxy standing in for `node`, in any mirror.
    pub(crate) fn forget_proxies_of(&mut self, node: NodeIndex) {
        for proxy in self.proxied.remove(&node).unwrap_or_default() {
            self.remove_proxy(proxy);
        }
    }

    /// Removes a proxy together with the proxies stacked on it. Each one
    /// leaves its owner's cache, and an active one hands activity to its owner.
    fn remove_proxy(&mut self, proxy: NodeIndex) {
        let mut pending = vec![proxy];
        while let Some(current) = pending.pop() {
            let Some(state) = self.proxy_state(current) else {
                continue;
            };
            let (owner, target) = (state.owner, state.target);
            if let Some(cache) = self.reference_state_mut(owner) {
                if cache.proxies.get(&target) == Some(&current) {
                    cache.proxies.remove(&target);
                }
            }
            if let Some(siblings) = self.proxied.get_mut(&target) {
                siblings.retain(|&p| p != current);
                if siblings.is_empty() {
                    self.proxied.remove(&target);
                }
            }
            pending.extend(self.proxied.remove(&current).unwrap_or_default());
            self.arena.remove(current);
            if self.active == current {
                self.active = if self.arena.contains(owner) {
                    owner
                } else {
                    self.root()
                };
            }
            trace!(proxy = ?current, ?owner, "discarded proxy");
        }
    }
}
