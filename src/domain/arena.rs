//! Arena-backed node store.
//!
//! Nodes live in a generational arena and are addressed by stable
//! [`NodeIndex`] handles. Sibling order is a doubly linked list whose head
//! and tail are owned by the parent. Proxy nodes of reference mirrors are
//! arena entries too, see [`crate::reference`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use generational_arena::Arena;
use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::domain::behavior::{NodeRegistry, NodeType};
use crate::domain::error::{StructuralRule, TreeError, TreeResult};
use crate::domain::id::{IdSource, NodeId};
use crate::domain::nodes::ROOT_TYPE;
use crate::domain::options::OptionValue;
use crate::query::QueryFilter;
use crate::reference::{ProxyState, ReferenceState};

pub use generational_arena::Index as NodeIndex;

/// Text shown by a proxy that closes a reference cycle.
pub const RECURSING_TEXT: &str = "<recursing>";

/// Head of a parent's child list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChildList {
    pub first: Option<NodeIndex>,
    pub last: Option<NodeIndex>,
    pub len: usize,
}

#[derive(Debug)]
pub enum NodeKind {
    Plain,
    Reference(ReferenceState),
    Proxy(ProxyState),
}

/// Tree node in the arena.
#[derive(Debug)]
pub struct TreeNode {
    pub(crate) node_type: Arc<NodeType>,
    pub(crate) text: Option<String>,
    pub(crate) id: Option<NodeId>,
    pub(crate) options: IndexMap<String, OptionValue>,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) prev: Option<NodeIndex>,
    pub(crate) next: Option<NodeIndex>,
    pub(crate) children: ChildList,
    pub(crate) kind: NodeKind,
    pub(crate) rooted: bool,
    /// `load_finished` already ran.
    pub(crate) loaded: bool,
}

impl TreeNode {
    pub(crate) fn new(
        node_type: Arc<NodeType>,
        text: Option<String>,
        id: Option<NodeId>,
        kind: NodeKind,
    ) -> Self {
        Self {
            node_type,
            text,
            id,
            options: IndexMap::new(),
            parent: None,
            prev: None,
            next: None,
            children: ChildList::default(),
            kind,
            rooted: false,
            loaded: false,
        }
    }

    pub fn node_type(&self) -> &str {
        &self.node_type.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn id(&self) -> Option<&NodeId> {
        self.id.as_ref()
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> ChildList {
        self.children
    }

    pub fn options(&self) -> &IndexMap<String, OptionValue> {
        &self.options
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, NodeKind::Proxy(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, NodeKind::Reference(_))
    }
}

/// How [`Tree::copy`] clones a node.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub children: bool,
    pub options: bool,
    pub keep_ids: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            children: true,
            options: true,
            keep_ids: false,
        }
    }
}

/// A rooted tree of nodes with an id index.
pub struct Tree {
    pub(crate) arena: Arena<TreeNode>,
    root: NodeIndex,
    ids: HashMap<NodeId, NodeIndex>,
    registry: Arc<NodeRegistry>,
    id_source: Box<dyn IdSource>,
    id_attempts: usize,
    pub(crate) max_ticks: usize,
    loading: bool,
    pub(crate) active: NodeIndex,
    pub(crate) query_filters: Vec<Arc<dyn QueryFilter>>,
    /// Real or proxied node -> proxies standing in for it, across all mirrors.
    pub(crate) proxied: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.arena.len())
            .field("ids", &self.ids.len())
            .field("root", &self.root)
            .field("active", &self.active)
            .field("loading", &self.loading)
            .finish()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        crate::domain::TreeBuilder::new().build()
    }

    pub(crate) fn from_parts(
        registry: Arc<NodeRegistry>,
        id_source: Box<dyn IdSource>,
        id_attempts: usize,
        max_ticks: usize,
    ) -> TreeResult<Self> {
        let root_type = registry
            .get(ROOT_TYPE)
            .ok_or_else(|| TreeError::UnknownType(ROOT_TYPE.to_string()))?;
        let mut arena = Arena::new();
        let mut root_node = TreeNode::new(root_type, None, Some(NodeId::root()), NodeKind::Plain);
        root_node.rooted = true;
        root_node.loaded = true;
        let root = arena.insert(root_node);
        let mut ids = HashMap::new();
        ids.insert(NodeId::root(), root);
        Ok(Self {
            arena,
            root,
            ids,
            registry,
            id_source,
            id_attempts,
            max_ticks,
            loading: false,
            active: root,
            query_filters: Vec::new(),
            proxied: HashMap::new(),
        })
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn max_ticks(&self) -> usize {
        self.max_ticks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn get(&self, node: NodeIndex) -> Option<&TreeNode> {
        self.arena.get(node)
    }

    pub(crate) fn node(&self, node: NodeIndex) -> TreeResult<&TreeNode> {
        self.arena.get(node).ok_or(TreeError::StaleNode)
    }

    pub(crate) fn node_mut(&mut self, node: NodeIndex) -> TreeResult<&mut TreeNode> {
        self.arena.get_mut(node).ok_or(TreeError::StaleNode)
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.arena.contains(node)
    }

    /// The real node behind a handle, following proxies.
    pub fn real(&self, node: NodeIndex) -> NodeIndex {
        let mut current = node;
        while let Some(NodeKind::Proxy(proxy)) = self.arena.get(current).map(|n| &n.kind) {
            current = proxy.target;
        }
        current
    }

    /// The node whose child list holds the children shown under `node`:
    /// proxies and resolved references are followed to their target.
    pub(crate) fn content_node(&self, node: NodeIndex) -> NodeIndex {
        let mut current = self.real(node);
        for _ in 0..=self.arena.len() {
            match self.arena.get(current).map(|n| &n.kind) {
                Some(NodeKind::Reference(state)) => match state.target {
                    Some(target) => current = self.real(target),
                    None => break,
                },
                _ => break,
            }
        }
        current
    }

    pub fn node_type(&self, node: NodeIndex) -> &str {
        self.arena
            .get(self.real(node))
            .map(|n| n.node_type.name.as_str())
            .unwrap_or("")
    }

    pub(crate) fn node_type_of(&self, node: NodeIndex) -> Option<Arc<NodeType>> {
        self.arena
            .get(self.real(node))
            .map(|n| Arc::clone(&n.node_type))
    }

    pub fn text(&self, node: NodeIndex) -> Option<&str> {
        if self.is_recursing(node) {
            return Some(RECURSING_TEXT);
        }
        self.arena.get(self.real(node)).and_then(|n| n.text.as_deref())
    }

    pub fn id(&self, node: NodeIndex) -> Option<&NodeId> {
        self.arena.get(self.real(node)).and_then(|n| n.id.as_ref())
    }

    pub fn is_proxy(&self, node: NodeIndex) -> bool {
        self.arena.get(node).is_some_and(TreeNode::is_proxy)
    }

    pub fn is_reference(&self, node: NodeIndex) -> bool {
        self.arena.get(self.real(node)).is_some_and(TreeNode::is_reference)
    }

    pub fn is_rooted(&self, node: NodeIndex) -> bool {
        self.arena.get(self.real(node)).is_some_and(|n| n.rooted)
    }

    /// Human readable `type: text` description, used in errors and logs.
    pub fn describe(&self, node: NodeIndex) -> String {
        let base = match self.text(node) {
            Some(text) => format!("{}: {}", self.node_type(node), text),
            None => self.node_type(node).to_string(),
        };
        if self.is_proxy(node) {
            format!("proxy: {base}")
        } else {
            base
        }
    }

    pub fn find_by_id(&self, id: &NodeId) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    // ============================================================
    // Creation
    // ============================================================

    /// Creates a floating node of `node_type`.
    ///
    /// Parent dependent rules are only checked when `parent` is given; the
    /// node is not linked.
    #[instrument(level = "debug", skip(self))]
    pub fn create(
        &mut self,
        node_type: &str,
        text: Option<&str>,
        parent: Option<NodeIndex>,
        id: Option<&str>,
    ) -> TreeResult<NodeIndex> {
        let nt = self
            .registry
            .get(node_type)
            .ok_or_else(|| TreeError::UnknownType(node_type.to_string()))?;
        let desc = match text {
            Some(text) => format!("{}: {}", nt.name, text),
            None => nt.name.clone(),
        };
        check_text(&nt, text, &desc)?;
        let id = id.map(NodeId::parse).transpose()?;
        if let Some(parent) = parent {
            let parent = self.content_node(parent);
            self.check_placement(parent, &nt, &desc)?;
        }
        let kind = nt.behavior.init_kind(text, &self.registry)?;
        let node = TreeNode::new(nt, text.map(str::to_string), id, kind);
        let idx = self.arena.insert(node);
        trace!(?idx, "created {desc}");
        Ok(idx)
    }

    /// Creates a node and appends it to `parent`.
    pub fn create_child(
        &mut self,
        parent: NodeIndex,
        node_type: &str,
        text: Option<&str>,
    ) -> TreeResult<NodeIndex> {
        let child = self.create(node_type, text, Some(parent), None)?;
        self.add_child(parent, child)
    }

    pub fn create_child_with_id(
        &mut self,
        parent: NodeIndex,
        node_type: &str,
        text: Option<&str>,
        id: &str,
    ) -> TreeResult<NodeIndex> {
        let child = self.create(node_type, text, Some(parent), Some(id))?;
        self.add_child(parent, child)
    }

    pub fn set_text(&mut self, node: NodeIndex, text: Option<&str>) -> TreeResult<()> {
        let real = self.real(node);
        let nt = self.node_type_of(real).ok_or(TreeError::StaleNode)?;
        check_text(&nt, text, &self.describe(real))?;
        if self.is_reference(real) {
            return self.retarget(real, text);
        }
        self.node_mut(real)?.text = text.map(str::to_string);
        Ok(())
    }

    // ============================================================
    // Linking
    // ============================================================

    /// Appends `child` to the end of `parent`'s children.
    pub fn add_child(&mut self, parent: NodeIndex, child: NodeIndex) -> TreeResult<NodeIndex> {
        self.insert_child(parent, child, None, None)
    }

    /// Links the floating `child` under `parent`, before and/or after existing
    /// children. Proxies are unwrapped; the returned handle is re-wrapped for
    /// the mirror `parent` belongs to.
    #[instrument(level = "debug", skip(self))]
    pub fn insert_child(
        &mut self,
        parent: NodeIndex,
        child: NodeIndex,
        before: Option<NodeIndex>,
        after: Option<NodeIndex>,
    ) -> TreeResult<NodeIndex> {
        let layers = self.mirror_layers(parent);
        let real_parent = self.content_node(parent);
        let real_child = self.real(child);
        let before = before.map(|b| self.real(b));
        let after = after.map(|a| self.real(a));
        self.link(real_parent, real_child, before, after)?;
        Ok(self.rewrap(&layers, real_child))
    }

    fn link(
        &mut self,
        parent: NodeIndex,
        child: NodeIndex,
        before: Option<NodeIndex>,
        after: Option<NodeIndex>,
    ) -> TreeResult<()> {
        let desc = self.describe(child);
        if self.node(child)?.parent.is_some() {
            return Err(TreeError::structural(desc, StructuralRule::AlreadyAttached));
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(TreeError::structural(desc, StructuralRule::Cycle));
            }
            cursor = self.node(current)?.parent;
        }
        let child_type = Arc::clone(&self.node(child)?.node_type);
        self.check_placement(parent, &child_type, &desc)?;
        for anchor in before.iter().chain(after.iter()) {
            if self.arena.get(*anchor).and_then(|n| n.parent) != Some(parent) {
                return Err(TreeError::structural(
                    desc,
                    StructuralRule::NotAChild {
                        anchor: self.describe(*anchor),
                    },
                ));
            }
        }

        let rooted = self.node(parent)?.rooted;
        let assigned = if rooted {
            self.plan_ids(child)?
        } else {
            Vec::new()
        };

        self.splice(parent, child, before, after)?;
        self.node_mut(child)?.parent = Some(parent);

        if rooted {
            self.register_subtree(child, assigned);
            if !self.loading {
                self.run_load_finished(child)?;
            }
        }
        debug!("linked {desc}");
        Ok(())
    }

    /// Inserts `child` into `parent`'s sibling list after checking the
    /// neighbors agree with each other. Nothing changes on failure.
    fn splice(
        &mut self,
        parent: NodeIndex,
        child: NodeIndex,
        before: Option<NodeIndex>,
        after: Option<NodeIndex>,
    ) -> TreeResult<()> {
        let list = self.node(parent)?.children;
        let (prev, next) = match (before, after) {
            (None, None) => (list.last, None),
            (Some(b), None) => (self.node(b)?.prev, Some(b)),
            (None, Some(a)) => (Some(a), self.node(a)?.next),
            (Some(b), Some(a)) => (Some(a), Some(b)),
        };
        let prev_next = match prev {
            Some(p) => self.node(p)?.next,
            None => list.first,
        };
        let next_prev = match next {
            Some(n) => self.node(n)?.prev,
            None => list.last,
        };
        if prev_next != next || next_prev != prev {
            return Err(TreeError::structural(
                self.describe(child),
                StructuralRule::ListIntegrity {
                    detail: format!("neighbors {prev:?} and {next:?} are not adjacent"),
                },
            ));
        }

        {
            let node = self.node_mut(child)?;
            node.prev = prev;
            node.next = next;
        }
        match prev {
            Some(p) => self.node_mut(p)?.next = Some(child),
            None => self.node_mut(parent)?.children.first = Some(child),
        }
        match next {
            Some(n) => self.node_mut(n)?.prev = Some(child),
            None => self.node_mut(parent)?.children.last = Some(child),
        }
        self.node_mut(parent)?.children.len += 1;
        Ok(())
    }

    /// Removes `child` from `parent`'s sibling list in O(1).
    fn unsplice(&mut self, parent: NodeIndex, child: NodeIndex) -> TreeResult<()> {
        let list = self.node(parent)?.children;
        let (prev, next) = {
            let node = self.node(child)?;
            (node.prev, node.next)
        };
        let prev_next = match prev {
            Some(p) => self.node(p)?.next,
            None => list.first,
        };
        let next_prev = match next {
            Some(n) => self.node(n)?.prev,
            None => list.last,
        };
        if prev_next != Some(child) || next_prev != Some(child) {
            return Err(TreeError::structural(
                self.describe(child),
                StructuralRule::ListIntegrity {
                    detail: "neighbors do not point back at the node".to_string(),
                },
            ));
        }

        match prev {
            Some(p) => self.node_mut(p)?.next = next,
            None => self.node_mut(parent)?.children.first = next,
        }
        match next {
            Some(n) => self.node_mut(n)?.prev = prev,
            None => self.node_mut(parent)?.children.last = prev,
        }
        let node = self.node_mut(child)?;
        node.prev = None;
        node.next = None;
        node.parent = None;
        self.node_mut(parent)?.children.len -= 1;
        Ok(())
    }

    /// Removes `child` from `parent`. Fails if it is not a child of `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, parent: NodeIndex, child: NodeIndex) -> TreeResult<NodeIndex> {
        let real_parent = self.content_node(parent);
        let real_child = self.real(child);
        if self.node(real_child)?.parent != Some(real_parent) {
            return Err(TreeError::structural(
                self.describe(child),
                StructuralRule::NotAChild {
                    anchor: self.describe(child),
                },
            ));
        }
        self.detach(child)
    }

    /// Unlinks a node from its parent and the id index. Detaching a proxy
    /// detaches its real node and discards the proxy. Returns the real node.
    /// The root cannot be detached.
    #[instrument(level = "debug", skip(self))]
    pub fn detach(&mut self, node: NodeIndex) -> TreeResult<NodeIndex> {
        let real = self.real(node);
        self.node(real)?;
        if real == self.root {
            return Err(TreeError::structural(self.describe(real), StructuralRule::Root));
        }
        self.drop_proxy_chain(node);
        let Some(parent) = self.node(real)?.parent else {
            return Ok(real);
        };
        self.unsplice(parent, real)?;
        if self.node(real)?.rooted {
            self.unregister_subtree(real);
        }
        debug!("detached {}", self.describe(real));
        Ok(real)
    }

    /// Frees a floating subtree. Rooted nodes are detached first.
    pub fn discard(&mut self, node: NodeIndex) -> TreeResult<()> {
        let real = self.detach(node)?;
        for idx in self.real_subtree(real) {
            self.release_proxies(idx);
            self.forget_proxies_of(idx);
            self.arena.remove(idx);
        }
        Ok(())
    }

    /// Real nodes of a subtree in pre-order, mirrors excluded.
    pub(crate) fn real_subtree(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(n) = self.arena.get(current) else {
                continue;
            };
            out.push(current);
            let mut child = n.children.last;
            while let Some(c) = child {
                stack.push(c);
                child = self.arena.get(c).and_then(|x| x.prev);
            }
        }
        out
    }

    // ============================================================
    // Ids
    // ============================================================

    /// Checks existing ids of a subtree against the index and allocates ids
    /// for nodes that have none. Nothing is registered yet.
    fn plan_ids(&mut self, node: NodeIndex) -> TreeResult<Vec<(NodeIndex, NodeId)>> {
        let mut taken: HashSet<NodeId> = HashSet::new();
        let mut missing = Vec::new();
        for idx in self.real_subtree(node) {
            match self.node(idx)?.id.clone() {
                Some(id) => {
                    if self.ids.contains_key(&id) || !taken.insert(id.clone()) {
                        return Err(TreeError::structural(
                            self.describe(idx),
                            StructuralRule::DuplicateId { id: id.to_string() },
                        ));
                    }
                }
                None => missing.push(idx),
            }
        }
        let mut assigned = Vec::with_capacity(missing.len());
        for idx in missing {
            let id = self.allocate_id(&taken)?;
            taken.insert(id.clone());
            assigned.push((idx, id));
        }
        Ok(assigned)
    }

    fn allocate_id(&mut self, taken: &HashSet<NodeId>) -> TreeResult<NodeId> {
        for _ in 0..self.id_attempts {
            let candidate = self.id_source.candidate();
            if !self.ids.contains_key(&candidate) && !taken.contains(&candidate) {
                return Ok(candidate);
            }
            trace!(%candidate, "id collision");
        }
        Err(TreeError::IdExhausted {
            attempts: self.id_attempts,
        })
    }

    fn register_subtree(&mut self, node: NodeIndex, assigned: Vec<(NodeIndex, NodeId)>) {
        for (idx, id) in assigned {
            if let Some(n) = self.arena.get_mut(idx) {
                n.id = Some(id);
            }
        }
        for idx in self.real_subtree(node) {
            if let Some(n) = self.arena.get_mut(idx) {
                n.rooted = true;
                if let Some(id) = n.id.clone() {
                    self.ids.insert(id, idx);
                }
            }
        }
    }

    fn unregister_subtree(&mut self, node: NodeIndex) {
        for idx in self.real_subtree(node) {
            self.release_proxies(idx);
            self.forget_proxies_of(idx);
            if let Some(n) = self.arena.get_mut(idx) {
                n.rooted = false;
                if let Some(id) = &n.id {
                    if self.ids.get(id) == Some(&idx) {
                        self.ids.remove(id);
                    }
                }
            }
            if self.active == idx {
                self.active = self.root;
            }
        }
    }

    // ============================================================
    // Bulk loading
    // ============================================================

    /// Defers `load_finished` hooks until [`Tree::finish_load`].
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Leaves bulk-load mode and runs every pending `load_finished` hook in
    /// pre-order.
    #[instrument(level = "debug", skip(self))]
    pub fn finish_load(&mut self) -> TreeResult<()> {
        self.loading = false;
        let root = self.root;
        self.run_load_finished(root)
    }

    fn run_load_finished(&mut self, node: NodeIndex) -> TreeResult<()> {
        for idx in self.real_subtree(node) {
            let Some(n) = self.arena.get_mut(idx) else {
                continue;
            };
            if n.loaded || !n.rooted {
                continue;
            }
            n.loaded = true;
            let nt = Arc::clone(&n.node_type);
            nt.behavior.load_finished(self, idx)?;
        }
        Ok(())
    }

    // ============================================================
    // Copy
    // ============================================================

    /// Deep copies a node into a new floating node. `parent` is only used for
    /// validation; link the copy with [`Tree::add_child`].
    #[instrument(level = "debug", skip(self))]
    pub fn copy(
        &mut self,
        node: NodeIndex,
        parent: Option<NodeIndex>,
        options: CopyOptions,
    ) -> TreeResult<NodeIndex> {
        let src = self.real(node);
        let (type_name, text, id, stored, validation_parent) = {
            let n = self.node(src)?;
            (
                n.node_type.name.clone(),
                n.text.clone(),
                n.id.clone(),
                n.options.clone(),
                parent.or(n.parent),
            )
        };
        let id = if options.keep_ids { id } else { None };
        let new = self.create(
            &type_name,
            text.as_deref(),
            validation_parent,
            id.as_ref().map(NodeId::as_str),
        )?;
        if options.options {
            self.node_mut(new)?.options = stored;
        }
        if options.children {
            let mut child = self.node(src)?.children.first;
            while let Some(c) = child {
                let copied = self.copy(c, Some(new), options)?;
                self.link(new, copied, None, None)?;
                child = self.node(c)?.next;
            }
        }
        Ok(new)
    }

    // ============================================================
    // Navigation
    // ============================================================

    /// Parent as seen through mirrors.
    pub fn parent(&mut self, node: NodeIndex) -> Option<NodeIndex> {
        match &self.arena.get(node)?.kind {
            NodeKind::Proxy(proxy) => {
                let (owner, target) = (proxy.owner, proxy.target);
                let parent = self.parent(target)?;
                Some(self.wrap(owner, parent))
            }
            _ => self.arena.get(node)?.parent,
        }
    }

    pub fn first_child(&mut self, node: NodeIndex) -> Option<NodeIndex> {
        self.edge_child(node, true)
    }

    pub fn last_child(&mut self, node: NodeIndex) -> Option<NodeIndex> {
        self.edge_child(node, false)
    }

    fn edge_child(&mut self, node: NodeIndex, first: bool) -> Option<NodeIndex> {
        let (owner, source) = match &self.arena.get(node)?.kind {
            NodeKind::Plain => {
                let list = self.arena.get(node)?.children;
                return if first { list.first } else { list.last };
            }
            NodeKind::Reference(state) => (node, state.target?),
            NodeKind::Proxy(proxy) if proxy.recursing => return None,
            NodeKind::Proxy(proxy) => (proxy.owner, proxy.target),
        };
        let child = self.edge_child(source, first)?;
        Some(self.wrap(owner, child))
    }

    pub fn next_sibling(&mut self, node: NodeIndex) -> Option<NodeIndex> {
        self.sibling(node, true)
    }

    pub fn prev_sibling(&mut self, node: NodeIndex) -> Option<NodeIndex> {
        self.sibling(node, false)
    }

    fn sibling(&mut self, node: NodeIndex, forward: bool) -> Option<NodeIndex> {
        let n = self.arena.get(node)?;
        match &n.kind {
            NodeKind::Proxy(proxy) => {
                let (owner, target) = (proxy.owner, proxy.target);
                let sibling = self.sibling(target, forward)?;
                Some(self.wrap(owner, sibling))
            }
            _ => {
                if forward {
                    n.next
                } else {
                    n.prev
                }
            }
        }
    }

    pub fn children(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut child = self.first_child(node);
        while let Some(c) = child {
            out.push(c);
            child = self.next_sibling(c);
        }
        out
    }

    /// Children stored on the real node itself; mirrors are not consulted,
    /// so a reference has none.
    pub fn real_children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut child = self.arena.get(node).and_then(|n| n.children.first);
        while let Some(c) = child {
            out.push(c);
            child = self.arena.get(c).and_then(|n| n.next);
        }
        out
    }

    /// Siblings after `node`, nearest first.
    pub fn siblings_after(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut cursor = SiblingCursor::after(self, node);
        std::iter::from_fn(|| cursor.advance(self)).collect()
    }

    /// Siblings before `node`, nearest first.
    pub fn siblings_before(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut cursor = SiblingCursor::before(self, node);
        std::iter::from_fn(|| cursor.advance(self)).collect()
    }

    /// Parents of `node`, nearest first, ending at the root.
    pub fn ancestors(&mut self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Depth-first pre-order descendants as `(depth, node)`, depth 1 for
    /// children. `descend` can veto walking into a node's children.
    pub fn walk(
        &mut self,
        node: NodeIndex,
        mut descend: impl FnMut(&Tree, usize, NodeIndex) -> bool,
    ) -> Vec<(usize, NodeIndex)> {
        let mut cursor = FlatCursor::new(self, node);
        let mut out = Vec::new();
        while let Some((depth, n)) = cursor.advance(self) {
            out.push((depth, n));
            if !descend(self, depth, n) {
                cursor.skip_children();
            }
        }
        out
    }

    pub fn descendants(&mut self, node: NodeIndex) -> Vec<(usize, NodeIndex)> {
        self.walk(node, |_, _, _| true)
    }

    // ============================================================
    // Options
    // ============================================================

    /// Stored option value, read through proxies.
    pub fn option(&self, node: NodeIndex, name: &str) -> Option<&OptionValue> {
        self.arena.get(self.real(node))?.options.get(name)
    }

    /// Stores a value without running option semantics.
    pub fn store_option(&mut self, node: NodeIndex, name: &str, value: OptionValue) {
        let real = self.real(node);
        if let Some(n) = self.arena.get_mut(real) {
            n.options.insert(name.to_string(), value);
        }
    }

    pub fn clear_option(&mut self, node: NodeIndex, name: &str) -> Option<OptionValue> {
        let real = self.real(node);
        self.arena.get_mut(real)?.options.shift_remove(name)
    }

    /// Sets an option by name, parsing `raw` for the option's kind.
    ///
    /// `active` activates the handle itself, so a proxy can be active while
    /// its target is not.
    #[instrument(level = "debug", skip(self))]
    pub fn set_option(&mut self, node: NodeIndex, name: &str, raw: Option<&str>) -> TreeResult<()> {
        let nt = self.node_type_of(node).ok_or(TreeError::StaleNode)?;
        match nt.options.get(name) {
            Some(kind) => match kind.parse(name, raw)? {
                Some(value) => self.store_option(node, name, value),
                None => {
                    self.activate(node, false)?;
                }
            },
            None if nt.behavior.accepts_any_option() => {
                let value = OptionValue::Text(raw.unwrap_or_default().to_string());
                self.store_option(node, name, value);
            }
            None => {
                return Err(TreeError::structural(
                    self.describe(node),
                    StructuralRule::NoSuchOption {
                        name: name.to_string(),
                    },
                ))
            }
        }
        Ok(())
    }

    /// Exportable options as `(name, value)`; flags and `active` have no value.
    pub fn option_values(&self, node: NodeIndex) -> Vec<(String, Option<String>)> {
        let real = self.real(node);
        let Some(n) = self.arena.get(real) else {
            return Vec::new();
        };
        let mut out: Vec<(String, Option<String>)> = n
            .options
            .iter()
            .map(|(name, value)| (name.clone(), value.display()))
            .collect();
        if n.node_type.options.contains_key("active") && self.active == node {
            out.push(("active".to_string(), None));
        }
        out
    }
}

fn check_text(nt: &NodeType, text: Option<&str>, desc: &str) -> TreeResult<()> {
    match text {
        Some(_) if nt.flags.textless => Err(TreeError::structural(desc, StructuralRule::TextForbidden)),
        None if nt.flags.text_required => {
            Err(TreeError::structural(desc, StructuralRule::TextRequired))
        }
        Some(text) if !nt.flags.multiline && text.contains('\n') => {
            Err(TreeError::structural(desc, StructuralRule::Multiline))
        }
        _ => Ok(()),
    }
}

impl Tree {
    /// Checks the type rules for placing a node of `child` type under the
    /// real node `parent`.
    fn check_placement(&self, parent: NodeIndex, child: &NodeType, desc: &str) -> TreeResult<()> {
        let parent_type = &self.node(parent)?.node_type;
        if child.flags.toplevel && parent != self.root {
            return Err(TreeError::structural(desc, StructuralRule::TopLevelOnly));
        }
        if let Some(allowed) = child.flags.children_of {
            if !allowed.contains(&parent_type.name.as_str()) {
                return Err(TreeError::structural(
                    desc,
                    StructuralRule::ChildrenOf {
                        parent_type: parent_type.name.clone(),
                    },
                ));
            }
        }
        if let Some(allowed) = parent_type.flags.allowed_children {
            if !allowed.contains(&child.name.as_str()) {
                return Err(TreeError::structural(
                    desc,
                    StructuralRule::AllowedChildren {
                        parent_type: parent_type.name.clone(),
                    },
                ));
            }
        }
        Ok(())
    }
}

/// Pull-based walk along a sibling chain.
#[derive(Debug, Clone)]
pub struct SiblingCursor {
    next: Option<NodeIndex>,
    forward: bool,
}

impl SiblingCursor {
    pub fn after(tree: &mut Tree, node: NodeIndex) -> Self {
        Self {
            next: tree.next_sibling(node),
            forward: true,
        }
    }

    pub fn before(tree: &mut Tree, node: NodeIndex) -> Self {
        Self {
            next: tree.prev_sibling(node),
            forward: false,
        }
    }

    pub fn children(tree: &mut Tree, node: NodeIndex) -> Self {
        Self {
            next: tree.first_child(node),
            forward: true,
        }
    }

    pub fn advance(&mut self, tree: &mut Tree) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = if self.forward {
            tree.next_sibling(current)
        } else {
            tree.prev_sibling(current)
        };
        Some(current)
    }
}

/// Pull-based depth-first pre-order walk over a subtree.
///
/// Children of the node returned last are only looked up on the next
/// advance, so [`FlatCursor::skip_children`] prevents them from ever being
/// materialized.
#[derive(Debug, Clone)]
pub struct FlatCursor {
    stack: Vec<(usize, Option<NodeIndex>)>,
    pending: Option<(usize, NodeIndex)>,
}

impl FlatCursor {
    pub fn new(tree: &mut Tree, node: NodeIndex) -> Self {
        Self {
            stack: vec![(1, tree.first_child(node))],
            pending: None,
        }
    }

    pub fn skip_children(&mut self) {
        self.pending = None;
    }

    pub fn advance(&mut self, tree: &mut Tree) -> Option<(usize, NodeIndex)> {
        if let Some((depth, node)) = self.pending.take() {
            let first = tree.first_child(node);
            if first.is_some() {
                self.stack.push((depth + 1, first));
            }
        }
        loop {
            let (depth, next) = self.stack.last_mut()?;
            match *next {
                Some(node) => {
                    let depth = *depth;
                    *next = tree.next_sibling(node);
                    self.pending = Some((depth, node));
                    return Some((depth, node));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
