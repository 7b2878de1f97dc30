//! Find-or-create driven by queries.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeIndex, Tree};
use crate::domain::error::{TreeError, TreeResult};
use crate::query::ast::{CreateRel, Placement, Plurality, Queries, Query, Retrieval, Segment};
use crate::query::eval::{Filter, Search, SegmentRun, TickCounter};

/// Why a segment cannot be created, if it cannot.
fn creation_blocker(segment: &Segment) -> Option<&'static str> {
    let Some(matcher) = &segment.matcher else {
        return Some("cannot create a node without type and text");
    };
    if !matcher.is_rigid() {
        return Some("cannot create a node without type and text");
    }
    if segment.retrieval == Retrieval::Parents {
        return Some("cannot create a parent node");
    }
    if segment.node_id.is_some() {
        return Some("cannot create a node with a given id");
    }
    if segment.plurality == Some(Plurality::Many) {
        return Some("cannot create more than one node");
    }
    if !matches!(
        segment.retrieval,
        Retrieval::Children | Retrieval::NextPeer | Retrieval::PrevPeer
    ) {
        return Some("cannot create with this separator");
    }
    if matcher.rel != CreateRel::Default
        && (segment.placement.is_some() || segment.plurality.is_some())
    {
        return Some("'+'/'-' conflicts with placement or plurality tags");
    }
    None
}

/// Creates the last segment of a query under the first match of the rest.
#[derive(Debug, Clone)]
pub struct Creator {
    prefix: Option<Query>,
    segment: Segment,
    is_before: bool,
    anchor_plurality: Plurality,
    anchor_tags: BTreeSet<String>,
}

impl Creator {
    pub fn new(query: &Query) -> TreeResult<Self> {
        let Some((segment, prefix)) = query.segments.split_last() else {
            return Err(TreeError::cant_create(query, "empty query"));
        };
        if let Some(reason) = creation_blocker(segment) {
            return Err(TreeError::cant_create(query, reason));
        }
        let rel = segment
            .matcher
            .as_ref()
            .map(|m| m.rel)
            .unwrap_or_default();

        let (is_before, anchor_plurality, anchor_tags) = match rel {
            CreateRel::Default => {
                let is_before = match segment.placement {
                    Some(Placement::Before) => true,
                    Some(Placement::After) => false,
                    None => segment.retrieval != Retrieval::PrevPeer,
                };
                let untagged = segment.tags.is_empty()
                    && segment.placement.is_none()
                    && segment.plurality.is_none();
                let tags = if untagged {
                    BTreeSet::from(["can_activate".to_string()])
                } else {
                    segment.tags.clone()
                };
                (
                    is_before,
                    segment.plurality.unwrap_or(Plurality::First),
                    tags,
                )
            }
            rel => {
                let is_last = rel == CreateRel::Last;
                let mut is_before = !is_last;
                if segment.retrieval == Retrieval::PrevPeer {
                    is_before = !is_before;
                }
                let plurality = if is_last {
                    Plurality::Last
                } else {
                    Plurality::First
                };
                (is_before, plurality, segment.tags.clone())
            }
        };

        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(Query {
                segments: prefix.to_vec(),
            })
        };
        Ok(Self {
            prefix,
            segment: segment.clone(),
            is_before,
            anchor_plurality,
            anchor_tags,
        })
    }

    pub fn is_before(&self) -> bool {
        self.is_before
    }

    pub fn anchor_plurality(&self) -> Plurality {
        self.anchor_plurality
    }

    /// Creates the node, or returns `None` when the prefix finds no parent.
    pub fn create(&self, tree: &mut Tree, start: NodeIndex) -> TreeResult<Option<NodeIndex>> {
        let mut counter = TickCounter::new(tree.max_ticks());
        self.create_counted(tree, start, &mut counter)
    }

    /// Like [`Creator::create`], with the prefix search and the anchor scan
    /// both charged to `counter`.
    #[instrument(level = "debug", skip(self, tree, counter))]
    pub fn create_counted(
        &self,
        tree: &mut Tree,
        start: NodeIndex,
        counter: &mut TickCounter,
    ) -> TreeResult<Option<NodeIndex>> {
        let parent = match &self.prefix {
            Some(prefix) => {
                let armed = std::mem::replace(counter, TickCounter::new(0));
                let prefix = std::slice::from_ref(prefix);
                let mut search = Search::with_counter(tree, start, prefix, armed);
                let first = search.next().transpose();
                *counter = search.into_counter();
                match first? {
                    Some(parent) => parent,
                    None => return Ok(None),
                }
            }
            None => start,
        };
        self.create_in(tree, parent, counter).map(Some)
    }

    fn create_in(
        &self,
        tree: &mut Tree,
        parent: NodeIndex,
        counter: &mut TickCounter,
    ) -> TreeResult<NodeIndex> {
        let (node_type, text) = match &self.segment.matcher {
            Some(m) => (
                m.node_type.clone().unwrap_or_default(),
                m.text.clone().unwrap_or_default(),
            ),
            None => return Err(TreeError::cant_create(&self.segment, "no matcher")),
        };
        let node = tree.create(&node_type, Some(text.as_str()), None, None)?;
        let placed = self.place(tree, node, parent, counter);
        if placed.is_err() {
            if let Err(e) = tree.discard(node) {
                warn!("could not discard unplaced node: {e}");
            }
        }
        placed
    }

    fn place(
        &self,
        tree: &mut Tree,
        node: NodeIndex,
        parent: NodeIndex,
        counter: &mut TickCounter,
    ) -> TreeResult<NodeIndex> {
        let anchor = self.anchor(tree, parent, counter)?;
        let nt = tree.node_type_of(node).ok_or(TreeError::StaleNode)?;
        if let Some(placed) = nt.behavior.auto_add(tree, node, parent)? {
            debug!("{} placed itself", tree.describe(placed));
            return Ok(placed);
        }

        let no_parent = || TreeError::cant_create(&self.segment, "candidate has no parent");
        match anchor {
            Some(anchor) => {
                let anchor_parent = tree.parent(anchor).ok_or_else(no_parent)?;
                if self.is_before {
                    tree.insert_child(anchor_parent, node, Some(anchor), None)
                } else {
                    tree.insert_child(anchor_parent, node, None, Some(anchor))
                }
            }
            None => match self.segment.retrieval {
                Retrieval::PrevPeer => {
                    let outer = tree.parent(parent).ok_or_else(no_parent)?;
                    tree.insert_child(outer, node, Some(parent), None)
                }
                Retrieval::NextPeer => {
                    let outer = tree.parent(parent).ok_or_else(no_parent)?;
                    tree.add_child(outer, node)
                }
                _ => tree.add_child(parent, node),
            },
        }
    }

    /// Existing sibling the new node is placed next to.
    fn anchor(
        &self,
        tree: &mut Tree,
        parent: NodeIndex,
        counter: &mut TickCounter,
    ) -> TreeResult<Option<NodeIndex>> {
        let mut run = SegmentRun::open(tree, self.segment.retrieval, parent);
        let filter = Filter {
            matcher: None,
            tags: &self.anchor_tags,
            plurality: self.anchor_plurality,
        };
        run.next(tree, filter, counter)
    }
}

/// Creators for a union; the first one that finds a parent wins.
#[derive(Debug, Clone)]
pub struct Creators {
    creators: Vec<Creator>,
    query: String,
}

impl Creators {
    /// Fails only when no member query can create.
    pub fn new(queries: &Queries) -> TreeResult<Self> {
        let mut creators = Vec::new();
        let mut errors = Vec::new();
        for query in queries.iter() {
            match Creator::new(query) {
                Ok(creator) => creators.push(creator),
                Err(e) => errors.push(e),
            }
        }
        if creators.is_empty() {
            if errors.len() == 1 {
                return Err(errors.remove(0));
            }
            return Err(TreeError::cant_create(queries, errors.iter().join("; ")));
        }
        Ok(Self {
            creators,
            query: queries.to_string(),
        })
    }

    /// Always creates a new node.
    pub fn create_new(&self, tree: &mut Tree, start: NodeIndex) -> TreeResult<NodeIndex> {
        let mut counter = TickCounter::new(tree.max_ticks());
        self.create_new_counted(tree, start, &mut counter)
    }

    pub fn create_new_counted(
        &self,
        tree: &mut Tree,
        start: NodeIndex,
        counter: &mut TickCounter,
    ) -> TreeResult<NodeIndex> {
        for creator in &self.creators {
            if let Some(node) = creator.create_counted(tree, start, counter)? {
                return Ok(node);
            }
        }
        Err(TreeError::NodeNotCreated {
            query: self.query.clone(),
        })
    }
}

impl Tree {
    /// Returns the first existing match of `query` or creates it.
    #[instrument(level = "debug", skip(self, query), fields(query = %query))]
    pub fn find_or_create(&mut self, start: NodeIndex, query: &Query) -> TreeResult<NodeIndex> {
        let queries = self.expand(query.clone());
        let counter = TickCounter::new(self.max_ticks());
        let mut search = Search::with_counter(self, start, &queries.queries, counter);
        if let Some(found) = search.next().transpose()? {
            return Ok(found);
        }
        let mut counter = search.into_counter();
        Creators::new(&queries)?.create_new_counted(self, start, &mut counter)
    }

    pub fn find_or_create_str(&mut self, start: NodeIndex, text: &str) -> TreeResult<NodeIndex> {
        let query = self.parse(text)?;
        self.find_or_create(start, &query)
    }

    /// Creates a node for query text even if a match exists.
    pub fn create_str(&mut self, start: NodeIndex, text: &str) -> TreeResult<NodeIndex> {
        let queries = self.expand(self.parse(text)?);
        Creators::new(&queries)?.create_new(self, start)
    }
}
