//! Query evaluation as an explicit stack of frames.
//!
//! Each frame holds the node a segment is applied to and a pull-based
//! source of candidates for that segment. A frame that runs dry without
//! yielding anything is reported as a miss, which is what error messages
//! and the creation engine use to tell where a path stopped matching.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{instrument, trace};

use crate::domain::arena::{FlatCursor, NodeIndex, SiblingCursor, Tree};
use crate::domain::error::{TreeError, TreeResult};
use crate::query::ast::{Matcher, Plurality, Queries, Query, QueryFilter, Retrieval, Segment};
use crate::query::parse::parse_query;

/// Visit counter shared by every query of one invocation.
#[derive(Debug, Clone)]
pub struct TickCounter {
    ticks: usize,
    max: usize,
}

impl TickCounter {
    pub fn new(max: usize) -> Self {
        Self { ticks: 0, max }
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn tick(&mut self) -> TreeResult<()> {
        self.ticks += 1;
        if self.ticks > self.max {
            return Err(TreeError::BoundedSearchExceeded { ticks: self.max });
        }
        Ok(())
    }
}

/// Candidate source of one retrieval mode.
#[derive(Debug, Clone)]
enum Source {
    Once(Option<NodeIndex>),
    Siblings(SiblingCursor),
    Flat(FlatCursor),
    Parents(Option<NodeIndex>),
}

impl Source {
    fn open(tree: &mut Tree, retrieval: Retrieval, node: NodeIndex) -> Self {
        match retrieval {
            Retrieval::Children => Source::Siblings(SiblingCursor::children(tree, node)),
            Retrieval::NextPeer => Source::Siblings(SiblingCursor::after(tree, node)),
            Retrieval::PrevPeer => Source::Siblings(SiblingCursor::before(tree, node)),
            Retrieval::Flatten => Source::Flat(FlatCursor::new(tree, node)),
            Retrieval::Parents => Source::Parents(tree.parent(node)),
            Retrieval::Root => Source::Once(Some(tree.root())),
            Retrieval::SelfNode => Source::Once(Some(node)),
        }
    }

    fn advance(&mut self, tree: &mut Tree) -> Option<NodeIndex> {
        match self {
            Source::Once(node) => node.take(),
            Source::Siblings(cursor) => cursor.advance(tree),
            Source::Flat(cursor) => cursor.advance(tree).map(|(_, node)| node),
            Source::Parents(next) => {
                let current = (*next)?;
                *next = tree.parent(current);
                Some(current)
            }
        }
    }
}

/// What a segment keeps from its candidates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Filter<'q> {
    pub matcher: Option<&'q Matcher>,
    pub tags: &'q BTreeSet<String>,
    pub plurality: Plurality,
}

impl<'q> Filter<'q> {
    pub fn of(segment: &'q Segment) -> Self {
        Self {
            matcher: segment.matcher.as_ref(),
            tags: &segment.tags,
            plurality: segment.effective_plurality(),
        }
    }
}

/// Case-insensitive type and text match against a node's search texts.
pub fn matches(tree: &Tree, matcher: &Matcher, node: NodeIndex) -> bool {
    let texts = tree.search_texts(node);
    let type_ok = matcher.node_type.as_ref().map_or(true, |t| {
        let canonical = tree
            .registry()
            .get(t)
            .map(|nt| nt.name.to_lowercase())
            .unwrap_or_else(|| t.to_lowercase());
        texts.types.contains(&canonical)
    });
    let text_ok = matcher
        .text
        .as_ref()
        .map_or(true, |t| texts.texts.contains(&t.to_lowercase()));
    type_ok && text_ok
}

/// Candidates of one segment applied to one node.
#[derive(Debug, Clone)]
pub(crate) struct SegmentRun {
    source: Source,
    done: bool,
    last: Option<NodeIndex>,
}

impl SegmentRun {
    pub fn open(tree: &mut Tree, retrieval: Retrieval, node: NodeIndex) -> Self {
        Self {
            source: Source::open(tree, retrieval, node),
            done: false,
            last: None,
        }
    }

    pub fn next(
        &mut self,
        tree: &mut Tree,
        filter: Filter<'_>,
        counter: &mut TickCounter,
    ) -> TreeResult<Option<NodeIndex>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let Some(node) = self.source.advance(tree) else {
                self.done = true;
                return Ok(self.last.take());
            };
            counter.tick()?;
            if let Some(matcher) = filter.matcher {
                if !matches(tree, matcher, node) {
                    continue;
                }
            }
            if !filter.tags.is_empty() && !filter.tags.is_subset(&tree.search_tags(node)) {
                continue;
            }
            match filter.plurality {
                Plurality::First => {
                    self.done = true;
                    return Ok(Some(node));
                }
                Plurality::Last => self.last = Some(node),
                Plurality::Many => {
                    counter.tick()?;
                    return Ok(Some(node));
                }
            }
        }
    }
}

/// Evaluation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEvent {
    Found(NodeIndex),
    /// Segment `segment` of query `query` yielded nothing from `from`.
    Miss {
        query: usize,
        segment: usize,
        from: NodeIndex,
    },
}

#[derive(Debug)]
struct Frame {
    segment: usize,
    from: NodeIndex,
    run: SegmentRun,
    found: bool,
}

/// Resumable evaluation of a union of queries from one start node.
#[derive(Debug)]
pub struct Search<'a> {
    tree: &'a mut Tree,
    queries: &'a [Query],
    start: NodeIndex,
    current: usize,
    opened: bool,
    stack: Vec<Frame>,
    counter: TickCounter,
    failed: bool,
}

impl<'a> Search<'a> {
    pub fn new(tree: &'a mut Tree, start: NodeIndex, queries: &'a [Query]) -> Self {
        let counter = TickCounter::new(tree.max_ticks());
        Self::with_counter(tree, start, queries, counter)
    }

    /// Search that keeps ticking a counter already armed by the caller.
    pub fn with_counter(
        tree: &'a mut Tree,
        start: NodeIndex,
        queries: &'a [Query],
        counter: TickCounter,
    ) -> Self {
        Self {
            tree,
            queries,
            start,
            current: 0,
            opened: false,
            stack: Vec::new(),
            counter,
            failed: false,
        }
    }

    pub fn ticks(&self) -> usize {
        self.counter.ticks()
    }

    /// Hands the counter back so a later phase of the same call can continue it.
    pub fn into_counter(self) -> TickCounter {
        self.counter
    }

    /// Next found node or miss; `None` once every query is exhausted.
    pub fn next_event(&mut self) -> Option<TreeResult<SearchEvent>> {
        if self.failed {
            return None;
        }
        let event = self.step();
        if let Some(Err(_)) = &event {
            self.failed = true;
        }
        event
    }

    fn step(&mut self) -> Option<TreeResult<SearchEvent>> {
        let queries: &'a [Query] = self.queries;
        loop {
            let query = queries.get(self.current)?;
            if !self.opened {
                self.opened = true;
                match self.open(query) {
                    Ok(Some(miss)) => return Some(Ok(miss)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                }
            }
            let Some(frame) = self.stack.last_mut() else {
                self.current += 1;
                self.opened = false;
                continue;
            };
            let segment = &query.segments[frame.segment];
            match frame.run.next(self.tree, Filter::of(segment), &mut self.counter) {
                Err(e) => return Some(Err(e)),
                Ok(Some(node)) => {
                    frame.found = true;
                    let next_segment = frame.segment + 1;
                    if next_segment == query.segments.len() {
                        trace!(?node, "found");
                        return Some(Ok(SearchEvent::Found(node)));
                    }
                    let retrieval = query.segments[next_segment].retrieval;
                    let run = SegmentRun::open(self.tree, retrieval, node);
                    self.stack.push(Frame {
                        segment: next_segment,
                        from: node,
                        run,
                        found: false,
                    });
                }
                Ok(None) => {
                    let Some(frame) = self.stack.pop() else {
                        continue;
                    };
                    if !frame.found {
                        return Some(Ok(SearchEvent::Miss {
                            query: self.current,
                            segment: frame.segment,
                            from: frame.from,
                        }));
                    }
                }
            }
        }
    }

    /// Pushes the first frame of a query; an unknown id anchor is a miss.
    fn open(&mut self, query: &Query) -> TreeResult<Option<SearchEvent>> {
        let Some(first) = query.segments.first() else {
            return Ok(None);
        };
        let base = match &first.node_id {
            Some(id) => {
                self.counter.tick()?;
                match self.tree.find_by_id(id) {
                    Some(node) => node,
                    None => {
                        return Ok(Some(SearchEvent::Miss {
                            query: self.current,
                            segment: 0,
                            from: self.start,
                        }))
                    }
                }
            }
            None => self.start,
        };
        let run = SegmentRun::open(self.tree, first.retrieval, base);
        self.stack.push(Frame {
            segment: 0,
            from: base,
            run,
            found: false,
        });
        Ok(None)
    }
}

impl Iterator for Search<'_> {
    type Item = TreeResult<NodeIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_event()? {
                Ok(SearchEvent::Found(node)) => return Some(Ok(node)),
                Ok(SearchEvent::Miss { .. }) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Tree {
    pub fn search<'a>(&'a mut self, start: NodeIndex, queries: &'a [Query]) -> Search<'a> {
        Search::new(self, start, queries)
    }

    /// All matches of `query` from `start`.
    #[instrument(level = "debug", skip(self, query), fields(query = %query))]
    pub fn find(&mut self, start: NodeIndex, query: &Query) -> TreeResult<Vec<NodeIndex>> {
        self.search(start, std::slice::from_ref(query)).collect()
    }

    /// All matches of a union, in query order.
    pub fn find_all(&mut self, start: NodeIndex, queries: &Queries) -> TreeResult<Vec<NodeIndex>> {
        self.search(start, &queries.queries).collect()
    }

    pub fn find_first(&mut self, start: NodeIndex, query: &Query) -> TreeResult<Option<NodeIndex>> {
        self.search(start, std::slice::from_ref(query))
            .next()
            .transpose()
    }

    /// First match or [`TreeError::NoMatches`] naming the deepest segment
    /// that matched nothing.
    pub fn find_one(&mut self, start: NodeIndex, query: &Query) -> TreeResult<NodeIndex> {
        self.find_one_of(start, std::slice::from_ref(query))
    }

    pub fn find_one_of(&mut self, start: NodeIndex, queries: &[Query]) -> TreeResult<NodeIndex> {
        let mut deepest = 0;
        let mut search = self.search(start, queries);
        while let Some(event) = search.next_event() {
            match event? {
                SearchEvent::Found(node) => return Ok(node),
                SearchEvent::Miss { segment, .. } => deepest = deepest.max(segment),
            }
        }
        Err(TreeError::NoMatches {
            query: Queries::new(queries.to_vec()).to_string(),
            segment: deepest,
        })
    }

    /// Matches collected until the tick ceiling; the overflow is dropped.
    pub fn find_ignoring_overflow(&mut self, start: NodeIndex, query: &Query) -> TreeResult<Vec<NodeIndex>> {
        let mut out = Vec::new();
        for result in self.search(start, std::slice::from_ref(query)) {
            match result {
                Ok(node) => out.push(node),
                Err(TreeError::BoundedSearchExceeded { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Parses query text with this tree's registry.
    pub fn parse(&self, text: &str) -> TreeResult<Query> {
        parse_query(text, self.registry())
    }

    pub fn add_query_filter(&mut self, filter: impl QueryFilter + 'static) {
        self.query_filters.push(Arc::new(filter));
    }

    /// A query followed by the alternatives registered filters add.
    pub fn expand(&self, query: Query) -> Queries {
        let mut queries = vec![query];
        for filter in &self.query_filters {
            queries = filter.expand(queries);
        }
        Queries::new(queries)
    }

    /// Parses, expands and evaluates query text.
    pub fn find_str(&mut self, start: NodeIndex, text: &str) -> TreeResult<Vec<NodeIndex>> {
        let queries = self.expand(self.parse(text)?);
        self.find_all(start, &queries)
    }

    pub fn find_one_str(&mut self, start: NodeIndex, text: &str) -> TreeResult<NodeIndex> {
        let queries = self.expand(self.parse(text)?);
        self.find_one_of(start, &queries.queries)
    }
}
