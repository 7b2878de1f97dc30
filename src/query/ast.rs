//! Parsed query representation consumed by the evaluator and creation engine.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;

use crate::domain::error::{TreeError, TreeResult};
use crate::domain::id::NodeId;

/// How a segment reaches candidate nodes from the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    Children,
    /// Ancestors, nearest first, excluding the node itself.
    Parents,
    NextPeer,
    PrevPeer,
    Root,
    SelfNode,
    /// Pre-order descendants.
    Flatten,
}

impl Retrieval {
    pub fn symbol(self) -> &'static str {
        match self {
            Retrieval::Children => ">",
            Retrieval::Parents => "<",
            Retrieval::NextPeer => "->",
            Retrieval::PrevPeer => "<-",
            Retrieval::Root => "<<",
            Retrieval::SelfNode => "",
            Retrieval::Flatten => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plurality {
    First,
    Last,
    Many,
}

/// Placement relative to the anchor chosen during creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

/// `+`/`-` creation shorthand on a matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreateRel {
    #[default]
    Default,
    /// `-`: first / before.
    First,
    /// `+`: last / after.
    Last,
}

/// Type and text pattern. `None` is the `*` wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matcher {
    pub node_type: Option<String>,
    pub text: Option<String>,
    pub rel: CreateRel,
}

impl Matcher {
    pub fn new(node_type: Option<&str>, text: Option<&str>) -> Self {
        Self {
            node_type: node_type.map(str::to_string),
            text: text.map(str::to_string),
            rel: CreateRel::Default,
        }
    }

    /// Both type and text are concrete.
    pub fn is_rigid(&self) -> bool {
        self.node_type.is_some() && self.text.is_some()
    }
}

/// One step of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub retrieval: Retrieval,
    pub matcher: Option<Matcher>,
    pub tags: BTreeSet<String>,
    pub plurality: Option<Plurality>,
    pub placement: Option<Placement>,
    /// Only valid on the first segment.
    pub node_id: Option<NodeId>,
}

impl Segment {
    pub fn new(retrieval: Retrieval) -> Self {
        Self {
            retrieval,
            matcher: None,
            tags: BTreeSet::new(),
            plurality: None,
            placement: None,
            node_id: None,
        }
    }

    pub fn children() -> Self {
        Self::new(Retrieval::Children)
    }

    pub fn parents() -> Self {
        Self::new(Retrieval::Parents)
    }

    pub fn next_peers() -> Self {
        Self::new(Retrieval::NextPeer)
    }

    pub fn prev_peers() -> Self {
        Self::new(Retrieval::PrevPeer)
    }

    pub fn root() -> Self {
        Self::new(Retrieval::Root)
    }

    pub fn this() -> Self {
        Self::new(Retrieval::SelfNode)
    }

    pub fn flatten() -> Self {
        Self::new(Retrieval::Flatten)
    }

    pub fn by_id(id: NodeId, retrieval: Retrieval) -> Self {
        Self {
            node_id: Some(id),
            ..Self::new(retrieval)
        }
    }

    pub fn of_type(mut self, node_type: &str) -> Self {
        self.matcher.get_or_insert_with(Matcher::default).node_type = Some(node_type.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.matcher.get_or_insert_with(Matcher::default).text = Some(text.to_string());
        self
    }

    pub fn with_rel(mut self, rel: CreateRel) -> Self {
        self.matcher.get_or_insert_with(Matcher::default).rel = rel;
        self
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn with_plurality(mut self, plurality: Plurality) -> Self {
        self.plurality = Some(plurality);
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Plurality with the default applied.
    pub fn effective_plurality(&self) -> Plurality {
        self.plurality.unwrap_or(Plurality::Many)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.node_id {
            write!(f, "#{id}")?;
        }
        write!(f, "{}", self.retrieval.symbol())?;
        if let Some(matcher) = &self.matcher {
            match matcher.rel {
                CreateRel::Default => {}
                CreateRel::First => f.write_str(" -")?,
                CreateRel::Last => f.write_str(" +")?,
            }
            let sep = if matcher.rel == CreateRel::Default { " " } else { "" };
            match (&matcher.node_type, &matcher.text) {
                (Some(t), Some(x)) => write!(f, "{sep}{t}: {x}")?,
                (Some(t), None) => write!(f, "{sep}{t}")?,
                (None, Some(x)) => write!(f, "{sep}*: {x}")?,
                (None, None) => write!(f, "{sep}*")?,
            }
        }
        let mut tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        match self.plurality {
            Some(Plurality::First) => tags.push("first"),
            Some(Plurality::Last) => tags.push("last"),
            Some(Plurality::Many) => tags.push("many"),
            None => {}
        }
        match self.placement {
            Some(Placement::Before) => tags.push("before"),
            Some(Placement::After) => tags.push("after"),
            None => {}
        }
        if !tags.is_empty() {
            write!(f, " :{{{}}}", tags.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub segments: Vec<Segment>,
}

impl Query {
    /// Validates that an id anchor only appears on the first segment.
    pub fn new(segments: Vec<Segment>) -> TreeResult<Self> {
        let query = Self { segments };
        if query.segments.iter().skip(1).any(|s| s.node_id.is_some()) {
            return Err(TreeError::invalid_query(
                &query,
                "an id anchor may only start a query",
            ));
        }
        if query.segments.is_empty() {
            return Err(TreeError::invalid_query(&query, "query has no segments"));
        }
        Ok(query)
    }

    pub fn single(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }

    /// Anchors a query at a node id, lookup happening before the first segment.
    pub fn by_id(id: NodeId) -> Self {
        Self::single(Segment::by_id(id, Retrieval::SelfNode))
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && segment.retrieval != Retrieval::SelfNode {
                f.write_str(" ")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Union of queries evaluated in order under one tick budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queries {
    pub queries: Vec<Query>,
}

impl Queries {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.iter()
    }
}

impl From<Query> for Queries {
    fn from(query: Query) -> Self {
        Self::new(vec![query])
    }
}

impl fmt::Display for Queries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.queries.iter().join(" | "))
    }
}

/// Extension point producing fallback queries for a query.
///
/// Filters run in registration order on the accumulated list; the result is
/// evaluated as a union.
pub trait QueryFilter: Send + Sync {
    fn expand(&self, queries: Vec<Query>) -> Vec<Query>;
}

impl<F> QueryFilter for F
where
    F: Fn(Vec<Query>) -> Vec<Query> + Send + Sync,
{
    fn expand(&self, queries: Vec<Query>) -> Vec<Query> {
        self(queries)
    }
}
