//! Per-node state of references and their proxies.

use std::collections::HashMap;

use crate::domain::arena::NodeIndex;
use crate::query::Query;

/// Which transitions of a reference reach its target.
///
/// Starting always reaches an unstarted target; the finish side is policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePolicy {
    /// Finishing the reference finishes an unfinished target.
    pub propagate_finish: bool,
    /// Un-finishing the reference un-finishes a finished target.
    pub propagate_unfinish: bool,
}

impl ReferencePolicy {
    /// Plain `reference`: the target outlives the reference being finished.
    pub fn reference() -> Self {
        Self {
            propagate_finish: false,
            propagate_unfinish: true,
        }
    }

    /// `depends`: the reference and its target finish together.
    pub fn depends() -> Self {
        Self {
            propagate_finish: true,
            propagate_unfinish: true,
        }
    }
}

/// Transitions a reference or proxy pushed onto its target itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transitions {
    pub did_start: bool,
    pub did_finish: bool,
}

#[derive(Debug)]
pub struct ReferenceState {
    pub(crate) query: Query,
    pub(crate) policy: ReferencePolicy,
    pub(crate) target: Option<NodeIndex>,
    /// Real or proxied node -> proxy standing in for it under this reference.
    pub(crate) proxies: HashMap<NodeIndex, NodeIndex>,
    pub(crate) transitions: Transitions,
    pub(crate) in_transition: bool,
}

impl ReferenceState {
    pub fn new(query: Query, policy: ReferencePolicy) -> Self {
        Self {
            query,
            policy,
            target: None,
            proxies: HashMap::new(),
            transitions: Transitions::default(),
            in_transition: false,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn target(&self) -> Option<NodeIndex> {
        self.target
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

/// A mirror entry: `target` seen through the reference `owner`.
#[derive(Debug)]
pub struct ProxyState {
    pub(crate) target: NodeIndex,
    pub(crate) owner: NodeIndex,
    /// The mirror reached `owner` again; shown as a leaf.
    pub(crate) recursing: bool,
    pub(crate) transitions: Transitions,
    pub(crate) in_transition: bool,
}

impl ProxyState {
    pub(crate) fn new(target: NodeIndex, owner: NodeIndex, recursing: bool) -> Self {
        Self {
            target,
            owner,
            recursing,
            transitions: Transitions::default(),
            in_transition: false,
        }
    }

    pub fn target(&self) -> NodeIndex {
        self.target
    }

    pub fn owner(&self) -> NodeIndex {
        self.owner
    }

    pub fn is_recursing(&self) -> bool {
        self.recursing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_policies_when_compared_then_only_finish_differs() {
        let reference = ReferencePolicy::reference();
        let depends = ReferencePolicy::depends();
        assert!(!reference.propagate_finish);
        assert!(depends.propagate_finish);
        assert_eq!(reference.propagate_unfinish, depends.propagate_unfinish);
    }
}
