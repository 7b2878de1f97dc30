//! Built-in node types.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::arena::{NodeIndex, NodeKind, Tree};
use crate::domain::behavior::{NodeBehavior, NodeFlags, NodeRegistry};
use crate::domain::error::{StructuralRule, TreeError, TreeResult};
use crate::domain::options::{
    now, parse_date, OptionKind, OptionSet, OptionSpec, OptionValue, ACTIVE_OPTIONS,
    COMMENT_OPTIONS, TASK_OPTIONS,
};
use crate::query::{Query, Segment};
use crate::reference::{ReferenceBehavior, ReferencePolicy};

pub const ROOT_TYPE: &str = "life";
pub const TODO_BUCKET_TYPE: &str = "todo bucket";
pub const DAYS_TYPE: &str = "days";
pub const DAY_TYPE: &str = "day";

pub const TASK_TYPES: &[&str] = &["task", "question", "problem", "project", "bug", "feature"];

/// Registry with every built-in node type.
pub fn builtin_registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    registry.register(ROOT_TYPE, RootBehavior);
    for name in TASK_TYPES {
        registry.register(name, TaskBehavior::default());
    }
    registry.register("event", TaskBehavior::event());
    registry.register("category", CategoryBehavior);
    for name in ["comment", "answer", "solution", "IGNORE"] {
        registry.register(name, CommentBehavior);
    }
    registry.register("todo", TodoBehavior);
    registry.register(TODO_BUCKET_TYPE, TodoBucketBehavior);
    registry.register(DAYS_TYPE, DaysBehavior);
    registry.register(DAY_TYPE, DayBehavior);
    registry.register("archived", GenericActiveBehavior);
    registry.register("_gennode", GenericBehavior);
    registry.register("_genactive", GenericActiveBehavior);
    registry.register("reference", ReferenceBehavior::new(ReferencePolicy::reference()));
    registry.register("depends", ReferenceBehavior::new(ReferencePolicy::depends()));
    registry.alias("dep", "depends").alias("depend", "depends");
    Arc::new(registry)
}

#[derive(Debug)]
pub struct RootBehavior;

impl NodeBehavior for RootBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            textless: true,
            can_activate: true,
            ..NodeFlags::default()
        }
    }
}

static EVENT_OPTIONS: OptionSet = OptionSet {
    name: "event",
    specs: &[OptionSpec {
        name: "when",
        kind: OptionKind::Time,
    }],
};

/// Tasks and their relatives: startable, finishable, activatable until finished.
#[derive(Debug, Default)]
pub struct TaskBehavior {
    extra: Option<&'static OptionSet>,
}

impl TaskBehavior {
    pub fn event() -> Self {
        Self {
            extra: Some(&EVENT_OPTIONS),
        }
    }
}

impl NodeBehavior for TaskBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            multiline: true,
            can_activate: true,
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        let mut sets = vec![&TASK_OPTIONS, &ACTIVE_OPTIONS];
        sets.extend(self.extra);
        sets
    }

    fn can_activate(&self, tree: &Tree, node: NodeIndex) -> bool {
        tree.option(node, "finished").is_none()
    }

    fn start(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        if tree.option(node, "started").is_none() {
            tree.store_option(node, "started", OptionValue::Time(now()));
        }
        Ok(())
    }

    fn finish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        tree.store_option(node, "finished", OptionValue::Time(now()));
        Ok(())
    }

    fn unfinish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<bool> {
        tree.clear_option(node, "finished");
        Ok(true)
    }

    fn search_tags(&self, tree: &Tree, node: NodeIndex) -> BTreeSet<String> {
        lifecycle_tags(tree, node)
    }
}

/// `finished`/`unfinished` and `started`/`unstarted` tags from stored options.
pub fn lifecycle_tags(tree: &Tree, node: NodeIndex) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    let finished = tree.option(node, "finished").is_some();
    tags.insert(if finished { "finished" } else { "unfinished" }.to_string());
    let started = tree.option(node, "started").is_some();
    tags.insert(if started { "started" } else { "unstarted" }.to_string());
    tags
}

#[derive(Debug)]
pub struct CategoryBehavior;

impl NodeBehavior for CategoryBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            can_activate: true,
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        vec![&ACTIVE_OPTIONS]
    }
}

#[derive(Debug)]
pub struct CommentBehavior;

impl NodeBehavior for CommentBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            multiline: true,
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        vec![&COMMENT_OPTIONS]
    }
}

#[derive(Debug)]
pub struct TodoBehavior;

impl NodeBehavior for TodoBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            multiline: true,
            allowed_children: Some(&[]),
            children_of: Some(&[TODO_BUCKET_TYPE]),
            ..NodeFlags::default()
        }
    }

    fn preferred_parent(&self) -> Option<Query> {
        Query::new(vec![
            Segment::root(),
            Segment::children().of_type(TODO_BUCKET_TYPE),
        ])
        .ok()
    }
}

#[derive(Debug)]
pub struct TodoBucketBehavior;

impl NodeBehavior for TodoBucketBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            textless: true,
            toplevel: true,
            allowed_children: Some(&["todo"]),
            ..NodeFlags::default()
        }
    }
}

/// Top-level journal holding one `day` per date.
#[derive(Debug)]
pub struct DaysBehavior;

impl NodeBehavior for DaysBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            textless: true,
            toplevel: true,
            allowed_children: Some(&[DAY_TYPE, "archived"]),
            ..NodeFlags::default()
        }
    }
}

/// A journal day. The text is its date, and it can only be activated on
/// that date.
#[derive(Debug)]
pub struct DayBehavior;

impl DayBehavior {
    fn date(tree: &Tree, node: NodeIndex) -> Option<NaiveDate> {
        tree.text(node).and_then(parse_date)
    }
}

impl NodeBehavior for DayBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            text_required: true,
            can_activate: true,
            children_of: Some(&[DAYS_TYPE]),
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        vec![&TASK_OPTIONS, &ACTIVE_OPTIONS]
    }

    fn init_kind(&self, text: Option<&str>, _registry: &NodeRegistry) -> TreeResult<NodeKind> {
        let text = text.unwrap_or_default();
        match parse_date(text) {
            Some(_) => Ok(NodeKind::Plain),
            None => Err(TreeError::structural(
                format!("{DAY_TYPE}: {text}"),
                StructuralRule::InvalidDate {
                    text: text.to_string(),
                },
            )),
        }
    }

    fn can_activate(&self, tree: &Tree, node: NodeIndex) -> bool {
        tree.option(node, "finished").is_none()
            && Self::date(tree, node) == Some(now().date())
    }

    fn start(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        TaskBehavior::default().start(tree, node)
    }

    fn finish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<()> {
        TaskBehavior::default().finish(tree, node)
    }

    fn unfinish(&self, tree: &mut Tree, node: NodeIndex) -> TreeResult<bool> {
        TaskBehavior::default().unfinish(tree, node)
    }

    fn search_tags(&self, tree: &Tree, node: NodeIndex) -> BTreeSet<String> {
        lifecycle_tags(tree, node)
    }

    fn preferred_parent(&self) -> Option<Query> {
        Query::new(vec![Segment::root(), Segment::children().of_type(DAYS_TYPE)]).ok()
    }

    /// Joins the journal in date order.
    fn auto_add(
        &self,
        tree: &mut Tree,
        node: NodeIndex,
        origin: NodeIndex,
    ) -> TreeResult<Option<NodeIndex>> {
        let Some(query) = self.preferred_parent() else {
            return Ok(None);
        };
        let days = tree.find_one(origin, &query)?;
        let date = Self::date(tree, node);
        let later = tree.children(days).into_iter().find(|&child| {
            tree.node_type(child) == DAY_TYPE && Self::date(tree, child) > date
        });
        tree.insert_child(days, node, later, None).map(Some)
    }
}

/// Free-form node keeping any option as text.
#[derive(Debug)]
pub struct GenericBehavior;

impl NodeBehavior for GenericBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            multiline: true,
            ..NodeFlags::default()
        }
    }

    fn accepts_any_option(&self) -> bool {
        true
    }
}

/// Free-form node that can be activated but does not track start or finish.
#[derive(Debug)]
pub struct GenericActiveBehavior;

impl NodeBehavior for GenericActiveBehavior {
    fn flags(&self) -> NodeFlags {
        NodeFlags {
            multiline: true,
            can_activate: true,
            ..NodeFlags::default()
        }
    }

    fn option_sets(&self) -> Vec<&'static OptionSet> {
        vec![&ACTIVE_OPTIONS]
    }

    fn unfinish(&self, _tree: &mut Tree, _node: NodeIndex) -> TreeResult<bool> {
        Ok(true)
    }
}
