use std::env;
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{NodeIndex, Tree, TreeError, TreeResult};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "debug");
        }
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let noisy_modules = ["config::"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Builds a tree from indented `type: text` lines, two spaces per level.
///
/// `type#abcde: text` gives the node an explicit id. A line without `: `
/// is a textless node of that type. Blank lines are skipped. Returns the
/// tree and the created nodes in line order.
pub fn tree_from(outline: &str) -> TreeResult<(Tree, Vec<NodeIndex>)> {
    let mut tree = Tree::new();
    let mut stack = vec![tree.root()];
    let mut created = Vec::new();
    for line in outline.lines().filter(|l| !l.trim().is_empty()) {
        let indent = line.len() - line.trim_start().len();
        let depth = indent / 2 + 1;
        if depth > stack.len() {
            return Err(TreeError::invalid_query(line.trim(), "indented too deep"));
        }
        stack.truncate(depth);
        let parent = stack[depth - 1];
        let (head, text) = match line.trim().split_once(": ") {
            Some((head, text)) => (head, Some(text)),
            None => (line.trim(), None),
        };
        let node = match head.split_once('#') {
            Some((node_type, id)) => tree.create_child_with_id(parent, node_type, text, id)?,
            None => tree.create_child(parent, head, text)?,
        };
        stack.push(node);
        created.push(node);
    }
    Ok((tree, created))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_indented_lines_when_building_then_nests_by_indent() {
        init_test_setup();
        let (mut tree, nodes) = tree_from(
            "task: A\n\
             \x20 task: B\n\
             \x20 comment: c\n\
             task: D\n",
        )
        .unwrap();

        assert_eq!(nodes.len(), 4);
        assert_eq!(tree.children(nodes[0]), vec![nodes[1], nodes[2]]);
        assert_eq!(tree.children(tree.root()), vec![nodes[0], nodes[3]]);
    }

    #[test]
    fn given_id_suffix_when_building_then_node_keeps_id() {
        let (tree, nodes) = tree_from("task#trgt1: A\n").unwrap();
        assert_eq!(tree.id(nodes[0]).map(|id| id.as_str()), Some("trgt1"));
    }

    #[test]
    fn given_skipped_level_when_building_then_fails() {
        let result = tree_from("task: A\n      task: B\n");
        assert!(result.is_err());
    }
}
