//! Text renderings of a tree as seen through its mirrors.

use termtree::Tree as TermTree;
use tracing::instrument;

use crate::domain::{NodeIndex, Tree};

/// Label of a node in renderings: `type: text`, with proxies marked.
pub fn label(tree: &Tree, node: NodeIndex) -> String {
    let mut label = tree.describe(node);
    if let Some(id) = tree.id(node) {
        if node != tree.root() {
            label.push_str(&format!(" #{id}"));
        }
    }
    label
}

/// Every descendant of `node` on its own line, indented two spaces per level.
///
/// Proxy lines start with `proxy: `, so a reference's mirrored subtree can
/// be told apart from the real one.
pub fn outline_lines(tree: &mut Tree, node: NodeIndex) -> Vec<String> {
    tree.descendants(node)
        .into_iter()
        .map(|(depth, n)| format!("{}{}", "  ".repeat(depth - 1), tree.describe(n)))
        .collect()
}

/// Box drawing rendering of the subtree under `node`.
#[instrument(level = "debug", skip(tree))]
pub fn to_tree_string(tree: &mut Tree, node: NodeIndex) -> TermTree<String> {
    let mut out = TermTree::new(label(tree, node));
    build_tree(tree, node, &mut out);
    out
}

fn build_tree(tree: &mut Tree, node: NodeIndex, parent_tree: &mut TermTree<String>) {
    for child in tree.children(node) {
        let mut child_tree = TermTree::new(label(tree, child));
        build_tree(tree, child, &mut child_tree);
        parent_tree.push(child_tree);
    }
}
