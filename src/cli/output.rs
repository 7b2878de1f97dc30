//! Colored terminal output
//!
//! `colored` honors NO_COLOR, CLICOLOR and CLICOLOR_FORCE.

use std::fmt::Display;

use colored::Colorize;

use crate::display::label;
use crate::domain::{NodeIndex, Tree};

pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "warning".yellow(), msg);
}

/// `verb: node` after a command changed or located a node.
pub fn changed(verb: &str, tree: &Tree, node: NodeIndex) {
    println!("{}: {}", verb.green(), styled_label(tree, node));
}

/// Settings key and value, e.g. for `config path`.
pub fn setting(key: &str, value: &(impl Display + ?Sized)) {
    println!("{}: {}", key.cyan(), value);
}

/// Heading above a rendered subtree.
pub fn header(tree: &Tree, node: NodeIndex) {
    println!("{}", label(tree, node).cyan().bold());
}

/// One node per line, marked by life cycle.
pub fn node(tree: &Tree, node: NodeIndex) {
    println!("{}", styled_label(tree, node));
}

/// Unstyled text such as tree renderings and TOML.
pub fn plain(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}

fn styled_label(tree: &Tree, node: NodeIndex) -> String {
    let text = label(tree, node);
    if node == tree.active() {
        format!("{} {}", "*".green().bold(), text.bold())
    } else if tree.is_finished(node) {
        format!("  {}", text.dimmed().strikethrough())
    } else {
        format!("  {text}")
    }
}
