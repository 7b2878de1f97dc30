//! Tests for the arena node store
//!
//! Sibling lists, id allocation, structural rules, copy and detach.

use std::collections::HashSet;

use rstest::rstest;

use lifetree::domain::{
    CopyOptions, IdSource, NodeId, NodeIndex, StructuralRule, Tree, TreeBuilder, TreeError,
};
use lifetree::util::testing::{init_test_setup, tree_from};

/// Hands out the same candidate every time.
#[derive(Debug)]
struct FixedIdSource(&'static str);

impl IdSource for FixedIdSource {
    fn candidate(&mut self) -> NodeId {
        NodeId::parse(self.0).unwrap()
    }
}

fn backward(tree: &mut Tree, parent: NodeIndex) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    let mut current = tree.last_child(parent);
    while let Some(node) = current {
        out.push(node);
        current = tree.prev_sibling(node);
    }
    out
}

fn texts(tree: &mut Tree, parent: NodeIndex) -> Vec<String> {
    tree.children(parent)
        .into_iter()
        .map(|n| tree.text(n).unwrap_or_default().to_string())
        .collect()
}

// ============================================================
// Sibling lists
// ============================================================

/// Ops: `a` append, `f` insert before the first child, `b<i>` insert
/// before child i, `x<i>` insert after child i, `r<i>` remove child i.
#[rstest]
#[case::appends("a a a a")]
#[case::front_inserts("a f f a f")]
#[case::middle_inserts("a a b1 x0 x3 b0")]
#[case::removals("a a a a r0 r2 a r1")]
#[case::drain_and_refill("a a r0 r0 a f x0 r1")]
fn given_insert_remove_sequence_when_iterating_then_forward_reversed_equals_backward(
    #[case] ops: &str,
) {
    init_test_setup();
    let mut tree = Tree::new();
    let root = tree.root();
    let parent = tree.create_child(root, "task", Some("parent")).unwrap();

    for (n, op) in ops.split_whitespace().enumerate() {
        let text = format!("n{n}");
        let (kind, pos) = op.split_at(1);
        let pos: usize = pos.parse().unwrap_or(0);
        let children = tree.children(parent);
        match kind {
            "a" => {
                tree.create_child(parent, "task", Some(text.as_str())).unwrap();
            }
            "f" => {
                let node = tree.create("task", Some(text.as_str()), Some(parent), None).unwrap();
                tree.insert_child(parent, node, children.first().copied(), None)
                    .unwrap();
            }
            "b" => {
                let node = tree.create("task", Some(text.as_str()), Some(parent), None).unwrap();
                tree.insert_child(parent, node, Some(children[pos]), None)
                    .unwrap();
            }
            "x" => {
                let node = tree.create("task", Some(text.as_str()), Some(parent), None).unwrap();
                tree.insert_child(parent, node, None, Some(children[pos]))
                    .unwrap();
            }
            "r" => {
                tree.remove_child(parent, children[pos]).unwrap();
            }
            other => panic!("unknown op {other}"),
        }
    }

    let mut forward = tree.children(parent);
    forward.reverse();
    assert_eq!(forward, backward(&mut tree, parent));
    assert_eq!(
        tree.get(parent).unwrap().children().len,
        tree.children(parent).len()
    );
}

#[test]
fn given_before_and_after_anchors_when_inserting_then_lands_between() {
    // Arrange
    let (mut tree, nodes) = tree_from("task: P\n  task: one\n  task: three\n").unwrap();
    let (parent, one, three) = (nodes[0], nodes[1], nodes[2]);
    let two = tree.create("task", Some("two"), Some(parent), None).unwrap();

    // Act
    tree.insert_child(parent, two, Some(three), Some(one)).unwrap();

    // Assert
    assert_eq!(texts(&mut tree, parent), vec!["one", "two", "three"]);
}

#[test]
fn given_non_adjacent_anchors_when_inserting_then_fails_and_tree_unchanged() {
    // Arrange
    let (mut tree, nodes) =
        tree_from("task: P\n  task: one\n  task: two\n  task: three\n").unwrap();
    let (parent, one, three) = (nodes[0], nodes[1], nodes[3]);
    let node = tree.create("task", Some("new"), Some(parent), None).unwrap();

    // Act
    let result = tree.insert_child(parent, node, Some(three), Some(one));

    // Assert
    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::ListIntegrity { .. },
            ..
        })
    ));
    assert_eq!(texts(&mut tree, parent), vec!["one", "two", "three"]);
    assert!(tree.get(node).unwrap().parent().is_none());
}

#[test]
fn given_anchor_of_other_parent_when_inserting_then_not_a_child() {
    let (mut tree, nodes) = tree_from("task: P\n  task: one\ntask: Q\n  task: other\n").unwrap();
    let (parent, other) = (nodes[0], nodes[3]);
    let node = tree.create("task", Some("new"), Some(parent), None).unwrap();

    let result = tree.insert_child(parent, node, Some(other), None);

    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::NotAChild { .. },
            ..
        })
    ));
    assert_eq!(texts(&mut tree, parent), vec!["one"]);
}

// ============================================================
// Ids
// ============================================================

#[test]
fn given_duplicate_explicit_id_when_linking_then_structural_error() {
    // Arrange
    let mut tree = Tree::new();
    let root = tree.root();
    tree.create_child_with_id(root, "task", Some("first"), "abcde")
        .unwrap();

    // Act
    let result = tree.create_child_with_id(root, "task", Some("second"), "abcde");

    // Assert
    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::DuplicateId { .. },
            ..
        })
    ));
    assert_eq!(tree.children(root).len(), 1);
}

#[test]
fn given_nodes_without_ids_when_linking_then_each_gets_unique_five_char_id() {
    let mut tree = Tree::new();
    let root = tree.root();
    let nodes: Vec<_> = (0..200)
        .map(|i| tree.create_child(root, "task", Some(format!("t{i}").as_str())).unwrap())
        .collect();

    let ids: HashSet<String> = nodes
        .iter()
        .map(|n| tree.id(*n).unwrap().to_string())
        .collect();

    assert_eq!(ids.len(), 200);
    assert!(ids.iter().all(|id| id.len() == 5 && NodeId::is_valid(id)));
    assert_eq!(tree.id_count(), 201);
}

#[test]
fn given_colliding_id_source_when_allocating_then_id_exhausted_after_attempts() {
    // Arrange
    let mut tree = TreeBuilder::new()
        .id_source(FixedIdSource("AAAAA"))
        .id_attempts(3)
        .build();
    let root = tree.root();
    tree.create_child(root, "task", Some("gets the id")).unwrap();

    // Act
    let result = tree.create_child(root, "task", Some("collides"));

    // Assert
    assert!(matches!(result, Err(TreeError::IdExhausted { attempts: 3 })));
    assert_eq!(tree.children(root).len(), 1);
}

#[test]
fn given_floating_node_when_not_linked_then_has_no_id() {
    let mut tree = Tree::new();
    let node = tree.create("task", Some("floating"), None, None).unwrap();
    assert!(tree.id(node).is_none());
    assert!(!tree.is_rooted(node));
}

// ============================================================
// Structural rules
// ============================================================

#[test]
fn given_unregistered_type_when_creating_then_unknown_type() {
    let mut tree = Tree::new();
    let result = tree.create("spaceship", Some("x"), None, None);
    assert!(matches!(result, Err(TreeError::UnknownType(t)) if t == "spaceship"));
}

#[rstest]
#[case::text_on_textless("todo bucket", Some("x"), StructuralRule::TextForbidden)]
#[case::missing_required_text("reference", None, StructuralRule::TextRequired)]
#[case::newline_in_single_line("category", Some("a\nb"), StructuralRule::Multiline)]
fn given_bad_text_when_creating_then_structural_error(
    #[case] node_type: &str,
    #[case] text: Option<&str>,
    #[case] expected: StructuralRule,
) {
    let mut tree = Tree::new();
    let result = tree.create(node_type, text, None, None);
    match result {
        Err(TreeError::Structural { rule, .. }) => assert_eq!(rule, expected),
        other => panic!("expected structural error, got {other:?}"),
    }
}

#[test]
fn given_toplevel_type_below_root_when_linking_then_rejected() {
    let (mut tree, nodes) = tree_from("task: A\n").unwrap();
    let result = tree.create_child(nodes[0], "todo bucket", None);
    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::TopLevelOnly,
            ..
        })
    ));
    assert!(tree.children(nodes[0]).is_empty());
}

#[test]
fn given_restricted_children_when_linking_then_rules_apply_both_ways() {
    let (mut tree, nodes) = tree_from("todo bucket\n").unwrap();
    let bucket = nodes[0];
    let root = tree.root();

    let task_in_bucket = tree.create_child(bucket, "task", Some("x"));
    let todo_at_root = tree.create_child(root, "todo", Some("y"));
    let todo_in_bucket = tree.create_child(bucket, "todo", Some("z"));

    assert!(matches!(
        task_in_bucket,
        Err(TreeError::Structural {
            rule: StructuralRule::AllowedChildren { .. },
            ..
        })
    ));
    assert!(matches!(
        todo_at_root,
        Err(TreeError::Structural {
            rule: StructuralRule::ChildrenOf { .. },
            ..
        })
    ));
    assert!(todo_in_bucket.is_ok());
}

#[test]
fn given_attached_node_when_linking_again_then_already_attached() {
    let (mut tree, nodes) = tree_from("task: A\ntask: B\n").unwrap();
    let result = tree.add_child(nodes[1], nodes[0]);
    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::AlreadyAttached,
            ..
        })
    ));
}

#[test]
fn given_node_when_linking_under_own_descendant_then_cycle() {
    let (mut tree, nodes) = tree_from("task: A\n  task: B\n").unwrap();
    let (a, b) = (nodes[0], nodes[1]);
    tree.detach(a).unwrap();

    let result = tree.add_child(b, a);

    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::Cycle,
            ..
        })
    ));
    assert_eq!(tree.children(a), vec![b]);
}

// ============================================================
// Copy, detach, discard
// ============================================================

#[test]
fn given_subtree_when_copied_then_linked_copy_gets_fresh_ids() {
    // Arrange
    let (mut tree, nodes) = tree_from("task#aaaaa: A\n  task#bbbbb: B\n").unwrap();
    let root = tree.root();
    tree.set_option(nodes[0], "started", Some("June 01, 2013 01:00:00 AM"))
        .unwrap();

    // Act
    let copy = tree.copy(nodes[0], None, CopyOptions::default()).unwrap();
    tree.add_child(root, copy).unwrap();

    // Assert
    let copied_child = tree.children(copy)[0];
    assert_eq!(tree.text(copied_child), Some("B"));
    assert_ne!(tree.id(copy).unwrap().as_str(), "aaaaa");
    assert_ne!(tree.id(copied_child).unwrap().as_str(), "bbbbb");
    assert!(tree.is_started(copy));
    assert_eq!(tree.id_count(), 5);
}

#[test]
fn given_copy_without_options_when_copied_then_options_dropped() {
    let (mut tree, nodes) = tree_from("task: A\n").unwrap();
    tree.start(nodes[0]).unwrap();

    let copy = tree
        .copy(
            nodes[0],
            None,
            CopyOptions {
                options: false,
                ..CopyOptions::default()
            },
        )
        .unwrap();

    assert!(!tree.is_started(copy));
}

#[test]
fn given_rooted_subtree_when_detached_then_ids_unregistered() {
    // Arrange
    let (mut tree, nodes) = tree_from("task#aaaaa: A\n  task#bbbbb: B\n").unwrap();
    let b_id = NodeId::parse("bbbbb").unwrap();

    // Act
    let detached = tree.detach(nodes[0]).unwrap();

    // Assert
    assert_eq!(detached, nodes[0]);
    assert!(tree.find_by_id(&b_id).is_none());
    assert!(!tree.is_rooted(nodes[1]));
    assert!(tree.children(tree.root()).is_empty());

    // re-linking registers them again
    let root = tree.root();
    tree.add_child(root, detached).unwrap();
    assert_eq!(tree.find_by_id(&b_id), Some(nodes[1]));
}

#[test]
fn given_subtree_when_discarded_then_nodes_leave_arena() {
    let (mut tree, nodes) = tree_from("task: A\n  task: B\n").unwrap();

    tree.discard(nodes[0]).unwrap();

    assert!(!tree.contains(nodes[0]));
    assert!(!tree.contains(nodes[1]));
    assert_eq!(tree.id_count(), 1);
}

#[rstest]
#[case::detach(false)]
#[case::discard(true)]
fn given_root_when_removed_then_rejected_and_root_stays_usable(#[case] discard: bool) {
    // Arrange
    let (mut tree, nodes) = tree_from("task: A\n").unwrap();
    let root = tree.root();

    // Act
    let result = if discard {
        tree.discard(root)
    } else {
        tree.detach(root).map(|_| ())
    };

    // Assert
    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::Root,
            ..
        })
    ));
    assert!(tree.contains(root));
    assert_eq!(tree.children(root), vec![nodes[0]]);
    let added = tree.create_child(root, "task", Some("B")).unwrap();
    assert_eq!(tree.parent(added), Some(root));
}

#[test]
fn given_nested_nodes_when_walking_then_preorder_with_depths() {
    let (mut tree, nodes) = tree_from("task: A\n  task: B\n    task: C\n  task: D\ntask: E\n").unwrap();
    let root = tree.root();

    let walked = tree.descendants(root);

    assert_eq!(
        walked,
        vec![(1, nodes[0]), (2, nodes[1]), (3, nodes[2]), (2, nodes[3]), (1, nodes[4])]
    );
    assert_eq!(tree.ancestors(nodes[2]), vec![nodes[1], nodes[0], root]);
}
