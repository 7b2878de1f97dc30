//! Tests for find-or-create

use rstest::rstest;

use lifetree::domain::{NodeIndex, StructuralRule, Tree, TreeBuilder, TreeError};
use lifetree::util::testing::{init_test_setup, tree_from};

fn child_texts(tree: &mut Tree, node: NodeIndex) -> Vec<String> {
    tree.children(node)
        .into_iter()
        .map(|n| tree.describe(n))
        .collect()
}

// ============================================================
// Find or create
// ============================================================

#[test]
fn given_id_start_when_creating_under_child_then_found_once_afterwards() {
    // Arrange
    init_test_setup();
    let (mut tree, nodes) = tree_from("task#T1abc: A\n  task: B\n").unwrap();
    let a = nodes[0];
    let b = nodes[1];

    // Act
    let c = tree.find_or_create_str(a, "B > task: C").unwrap();

    // Assert
    assert_eq!(tree.children(b), vec![c]);
    assert_eq!(tree.describe(c), "task: C");
    let start = tree.find_one_str(tree.root(), "#T1abc").unwrap();
    assert_eq!(tree.find_str(start, "** > task: C").unwrap(), vec![c]);
}

#[test]
fn given_existing_match_when_find_or_create_then_nothing_is_added() {
    let (mut tree, nodes) = tree_from("task: A\n  task: B\n").unwrap();
    let root = tree.root();
    let before = tree.id_count();

    let found = tree.find_or_create_str(root, "task: A > task: B").unwrap();

    assert_eq!(found, nodes[1]);
    assert_eq!(tree.id_count(), before);
}

#[test]
fn given_repeated_find_or_create_when_called_twice_then_same_node() {
    let (mut tree, nodes) = tree_from("category: work\n").unwrap();
    let root = tree.root();

    let first = tree.find_or_create_str(root, "category: work > task: report").unwrap();
    let second = tree.find_or_create_str(root, "CATEGORY: WORK > TASK: REPORT").unwrap();

    assert_eq!(first, second);
    assert_eq!(tree.children(nodes[0]), vec![first]);
}

#[test]
fn given_existing_match_when_create_str_then_creates_duplicate() {
    let (mut tree, nodes) = tree_from("task: A\n  task: B\n").unwrap();
    let root = tree.root();

    let created = tree.create_str(root, "task: A > task: B").unwrap();

    assert_ne!(created, nodes[1]);
    assert_eq!(child_texts(&mut tree, nodes[0]), vec!["task: B", "task: B"]);
}

// ============================================================
// Placement
// ============================================================

const PLACEMENT: &str = "\
task: A
  comment: c
  task: done
  task: open
";

#[rstest]
#[case::before_first_activatable("A > task: new", &["comment: c", "task: done", "task: new", "task: open"])]
#[case::plus_appends("A > +task: new", &["comment: c", "task: done", "task: open", "task: new"])]
#[case::minus_prepends("A > -task: new", &["task: new", "comment: c", "task: done", "task: open"])]
#[case::after_first("A > task: new :{after}", &["comment: c", "task: new", "task: done", "task: open"])]
#[case::before_last("A > task: new :{last, before}", &["comment: c", "task: done", "task: new", "task: open"])]
fn given_placement_hint_when_creating_then_node_lands_in_place(
    #[case] query: &str,
    #[case] expected: &[&str],
) {
    // Arrange
    let (mut tree, nodes) = tree_from(PLACEMENT).unwrap();
    tree.finish(nodes[2]).unwrap();
    let root = tree.root();

    // Act
    tree.create_str(root, query).unwrap();

    // Assert
    assert_eq!(child_texts(&mut tree, nodes[0]), expected);
}

#[test]
fn given_no_activatable_child_when_creating_then_appends() {
    let (mut tree, nodes) = tree_from("task: A\n  comment: c\n").unwrap();
    let root = tree.root();

    tree.create_str(root, "A > task: new").unwrap();

    assert_eq!(child_texts(&mut tree, nodes[0]), vec!["comment: c", "task: new"]);
}

#[test]
fn given_next_peer_query_when_creating_then_placed_among_parents_children() {
    let (mut tree, _) = tree_from("task: A\ncomment: c\n").unwrap();
    let root = tree.root();

    tree.create_str(root, "A -> task: next").unwrap();

    assert_eq!(
        child_texts(&mut tree, root),
        vec!["task: A", "comment: c", "task: next"]
    );
}

#[test]
fn given_prev_peer_query_when_creating_then_placed_after_activatable_peer() {
    let (mut tree, _) = tree_from("task: A\ntask: B\n").unwrap();
    let root = tree.root();

    tree.create_str(root, "B <- task: mid").unwrap();

    assert_eq!(
        child_texts(&mut tree, root),
        vec!["task: A", "task: mid", "task: B"]
    );
}

// ============================================================
// Tick ceiling
// ============================================================

/// Ten tasks under one category: the lookup costs 12 ticks, the prefix
/// search 2 more and the anchor scan 1.
#[rstest]
#[case::prefix_search_over_budget(13, false)]
#[case::anchor_scan_over_budget(14, false)]
#[case::whole_call_fits(15, true)]
fn given_ceiling_when_find_or_create_then_one_budget_covers_every_phase(
    #[case] max_ticks: usize,
    #[case] fits: bool,
) {
    // Arrange
    let mut tree = TreeBuilder::new().max_ticks(max_ticks).build();
    let root = tree.root();
    let category = tree.create_child(root, "category", Some("work")).unwrap();
    for i in 0..10 {
        tree.create_child(category, "task", Some(format!("t{i}").as_str()))
            .unwrap();
    }
    let before = tree.id_count();

    // Act
    let result = tree.find_or_create_str(root, "category: work > task: new");

    // Assert
    if fits {
        let created = result.unwrap();
        assert_eq!(tree.parent(created), Some(category));
        assert_eq!(tree.id_count(), before + 1);
    } else {
        assert_eq!(
            result,
            Err(TreeError::BoundedSearchExceeded { ticks: max_ticks })
        );
        assert_eq!(tree.id_count(), before);
    }
}

// ============================================================
// Self placing types
// ============================================================

#[test]
fn given_todo_bucket_when_creating_todo_then_lands_in_bucket() {
    // Arrange
    let (mut tree, nodes) = tree_from("todo bucket\ntask: A\n").unwrap();
    let root = tree.root();

    // Act
    let todo = tree.find_or_create_str(root, "task: A > todo: buy milk").unwrap();

    // Assert
    assert_eq!(tree.parent(todo), Some(nodes[0]));
    assert!(tree.children(nodes[1]).is_empty());
}

#[test]
fn given_no_todo_bucket_when_creating_todo_then_fails_and_leaves_nothing() {
    let (mut tree, _) = tree_from("task: A\n").unwrap();
    let root = tree.root();
    let before = tree.id_count();

    let result = tree.create_str(root, "task: A > todo: buy milk");

    assert!(matches!(result, Err(TreeError::NoMatches { .. })));
    assert_eq!(tree.id_count(), before);
}

#[test]
fn given_days_journal_when_creating_days_from_anywhere_then_kept_in_date_order() {
    // Arrange
    let (mut tree, nodes) = tree_from("days\ntask: A\n").unwrap();
    let (days, task) = (nodes[0], nodes[1]);
    let root = tree.root();

    // Act
    tree.create_str(root, "day: October 18, 2026").unwrap();
    tree.create_str(task, "day: October 16, 2026").unwrap();
    tree.create_str(root, "day: 2026-10-17").unwrap();

    // Assert
    assert_eq!(
        child_texts(&mut tree, days),
        vec![
            "day: October 16, 2026",
            "day: 2026-10-17",
            "day: October 18, 2026",
        ]
    );
    assert!(tree.children(task).is_empty());
}

#[test]
fn given_day_when_checking_activation_then_only_today_is_activatable() {
    let (mut tree, _) = tree_from("days\n").unwrap();
    let root = tree.root();
    let today = chrono::Local::now().format("%B %d, %Y").to_string();

    let current = tree.create_str(root, &format!("day: {today}")).unwrap();
    let past = tree.create_str(root, "day: January 01, 2001").unwrap();

    assert!(tree.can_activate(current));
    assert!(!tree.can_activate(past));
}

#[test]
fn given_text_that_is_not_a_date_when_creating_day_then_invalid_date() {
    let (mut tree, nodes) = tree_from("days\n").unwrap();
    let root = tree.root();

    let result = tree.create_str(root, "day: someday");

    assert!(matches!(
        result,
        Err(TreeError::Structural {
            rule: StructuralRule::InvalidDate { .. },
            ..
        })
    ));
    assert!(tree.children(nodes[0]).is_empty());
}

// ============================================================
// Refusals
// ============================================================

#[rstest]
#[case::type_only("task")]
#[case::wildcard("task: A > *")]
#[case::parents("task: A < task: B")]
#[case::explicit_id("#aaaaa > task: B")]
#[case::many("task: A > task: B :{many}")]
#[case::flatten("task: A ** task: B")]
#[case::root("<< task: B")]
#[case::rel_with_plurality("task: A > +task: B :{first}")]
#[case::rel_with_placement("task: A > -task: B :{after}")]
fn given_uncreatable_query_when_creating_then_cant_create(#[case] query: &str) {
    let (mut tree, _) = tree_from("task#aaaaa: A\n").unwrap();
    let root = tree.root();

    let result = tree.create_str(root, query);

    assert!(
        matches!(result, Err(TreeError::CantCreate { .. })),
        "{query}: {result:?}"
    );
}

#[test]
fn given_missing_prefix_when_creating_then_node_not_created() {
    let (mut tree, _) = tree_from("task: A\n").unwrap();
    let root = tree.root();
    let before = tree.id_count();

    let result = tree.find_or_create_str(root, "task: nope > task: B");

    assert!(matches!(result, Err(TreeError::NodeNotCreated { .. })));
    assert_eq!(tree.id_count(), before);
}

#[test]
fn given_structural_violation_when_creating_then_error_and_no_leftover() {
    let (mut tree, _) = tree_from("task: A\n").unwrap();
    let root = tree.root();
    let before = tree.id_count();

    let result = tree.create_str(root, "task: A > todo bucket: x");

    assert!(result.is_err());
    assert_eq!(tree.id_count(), before);
}
