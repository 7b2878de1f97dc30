//! Tests for outline files: saving, loading and settings wiring

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use lifetree::application::outline::{OutlineDocument, OutlineNode};
use lifetree::application::ApplicationError;
use lifetree::config::Settings;
use lifetree::display::outline_lines;
use lifetree::domain::{NodeId, NodeIndex, Tree, TreeError};
use lifetree::infrastructure::di::ServiceContainer;
use lifetree::infrastructure::traits::RealFileSystem;
use lifetree::util::testing::{init_test_setup, tree_from};

fn container(settings: Settings) -> ServiceContainer {
    ServiceContainer::with_deps(settings, Arc::new(RealFileSystem))
}

fn outline_path(dir: &TempDir) -> PathBuf {
    dir.path().join("nested").join("life.toml")
}

fn node_by_id(tree: &Tree, id: &str) -> NodeIndex {
    tree.find_by_id(&NodeId::parse(id).unwrap()).unwrap()
}

// ============================================================
// Round trips
// ============================================================

#[test]
fn given_saved_tree_when_loading_then_structure_and_ids_survive() {
    // Arrange
    init_test_setup();
    let dir = TempDir::new().unwrap();
    let path = outline_path(&dir);
    let services = container(Settings::default());
    let (mut tree, _) = tree_from(
        "category#cat01: work\n\
         \x20 task#tsk01: report\n\
         \x20   comment: multi\n\
         reference#ref01: #tsk01\n",
    )
    .unwrap();
    let root = tree.root();
    let before = outline_lines(&mut tree, root);

    // Act
    services.outline.save(&tree, &path).unwrap();
    let mut loaded = services.outline.load(&path).unwrap();

    // Assert
    let root = loaded.root();
    assert_eq!(outline_lines(&mut loaded, root), before);
    let reference = node_by_id(&loaded, "ref01");
    assert_eq!(
        loaded.reference_target(reference),
        Some(node_by_id(&loaded, "tsk01"))
    );
    assert!(!path.with_file_name("life.toml.tmp").exists());
}

#[test]
fn given_finished_task_when_round_tripped_then_life_cycle_survives() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = outline_path(&dir);
    let services = container(Settings::default());
    let (mut tree, nodes) = tree_from("task#tsk01: A\ntask#tsk02: B\n").unwrap();
    tree.activate(nodes[0], false).unwrap();
    tree.finish(nodes[0]).unwrap();
    tree.activate(nodes[1], false).unwrap();

    // Act
    services.outline.save(&tree, &path).unwrap();
    let loaded = services.outline.load(&path).unwrap();

    // Assert
    let a = node_by_id(&loaded, "tsk01");
    let b = node_by_id(&loaded, "tsk02");
    assert!(loaded.is_started(a));
    assert!(loaded.is_finished(a));
    assert!(!loaded.is_finished(b));
    assert_eq!(loaded.active(), b);
}

#[test]
fn given_active_proxy_when_saved_then_reference_is_active_after_load() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = outline_path(&dir);
    let services = container(Settings::default());
    let (mut tree, nodes) = tree_from("task#tsk01: T\n  task: c\nreference#ref01: #tsk01\n").unwrap();
    let proxy = tree.children(nodes[2])[0];
    assert!(tree.activate(proxy, false).unwrap());

    // Act
    services.outline.save(&tree, &path).unwrap();
    let saved = fs::read_to_string(&path).unwrap();
    let loaded = services.outline.load(&path).unwrap();

    // Assert
    assert_eq!(saved.matches("\"active\"").count(), 1);
    assert_eq!(loaded.active(), node_by_id(&loaded, "ref01"));
}

#[test]
fn given_reference_before_its_target_when_loading_document_then_resolves() {
    // Arrange
    let doc = OutlineDocument {
        nodes: vec![
            OutlineNode::new("reference", Some("#tsk01")).with_id("ref01"),
            OutlineNode::new("task", Some("T"))
                .with_id("tsk01")
                .with_child(OutlineNode::new("task", Some("c"))),
        ],
    };
    let mut tree = Tree::new();

    // Act
    doc.load_into(&mut tree).unwrap();

    // Assert
    let reference = node_by_id(&tree, "ref01");
    assert_eq!(
        tree.reference_target(reference),
        Some(node_by_id(&tree, "tsk01"))
    );
    assert_eq!(tree.children(reference).len(), 1);
}

// ============================================================
// Failures and defaults
// ============================================================

#[test]
fn given_missing_file_when_load_or_new_then_empty_tree() {
    let dir = TempDir::new().unwrap();
    let services = container(Settings::default());

    let mut tree = services.outline.load_or_new(&outline_path(&dir)).unwrap();

    let root = tree.root();
    assert!(tree.children(root).is_empty());
    assert_eq!(tree.id_count(), 1);
}

#[test]
fn given_malformed_file_when_loading_then_outline_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("life.toml");
    fs::write(&path, "[[nodes]\ntype = ").unwrap();
    let services = container(Settings::default());

    let result = services.outline.load(&path);

    assert!(matches!(result, Err(ApplicationError::Outline { .. })));
}

#[test]
fn given_unknown_type_in_file_when_loading_then_tree_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("life.toml");
    fs::write(&path, "[[nodes]]\ntype = \"spaceship\"\ntext = \"x\"\n").unwrap();
    let services = container(Settings::default());

    let result = services.outline.load(&path);

    assert!(matches!(
        result,
        Err(ApplicationError::Tree(TreeError::UnknownType(_)))
    ));
}

#[test]
fn given_absent_path_when_loading_then_outline_io_error() {
    let dir = TempDir::new().unwrap();
    let services = container(Settings::default());

    let result = services.outline.load(&dir.path().join("absent.toml"));

    assert!(matches!(
        result,
        Err(ApplicationError::OutlineIo { action: "read", .. })
    ));
}

// ============================================================
// Settings wiring
// ============================================================

#[test]
fn given_seeded_settings_when_building_trees_then_ids_repeat() {
    let mut settings = Settings::default();
    settings.ids.seed = Some(42);
    let services = container(settings);

    let mut first = services.outline.new_tree().unwrap();
    let mut second = services.outline.new_tree().unwrap();
    let (r1, r2) = (first.root(), second.root());
    let a = first.create_child(r1, "task", Some("A")).unwrap();
    let b = second.create_child(r2, "task", Some("A")).unwrap();

    assert_eq!(first.id(a), second.id(b));
}

#[test]
fn given_tick_setting_when_building_tree_then_ceiling_applies() {
    let mut settings = Settings::default();
    settings.search.max_ticks = 5;
    let services = container(settings);

    let tree = services.outline.new_tree().unwrap();

    assert_eq!(tree.max_ticks(), 5);
}
