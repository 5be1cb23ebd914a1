mod common;

use archive_ingest::config::Config;
use archive_ingest::error::HierarchyError;
use archive_ingest::hierarchy::split_path;
use archive_ingest::types::{fields, text_field};

use common::*;

#[test]
fn missing_levels_are_created_under_compound_identifiers() {
    let h = Harness::new(test_config());
    let resolution = h.orchestrator.hierarchy().resolve(&split_path("Top/Mid")).unwrap();

    let top = h.collection("Top");
    let mid = h.collection("Top_Mid");
    assert_eq!(resolution.created, vec![id_of(&top), id_of(&mid)]);
    assert_eq!(resolution.leaf_id, id_of(&mid));
    assert_eq!(resolution.leaf_identifier, "Top_Mid");
    assert_eq!(resolution.ancestor_path, vec![id_of(&top), id_of(&mid)]);
    assert!(resolution.map_rebuilt);

    assert_eq!(text_field(&mid, fields::TITLE), Some("Mid"));
    assert_eq!(list(&mid, fields::PARENT_COLLECTION), vec![id_of(&top)]);
    assert_eq!(list(&top, fields::ANCESTOR_PATH), vec![id_of(&top)]);
    assert!(!top.contains_key(fields::PARENT_COLLECTION));

    let map = h.orchestrator.maps().load_map(&id_of(&top)).unwrap().unwrap();
    assert_eq!(map.node_count(), 2);
    assert_eq!(map.children[0].id, id_of(&mid));
}

#[test]
fn dry_run_levels_are_not_mapped() {
    let h = Harness::new(Config {
        dry_run: true,
        ..test_config()
    });
    let resolution = h.orchestrator.hierarchy().resolve(&split_path("Top/Mid")).unwrap();

    assert_eq!(resolution.created.len(), 2);
    assert_eq!(resolution.ancestor_path, resolution.created);
    assert!(!resolution.map_rebuilt);
    assert!(h.collections().is_empty());
    assert!(h.store.documents(&h.config.tables.collection_map).is_empty());
    assert_eq!(h.store.write_count(), 0);
}

#[test]
fn resolving_again_creates_nothing() {
    let h = Harness::new(test_config());
    let segments = split_path("Top/Mid/Leaf");
    let first = h.orchestrator.hierarchy().resolve(&segments).unwrap();
    let writes = h.store.write_count();

    let second = h.orchestrator.hierarchy().resolve(&segments).unwrap();
    assert!(second.created.is_empty());
    assert!(!second.map_rebuilt);
    assert_eq!(second.leaf_id, first.leaf_id);
    assert_eq!(second.ancestor_path, first.ancestor_path);
    assert_eq!(h.collections().len(), 3);
    assert_eq!(h.store.write_count(), writes);
}

#[test]
fn existing_levels_are_reused() {
    let h = Harness::new(test_config());
    h.store
        .insert_raw(
            &h.config.tables.collection,
            collection_fixture("top-id", "Top", "Top", &[], &["top-id"]),
        )
        .unwrap();

    let resolution = h.orchestrator.hierarchy().resolve(&split_path("Top/New")).unwrap();
    let new = h.collection("Top_New");
    assert_eq!(resolution.created, vec![id_of(&new)]);
    assert_eq!(resolution.ancestor_path, vec!["top-id".to_string(), id_of(&new)]);
    assert_eq!(list(&new, fields::ANCESTOR_PATH), resolution.ancestor_path);
}

#[test]
fn duplicated_level_is_ambiguous_and_creates_nothing() {
    let h = Harness::new(test_config());
    for id in ["t1", "t2"] {
        h.store
            .insert_raw(&h.config.tables.collection, collection_fixture(id, "Top", "Top", &[], &[id]))
            .unwrap();
    }

    let err = h.orchestrator.hierarchy().resolve(&split_path("Top/Mid")).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::AmbiguousHierarchy { ref identifier, matches: 2 } if identifier == "Top"
    ));
    assert_eq!(h.collections().len(), 2);
}

#[test]
fn blank_path_is_rejected() {
    let h = Harness::new(test_config());
    assert!(matches!(
        h.orchestrator.hierarchy().resolve(&split_path(" / ")),
        Err(HierarchyError::EmptyPath)
    ));
}
