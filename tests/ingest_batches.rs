mod common;

use std::sync::Arc;

use archive_ingest::config::{BatchPolicy, Config};
use archive_ingest::ingest::{FileKind, IngestSeverity};
use archive_ingest::types::{fields, text_field, Value};
use archive_ingest::IngestError;

use common::*;

const COLLECTIONS: &str = "IAWA/Ms1990_025_collection_metadata.csv";
const ITEMS: &str = "IAWA/Ms1990_025_archive_metadata.csv";

fn ingest_collection_then_item(config: Config) -> Harness {
    let h = Harness::new(config);
    h.put_file(COLLECTIONS, "identifier,title,description\ncol1,Test,First collection\n");
    h.put_file(
        ITEMS,
        "identifier,title,parent_collection_identifier\nitemA,Item A,col1\n",
    );
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    h.orchestrator.ingest_file(ITEMS).unwrap();
    h
}

#[test]
fn collection_row_creates_record_rooted_at_itself() {
    let h = Harness::new(test_config());
    h.put_file(COLLECTIONS, "identifier,title,description\ncol1,Test,First collection\n");

    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert_eq!(report.kind, FileKind::Collection);
    assert!(report.is_clean());

    let col = h.collection("col1");
    assert_eq!(list(&col, fields::ANCESTOR_PATH), vec![id_of(&col)]);
    assert_eq!(col.get(fields::VISIBILITY), Some(&Value::Bool(true)));
    assert_eq!(text_field(&col, fields::COLLECTION_CATEGORY), Some("IAWA"));
    assert!(text_field(&col, fields::SHORT_KEY).unwrap().starts_with("ark:/53696/"));
    assert_eq!(
        text_field(&col, fields::THUMBNAIL_PATH),
        Some("https://img.example.org/IAWA/col1/representative.jpg")
    );

    // A new root gets a map document and a back link.
    let map = h.orchestrator.maps().load_map(&id_of(&col)).unwrap().unwrap();
    assert_eq!(map.name, "Test");
    assert!(map.children.is_empty());
    assert!(text_field(&h.collection("col1"), fields::COLLECTION_MAP_ID).is_some());
}

#[test]
fn item_row_is_attached_to_its_parent_collection() {
    let h = ingest_collection_then_item(test_config());
    let col = h.collection("col1");
    let item = h.item("itemA");

    assert_eq!(text_field(&item, fields::COLLECTION), Some(id_of(&col).as_str()));
    assert_eq!(list(&item, fields::PARENT_COLLECTION), vec![id_of(&col)]);
    assert_eq!(list(&item, fields::ANCESTOR_PATH), list(&col, fields::ANCESTOR_PATH));
    assert_eq!(text_field(&item, fields::ITEM_CATEGORY), Some("IAWA"));

    let manifest = "https://img.example.org/IAWA/col1/itemA/manifest.json";
    assert_eq!(text_field(&item, fields::MANIFEST_URL), Some(manifest));
    assert_eq!(
        text_field(&item, fields::THUMBNAIL_PATH),
        Some(thumbnail_for(manifest).as_str())
    );
}

#[test]
fn item_parent_collection_may_name_a_collection_id() {
    let h = Harness::new(test_config());
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    let col = h.collection("col1");

    h.put_file(ITEMS, &format!("identifier,title,parent_collection\nitemA,A,{}\n", id_of(&col)));
    let report = h.orchestrator.ingest_file(ITEMS).unwrap();
    assert!(report.is_clean(), "{:?}", report.entries);

    let item = h.item("itemA");
    assert_eq!(text_field(&item, fields::COLLECTION), Some(id_of(&col).as_str()));
    assert_eq!(list(&item, fields::PARENT_COLLECTION), vec![id_of(&col)]);
    assert_eq!(list(&item, fields::PARENT_COLLECTION_IDENTIFIER), vec!["col1".to_string()]);
    assert_eq!(list(&item, fields::ANCESTOR_PATH), list(&col, fields::ANCESTOR_PATH));
}

#[test]
fn item_falls_back_to_configured_default_collection() {
    let h = Harness::new(Config {
        collection_identifier: Some("col1".to_string()),
        ..test_config()
    });
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");
    h.put_file(ITEMS, "identifier,title\nitemB,Item B\n");
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    let report = h.orchestrator.ingest_file(ITEMS).unwrap();

    assert!(report.is_clean());
    let col = h.collection("col1");
    assert_eq!(
        text_field(&h.item("itemB"), fields::COLLECTION),
        Some(id_of(&col).as_str())
    );
}

#[test]
fn item_without_collection_fails_its_row() {
    let h = Harness::new(test_config());
    h.put_file(ITEMS, "identifier,title,parent_collection_identifier\nitemA,Item A,nope\n");

    let report = h.orchestrator.ingest_file(ITEMS).unwrap();
    assert_eq!(report.failed_rows(), 1);
    let entry = &report.entries[0];
    assert_eq!(entry.row, 2);
    assert_eq!(entry.identifier, "itemA");
    assert_eq!(
        entry.message,
        "Error Row 2: collection record not found for archive itemA."
    );
    assert!(h.items().is_empty());
}

#[test]
fn missing_manifest_fails_iiif_item() {
    let manifest = "https://img.example.org/IAWA/col1/itemA/manifest.json";
    let h = Harness::with_services(
        test_config(),
        Arc::new(archive_ingest::minting::LocalNoidService),
        Arc::new(FakeManifests::missing(&[manifest])),
    );
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");
    h.put_file(ITEMS, "identifier,title,parent_collection_identifier\nitemA,Item A,col1\n");
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();

    let report = h.orchestrator.ingest_file(ITEMS).unwrap();
    assert_eq!(report.failed_rows(), 1);
    assert!(report.entries[0].message.contains("manifest not found for archive itemA"));
    assert!(h.items().is_empty());
}

#[test]
fn reingest_without_update_skips_duplicates() {
    let h = Harness::new(test_config());
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();

    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert_eq!(h.collections().len(), 1);
    assert!(report.entries[0].succeeded);
    assert_eq!(
        report.entries[0].message,
        "Row 2: Identifier (col1) already exists, skipped."
    );
    assert_eq!(report.metrics.duplicates_skipped, 1);
    assert_eq!(report.metrics.created, 0);
    assert_eq!(report.metrics.ids_minted, 0);
}

#[test]
fn reingest_with_update_merges_changes() {
    let h = Harness::new(Config {
        update_metadata: true,
        ..test_config()
    });
    h.put_file(COLLECTIONS, "identifier,title,description,creator\ncol1,Test,Old,Someone\n");
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    let before = h.collection("col1");

    h.put_file(COLLECTIONS, "identifier,title,description,creator\ncol1,Renamed,Old,\n");
    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert_eq!(report.metrics.updated, 1);
    assert_eq!(report.metrics.maps_rebuilt, 1);

    let after = h.collection("col1");
    assert_eq!(id_of(&after), id_of(&before));
    assert_eq!(text_field(&after, fields::TITLE), Some("Renamed"));
    assert!(!after.contains_key("creator"));
    assert_eq!(after.get(fields::CREATED_AT), before.get(fields::CREATED_AT));
    assert_eq!(list(&after, fields::ANCESTOR_PATH), list(&before, fields::ANCESTOR_PATH));

    let map = h.orchestrator.maps().load_map(&id_of(&after)).unwrap().unwrap();
    assert_eq!(map.name, "Renamed");

    // Same row again: nothing differs, but the record is still stamped.
    std::thread::sleep(std::time::Duration::from_millis(2));
    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert_eq!(report.metrics.updated, 1);
    assert_eq!(report.metrics.unchanged, 0);
    assert_eq!(report.metrics.maps_rebuilt, 0);
    assert!(report.entries[0].message.contains("has been updated (no field changes)"));
    let again = h.collection("col1");
    assert_ne!(again.get(fields::UPDATED_AT), after.get(fields::UPDATED_AT));
    assert_eq!(text_field(&again, fields::TITLE), Some("Renamed"));
}

#[test]
fn child_collection_update_keeps_its_own_id_in_the_path() {
    let h = Harness::new(Config {
        update_metadata: true,
        ..test_config()
    });
    h.put_file(
        COLLECTIONS,
        "identifier,title,parent_collection_identifier\ntop,Top,\nsub,Sub,top\n",
    );
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    let top = h.collection("top");
    let sub = h.collection("sub");
    assert_eq!(list(&sub, fields::ANCESTOR_PATH), vec![id_of(&top), id_of(&sub)]);

    let map = h.orchestrator.maps().load_map(&id_of(&top)).unwrap().unwrap();
    assert_eq!(map.children.len(), 1);
    assert_eq!(map.children[0].name, "Sub");

    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert_eq!(
        list(&h.collection("sub"), fields::ANCESTOR_PATH),
        vec![id_of(&top), id_of(&sub)]
    );
}

const THREE_ROWS: &str = "identifier,title\nc1,First\nc2,\nc3,Third\n";

#[test]
fn abort_policy_stops_at_first_failed_row() {
    let h = Harness::new(test_config());
    h.put_file(COLLECTIONS, THREE_ROWS);

    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert!(report.aborted);
    assert_eq!(report.entries.len(), 2);
    assert!(!report.entries[1].succeeded);
    assert_eq!(
        report.entries[1].message,
        "Error Row 3: missing required attribute 'title'."
    );
    assert_eq!(h.collections().len(), 1);
}

#[test]
fn continue_policy_processes_every_row() {
    let h = Harness::new(Config {
        batch_policy: BatchPolicy::ContinueAndAccumulateErrors,
        ..test_config()
    });
    h.put_file(COLLECTIONS, THREE_ROWS);

    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert!(!report.aborted);
    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.failed_rows(), 1);
    assert_eq!(h.collections().len(), 2);
    assert_eq!(report.metrics.failed, 1);
    assert_eq!(report.metrics.rows_processed, 3);
}

#[test]
fn results_log_and_summary_are_written() {
    let h = Harness::new(Config {
        batch_policy: BatchPolicy::ContinueAndAccumulateErrors,
        ..test_config()
    });
    h.put_file(COLLECTIONS, THREE_ROWS);
    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();

    let location = report.results_location.clone().unwrap();
    assert!(location.starts_with("IAWA/Ms1990_025/metadata_import_results/Ms1990_025_ingest_results_"));
    assert!(location.ends_with(".csv"));

    let files = files_under(&h.objects, "IAWA/Ms1990_025/metadata_import_results/");
    assert_eq!(files.len(), 2);
    let csv = &files[&location];
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "row_in_metadata,identifier,succeeded,message");
    assert_eq!(lines[1], "2,c1,true,Row 2: c1 has been successfully imported. collection map rebuilt.");
    assert!(lines[2].starts_with("3,c2,false,"));
    assert_eq!(lines.len(), 4);

    let summary = &files[&location.replace(".csv", ".txt")];
    assert!(summary.contains("Rows: 3 processed, 2 succeeded, 1 failed"));
}

#[test]
fn dry_run_writes_nothing_but_the_results_log() {
    let h = Harness::new(Config {
        dry_run: true,
        ..test_config()
    });
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");

    let report = h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    assert!(report.is_clean());
    assert!(report.entries[0].message.ends_with("[dry run]"));
    assert_eq!(h.store.write_count(), 0);
    assert!(h.collections().is_empty());
    assert!(h.store.is_empty(&h.config.tables.short_id));
    assert!(report.results_location.is_some());
}

#[test]
fn identifiers_can_be_prefixed_with_their_collection() {
    let h = Harness::new(Config {
        prefix_item_identifiers: true,
        ..test_config()
    });
    h.put_file(COLLECTIONS, "identifier,title\nMs1990_025,Papers\n");
    h.put_file(
        ITEMS,
        "identifier,title,parent_collection_identifier\nBox1,Box one,Ms1990_025\nMs1990_025_Box2,Box two,Ms1990_025\n",
    );
    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    h.orchestrator.ingest_file(ITEMS).unwrap();

    h.item("Ms1990_025_Box1");
    h.item("Ms1990_025_Box2");
    assert_eq!(h.items().len(), 2);
}

#[test]
fn index_file_builds_hierarchy_and_ingests_items() {
    let h = Harness::new(test_config());
    h.put_file(
        "IAWA/batch_index.csv",
        "file,path\nIAWA/box1_archive_metadata.csv,Top/Mid\nIAWA/box2_archive_metadata.csv,Top\n",
    );
    h.put_file("IAWA/box1_archive_metadata.csv", "identifier,title\nitem1,One\nitem2,Two\n");
    h.put_file("IAWA/box2_archive_metadata.csv", "identifier,title\nitem3,Three\n");

    let report = h.orchestrator.ingest_file("IAWA/batch_index.csv").unwrap();
    assert_eq!(report.kind, FileKind::Index);
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.children.len(), 2);
    assert_eq!(report.entries[0].identifier, "Top_Mid");

    let top = h.collection("Top");
    let mid = h.collection("Top_Mid");
    assert_eq!(list(&mid, fields::ANCESTOR_PATH), vec![id_of(&top), id_of(&mid)]);
    for identifier in ["item1", "item2"] {
        let item = h.item(identifier);
        assert_eq!(text_field(&item, fields::COLLECTION), Some(id_of(&mid).as_str()));
        assert_eq!(list(&item, fields::ANCESTOR_PATH), list(&mid, fields::ANCESTOR_PATH));
    }
    assert_eq!(
        text_field(&h.item("item3"), fields::COLLECTION),
        Some(id_of(&top).as_str())
    );
    assert_eq!(h.collections().len(), 2);

    let map = h.orchestrator.maps().load_map(&id_of(&top)).unwrap().unwrap();
    assert_eq!(map.children.len(), 1);
    assert_eq!(map.children[0].name, "Mid");
}

#[test]
fn index_rows_for_one_leaf_keep_separate_result_logs() {
    let h = Harness::new(test_config());
    h.put_file(
        "IAWA/batch_index.csv",
        "file,path\nIAWA/box1_archive_metadata.csv,Top\nIAWA/box2_archive_metadata.csv,Top\n",
    );
    h.put_file("IAWA/box1_archive_metadata.csv", "identifier,title\nitem1,One\n");
    h.put_file("IAWA/box2_archive_metadata.csv", "identifier,title\nitem2,Two\n");

    let report = h.orchestrator.ingest_file("IAWA/batch_index.csv").unwrap();
    assert!(report.is_clean(), "{report:?}");
    let first = report.children[0].results_location.clone().unwrap();
    let second = report.children[1].results_location.clone().unwrap();
    assert_ne!(first, second);

    let files = files_under(&h.objects, "IAWA/Top/metadata_import_results/");
    assert!(files[&first].contains("item1"));
    assert!(files[&second].contains("item2"));
}

#[test]
fn index_without_path_column_is_rejected() {
    let h = Harness::new(test_config());
    h.put_file("IAWA/batch_index.csv", "file\nIAWA/a_archive_metadata.csv\n");
    let err = h.orchestrator.ingest_file("IAWA/batch_index.csv").unwrap_err();
    assert!(matches!(err, IngestError::SchemaMismatch { .. }));
}

#[test]
fn unknown_file_names_are_rejected() {
    let h = Harness::new(test_config());
    h.put_file("IAWA/notes.csv", "identifier,title\nx,y\n");
    let err = h.orchestrator.ingest_file("IAWA/notes.csv").unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFile(_)));
}

#[test]
fn unavailable_store_fails_preflight_and_alerts() {
    let obs = Arc::new(RecordingObserver::default());
    let h = Harness::new(test_config()).observed_by(obs.clone(), IngestSeverity::Critical);
    h.put_file(COLLECTIONS, "identifier,title\ncol1,Test\n");
    h.store.set_unavailable(true);

    let err = h.orchestrator.ingest_file(COLLECTIONS).unwrap_err();
    assert!(matches!(err, IngestError::Store(_)));
    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestSeverity::Critical]);
    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestSeverity::Critical]);
    assert!(obs.rows.lock().unwrap().is_empty());
}

#[test]
fn observer_sees_rows_and_finished_batches() {
    let obs = Arc::new(RecordingObserver::default());
    let h = Harness::new(Config {
        batch_policy: BatchPolicy::ContinueAndAccumulateErrors,
        ..test_config()
    })
    .observed_by(obs.clone(), IngestSeverity::Critical);
    h.put_file(COLLECTIONS, THREE_ROWS);

    h.orchestrator.ingest_file(COLLECTIONS).unwrap();
    let rows = obs.rows.lock().unwrap();
    assert_eq!(rows.iter().map(|e| e.succeeded).collect::<Vec<_>>(), vec![true, false, true]);
    let batches = obs.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, COLLECTIONS);
    assert_eq!(batches[0].1.created, 2);
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn schema_errors_do_not_alert_at_critical_threshold() {
    let obs = Arc::new(RecordingObserver::default());
    let h = Harness::new(test_config()).observed_by(obs.clone(), IngestSeverity::Critical);
    h.put_file(COLLECTIONS, "");

    let err = h.orchestrator.ingest_file(COLLECTIONS).unwrap_err();
    assert!(matches!(err, IngestError::SchemaMismatch { .. }));
    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn missing_input_object_is_critical() {
    let obs = Arc::new(RecordingObserver::default());
    let h = Harness::new(test_config()).observed_by(obs.clone(), IngestSeverity::Error);

    let _ = h.orchestrator.ingest_file(COLLECTIONS).unwrap_err();
    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestSeverity::Critical]);
}
