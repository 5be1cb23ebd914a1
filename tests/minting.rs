mod common;

use std::collections::HashSet;
use std::sync::Arc;

use archive_ingest::config::Config;
use archive_ingest::error::MintingError;
use archive_ingest::minting::{parse_mint_message, LocalNoidService, DRY_RUN_SHORT_ID};
use archive_ingest::types::RecordType;

use common::*;

#[test]
fn minted_ids_are_unique_and_registered() {
    let (config, store, minter, _) = registry_parts(test_config(), Arc::new(LocalNoidService));
    let mut seen = HashSet::new();
    for n in 0..200 {
        let short_id = minter.mint().unwrap();
        assert_eq!(short_id.len(), 8);
        minter
            .register_minted(&short_id, RecordType::Item, &format!("item{n}"))
            .unwrap();
        assert!(seen.insert(short_id));
    }
    assert_eq!(store.len(&config.tables.short_id), 200);
    assert_eq!(minter.registered_count(), 200);
}

#[test]
fn colliding_candidates_are_retried() {
    let (_, _, minter, _) = registry_parts(
        test_config(),
        Arc::new(SequenceMinting::new(&["aaaa1111", "aaaa1111", "bbbb2222"])),
    );
    let first = minter.mint().unwrap();
    minter.register_minted(&first, RecordType::Collection, "c1").unwrap();

    assert_eq!(minter.mint().unwrap(), "bbbb2222");
}

#[test]
fn minting_gives_up_after_max_attempts() {
    let (_, _, minter, _) = registry_parts(
        Config {
            max_mint_attempts: 2,
            ..test_config()
        },
        Arc::new(SequenceMinting::new(&["x1", "x1", "x1", "y1"])),
    );
    minter.register_minted(&minter.mint().unwrap(), RecordType::Item, "i1").unwrap();

    assert!(matches!(minter.mint(), Err(MintingError::Exhausted { attempts: 2 })));
}

#[test]
fn second_registration_of_an_id_collides() {
    let (_, _, minter, _) = registry_parts(test_config(), Arc::new(LocalNoidService));
    minter.register_minted("ab12cd34", RecordType::Item, "i1").unwrap();
    assert!(matches!(
        minter.register_minted("ab12cd34", RecordType::Item, "i2"),
        Err(MintingError::Collision(id)) if id == "ab12cd34"
    ));
}

#[test]
fn release_removes_the_mapping() {
    let (config, store, minter, _) = registry_parts(test_config(), Arc::new(LocalNoidService));
    minter.register_minted("ab12cd34", RecordType::Item, "i1").unwrap();
    minter.release("ab12cd34").unwrap();
    assert!(store.is_empty(&config.tables.short_id));
    assert_eq!(minter.released_count(), 1);
}

#[test]
fn dry_run_mints_the_placeholder_and_writes_nothing() {
    let (config, store, minter, _) = registry_parts(
        Config {
            dry_run: true,
            ..test_config()
        },
        Arc::new(SequenceMinting::new(&[])),
    );
    let short_id = minter.mint().unwrap();
    assert_eq!(short_id, DRY_RUN_SHORT_ID);
    let record = minter.register_minted(&short_id, RecordType::Item, "i1").unwrap();
    assert_eq!(record.short_url, "https://n2t.example.org/ark:/53696/12345678");
    assert!(store.is_empty(&config.tables.short_id));
}

#[test]
fn urls_follow_the_configured_namespace() {
    let (_, _, minter, _) = registry_parts(test_config(), Arc::new(LocalNoidService));
    assert_eq!(minter.short_key("ab12cd34"), "ark:/53696/ab12cd34");
    assert_eq!(
        minter.long_url(RecordType::Collection, "ab12cd34"),
        "https://example.org/collection/ab12cd34"
    );
    assert_eq!(minter.short_url("ab12cd34"), "https://n2t.example.org/ark:/53696/ab12cd34");
}

#[test]
fn mint_messages_are_parsed() {
    assert_eq!(parse_mint_message("New NOID: f0a1b2c3 is created.").unwrap(), "f0a1b2c3");
    assert!(matches!(
        parse_mint_message("quota exceeded"),
        Err(MintingError::InvalidResponse(_))
    ));
}
