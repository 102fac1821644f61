//! Durability tests for the file-backed store.
//!
//! These tests verify that:
//! - Saved experiments survive reopening the store
//! - Corrupted records are reported, not silently returned
//! - A second open of the same directory is refused

#![cfg(feature = "persistent")]

use std::fs;

use serde_json::json;
use tempfile::tempdir;

use idmtools::storage::persistent::{open_context, FileStoreConfig};
use idmtools::storage::{StorageError, EXPERIMENTS_NAMESPACE};
use idmtools::{CommandTask, Entity, Experiment, IdmError, Tags};

#[test]
fn test_experiment_survives_reopen() {
    let dir = tempdir().unwrap();
    let experiment = Experiment::from_task("durable", CommandTask::from_command("run").unwrap())
        .with_tags(Tags::from([("round".to_string(), json!(2))]));

    let id = {
        let ctx = open_context(dir.path(), None).unwrap();
        ctx.experiments().save(&experiment).unwrap()
    };

    let ctx = open_context(dir.path(), None).unwrap();
    let back = ctx.experiments().retrieve(id).unwrap().unwrap();
    assert_eq!(back, experiment);
    assert_eq!(back.uid().unwrap(), id);
    assert_eq!(ctx.experiments().ids().unwrap(), vec![id]);
}

#[test]
fn test_corrupted_record_is_reported() {
    let dir = tempdir().unwrap();
    let ctx = open_context(dir.path(), None).unwrap();
    let id = ctx.experiments().save(&Experiment::new("fragile")).unwrap();

    let path = dir
        .path()
        .join(EXPERIMENTS_NAMESPACE)
        .join(format!("{id}.rec"));
    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = ctx.experiments().retrieve(id).unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));
}

#[test]
fn test_truncated_record_is_reported() {
    let dir = tempdir().unwrap();
    let ctx = open_context(dir.path(), None).unwrap();
    let id = ctx.experiments().save(&Experiment::new("short")).unwrap();

    let path = dir
        .path()
        .join(EXPERIMENTS_NAMESPACE)
        .join(format!("{id}.rec"));
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    assert!(ctx.experiments().retrieve(id).is_err());
}

#[test]
fn test_store_is_exclusive() {
    let dir = tempdir().unwrap();
    let _ctx = open_context(dir.path(), None).unwrap();
    let err = open_context(dir.path(), None).unwrap_err();
    match err {
        StorageError::Locked(message) => {
            assert!(message.contains(&format!("pid {}", std::process::id())));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_custom_lock_file_name() {
    let dir = tempdir().unwrap();
    let config = FileStoreConfig {
        lock_file_name: ".idmtools.lock".to_string(),
        ..FileStoreConfig::default()
    };
    {
        let ctx = open_context(dir.path(), Some(config.clone())).unwrap();
        ctx.experiments().save(&Experiment::new("locked")).unwrap();
        assert!(dir.path().join(".idmtools.lock").exists());
        assert!(!dir.path().join(".lock").exists());
        assert!(open_context(dir.path(), Some(config.clone())).is_err());
    }
    let ctx = open_context(dir.path(), Some(config)).unwrap();
    assert_eq!(ctx.experiments().len().unwrap(), 1);
}

#[test]
fn test_oversized_record_rejected() {
    let dir = tempdir().unwrap();
    let config = FileStoreConfig {
        max_record_size: 1024,
        sync_on_write: false,
        ..FileStoreConfig::default()
    };
    let ctx = open_context(dir.path(), Some(config)).unwrap();
    let big = Experiment::new("x".repeat(4096));

    let err = ctx.experiments().save(&big).unwrap_err();
    assert!(matches!(
        err,
        IdmError::Storage(StorageError::RecordTooLarge { .. })
    ));
    assert!(ctx.experiments().is_empty().unwrap());
}

#[test]
fn test_clear_removes_records() {
    let dir = tempdir().unwrap();
    let ctx = open_context(dir.path(), None).unwrap();
    ctx.experiments().save(&Experiment::new("a")).unwrap();
    ctx.experiments().save(&Experiment::new("b")).unwrap();
    ctx.clear().unwrap();
    assert_eq!(ctx.experiments().len().unwrap(), 0);
}
