//! Integration tests for the async package database

use std::path::PathBuf;

use pkgdb::db::{DbConfig, DbError, PackageDb, RelationId};
use pkgdb::relation::{Scope, Value, Variant};
use pkgdb::store::StoreError;

fn test_dir(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("pkgdb_db_test_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&path);
    path
}

fn cleanup_dir(path: &PathBuf) {
    let _ = std::fs::remove_dir_all(path);
}

async fn open_db(dir: &PathBuf) -> PackageDb {
    PackageDb::open(DbConfig::new(dir).with_sync_on_write(false).with_lb_block_size(12))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_and_query_package() {
    let dir = test_dir("register");
    let db = open_db(&dir).await;

    db.insert(RelationId::NameId, &[("git", Value::Integer(1))], Variant::Public)
        .await
        .unwrap();
    db.insert(RelationId::IdName, &[("1", Value::from("git"))], Variant::Public)
        .await
        .unwrap();
    db.insert(
        RelationId::FileId,
        &[
            ("usr/bin/git", Value::Integer(1)),
            ("usr/libexec/git-core/git-add", Value::Integer(1)),
        ],
        Variant::Public,
    )
    .await
    .unwrap();

    let owners = db
        .joined_fetch(
            &["usr/bin/git", "usr/bin/hg"],
            &[RelationId::FileId, RelationId::IdName],
            Scope::Both,
        )
        .await
        .unwrap();
    assert_eq!(
        owners,
        vec![
            (b"usr/bin/git".to_vec(), Some(Value::from("git"))),
            (b"usr/bin/hg".to_vec(), None),
        ]
    );

    db.override_values(RelationId::NameId, &[("git", Value::Integer(5))], Variant::Public)
        .await
        .unwrap();
    assert_eq!(
        db.fetch(RelationId::NameId, &["git"], Scope::Public).await.unwrap(),
        vec![(b"git".to_vec(), Some(Value::Integer(5)))]
    );

    let not_found = db
        .remove(RelationId::FileId, &["usr/bin/git", "usr/bin/hg"], Variant::Public)
        .await
        .unwrap();
    assert_eq!(not_found, vec![b"usr/bin/hg".to_vec()]);
    assert_eq!(db.list(RelationId::FileId, Scope::Both).await.unwrap().len(), 1);

    cleanup_dir(&dir);
}

#[tokio::test]
async fn test_concurrent_writers_are_serialized() {
    let dir = test_dir("concurrent");
    let db = open_db(&dir).await;

    let mut handles = Vec::new();
    for task in 0..8u64 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let pairs: Vec<(String, Value)> = (0..50u64)
                .map(|i| (format!("pkg-{}-{}", task, i), Value::Integer(task * 100 + i)))
                .collect();
            db.insert(RelationId::NameId, &pairs, Variant::Public).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listed = db.list(RelationId::NameId, Scope::Public).await.unwrap();
    assert_eq!(listed.len(), 400);

    cleanup_dir(&dir);
}

#[tokio::test]
async fn test_rebuild_and_destroy() {
    let dir = test_dir("rebuild_destroy");
    let db = open_db(&dir).await;

    db.insert(
        RelationId::IdDep,
        &[("1", Value::Integer(2)), ("1", Value::Integer(3))],
        Variant::Private,
    )
    .await
    .unwrap();
    let before = db.list(RelationId::IdDep, Scope::Private).await.unwrap();

    db.rebuild(RelationId::IdDep, Variant::Private).await.unwrap();
    assert_eq!(db.list(RelationId::IdDep, Scope::Private).await.unwrap(), before);

    db.destroy(RelationId::IdDep, Variant::Private).await.unwrap();
    assert!(db.list(RelationId::IdDep, Scope::Both).await.unwrap().is_empty());

    cleanup_dir(&dir);
}

#[tokio::test]
async fn test_invalid_value_is_reported() {
    let dir = test_dir("invalid");
    let db = open_db(&dir).await;

    let result = db
        .insert(RelationId::NameId, &[("git", Value::from("not an id"))], Variant::Public)
        .await;
    assert!(matches!(
        result,
        Err(DbError::Store(StoreError::InvalidArgument(_)))
    ));

    cleanup_dir(&dir);
}
