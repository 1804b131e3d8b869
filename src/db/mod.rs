//! Async package database
//!
//! Wraps the synchronous relation layer for use from a tokio runtime. Every
//! call runs on the blocking pool; writes are serialized by one coarse lock
//! since the store itself has no internal locking.

pub mod catalog;
pub mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

pub use catalog::RelationId;
pub use error::{DbError, DbResult};

use crate::relation::{joined_fetch, Relation, Scope, Value, ValueRow, Variant};
use crate::store::{StoreConfig, StoreResult};

/// Package database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Data directory
    pub dir: PathBuf,
    /// fsync every rewrite
    pub sync_on_write: bool,
    /// Block cache size exponent, detected when `None`
    pub lb_block_size: Option<u32>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            sync_on_write: true,
            lb_block_size: None,
        }
    }
}

impl DbConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    pub fn with_lb_block_size(mut self, lb: u32) -> Self {
        self.lb_block_size = Some(lb);
        self
    }

    fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new().with_sync_on_write(self.sync_on_write);
        match self.lb_block_size {
            Some(lb) => config.with_lb_block_size(lb),
            None => config,
        }
    }
}

fn owned_keys<K: AsRef<[u8]>>(keys: &[K]) -> Vec<Vec<u8>> {
    keys.iter().map(|k| k.as_ref().to_vec()).collect()
}

fn owned_pairs<K: AsRef<[u8]>>(pairs: &[(K, Value)]) -> Vec<(Vec<u8>, Value)> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_ref().to_vec(), v.clone()))
        .collect()
}

/// Package database over the standard catalog
#[derive(Clone)]
pub struct PackageDb {
    dir: PathBuf,
    store_config: StoreConfig,
    /// Held for the duration of every write
    write_lock: Arc<Mutex<()>>,
}

impl PackageDb {
    /// Open the database, creating its directory if needed
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        let dir = config.dir.clone();
        tokio::task::spawn_blocking(move || std::fs::create_dir_all(dir))
            .await?
            .map_err(crate::store::StoreError::from)?;

        tracing::info!(dir = %config.dir.display(), "opened package database");

        Ok(Self {
            store_config: config.store_config(),
            dir: config.dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The relation behind a catalog id
    pub fn relation(&self, id: RelationId) -> Relation {
        id.relation(&self.dir, &self.store_config)
    }

    async fn read<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        Ok(tokio::task::spawn_blocking(f).await??)
    }

    async fn write<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        let lock = self.write_lock.clone();
        self.read(move || {
            let _guard = lock.lock();
            f()
        })
        .await
    }

    pub async fn fetch<K: AsRef<[u8]>>(
        &self,
        id: RelationId,
        keys: &[K],
        scope: Scope,
    ) -> DbResult<Vec<ValueRow>> {
        let relation = self.relation(id);
        let keys = owned_keys(keys);
        self.read(move || relation.fetch(&keys, scope)).await
    }

    pub async fn list(&self, id: RelationId, scope: Scope) -> DbResult<Vec<(Vec<u8>, Value)>> {
        let relation = self.relation(id);
        self.read(move || relation.list(scope)).await
    }

    /// Chain lookups through the given relations
    pub async fn joined_fetch<K: AsRef<[u8]>>(
        &self,
        inputs: &[K],
        ids: &[RelationId],
        scope: Scope,
    ) -> DbResult<Vec<ValueRow>> {
        let relations: Vec<Relation> = ids.iter().map(|&id| self.relation(id)).collect();
        let inputs = owned_keys(inputs);
        self.read(move || {
            let refs: Vec<&Relation> = relations.iter().collect();
            joined_fetch(&inputs, &refs, scope)
        })
        .await
    }

    pub async fn insert<K: AsRef<[u8]>>(
        &self,
        id: RelationId,
        pairs: &[(K, Value)],
        variant: Variant,
    ) -> DbResult<()> {
        let relation = self.relation(id);
        let pairs = owned_pairs(pairs);
        self.write(move || relation.insert(&pairs, variant)).await
    }

    pub async fn override_values<K: AsRef<[u8]>>(
        &self,
        id: RelationId,
        pairs: &[(K, Value)],
        variant: Variant,
    ) -> DbResult<()> {
        let relation = self.relation(id);
        let pairs = owned_pairs(pairs);
        self.write(move || relation.override_values(&pairs, variant))
            .await
    }

    /// Returns the keys that had no value
    pub async fn remove<K: AsRef<[u8]>>(
        &self,
        id: RelationId,
        keys: &[K],
        variant: Variant,
    ) -> DbResult<Vec<Vec<u8>>> {
        let relation = self.relation(id);
        let keys = owned_keys(keys);
        self.write(move || relation.remove(&keys, variant)).await
    }

    pub async fn rebuild(&self, id: RelationId, variant: Variant) -> DbResult<()> {
        let relation = self.relation(id);
        self.write(move || relation.rebuild(variant)).await
    }

    pub async fn destroy(&self, id: RelationId, variant: Variant) -> DbResult<()> {
        let relation = self.relation(id);
        self.write(move || relation.destroy(variant)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("db");

        let db = PackageDb::open(DbConfig::new(&dir).with_sync_on_write(false))
            .await
            .unwrap();
        assert!(dir.is_dir());
        assert_eq!(db.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let db = PackageDb::open(DbConfig::new(tmp.path()).with_sync_on_write(false))
            .await
            .unwrap();

        db.insert(RelationId::NameId, &[("git", Value::Integer(7))], Variant::Public)
            .await
            .unwrap();
        let rows = db
            .fetch(RelationId::NameId, &["git"], Scope::Public)
            .await
            .unwrap();
        assert_eq!(rows, vec![(b"git".to_vec(), Some(Value::Integer(7)))]);
    }
}
