//! Bucketed, length-partitioned multimap store
//!
//! A store is the file-set `<dir>/<stem>.<L>` for every length class L that
//! holds at least one key. All operations take batches: a mutation rewrites
//! each affected class file once, however many pairs it carries.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::search::SearchHit;
use crate::store::error::{StoreError, StoreResult};
use crate::store::file::ClassFile;
use crate::store::format::{
    bucket_of, class_path, display_key, length_class, pad_key, temp_path, trim_key,
    validate_key, Layout, BUCKET_COUNT, MAX_LENGTH_CLASS,
};
use crate::store::rewrite::{apply_splices, write_sorted, Prepared, Splice};

/// A stored key-value pair (key without padding)
pub type Pair = (Vec<u8>, Vec<u8>);

/// One fetch result row; `None` means the key has no value
pub type FetchRow = (Vec<u8>, Option<Vec<u8>>);

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// fsync rewritten files and their directory before returning
    pub sync_on_write: bool,
    /// Block cache size exponent; detected from the filesystem when `None`
    pub lb_block_size: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            lb_block_size: None,
        }
    }
}

impl StoreConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable fsync on write
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Fix the block cache size to `2^lb` bytes
    pub fn with_lb_block_size(mut self, lb: u32) -> Self {
        self.lb_block_size = Some(lb);
        self
    }
}

/// Requested keys grouped by class and bucket, as sorted padded keys
type KeyGroups = BTreeMap<u32, BTreeMap<u16, BTreeSet<Vec<u8>>>>;

/// A multimap file-set for one relation scope
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    stem: String,
    value_width: usize,
    config: StoreConfig,
}

impl Store {
    /// Store for the files `<dir>/<stem>.<L>` holding `value_width`-byte values
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, value_width: usize) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            value_width,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn value_width(&self) -> usize {
        self.value_width
    }

    /// Path of the file holding length class `class`
    pub fn class_path(&self, class: u32) -> PathBuf {
        class_path(&self.dir, &self.stem, class)
    }

    fn layout(&self, class: u32) -> Layout {
        Layout::new(class, self.value_width)
    }

    fn open_class(&self, class: u32) -> StoreResult<Option<ClassFile>> {
        ClassFile::open(
            &self.class_path(class),
            self.layout(class),
            self.config.lb_block_size,
        )
    }

    /// Length classes that currently have a file
    pub fn classes(&self) -> Vec<u32> {
        (0..=MAX_LENGTH_CLASS)
            .filter(|&class| self.class_path(class).exists())
            .collect()
    }

    /// Validate and pad pairs, grouped by length class
    fn prepare<K, V>(&self, pairs: &[(K, V)]) -> StoreResult<BTreeMap<u32, Vec<Prepared>>>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut classes: BTreeMap<u32, Vec<Prepared>> = BTreeMap::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            validate_key(key)?;
            if value.len() != self.value_width {
                return Err(StoreError::InvalidArgument(format!(
                    "value for key {:?} is {} bytes, store {} expects {}",
                    display_key(key),
                    value.len(),
                    self.stem,
                    self.value_width
                )));
            }
            classes
                .entry(length_class(key.len()))
                .or_default()
                .push(Prepared {
                    bucket: bucket_of(key),
                    key: pad_key(key),
                    value: value.to_vec(),
                });
        }
        Ok(classes)
    }

    /// Validate keys and group them by class and bucket
    ///
    /// Also returns the distinct keys in first-request order.
    fn group_keys<K: AsRef<[u8]>>(keys: &[K]) -> StoreResult<(Vec<Vec<u8>>, KeyGroups)> {
        let mut order = Vec::with_capacity(keys.len());
        let mut seen = HashSet::with_capacity(keys.len());
        let mut groups = KeyGroups::new();

        for key in keys {
            let key = key.as_ref();
            validate_key(key)?;
            if !seen.insert(key.to_vec()) {
                continue;
            }
            order.push(key.to_vec());
            groups
                .entry(length_class(key.len()))
                .or_default()
                .entry(bucket_of(key))
                .or_default()
                .insert(pad_key(key));
        }

        Ok((order, groups))
    }

    /// Build class files from scratch
    ///
    /// Any existing file of a class present in `pairs` is replaced. Identical
    /// pairs are stored once.
    pub fn make<K, V>(&self, pairs: &[(K, V)]) -> StoreResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        for (class, mut entries) in self.prepare(pairs)? {
            entries.sort();
            entries.dedup();
            write_sorted(
                &self.class_path(class),
                self.layout(class),
                &entries,
                self.config.sync_on_write,
            )?;
        }
        tracing::debug!(store = %self.stem, pairs = pairs.len(), "made store");
        Ok(())
    }

    /// Look up every value of each key
    ///
    /// Rows follow the first-request order of the keys; a key with several
    /// values yields one row per value, a key without values one `None` row.
    pub fn fetch<K: AsRef<[u8]>>(&self, keys: &[K]) -> StoreResult<Vec<FetchRow>> {
        let (order, groups) = Self::group_keys(keys)?;
        let mut found: HashMap<Vec<u8>, Vec<Vec<u8>>> = HashMap::new();

        for (class, buckets) in groups {
            let Some(mut file) = self.open_class(class)? else {
                continue;
            };

            for (bucket, needles) in buckets {
                let needles: Vec<Vec<u8>> = needles.into_iter().collect();
                for (i, outcome) in file.search_bucket(bucket, &needles)? {
                    if let SearchHit::Found(hit) = outcome {
                        let run = file.run_around(bucket, hit, &needles[i])?;
                        let values = file.values(run)?;
                        found.insert(trim_key(&needles[i]).to_vec(), values);
                    }
                }
            }
        }

        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            match found.remove(&key) {
                Some(values) => {
                    for value in values {
                        rows.push((key.clone(), Some(value)));
                    }
                }
                None => rows.push((key, None)),
            }
        }

        tracing::trace!(store = %self.stem, rows = rows.len(), "fetched");
        Ok(rows)
    }

    /// Add pairs, never storing an identical (key, value) pair twice
    pub fn insert<K, V>(&self, pairs: &[(K, V)]) -> StoreResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        for (class, mut entries) in self.prepare(pairs)? {
            entries.sort();
            entries.dedup();

            let path = self.class_path(class);
            let Some(mut file) = self.open_class(class)? else {
                write_sorted(&path, self.layout(class), &entries, self.config.sync_on_write)?;
                continue;
            };

            let mut splices = Vec::new();
            for bucket_entries in entries.chunk_by(|a, b| a.bucket == b.bucket) {
                let bucket = bucket_entries[0].bucket;
                let per_key: Vec<&[Prepared]> =
                    bucket_entries.chunk_by(|a, b| a.key == b.key).collect();
                let needles: Vec<Vec<u8>> = per_key.iter().map(|g| g[0].key.clone()).collect();

                for (i, outcome) in file.search_bucket(bucket, &needles)? {
                    let key = &needles[i];
                    match outcome {
                        SearchHit::Found(hit) => {
                            let run = file.run_around(bucket, hit, key)?;
                            let existing = file.values(run.clone())?;
                            for e in per_key[i] {
                                if existing.contains(&e.value) {
                                    continue;
                                }
                                let at = run.start + existing.iter().filter(|v| **v < e.value).count();
                                splices.push(Splice::insert(
                                    at,
                                    bucket,
                                    vec![(key.clone(), e.value.clone())],
                                ));
                            }
                        }
                        SearchHit::Missing(at) => {
                            let new = per_key[i]
                                .iter()
                                .map(|e| (key.clone(), e.value.clone()))
                                .collect();
                            splices.push(Splice::insert(at, bucket, new));
                        }
                    }
                }
            }

            if splices.is_empty() {
                tracing::debug!(path = %path.display(), "insert: all pairs already present");
                continue;
            }

            let index = file.index().clone();
            drop(file);
            apply_splices(&path, self.layout(class), &index, splices, self.config.sync_on_write)?;
        }
        Ok(())
    }

    /// Replace every value of each key with the given one
    ///
    /// When a batch names a key more than once the last pair wins.
    pub fn override_values<K, V>(&self, pairs: &[(K, V)]) -> StoreResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        for (class, entries) in self.prepare(pairs)? {
            let mut latest: BTreeMap<(u16, Vec<u8>), Vec<u8>> = BTreeMap::new();
            for e in entries {
                latest.insert((e.bucket, e.key), e.value);
            }
            let entries: Vec<Prepared> = latest
                .into_iter()
                .map(|((bucket, key), value)| Prepared { bucket, key, value })
                .collect();

            let path = self.class_path(class);
            let Some(mut file) = self.open_class(class)? else {
                write_sorted(&path, self.layout(class), &entries, self.config.sync_on_write)?;
                continue;
            };

            let mut splices = Vec::new();
            for bucket_entries in entries.chunk_by(|a, b| a.bucket == b.bucket) {
                let bucket = bucket_entries[0].bucket;
                let needles: Vec<Vec<u8>> = bucket_entries.iter().map(|e| e.key.clone()).collect();

                for (i, outcome) in file.search_bucket(bucket, &needles)? {
                    let e = &bucket_entries[i];
                    match outcome {
                        SearchHit::Found(hit) => {
                            let run = file.run_around(bucket, hit, &e.key)?;
                            if run.len() == 1 && file.values(run.clone())?[0] == e.value {
                                continue;
                            }
                            splices.push(Splice::replace(
                                run.start,
                                run.len(),
                                bucket,
                                vec![(e.key.clone(), e.value.clone())],
                            ));
                        }
                        SearchHit::Missing(at) => {
                            splices.push(Splice::insert(
                                at,
                                bucket,
                                vec![(e.key.clone(), e.value.clone())],
                            ));
                        }
                    }
                }
            }

            if splices.is_empty() {
                continue;
            }

            let index = file.index().clone();
            drop(file);
            apply_splices(&path, self.layout(class), &index, splices, self.config.sync_on_write)?;
        }
        Ok(())
    }

    /// Delete every value of each key
    ///
    /// Returns the keys that had no value, in first-request order.
    pub fn remove<K: AsRef<[u8]>>(&self, keys: &[K]) -> StoreResult<Vec<Vec<u8>>> {
        let (order, groups) = Self::group_keys(keys)?;
        let mut removed: HashSet<Vec<u8>> = HashSet::new();

        for (class, buckets) in groups {
            let path = self.class_path(class);
            let Some(mut file) = self.open_class(class)? else {
                continue;
            };

            let mut splices = Vec::new();
            for (bucket, needles) in buckets {
                let needles: Vec<Vec<u8>> = needles.into_iter().collect();
                for (i, outcome) in file.search_bucket(bucket, &needles)? {
                    if let SearchHit::Found(hit) = outcome {
                        let run = file.run_around(bucket, hit, &needles[i])?;
                        splices.push(Splice::replace(run.start, run.len(), bucket, Vec::new()));
                        removed.insert(trim_key(&needles[i]).to_vec());
                    }
                }
            }

            if splices.is_empty() {
                continue;
            }

            let index = file.index().clone();
            drop(file);
            apply_splices(&path, self.layout(class), &index, splices, self.config.sync_on_write)?;
        }

        let not_found: Vec<Vec<u8>> = order
            .into_iter()
            .filter(|key| !removed.contains(key))
            .collect();
        tracing::debug!(
            store = %self.stem,
            removed = removed.len(),
            not_found = not_found.len(),
            "removed keys"
        );
        Ok(not_found)
    }

    /// Every stored pair, in on-disk order (class, then bucket, then key)
    pub fn list(&self) -> StoreResult<Vec<Pair>> {
        let mut pairs = Vec::new();

        for class in 0..=MAX_LENGTH_CLASS {
            let Some(mut file) = self.open_class(class)? else {
                continue;
            };
            pairs.reserve(file.index().total() as usize);

            for bucket in 0..BUCKET_COUNT {
                let bucket = bucket as u16;
                for i in file.index().bucket_range(bucket) {
                    let (padded, value) = file.entry_at(i)?;
                    let key = trim_key(&padded);
                    if key.is_empty() || bucket_of(key) != bucket {
                        return Err(StoreError::corrupt(
                            file.path(),
                            format!(
                                "entry {} with key {:?} stored in bucket {:#06x}",
                                i,
                                display_key(key),
                                bucket
                            ),
                        ));
                    }
                    pairs.push((key.to_vec(), value));
                }
            }
        }

        Ok(pairs)
    }

    /// Number of stored pairs
    pub fn len(&self) -> StoreResult<u64> {
        let mut total = 0;
        for class in 0..=MAX_LENGTH_CLASS {
            if let Some(file) = self.open_class(class)? {
                total += file.index().total();
            }
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite every class file in canonical order
    ///
    /// Drops exact duplicate pairs and fails with `Corrupt` on entries stored
    /// outside their bucket.
    pub fn rebuild(&self) -> StoreResult<()> {
        let pairs = self.list()?;
        self.make(&pairs)?;
        tracing::info!(store = %self.stem, pairs = pairs.len(), "rebuilt store");
        Ok(())
    }

    /// Delete every class file of this store
    pub fn destroy(&self) -> StoreResult<()> {
        let mut deleted = 0;
        for class in 0..=MAX_LENGTH_CLASS {
            let path = self.class_path(class);
            for p in [temp_path(&path), path] {
                match std::fs::remove_file(&p) {
                    Ok(()) => deleted += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tracing::info!(store = %self.stem, files = deleted, "destroyed store");
        Ok(())
    }
}
