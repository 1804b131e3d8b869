//! Typed relations over stores

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::relation::kind::{Kind, Value};
use crate::store::{length_class, Store, StoreConfig, StoreError, StoreResult};

/// File name prefix of the private variant
pub const PRIVATE_PREFIX: &str = "priv_";

/// One concrete file-set of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Public,
    Private,
}

impl Variant {
    pub fn prefix(self) -> &'static str {
        match self {
            Variant::Public => "",
            Variant::Private => PRIVATE_PREFIX,
        }
    }
}

/// Which variants a query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Public,
    Private,
    Both,
}

impl Scope {
    pub fn variants(self) -> &'static [Variant] {
        match self {
            Scope::Public => &[Variant::Public],
            Scope::Private => &[Variant::Private],
            Scope::Both => &[Variant::Public, Variant::Private],
        }
    }
}

impl From<Variant> for Scope {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Public => Scope::Public,
            Variant::Private => Scope::Private,
        }
    }
}

/// A decoded fetch row; `None` means the key has no value
pub type ValueRow = (Vec<u8>, Option<Value>);

/// A key-kind to value-kind relation stored under one directory
///
/// Holds no open files: every call opens the stores it needs.
#[derive(Debug, Clone)]
pub struct Relation {
    dir: PathBuf,
    key: Kind,
    value: Kind,
    config: StoreConfig,
}

impl Relation {
    pub fn new(dir: impl Into<PathBuf>, key: Kind, value: Kind) -> Self {
        Self {
            dir: dir.into(),
            key,
            value,
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

    pub fn key_kind(&self) -> &Kind {
        &self.key
    }

    pub fn value_kind(&self) -> &Kind {
        &self.value
    }

    /// `<keykind>_<valuekind>`
    pub fn name(&self) -> String {
        format!("{}_{}", self.key.name, self.value.name)
    }

    /// `[priv_]<keykind>_<valuekind>`
    pub fn file_stem(&self, variant: Variant) -> String {
        format!("{}{}", variant.prefix(), self.name())
    }

    /// The store backing one variant
    pub fn open(&self, variant: Variant) -> Store {
        Store::new(&self.dir, self.file_stem(variant), self.value.width)
            .with_config(self.config.clone())
    }

    fn check_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> StoreResult<()> {
        keys.iter().try_for_each(|key| self.key.check_key(key.as_ref()))
    }

    fn encode_pairs<K: AsRef<[u8]>>(&self, pairs: &[(K, Value)]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        pairs
            .iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                self.key.check_key(key)?;
                Ok((key.to_vec(), self.value.encode(value)?))
            })
            .collect()
    }

    /// Decode a value read from `store`; undecodable bytes mean a damaged file
    fn decode_stored(&self, store: &Store, key: &[u8], bytes: &[u8]) -> StoreResult<Value> {
        self.value.decode(bytes).map_err(|e| match e {
            StoreError::InvalidArgument(reason) => {
                StoreError::corrupt(store.class_path(length_class(key.len())), reason)
            }
            other => other,
        })
    }

    /// Fetch and decode every value of each key
    ///
    /// With [`Scope::Both`] the values of both variants are merged; a key is
    /// `None` only when neither variant has a value for it.
    pub fn fetch<K: AsRef<[u8]>>(&self, keys: &[K], scope: Scope) -> StoreResult<Vec<ValueRow>> {
        self.check_keys(keys)?;
        let mut order: Vec<Vec<u8>> = Vec::new();
        let mut merged: HashMap<Vec<u8>, Vec<Value>> = HashMap::new();

        for &variant in scope.variants() {
            let store = self.open(variant);
            for (key, value) in store.fetch(keys)? {
                let values = merged.entry(key.clone()).or_insert_with_key(|key| {
                    order.push(key.clone());
                    Vec::new()
                });
                if let Some(bytes) = value {
                    let value = self.decode_stored(&store, &key, &bytes)?;
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
        }

        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            match merged.remove(&key) {
                Some(values) if !values.is_empty() => {
                    rows.extend(values.into_iter().map(|v| (key.clone(), Some(v))));
                }
                _ => rows.push((key, None)),
            }
        }
        Ok(rows)
    }

    /// Add pairs to one variant (set semantics per pair)
    pub fn insert<K: AsRef<[u8]>>(&self, pairs: &[(K, Value)], variant: Variant) -> StoreResult<()> {
        let encoded = self.encode_pairs(pairs)?;
        self.open(variant).insert(&encoded)
    }

    /// Replace all values of each key in one variant
    pub fn override_values<K: AsRef<[u8]>>(
        &self,
        pairs: &[(K, Value)],
        variant: Variant,
    ) -> StoreResult<()> {
        let encoded = self.encode_pairs(pairs)?;
        self.open(variant).override_values(&encoded)
    }

    /// Remove every value of each key in one variant; returns keys not found
    pub fn remove<K: AsRef<[u8]>>(&self, keys: &[K], variant: Variant) -> StoreResult<Vec<Vec<u8>>> {
        self.check_keys(keys)?;
        self.open(variant).remove(keys)
    }

    /// Every pair of the selected variants, decoded
    pub fn list(&self, scope: Scope) -> StoreResult<Vec<(Vec<u8>, Value)>> {
        let mut pairs = Vec::new();
        for &variant in scope.variants() {
            let store = self.open(variant);
            for (key, bytes) in store.list()? {
                let value = self.decode_stored(&store, &key, &bytes)?;
                pairs.push((key, value));
            }
        }
        Ok(pairs)
    }

    pub fn rebuild(&self, variant: Variant) -> StoreResult<()> {
        self.open(variant).rebuild()
    }

    pub fn destroy(&self, variant: Variant) -> StoreResult<()> {
        self.open(variant).destroy()
    }
}
