//! Reshaping fetch rows into one-to-many tables

use std::collections::BTreeMap;

/// Group `(key, value)` rows into `key -> values`
///
/// `on_absent` runs once for every row without a value and may record the
/// key in the table or ignore it.
pub fn tablise<K, V, I, F>(rows: I, mut on_absent: F) -> BTreeMap<K, Vec<V>>
where
    K: Ord,
    I: IntoIterator<Item = (K, Option<V>)>,
    F: FnMut(K, &mut BTreeMap<K, Vec<V>>),
{
    let mut table: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for (key, value) in rows {
        match value {
            Some(value) => table.entry(key).or_default().push(value),
            None => on_absent(key, &mut table),
        }
    }
    table
}

/// Invert `(key, value)` rows into `value -> keys`
///
/// `on_absent` runs once for every row without a value.
pub fn transpose<K, V, I, F>(rows: I, mut on_absent: F) -> BTreeMap<V, Vec<K>>
where
    V: Ord,
    I: IntoIterator<Item = (K, Option<V>)>,
    F: FnMut(K, &mut BTreeMap<V, Vec<K>>),
{
    let mut table: BTreeMap<V, Vec<K>> = BTreeMap::new();
    for (key, value) in rows {
        match value {
            Some(value) => table.entry(value).or_default().push(key),
            None => on_absent(key, &mut table),
        }
    }
    table
}

/// `on_absent` callback that drops keys without values
pub fn skip_absent<K, T>(_key: K, _table: &mut T) {}

/// `on_absent` callback for [`tablise`] that records an empty value list
pub fn record_absent<K: Ord, V>(key: K, table: &mut BTreeMap<K, Vec<V>>) {
    table.entry(key).or_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<(&'static str, Option<u32>)> {
        vec![
            ("git", Some(1)),
            ("vim", None),
            ("git", Some(2)),
            ("zsh", Some(1)),
        ]
    }

    #[test]
    fn test_tablise() {
        let table = tablise(rows(), skip_absent);
        assert_eq!(table.len(), 2);
        assert_eq!(table["git"], vec![1, 2]);
        assert_eq!(table["zsh"], vec![1]);

        let table = tablise(rows(), record_absent);
        assert_eq!(table["vim"], Vec::<u32>::new());
    }

    #[test]
    fn test_transpose() {
        let mut missing = Vec::new();
        let table = transpose(rows(), |key, _| missing.push(key));
        assert_eq!(table[&1], vec!["git", "zsh"]);
        assert_eq!(table[&2], vec!["git"]);
        assert_eq!(missing, vec!["vim"]);
    }
}
