//! Multi-hop lookups across relations
//!
//! Each hop fetches the keys still alive in one batch, decodes the values and
//! turns them into the keys of the next relation. A branch that finds nothing,
//! or whose key the next relation's key kind rejects, is dropped at that hop
//! and never reaches later relations.

use std::collections::{HashMap, HashSet};

use crate::relation::kind::Value;
use crate::relation::relation::{Relation, Scope, ValueRow};
use crate::store::{StoreError, StoreResult};

/// Chain lookups through `relations`, starting from `inputs`
///
/// Returns one row per (input, final value); an input that reaches no final
/// value is reported once as `None`. Rows follow the first-request order of
/// the inputs.
pub fn joined_fetch<K: AsRef<[u8]>>(
    inputs: &[K],
    relations: &[&Relation],
    scope: Scope,
) -> StoreResult<Vec<ValueRow>> {
    if relations.is_empty() {
        return Err(StoreError::InvalidArgument(
            "joined fetch needs at least one relation".to_string(),
        ));
    }

    let mut order: Vec<Vec<u8>> = Vec::new();
    let mut seen_inputs = HashSet::new();
    for input in inputs {
        let input = input.as_ref();
        if seen_inputs.insert(input.to_vec()) {
            order.push(input.to_vec());
        }
    }

    // (input index, key for the current hop)
    let mut frontier: Vec<(usize, Vec<u8>)> = order.iter().cloned().enumerate().collect();
    let mut results: Vec<Vec<Value>> = vec![Vec::new(); order.len()];

    for (hop, relation) in relations.iter().enumerate() {
        let last = hop + 1 == relations.len();

        // A key this relation cannot hold has no match here
        frontier.retain(|(_, key)| relation.key_kind().check_key(key).is_ok());

        let mut keys: Vec<Vec<u8>> = Vec::new();
        let mut seen_keys = HashSet::new();
        for (_, key) in &frontier {
            if seen_keys.insert(key.clone()) {
                keys.push(key.clone());
            }
        }
        if keys.is_empty() {
            break;
        }

        let mut values: HashMap<Vec<u8>, Vec<Value>> = HashMap::new();
        for (key, value) in relation.fetch(&keys, scope)? {
            if let Some(value) = value {
                values.entry(key).or_default().push(value);
            }
        }

        tracing::debug!(
            hop,
            relation = %relation.name(),
            keys = keys.len(),
            matched = values.len(),
            "join hop"
        );

        let mut next = Vec::new();
        let mut seen_next = HashSet::new();
        for (input, key) in frontier {
            let Some(found) = values.get(&key) else {
                continue;
            };
            for value in found {
                if last {
                    if !results[input].contains(value) {
                        results[input].push(value.clone());
                    }
                    continue;
                }
                let next_key = value.to_key();
                if seen_next.insert((input, next_key.clone())) {
                    next.push((input, next_key));
                }
            }
        }
        frontier = next;
    }

    let mut rows = Vec::with_capacity(order.len());
    for (input, key) in order.into_iter().enumerate() {
        let found = std::mem::take(&mut results[input]);
        if found.is_empty() {
            rows.push((key, None));
        } else {
            rows.extend(found.into_iter().map(|v| (key.clone(), Some(v))));
        }
    }
    Ok(rows)
}
