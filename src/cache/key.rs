//! Canonical cache keys.
//!
//! A key is the JSON serialization of the request parameters sorted by name,
//! so two requests with the same parameters always collide no matter the
//! order the parameters were supplied in.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Build the canonical key for a set of named parameters.
///
/// If a name repeats, the last value wins.
pub fn cache_key<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let sorted: BTreeMap<String, Value> = params
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect();

    // Insertion follows the sorted order, so the object serializes sorted
    // whether or not serde_json preserves insertion order.
    let object: Map<String, Value> = sorted.into_iter().collect();
    Value::Object(object).to_string()
}
