//! Frequency counts of one flattened attribute across a store

use crate::store::MetadataStore;
use serde_json::Value;
use std::collections::HashMap;

/// Display key for an attribute value; strings are used unquoted
fn bucket_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Count how often each value of `attribute` occurs.
///
/// Entries without the attribute are ignored. With `proportional` the counts
/// are divided by the number of entries that have the attribute. Buckets are
/// ordered by count, most frequent first unless `ascending`; ties are broken
/// by key so the order is stable.
pub fn attribute_frequency(
    store: &MetadataStore,
    attribute: &str,
    proportional: bool,
    ascending: bool,
) -> Vec<(String, f64)> {
    let values = store.attribute_values(attribute);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values.values() {
        *counts.entry(bucket_key(value)).or_default() += 1;
    }

    let total = values.len();
    let mut buckets: Vec<(String, f64)> = counts
        .into_iter()
        .map(|(key, count)| {
            let weight = if proportional {
                count as f64 / total as f64
            } else {
                count as f64
            };
            (key, weight)
        })
        .collect();

    buckets.sort_by(|a, b| {
        let by_weight = a.1.total_cmp(&b.1);
        let by_weight = if ascending { by_weight } else { by_weight.reverse() };
        by_weight.then_with(|| a.0.cmp(&b.0))
    });
    buckets
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MetadataStore {
        let mut store = MetadataStore::empty("unused.json");
        store.merge_page(vec![
            json!({"_id": "1", "preset": {"short_name": "A6"}}),
            json!({"_id": "2", "preset": {"short_name": "A6"}}),
            json!({"_id": "3", "preset": {"short_name": "C1"}}),
            json!({"_id": "4", "preset": {"short_name": "HB2"}}),
            json!({"_id": "5", "preset": {"short_name": "A6"}}),
            json!({"_id": "6"}),
        ]);
        store
    }

    #[test]
    fn test_counts_descending() {
        let hist = attribute_frequency(&store(), "preset", false, false);
        assert_eq!(
            hist,
            vec![
                ("A6".to_string(), 3.0),
                ("C1".to_string(), 1.0),
                ("HB2".to_string(), 1.0),
            ]
        );
    }

    #[test]
    fn test_proportional_ascending() {
        let hist = attribute_frequency(&store(), "preset", true, true);
        assert_eq!(hist.len(), 3);
        assert_eq!(hist[0], ("C1".to_string(), 0.2));
        assert_eq!(hist[2], ("A6".to_string(), 0.6));
        let sum: f64 = hist.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_attribute_is_empty() {
        assert!(attribute_frequency(&store(), "nope", false, false).is_empty());
    }
}
