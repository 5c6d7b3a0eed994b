// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::Serialize;
use blake3::hash as blake3_hash;
use serde_json::Value;

/// Compute a stable hash for any serializable object. Object keys are
/// sorted first so logically equal documents hash the same.
pub fn compute_object_hash<T>(object: &T) -> Result<String, serde_json::Error>
where
    T: Serialize,
{
    let value = serde_json::to_value(object)?;
    let hash = blake3_hash(serde_json::to_string(&sort_json(value))?.as_bytes());

    Ok(hash.to_hex().to_string())
}

/// Recursively sort JSON objects
pub fn sort_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_json(v))).collect())
        },
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json).collect()),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(compute_object_hash(&a).unwrap(), compute_object_hash(&b).unwrap());
    }

    #[test]
    fn hash_distinguishes_array_order() {
        let a = json!({"items": [1, 2]});
        let b = json!({"items": [2, 1]});
        assert_ne!(compute_object_hash(&a).unwrap(), compute_object_hash(&b).unwrap());
    }
}
