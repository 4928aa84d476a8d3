//! Structural utilities over [`serde_json::Value`].
//!
//! Node and connection payloads are free-form JSON. These helpers give the
//! rest of the engine one implementation of dotted-path access and recursive
//! merging instead of ad-hoc traversal at each call site.
//!
//! Paths are dot separated; numeric segments index into arrays
//! (`"branches.0.label"`).

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by [`set_path`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path was empty.
    #[error("empty path")]
    Empty,
    /// An intermediate segment resolved to a scalar.
    #[error("segment '{segment}' of '{path}' does not refer to an object or array")]
    NotAContainer {
        /// The full path.
        path: String,
        /// The offending segment.
        segment: String,
    },
    /// An array index was out of bounds or not numeric.
    #[error("segment '{segment}' of '{path}' is not a valid array index")]
    BadIndex {
        /// The full path.
        path: String,
        /// The offending segment.
        segment: String,
    },
}

/// Resolves a dotted path inside `value`.
///
/// An empty path returns `value` itself.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Writes `new_value` at a dotted path, creating intermediate objects as needed.
///
/// Array segments must address an existing index or the position right after
/// the last element (append).
///
/// # Errors
///
/// Returns a [`PathError`] if the path is empty, traverses a scalar, or uses an
/// invalid array index.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(value, &segments, path, new_value)
}

fn set_segments(
    current: &mut Value,
    segments: &[&str],
    path: &str,
    new_value: Value,
) -> Result<(), PathError> {
    let Some((segment, rest)) = segments.split_first() else {
        *current = new_value;
        return Ok(());
    };
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            let child = map.entry((*segment).to_owned()).or_insert(Value::Null);
            set_segments(child, rest, path, new_value)
        }
        Value::Array(items) => {
            let Some(index) = segment.parse::<usize>().ok().filter(|i| *i <= items.len()) else {
                return Err(PathError::BadIndex {
                    path: path.to_owned(),
                    segment: (*segment).to_owned(),
                });
            };
            if index == items.len() {
                items.push(Value::Null);
            }
            set_segments(&mut items[index], rest, path, new_value)
        }
        _ => Err(PathError::NotAContainer {
            path: path.to_owned(),
            segment: (*segment).to_owned(),
        }),
    }
}

/// Recursively merges `patch` into `target`.
///
/// Objects merge key by key; every other combination replaces the target
/// value. A `null` in the patch removes the key from an object target.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => merge_maps(existing, incoming),
        (slot, incoming) => *slot = incoming,
    }
}

/// Map flavour of [`deep_merge`], used for node/connection `data` maps.
pub fn merge_maps(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, incoming) in patch {
        if incoming.is_null() {
            target.remove(&key);
            continue;
        }
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, incoming),
            None => {
                target.insert(key, incoming);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_walks_objects_and_arrays() {
        let value = json!({ "a": { "b": [ { "c": 1 }, { "c": 2 } ] } });
        assert_eq!(get_path(&value, "a.b.1.c"), Some(&json!(2)));
        assert_eq!(get_path(&value, "a.x"), None);
        assert_eq!(get_path(&value, "a.b.9"), None);
        assert_eq!(get_path(&value, ""), Some(&value));
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut value = json!({});
        set_path(&mut value, "config.retry.count", json!(3)).unwrap();
        assert_eq!(value, json!({ "config": { "retry": { "count": 3 } } }));
    }

    #[test]
    fn set_path_appends_to_arrays() {
        let mut value = json!({ "tags": ["a"] });
        set_path(&mut value, "tags.1", json!("b")).unwrap();
        assert_eq!(value, json!({ "tags": ["a", "b"] }));
        let err = set_path(&mut value, "tags.5", json!("z")).unwrap_err();
        assert!(matches!(err, PathError::BadIndex { .. }));
    }

    #[test]
    fn set_path_rejects_scalars_and_empty_paths() {
        let mut value = json!({ "a": 1 });
        assert!(matches!(
            set_path(&mut value, "a.b", json!(2)),
            Err(PathError::NotAContainer { .. })
        ));
        assert_eq!(set_path(&mut value, "", json!(2)), Err(PathError::Empty));
    }

    #[test]
    fn deep_merge_merges_nested_objects_and_removes_nulls() {
        let mut target = json!({ "a": { "x": 1, "y": 2 }, "keep": true, "drop": 1 });
        deep_merge(
            &mut target,
            json!({ "a": { "y": 3, "z": 4 }, "drop": null, "list": [1] }),
        );
        assert_eq!(
            target,
            json!({ "a": { "x": 1, "y": 3, "z": 4 }, "keep": true, "list": [1] })
        );
    }
}
