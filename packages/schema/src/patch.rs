//! # Patches
//!
//! Structural change records over the JSON form of the editor state.
//!
//! A [`Patch`] is `{op, path, value?}` where `path` is a list of object keys
//! and array indices. [`diff`] derives a forward/inverse pair from two
//! values, [`apply_patches`] replays either side.
//!
//! For transport a patch path converts to a JSON pointer (RFC 6901):
//! `~` is written as `~0` and `/` as `~1`.

use crate::{Result, SchemaError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Replace,
    Remove,
    Add,
}

/// One step of a patch path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment::Key(key.into())
    }

    /// Segment as an object key. Indices are rendered in decimal.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathSegment::Key(key) => Cow::Borrowed(key),
            PathSegment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Segment as an array index. Keys are accepted when they spell one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(index) => Some(*index),
            PathSegment::Key(key) if is_canonical_index(key) => key.parse().ok(),
            PathSegment::Key(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<PathSegment>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub value: Option<Value>,
}

// `"value": null` must stay distinguishable from an absent value.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Patch {
    pub fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    pub fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<PathSegment>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    /// First path segment when it is an object key
    pub fn root_key(&self) -> Option<&str> {
        match self.path.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    pub fn to_json_patch(&self) -> JsonPatch {
        JsonPatch {
            op: self.op,
            path: to_pointer(&self.path),
            value: self.value.clone(),
        }
    }

    pub fn from_json_patch(patch: &JsonPatch) -> Result<Self> {
        Ok(Self {
            op: patch.op,
            path: parse_pointer(&patch.path)?,
            value: patch.value.clone(),
        })
    }
}

/// Transport form of a [`Patch`] with a JSON-pointer path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatch {
    pub op: PatchOp,
    pub path: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub value: Option<Value>,
}

pub fn to_json_patches(patches: &[Patch]) -> Vec<JsonPatch> {
    patches.iter().map(Patch::to_json_patch).collect()
}

pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Render a path as an RFC 6901 JSON pointer. The empty path is the whole
/// document (`""`); `"/"` addresses the key `""` at the root.
pub fn to_pointer(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| format!("/{}", escape_segment(&segment.as_key())))
        .collect()
}

pub fn parse_pointer(pointer: &str) -> Result<Vec<PathSegment>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(SchemaError::Patch {
            path: pointer.to_string(),
            reason: "JSON pointer must start with '/'".to_string(),
        });
    };
    Ok(rest
        .split('/')
        .map(|raw| {
            let segment = unescape_segment(raw);
            match segment.parse::<usize>() {
                Ok(index) if is_canonical_index(&segment) => PathSegment::Index(index),
                _ => PathSegment::Key(segment),
            }
        })
        .collect())
}

fn is_canonical_index(segment: &str) -> bool {
    !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'))
}

/// Compute the patches turning `before` into `after`, and the inverse
/// patches turning `after` back into `before`.
pub fn diff(before: &Value, after: &Value) -> (Vec<Patch>, Vec<Patch>) {
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    diff_into(&mut Vec::new(), before, after, &mut forward, &mut inverse);
    inverse.reverse();
    (forward, inverse)
}

fn diff_into(
    path: &mut Vec<PathSegment>,
    before: &Value,
    after: &Value,
    forward: &mut Vec<Patch>,
    inverse: &mut Vec<Patch>,
) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                path.push(PathSegment::Key(key.clone()));
                match new.get(key) {
                    Some(new_value) => diff_into(path, old_value, new_value, forward, inverse),
                    None => {
                        forward.push(Patch::remove(path.clone()));
                        inverse.push(Patch::add(path.clone(), old_value.clone()));
                    }
                }
                path.pop();
            }
            for (key, new_value) in new {
                if old.contains_key(key) {
                    continue;
                }
                path.push(PathSegment::Key(key.clone()));
                forward.push(Patch::add(path.clone(), new_value.clone()));
                inverse.push(Patch::remove(path.clone()));
                path.pop();
            }
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => {
            for (index, (old_value, new_value)) in old.iter().zip(new).enumerate() {
                path.push(PathSegment::Index(index));
                diff_into(path, old_value, new_value, forward, inverse);
                path.pop();
            }
        }
        _ => {
            forward.push(Patch::replace(path.clone(), after.clone()));
            inverse.push(Patch::replace(path.clone(), before.clone()));
        }
    }
}

pub fn apply_patches(target: &mut Value, patches: &[Patch]) -> Result<()> {
    for patch in patches {
        apply_patch(target, patch)?;
    }
    Ok(())
}

pub fn apply_patch(target: &mut Value, patch: &Patch) -> Result<()> {
    let Some((last, parents)) = patch.path.split_last() else {
        return match patch.op {
            PatchOp::Replace | PatchOp::Add => {
                *target = value_of(patch)?;
                Ok(())
            }
            PatchOp::Remove => Err(SchemaError::patch(&patch.path, "cannot remove the root")),
        };
    };

    let mut cursor = target;
    for (depth, segment) in parents.iter().enumerate() {
        cursor = child_mut(cursor, segment)
            .ok_or_else(|| SchemaError::patch(&patch.path[..=depth], "path does not exist"))?;
    }

    match cursor {
        Value::Object(map) => match patch.op {
            PatchOp::Replace | PatchOp::Add => {
                map.insert(last.as_key().into_owned(), value_of(patch)?);
                Ok(())
            }
            PatchOp::Remove => map
                .remove(last.as_key().as_ref())
                .map(|_| ())
                .ok_or_else(|| SchemaError::patch(&patch.path, "key does not exist")),
        },
        Value::Array(items) => {
            let index = last
                .as_index()
                .ok_or_else(|| SchemaError::patch(&patch.path, "expected an array index"))?;
            match patch.op {
                PatchOp::Replace => {
                    let value = value_of(patch)?;
                    let slot = items
                        .get_mut(index)
                        .ok_or_else(|| SchemaError::patch(&patch.path, "index out of bounds"))?;
                    *slot = value;
                }
                PatchOp::Add => {
                    if index > items.len() {
                        return Err(SchemaError::patch(&patch.path, "index out of bounds"));
                    }
                    items.insert(index, value_of(patch)?);
                }
                PatchOp::Remove => {
                    if index >= items.len() {
                        return Err(SchemaError::patch(&patch.path, "index out of bounds"));
                    }
                    items.remove(index);
                }
            }
            Ok(())
        }
        _ => Err(SchemaError::patch(&patch.path, "parent is not a container")),
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment.as_key().as_ref()),
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

fn value_of(patch: &Patch) -> Result<Value> {
    patch
        .value
        .clone()
        .ok_or_else(|| SchemaError::patch(&patch.path, "missing value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<PathSegment> {
        segments.iter().map(|s| PathSegment::from(*s)).collect()
    }

    #[test]
    fn test_diff_and_inverse_restore() {
        let before = json!({
            "selection": ["a"],
            "document": {"nodes": {"a": {"left": 0, "name": "A"}}},
            "hovered": null
        });
        let after = json!({
            "selection": ["a", "b"],
            "document": {"nodes": {"a": {"left": 10, "name": "A"}, "b": {"left": 5}}},
            "hovered": "b"
        });

        let (forward, inverse) = diff(&before, &after);

        let mut value = before.clone();
        apply_patches(&mut value, &forward).unwrap();
        assert_eq!(value, after);

        apply_patches(&mut value, &inverse).unwrap();
        assert_eq!(value, before);
    }

    #[test]
    fn test_equal_values_produce_no_patches() {
        let value = json!({"a": [1, 2, {"b": true}]});
        let (forward, inverse) = diff(&value, &value);
        assert!(forward.is_empty());
        assert!(inverse.is_empty());
    }

    #[test]
    fn test_array_length_change_is_a_replace() {
        let (forward, _) = diff(&json!({"s": [1]}), &json!({"s": [1, 2]}));
        assert_eq!(forward, vec![Patch::replace(path(&["s"]), json!([1, 2]))]);
    }

    #[test]
    fn test_key_segment_indexes_arrays() {
        let mut value = json!({"children": ["a", "b", "c"]});
        let patch = Patch::replace(path(&["children", "1"]), json!("x"));
        apply_patch(&mut value, &patch).unwrap();
        assert_eq!(value, json!({"children": ["a", "x", "c"]}));
    }

    #[test]
    fn test_index_segment_on_object() {
        let mut value = json!({"3": "old"});
        apply_patch(&mut value, &Patch::replace(vec![PathSegment::Index(3)], json!("new"))).unwrap();
        assert_eq!(value, json!({"3": "new"}));
    }

    #[test]
    fn test_missing_parent_fails() {
        let mut value = json!({"document": {}});
        let err = apply_patch(&mut value, &Patch::remove(path(&["document", "nodes", "a"])))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Patch { ref path, .. } if path == "/document/nodes"));
    }

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(escape_segment("a/b~c"), "a~1b~0c");
        assert_eq!(unescape_segment("a~1b~0c"), "a/b~c");
        assert_eq!(unescape_segment("~01"), "~1");

        let segments = vec![
            PathSegment::key("nodes"),
            PathSegment::key("frame/1"),
            PathSegment::Index(2),
        ];
        let pointer = to_pointer(&segments);
        assert_eq!(pointer, "/nodes/frame~11/2");
        assert_eq!(parse_pointer(&pointer).unwrap(), segments);
        assert_eq!(to_pointer(&[]), "");

        let tricky = vec![PathSegment::key("a~b"), PathSegment::key("c/d")];
        assert_eq!(to_pointer(&tricky), "/a~0b/c~1d");
        assert_eq!(parse_pointer("/a~0b/c~1d").unwrap(), tricky);
    }

    #[test]
    fn test_root_pointer_differs_from_empty_key() {
        assert_eq!(to_pointer(&[]), "");
        assert_eq!(parse_pointer("").unwrap(), Vec::<PathSegment>::new());

        let empty_key = vec![PathSegment::key("")];
        assert_eq!(to_pointer(&empty_key), "/");
        assert_eq!(parse_pointer("/").unwrap(), empty_key);
    }

    #[test]
    fn test_pointer_numeric_segments() {
        let parsed = parse_pointer("/children/0/007/12").unwrap();
        assert_eq!(
            parsed,
            vec![
                PathSegment::key("children"),
                PathSegment::Index(0),
                PathSegment::key("007"),
                PathSegment::Index(12),
            ]
        );
        assert!(parse_pointer("children").is_err());
    }

    #[test]
    fn test_null_value_is_kept() {
        let patch: Patch =
            serde_json::from_value(json!({"op": "replace", "path": ["hovered"], "value": null}))
                .unwrap();
        assert_eq!(patch.value, Some(Value::Null));

        let removal: Patch =
            serde_json::from_value(json!({"op": "remove", "path": ["nodes", 0]})).unwrap();
        assert_eq!(removal.value, None);
        assert_eq!(removal.path[1], PathSegment::Index(0));
    }

    #[test]
    fn test_json_patch_round_trip() {
        let patch = Patch::replace(path(&["document", "nodes", "a/b", "name"]), json!("n"));
        let wire = patch.to_json_patch();
        assert_eq!(wire.path, "/document/nodes/a~1b/name");
        assert_eq!(Patch::from_json_patch(&wire).unwrap(), patch);
    }
}
