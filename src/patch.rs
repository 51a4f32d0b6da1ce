//! Structural diffs between game state snapshots.
//!
//! [`diff`] walks two [`Value`]s and produces the minimal ordered list of [`Patch`]es that turns
//! the older one into the newer one; [`apply`] mutates a target in place. Patches are the unit of
//! synchronization between the host and its clients.
//!
//! # Sequences
//!
//! Arrays are compared positionally: index `i` of the old array is diffed against index `i` of
//! the new one, and length changes show up as `add`/`remove` at the tail. There is no
//! longest-common-subsequence pass, so inserting at the front of an array rewrites every element.
//!
//! # Delivery
//!
//! Transports deliver at least once, so applying a patch that has already been applied is a
//! no-op. `add` and `replace` overwrite in place (they never insert), and removing an array index
//! truncates the array at that index, which makes tail removals idempotent in any order.
//!
//! # Example
//!
//! ```
//! use rampart::patch::{apply_all, diff};
//! use rampart::Value;
//!
//! let older: Value = serde_json::json!({"players": {"p1": {"x": 100}}}).into();
//! let newer: Value = serde_json::json!({"players": {"p1": {"x": 105}}}).into();
//!
//! let patches = diff(&older, &newer);
//! assert_eq!(patches.len(), 1);
//!
//! let mut state = older.clone();
//! apply_all(&mut state, &patches).unwrap();
//! assert_eq!(state, newer);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::{Map, Value};

/// One step of a path into a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position in an array.
    Index(usize),
    /// Field of an object.
    Key(String),
}

impl PathSegment {
    /// The array position this segment addresses, if any. Numeric keys count as indices.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(index) => Some(*index),
            PathSegment::Key(key) => key.parse().ok(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Ordered sequence of segments from the root of a state to the patched location.
pub type Path = SmallVec<[PathSegment; 4]>;

/// Kind of change a [`Patch`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// A location that did not exist now holds a value.
    Add,
    /// A location that existed now holds a different value.
    Replace,
    /// A location that existed is gone.
    Remove,
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// What kind of change this is.
    pub op: PatchOp,
    /// Where the change happens. Empty for the root.
    pub path: Path,
    /// The new value for `add`/`replace`. A missing value means "absent" and is applied as removal.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub value: Option<Value>,
}

// A present `"value": null` is a null value, not an absent one.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Patch {
    /// Creates an `add` patch.
    #[must_use]
    pub fn add(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a `replace` patch.
    #[must_use]
    pub fn replace(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a `remove` patch.
    #[must_use]
    pub fn remove(path: impl Into<Path>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    /// A patch that replaces the whole state. Used to bring a joining peer up to date.
    #[must_use]
    pub fn full_state(state: &Value) -> Self {
        Self::replace(Path::new(), snapshot(state))
    }
}

/// Builds a [`Path`] from anything that converts into segments.
///
/// ```
/// use rampart::patch::{path, PathSegment};
///
/// let p = path(["players", "p1", "x"]);
/// assert_eq!(p.len(), 3);
/// assert_eq!(p[0], PathSegment::Key("players".to_owned()));
/// ```
pub fn path<I, S>(segments: I) -> Path
where
    I: IntoIterator<Item = S>,
    S: Into<PathSegment>,
{
    segments.into_iter().map(Into::into).collect()
}

/// How far past the end of an array an `add`/`replace` may reach. The gap is filled with `null`.
pub const MAX_ARRAY_GAP: usize = 1024;

/// Why a patch could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatchError {
    /// The path runs through a primitive value, which cannot hold children.
    NotAContainer {
        /// Path up to (and including) the primitive.
        at: Path,
        /// Kind of the primitive that was found.
        found: &'static str,
    },
    /// A key segment addressed an array and is not a number.
    InvalidIndex {
        /// Path up to the array.
        at: Path,
        /// The offending key.
        key: String,
    },
    /// An index lies more than [`MAX_ARRAY_GAP`] past the end of the array.
    IndexOutOfRange {
        /// Path up to the array.
        at: Path,
        /// The requested index.
        index: usize,
        /// Length of the array.
        len: usize,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAContainer { at, found } => {
                write!(f, "cannot descend into {} at {}", found, DisplayPath(at))
            },
            Self::InvalidIndex { at, key } => {
                write!(
                    f,
                    "key '{}' does not index the array at {}",
                    key,
                    DisplayPath(at)
                )
            },
            Self::IndexOutOfRange { at, index, len } => {
                write!(
                    f,
                    "index {} is out of range for the array of length {} at {}",
                    index,
                    len,
                    DisplayPath(at)
                )
            },
        }
    }
}

impl std::error::Error for PatchError {}

/// Renders a path as `/players/p1/x`.
pub struct DisplayPath<'a>(pub &'a [PathSegment]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Structural deep copy of a state, taken before speculative application.
#[must_use]
pub fn snapshot(value: &Value) -> Value {
    value.clone()
}

/// Computes the patches that turn `older` into `newer`.
///
/// Identical values produce no patches. Objects and arrays are recursed into, so a change deep
/// inside a large structure produces a single `replace` at its exact path.
#[must_use]
pub fn diff(older: &Value, newer: &Value) -> Vec<Patch> {
    let mut out = Vec::new();
    let mut path = Path::new();
    diff_into(older, newer, &mut path, &mut out);
    out
}

fn diff_into(older: &Value, newer: &Value, path: &mut Path, out: &mut Vec<Patch>) {
    if older == newer {
        return;
    }
    match (older, newer) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            diff_objects(old_map, new_map, path, out);
        },
        (Value::Array(old_items), Value::Array(new_items)) => {
            let common = old_items.len().min(new_items.len());
            for index in 0..common {
                path.push(PathSegment::Index(index));
                diff_into(&old_items[index], &new_items[index], path, out);
                path.pop();
            }
            for (index, item) in new_items.iter().enumerate().skip(common) {
                let mut item_path = path.clone();
                item_path.push(PathSegment::Index(index));
                out.push(Patch::add(item_path, item.clone()));
            }
            // Highest index first so each removal is the current tail.
            for index in (common..old_items.len()).rev() {
                let mut item_path = path.clone();
                item_path.push(PathSegment::Index(index));
                out.push(Patch::remove(item_path));
            }
        },
        _ => out.push(Patch::replace(path.clone(), newer.clone())),
    }
}

fn diff_objects(old_map: &Map, new_map: &Map, path: &mut Path, out: &mut Vec<Patch>) {
    for (key, old_value) in old_map {
        path.push(PathSegment::Key(key.clone()));
        match new_map.get(key) {
            Some(new_value) => diff_into(old_value, new_value, path, out),
            None => out.push(Patch::remove(path.clone())),
        }
        path.pop();
    }
    for (key, new_value) in new_map {
        if !old_map.contains_key(key) {
            let mut field_path = path.clone();
            field_path.push(PathSegment::Key(key.clone()));
            out.push(Patch::add(field_path, new_value.clone()));
        }
    }
}

/// Applies one patch to `state` in place.
///
/// Missing intermediate containers are created: an object for a key segment, an array for an
/// index segment. Removing something that does not exist is a no-op.
pub fn apply(state: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    match (&patch.op, &patch.value) {
        (PatchOp::Add | PatchOp::Replace, Some(value)) => set(state, &patch.path, value),
        // A value-less add/replace carries "absent".
        (PatchOp::Add | PatchOp::Replace, None) | (PatchOp::Remove, _) => {
            remove(state, &patch.path)
        },
    }
}

/// Applies an ordered list of patches. Later patches win where paths overlap.
///
/// Stops at the first failing patch; the earlier ones stay applied. Callers that need
/// all-or-nothing semantics apply to a [`snapshot`] and swap it in on success.
pub fn apply_all(state: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply(state, patch)?;
    }
    Ok(())
}

fn set(state: &mut Value, path: &[PathSegment], value: &Value) -> Result<(), PatchError> {
    let Some((last, parents)) = path.split_last() else {
        *state = value.clone();
        return Ok(());
    };

    let mut current = state;
    for (depth, segment) in parents.iter().enumerate() {
        let next = path.get(depth + 1);
        current = child_or_create(current, segment, next, &path[..=depth])?;
    }

    match current {
        Value::Object(map) => {
            map.insert(object_key(last), value.clone());
            Ok(())
        },
        Value::Array(items) => {
            let index = array_index(last, parents)?;
            if index < items.len() {
                items[index] = value.clone();
            } else {
                grow_to(items, index, parents)?;
                items.push(value.clone());
            }
            Ok(())
        },
        other => Err(PatchError::NotAContainer {
            at: parents.iter().cloned().collect(),
            found: other.kind(),
        }),
    }
}

/// Descends one level, creating the child if it is missing (or `null`).
fn child_or_create<'v>(
    current: &'v mut Value,
    segment: &PathSegment,
    next: Option<&PathSegment>,
    at: &[PathSegment],
) -> Result<&'v mut Value, PatchError> {
    let fresh = || match next {
        Some(PathSegment::Index(_)) => Value::array(),
        _ => Value::object(),
    };
    match current {
        Value::Object(map) => {
            let child = map.entry(object_key(segment)).or_insert_with(fresh);
            if child.is_null() {
                *child = fresh();
            }
            Ok(child)
        },
        Value::Array(items) => {
            let parent = &at[..at.len() - 1];
            let index = array_index(segment, parent)?;
            if index >= items.len() {
                grow_to(items, index, parent)?;
                items.push(Value::Null);
            }
            let child = &mut items[index];
            if child.is_null() {
                *child = fresh();
            }
            Ok(child)
        },
        other => Err(PatchError::NotAContainer {
            at: at[..at.len() - 1].iter().cloned().collect(),
            found: other.kind(),
        }),
    }
}

/// Pads `items` with `null` up to `len`, refusing gaps wider than [`MAX_ARRAY_GAP`].
fn grow_to(items: &mut Vec<Value>, len: usize, at: &[PathSegment]) -> Result<(), PatchError> {
    let limit = items.len().saturating_add(MAX_ARRAY_GAP);
    if len > limit {
        return Err(PatchError::IndexOutOfRange {
            at: at.iter().cloned().collect(),
            index: len,
            len: items.len(),
        });
    }
    items.resize(len, Value::Null);
    Ok(())
}

fn remove(state: &mut Value, path: &[PathSegment]) -> Result<(), PatchError> {
    let Some((last, parents)) = path.split_last() else {
        *state = Value::Null;
        return Ok(());
    };

    let mut current = state;
    for segment in parents {
        let child = match current {
            Value::Object(map) => map.get_mut(&object_key(segment)),
            Value::Array(items) => match segment.as_index() {
                Some(index) => items.get_mut(index),
                None => None,
            },
            _ => None,
        };
        match child {
            Some(child) => current = child,
            // Nothing to remove below a missing parent.
            None => return Ok(()),
        }
    }

    match current {
        Value::Object(map) => {
            map.remove(&object_key(last));
        },
        Value::Array(items) => {
            if let Some(index) = last.as_index() {
                items.truncate(index);
            }
        },
        _ => {}
    }
    Ok(())
}

fn object_key(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(key) => key.clone(),
        PathSegment::Index(index) => index.to_string(),
    }
}

fn array_index(segment: &PathSegment, at: &[PathSegment]) -> Result<usize, PatchError> {
    segment.as_index().ok_or_else(|| PatchError::InvalidIndex {
        at: at.iter().cloned().collect(),
        key: segment.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    fn round_trip(older: &Value, newer: &Value) {
        let patches = diff(older, newer);
        let mut state = snapshot(older);
        apply_all(&mut state, &patches).unwrap();
        assert_eq!(&state, newer, "patches: {:?}", patches);
    }

    #[test]
    fn identical_values_produce_no_patches() {
        let state = v(json!({"a": [1, 2, {"b": null}]}));
        assert!(diff(&state, &state.clone()).is_empty());
    }

    #[test]
    fn move_scenario_produces_single_replace() {
        let older = v(json!({"players": {"p1": {"x": 100, "y": 7}}}));
        let newer = v(json!({"players": {"p1": {"x": 105, "y": 7}}}));
        let patches = diff(&older, &newer);
        assert_eq!(
            patches,
            vec![Patch::replace(path(["players", "p1", "x"]), 105)]
        );

        let json = serde_json::to_value(&patches).unwrap();
        assert_eq!(
            json,
            json!([{"op": "replace", "path": ["players", "p1", "x"], "value": 105}])
        );

        let mut client = v(json!({"players": {"p1": {"x": 100, "y": 7}}}));
        apply_all(&mut client, &patches).unwrap();
        assert_eq!(client.get_path(&path(["players", "p1", "x"])), Some(&Value::from(105)));
    }

    #[test]
    fn object_keys_yield_add_and_remove() {
        let older = v(json!({"keep": 1, "gone": 2}));
        let newer = v(json!({"keep": 1, "fresh": 3}));
        let patches = diff(&older, &newer);
        assert_eq!(
            patches,
            vec![
                Patch::remove(path(["gone"])),
                Patch::add(path(["fresh"]), 3),
            ]
        );
        round_trip(&older, &newer);
    }

    #[test]
    fn arrays_diff_positionally() {
        let older = v(json!({"xs": [1, 2, 3]}));
        let newer = v(json!({"xs": [1, 9, 3, 4]}));
        let patches = diff(&older, &newer);
        assert_eq!(
            patches,
            vec![
                Patch::replace(path([PathSegment::from("xs"), PathSegment::Index(1)]), 9),
                Patch::add(path([PathSegment::from("xs"), PathSegment::Index(3)]), 4),
            ]
        );
        round_trip(&older, &newer);
    }

    #[test]
    fn array_shrink_removes_from_the_tail_down() {
        let older = v(json!([1, 2, 3, 4, 5]));
        let newer = v(json!([1, 2, 3]));
        let patches = diff(&older, &newer);
        assert_eq!(
            patches,
            vec![
                Patch::remove(path([PathSegment::Index(4)])),
                Patch::remove(path([PathSegment::Index(3)])),
            ]
        );
        round_trip(&older, &newer);
    }

    #[test]
    fn type_change_replaces_whole_subtree() {
        let older = v(json!({"a": {"b": 1}}));
        let newer = v(json!({"a": [1]}));
        assert_eq!(diff(&older, &newer), vec![Patch::replace(path(["a"]), v(json!([1])))]);
        round_trip(&older, &newer);
    }

    #[test]
    fn root_type_change_replaces_root() {
        round_trip(&v(json!(1)), &v(json!({"a": 1})));
        round_trip(&v(json!({"a": 1})), &Value::Null);
    }

    #[test]
    fn apply_creates_missing_intermediate_containers() {
        let mut state = Value::object();
        apply(&mut state, &Patch::add(path(["players", "p2", "x"]), 5)).unwrap();
        assert_eq!(state, v(json!({"players": {"p2": {"x": 5}}})));

        let mut state = Value::object();
        let p = path([PathSegment::from("grid"), PathSegment::Index(2)]);
        apply(&mut state, &Patch::add(p, true)).unwrap();
        assert_eq!(state, v(json!({"grid": [null, null, true]})));
    }

    #[test]
    fn reapplying_patches_is_a_no_op() {
        let older = v(json!({"a": 1, "b": [1, 2, 3], "c": {"d": 4}}));
        let newer = v(json!({"a": 2, "b": [1], "e": "new"}));
        let patches = diff(&older, &newer);
        let mut state = snapshot(&older);
        apply_all(&mut state, &patches).unwrap();
        let once = snapshot(&state);
        apply_all(&mut state, &patches).unwrap();
        assert_eq!(state, once);
    }

    #[test]
    fn removing_missing_paths_is_a_no_op() {
        let mut state = v(json!({"a": 1}));
        apply(&mut state, &Patch::remove(path(["b", "c"]))).unwrap();
        apply(&mut state, &Patch::remove(path(["b"]))).unwrap();
        assert_eq!(state, v(json!({"a": 1})));
    }

    #[test]
    fn valueless_replace_acts_as_removal() {
        let mut state = v(json!({"a": 1, "b": 2}));
        let patch = Patch {
            op: PatchOp::Replace,
            path: path(["a"]),
            value: None,
        };
        apply(&mut state, &patch).unwrap();
        assert_eq!(state, v(json!({"b": 2})));
    }

    #[test]
    fn descending_through_a_primitive_fails() {
        let mut state = v(json!({"a": 1}));
        let err = apply(&mut state, &Patch::add(path(["a", "b"]), 2)).unwrap_err();
        assert!(matches!(err, PatchError::NotAContainer { found: "number", .. }));
        assert_eq!(err.to_string(), "cannot descend into number at /a");
    }

    #[test]
    fn non_numeric_key_on_array_fails() {
        let mut state = v(json!({"xs": [1]}));
        let err = apply(&mut state, &Patch::replace(path(["xs", "first"]), 2)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidIndex { .. }));
    }

    #[test]
    fn far_out_of_range_index_is_refused() {
        let mut state = v(json!({"xs": [1]}));
        let tail = path([PathSegment::from("xs"), PathSegment::Index(usize::MAX)]);
        let err = apply(&mut state, &Patch::add(tail, 2)).unwrap_err();
        assert_eq!(
            err,
            PatchError::IndexOutOfRange {
                at: path(["xs"]),
                index: usize::MAX,
                len: 1,
            }
        );

        let nested = path([
            PathSegment::from("xs"),
            PathSegment::Index(usize::MAX),
            PathSegment::from("a"),
        ]);
        let err = apply(&mut state, &Patch::add(nested, 2)).unwrap_err();
        assert!(matches!(err, PatchError::IndexOutOfRange { .. }));
        assert_eq!(state, v(json!({"xs": [1]})));
    }

    #[test]
    fn array_gap_is_bounded() {
        let mut state = Value::array();
        let edge = path([PathSegment::Index(MAX_ARRAY_GAP)]);
        apply(&mut state, &Patch::add(edge, true)).unwrap();
        assert_eq!(state.as_array().map(Vec::len), Some(MAX_ARRAY_GAP + 1));

        let mut state = Value::array();
        let beyond = path([PathSegment::Index(MAX_ARRAY_GAP + 1)]);
        let err = apply(&mut state, &Patch::add(beyond, true)).unwrap_err();
        assert!(err.to_string().starts_with("index 1025 is out of range"));
        assert_eq!(state, Value::array());
    }

    #[test]
    fn later_patch_wins_on_overlap() {
        let mut state = Value::object();
        apply_all(
            &mut state,
            &[
                Patch::add(path(["x"]), 1),
                Patch::replace(path(["x"]), 2),
            ],
        )
        .unwrap();
        assert_eq!(state, v(json!({"x": 2})));
    }

    #[test]
    fn patch_deserializes_from_wire_json() {
        let patch: Patch =
            serde_json::from_value(json!({"op": "add", "path": ["items", 0], "value": "sword"}))
                .unwrap();
        assert_eq!(patch.op, PatchOp::Add);
        assert_eq!(
            patch.path,
            path([PathSegment::from("items"), PathSegment::Index(0)])
        );
        let remove: Patch =
            serde_json::from_value(json!({"op": "remove", "path": ["items"]})).unwrap();
        assert_eq!(remove.value, None);
        let to_null: Patch =
            serde_json::from_value(json!({"op": "replace", "path": ["hp"], "value": null}))
                .unwrap();
        assert_eq!(to_null.value, Some(Value::Null));
    }
}
