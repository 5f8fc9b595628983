//! Dot-path access and deep merge over preference trees
//!
//! Preference trees are plain `serde_json::Value`s. Paths are dotted
//! (`"appearance.theme"`); the empty path addresses the root.
//!
//! Deep merge semantics:
//! - Objects are merged key-wise, recursively
//! - Any other patch value (scalar or array) overwrites the target leaf
//! - `null` deletes the field

use serde_json::{Map, Value};

use crate::prelude::*;
use prefhub_types::utils::split_path;

/// Split and check a dotted path
pub fn parse_path(path: &str) -> ClResult<Vec<&str>> {
	split_path(path).ok_or_else(|| Error::InvalidArgument(format!("malformed path '{}'", path)))
}

/// Resolve a path against a tree
pub fn get_path<'a>(root: &'a Value, path: &str) -> ClResult<Option<&'a Value>> {
	let mut current = root;
	for part in parse_path(path)? {
		match current.as_object().and_then(|obj| obj.get(part)) {
			Some(next) => current = next,
			None => return Ok(None),
		}
	}
	Ok(Some(current))
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Setting `null` removes the field. Returns the previous value.
///
/// # Errors
/// `InvalidArgument` for the root path, a malformed path, or when an
/// intermediate field exists but is not an object.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> ClResult<Option<Value>> {
	let parts = parse_path(path)?;
	let Some((last, parents)) = parts.split_last() else {
		return Err(Error::InvalidArgument("cannot set the root of a preference tree".into()));
	};
	if value.is_null() {
		return remove_path(root, path);
	}

	if !root.is_object() {
		*root = Value::Object(Map::new());
	}
	let mut current = root;
	for &part in parents {
		let Some(obj) = current.as_object_mut() else {
			return Err(not_an_object(path, part));
		};
		current = obj.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
		if !current.is_object() {
			return Err(not_an_object(path, part));
		}
	}

	match current.as_object_mut() {
		Some(obj) => Ok(obj.insert((*last).to_string(), value)),
		None => Err(not_an_object(path, last)),
	}
}

/// Remove the value at `path`, returns it if it existed
pub fn remove_path(root: &mut Value, path: &str) -> ClResult<Option<Value>> {
	let parts = parse_path(path)?;
	let Some((last, parents)) = parts.split_last() else {
		return Err(Error::InvalidArgument("cannot remove the root of a preference tree".into()));
	};

	let mut current = root;
	for part in parents {
		match current.as_object_mut().and_then(|obj| obj.get_mut(*part)) {
			Some(next) => current = next,
			None => return Ok(None),
		}
	}
	Ok(current.as_object_mut().and_then(|obj| obj.shift_remove(*last)))
}

fn not_an_object(path: &str, part: &str) -> Error {
	Error::InvalidArgument(format!("cannot set '{}': field '{}' is not an object", path, part))
}

/// Deep merge `patch` into `target`
pub fn deep_merge(target: &mut Value, patch: &Value) {
	match (target.as_object_mut(), patch) {
		(Some(target_obj), Value::Object(patch_obj)) => merge_objects_deep(target_obj, patch_obj),
		_ => *target = patch.clone(),
	}
}

fn merge_objects_deep(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
	for (key, patch_value) in patch {
		match patch_value {
			Value::Null => {
				target.shift_remove(key);
			}
			Value::Object(_) => match target.get_mut(key) {
				Some(existing) if existing.is_object() => deep_merge(existing, patch_value),
				_ => {
					target.insert(key.clone(), strip_nulls(patch_value));
				}
			},
			_ => {
				target.insert(key.clone(), patch_value.clone());
			}
		}
	}
}

/// Copy a value dropping `null` object members (deletes of absent fields)
fn strip_nulls(value: &Value) -> Value {
	match value {
		Value::Object(obj) => Value::Object(
			obj.iter()
				.filter(|(_, v)| !v.is_null())
				.map(|(k, v)| (k.clone(), strip_nulls(v)))
				.collect(),
		),
		other => other.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_get_path() {
		let tree = json!({ "appearance": { "theme": "dark" }, "n": 1 });
		assert_eq!(get_path(&tree, "appearance.theme").unwrap(), Some(&json!("dark")));
		assert_eq!(get_path(&tree, "appearance.missing").unwrap(), None);
		assert_eq!(get_path(&tree, "n.deeper").unwrap(), None);
		assert_eq!(get_path(&tree, "").unwrap(), Some(&tree));
		assert!(get_path(&tree, "a..b").is_err());
	}

	#[test]
	fn test_set_path_creates_intermediates() {
		let mut tree = json!({});
		let old = set_path(&mut tree, "conversion.image.quality", json!(80)).unwrap();
		assert_eq!(old, None);
		assert_eq!(tree, json!({ "conversion": { "image": { "quality": 80 } } }));

		let old = set_path(&mut tree, "conversion.image.quality", json!(90)).unwrap();
		assert_eq!(old, Some(json!(80)));
	}

	#[test]
	fn test_set_path_through_scalar_fails() {
		let mut tree = json!({ "general": "oops" });
		let res = set_path(&mut tree, "general.language", json!("en"));
		assert!(matches!(res, Err(Error::InvalidArgument(_))));
		assert_eq!(tree, json!({ "general": "oops" }));
	}

	#[test]
	fn test_set_null_removes() {
		let mut tree = json!({ "a": { "b": 1, "c": 2 } });
		let old = set_path(&mut tree, "a.b", Value::Null).unwrap();
		assert_eq!(old, Some(json!(1)));
		assert_eq!(tree, json!({ "a": { "c": 2 } }));
		assert!(set_path(&mut tree, "", json!(1)).is_err());
	}

	#[test]
	fn test_deep_merge_objects_key_wise() {
		let mut target = json!({
			"appearance": { "theme": "light", "fontSize": 14 },
			"general": { "language": "en" }
		});
		let patch = json!({
			"appearance": { "theme": "dark" },
			"privacy": { "telemetry": false }
		});
		deep_merge(&mut target, &patch);
		assert_eq!(
			target,
			json!({
				"appearance": { "theme": "dark", "fontSize": 14 },
				"general": { "language": "en" },
				"privacy": { "telemetry": false }
			})
		);
	}

	#[test]
	fn test_deep_merge_leaves_and_nulls() {
		let mut target = json!({ "a": { "list": [1, 2], "gone": true }, "b": { "x": 1 } });
		let patch = json!({ "a": { "list": [3], "gone": null }, "b": 5, "c": { "n": null, "m": 1 } });
		deep_merge(&mut target, &patch);
		assert_eq!(target, json!({ "a": { "list": [3] }, "b": 5, "c": { "m": 1 } }));
	}
}

// vim: ts=4
