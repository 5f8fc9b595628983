//! Schema validation and sanitization
//!
//! The validator walks the schema tree depth-first, mirrored against the input
//! tree. For every node the checks run in a fixed order (presence, type, enum,
//! range/length/pattern/array size, children, custom rule) and the first
//! failing check ends that node. Sibling nodes are always checked, so errors
//! accumulate across the tree.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

use crate::merge::{get_path, parse_path};
use crate::prelude::*;
use crate::schema::{SchemaNode, ValidationContext, ValueKind};
use prefhub_types::validation::{ValidationCode, ValidationIssue};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
	pub valid: bool,
	pub errors: Vec<ValidationIssue>,
	pub warnings: Vec<ValidationIssue>,
	/// Input coerced to conform to the schema
	pub sanitized: Value,
}

impl ValidationResult {
	/// Convert a failed result into an error carrying its issues
	pub fn into_result(self) -> ClResult<Value> {
		if self.valid { Ok(self.sanitized) } else { Err(Error::ValidationFailed(self.errors)) }
	}
}

fn child_path(parent: &str, name: &str) -> String {
	if parent.is_empty() { name.to_string() } else { format!("{}.{}", parent, name) }
}

fn item_path(parent: &str, index: usize) -> String {
	format!("{}[{}]", parent, index)
}

fn is_present(value: Option<&Value>) -> bool {
	value.is_some_and(|v| !v.is_null())
}

/// Collects issues during one validation pass
struct Walk<'a> {
	root: &'a Value,
	strict: bool,
	errors: Vec<ValidationIssue>,
	warnings: Vec<ValidationIssue>,
}

impl Walk<'_> {
	fn check(&mut self, node: &SchemaNode, value: Option<&Value>, path: &str) {
		let Some(value) = value.filter(|v| !v.is_null()) else {
			if node.required {
				self.errors.push(ValidationIssue::new(
					path,
					ValidationCode::MissingRequired,
					"required value is missing",
				));
			}
			return;
		};

		if let Err(issue) = check_constraints(node, value, path) {
			self.errors.push(issue);
			return;
		}

		match node.kind {
			ValueKind::Object => self.check_object(node, value, path),
			ValueKind::Array => {
				if let (Some(items), Some(arr)) = (&node.items, value.as_array()) {
					for (i, item) in arr.iter().enumerate() {
						self.check(items, Some(item), &item_path(path, i));
					}
				}
			}
			_ => {}
		}

		if let Some(validator) = &node.validator {
			let ctx = ValidationContext { path, root: self.root, strict: self.strict };
			if let Some(message) = validator(value, &ctx) {
				self.errors.push(ValidationIssue::new(
					path,
					ValidationCode::CustomValidationFailed,
					message,
				));
			}
		}
	}

	fn check_object(&mut self, node: &SchemaNode, value: &Value, path: &str) {
		let (Some(props), Some(obj)) = (&node.properties, value.as_object()) else { return };

		for (name, child) in props {
			let child_value = obj.get(name);
			let child_path = child_path(path, name);
			self.check(child, child_value, &child_path);
			if is_present(child_value) {
				self.check_dependencies(child, obj, &child_path);
			}
		}

		if self.strict {
			for key in obj.keys().filter(|key| !props.contains_key(*key)) {
				self.errors.push(ValidationIssue::new(
					child_path(path, key),
					ValidationCode::UnknownProperty,
					"property is not defined in the schema",
				));
			}
		}
	}

	fn check_dependencies(&mut self, node: &SchemaNode, siblings: &Map<String, Value>, path: &str) {
		for dep in &node.dependencies {
			if !is_present(siblings.get(dep)) {
				self.warnings.push(ValidationIssue::new(
					path,
					ValidationCode::DependencyViolation,
					format!("depends on missing sibling '{}'", dep),
				));
			}
		}
	}
}

/// Type, enum and bound checks of a single present value
fn check_constraints(node: &SchemaNode, value: &Value, path: &str) -> Result<(), ValidationIssue> {
	if !node.kind.matches(value) {
		let found = ValueKind::of(value).map_or("null", ValueKind::as_str);
		return Err(ValidationIssue::new(
			path,
			ValidationCode::InvalidType,
			format!("expected {}, got {}", node.kind, found),
		));
	}

	if let Some(allowed) = &node.allowed
		&& !allowed.contains(value)
	{
		return Err(ValidationIssue::new(
			path,
			ValidationCode::InvalidEnum,
			format!("{} is not one of the allowed values", value),
		));
	}

	match value {
		Value::Number(n) => {
			let n = n.as_f64().unwrap_or(f64::NAN);
			if node.min.is_some_and(|min| n < min) || node.max.is_some_and(|max| n > max) {
				return Err(ValidationIssue::new(
					path,
					ValidationCode::InvalidRange,
					format!("{} is outside {}", n, describe_bounds(node.min, node.max)),
				));
			}
		}
		Value::String(s) => {
			let len = s.chars().count();
			if node.min_length.is_some_and(|min| len < min)
				|| node.max_length.is_some_and(|max| len > max)
			{
				return Err(ValidationIssue::new(
					path,
					ValidationCode::InvalidLength,
					format!("length {} is outside the allowed range", len),
				));
			}
			if let Some(pattern) = &node.pattern
				&& !pattern.is_match(s)
			{
				return Err(ValidationIssue::new(
					path,
					ValidationCode::InvalidPattern,
					format!("does not match pattern {}", pattern.as_str()),
				));
			}
		}
		Value::Array(arr) => {
			if node.min_items.is_some_and(|min| arr.len() < min)
				|| node.max_items.is_some_and(|max| arr.len() > max)
			{
				return Err(ValidationIssue::new(
					path,
					ValidationCode::InvalidArraySize,
					format!("{} items is outside the allowed range", arr.len()),
				));
			}
		}
		_ => {}
	}
	Ok(())
}

fn describe_bounds(min: Option<f64>, max: Option<f64>) -> String {
	match (min, max) {
		(Some(min), Some(max)) => format!("[{}, {}]", min, max),
		(Some(min), None) => format!("[{}, ..)", min),
		(None, Some(max)) => format!("(.., {}]", max),
		(None, None) => "any range".into(),
	}
}

/// Number value of a clamped float, kept integral when possible
#[allow(clippy::cast_possible_truncation)]
fn number_value(n: f64) -> Option<Value> {
	if n.fract() == 0.0 && n.abs() < 9.0e15 {
		return Some(Value::from(n as i64));
	}
	Number::from_f64(n).map(Value::Number)
}

pub struct Validator {
	schema: Arc<SchemaNode>,
	strict: bool,
}

impl Validator {
	pub fn new(schema: SchemaNode, strict: bool) -> Self {
		Self { schema: Arc::new(schema), strict }
	}

	pub fn schema(&self) -> &SchemaNode {
		&self.schema
	}

	pub fn is_strict(&self) -> bool {
		self.strict
	}

	/// Validate a whole preference tree
	pub fn validate(&self, data: &Value) -> ValidationResult {
		let mut walk = Walk { root: data, strict: self.strict, errors: Vec::new(), warnings: Vec::new() };
		walk.check(&self.schema, Some(data), "");
		ValidationResult {
			valid: walk.errors.is_empty(),
			errors: walk.errors,
			warnings: walk.warnings,
			sanitized: self.sanitize(data),
		}
	}

	/// Reject a write that would descend below a non-object schema node.
	///
	/// Applies regardless of strict mode and of whether values are validated.
	pub fn check_placement(&self, path: &str) -> Option<ValidationIssue> {
		let (leaf_path, leaf) = self.schema.leaf_ancestor(path)?;
		Some(ValidationIssue::new(
			path,
			ValidationCode::InvalidType,
			format!("{} is a {} and has no properties", leaf_path, leaf.kind.as_str()),
		))
	}

	/// Validate a single value about to be written at `path` of `root`.
	///
	/// Paths unknown to the schema are accepted unless in strict mode. Paths
	/// below a non-object node are always rejected.
	pub fn validate_property(
		&self,
		path: &str,
		value: &Value,
		root: &Value,
	) -> ClResult<ValidationResult> {
		let parts = parse_path(path)?;
		let mut walk = Walk { root, strict: self.strict, errors: Vec::new(), warnings: Vec::new() };

		let Some(node) = self.schema.node_at(path) else {
			if let Some(issue) = self.check_placement(path) {
				walk.errors.push(issue);
			} else if self.strict {
				walk.errors.push(ValidationIssue::new(
					path,
					ValidationCode::UnknownProperty,
					"property is not defined in the schema",
				));
			}
			return Ok(ValidationResult {
				valid: walk.errors.is_empty(),
				errors: walk.errors,
				warnings: walk.warnings,
				sanitized: value.clone(),
			});
		};

		walk.check(node, Some(value), path);
		if is_present(Some(value)) && !node.dependencies.is_empty() {
			let parent = parts.split_last().map(|(_, parents)| parents.join(".")).unwrap_or_default();
			if let Some(Value::Object(siblings)) = get_path(root, &parent)? {
				walk.check_dependencies(node, siblings, path);
			} else {
				walk.check_dependencies(node, &Map::new(), path);
			}
		}

		let sanitized = self.sanitize_node(node, Some(value), root).unwrap_or(Value::Null);
		Ok(ValidationResult {
			valid: walk.errors.is_empty(),
			errors: walk.errors,
			warnings: walk.warnings,
			sanitized,
		})
	}

	/// Coerce a tree into shape.
	///
	/// Missing values get their defaults, numbers are clamped, strings and
	/// arrays truncated; anything still invalid falls back to its default or
	/// is dropped. Sanitizing a sanitized tree is a no-op.
	pub fn sanitize(&self, data: &Value) -> Value {
		self.sanitize_node(&self.schema, Some(data), data)
			.unwrap_or_else(|| Value::Object(Map::new()))
	}

	fn sanitize_node(&self, node: &SchemaNode, value: Option<&Value>, root: &Value) -> Option<Value> {
		let Some(value) = value.filter(|v| !v.is_null()) else {
			return node.default_tree();
		};
		if !node.kind.matches(value) {
			return node.default_tree();
		}

		let coerced = match value {
			Value::Number(n) => {
				let raw = n.as_f64().unwrap_or(f64::NAN);
				let clamped = raw.max(node.min.unwrap_or(f64::MIN)).min(node.max.unwrap_or(f64::MAX));
				if (clamped - raw).abs() > 0.0 { number_value(clamped) } else { Some(value.clone()) }
			}
			Value::String(s) => {
				let truncated: String = match node.max_length {
					Some(max) if s.chars().count() > max => s.chars().take(max).collect(),
					_ => s.clone(),
				};
				Some(Value::String(truncated))
			}
			Value::Array(arr) => {
				let max = node.max_items.unwrap_or(usize::MAX);
				let items: Vec<Value> = match &node.items {
					Some(items) => arr
						.iter()
						.filter_map(|item| self.sanitize_node(items, Some(item), root))
						.take(max)
						.collect(),
					None => arr.iter().take(max).cloned().collect(),
				};
				Some(Value::Array(items))
			}
			Value::Object(obj) => Some(Value::Object(self.sanitize_object(node, obj, root))),
			_ => Some(value.clone()),
		};

		// Whatever is still invalid after coercion falls back to the default
		let coerced = coerced?;
		let still_valid = check_constraints(node, &coerced, "").is_ok()
			&& node.validator.as_ref().is_none_or(|validator| {
				let ctx = ValidationContext { path: "", root, strict: self.strict };
				validator(&coerced, &ctx).is_none()
			});
		if still_valid { Some(coerced) } else { node.default_tree() }
	}

	fn sanitize_object(
		&self,
		node: &SchemaNode,
		obj: &Map<String, Value>,
		root: &Value,
	) -> Map<String, Value> {
		let Some(props) = &node.properties else { return obj.clone() };

		let mut out = Map::new();
		for (key, value) in obj {
			match props.get(key) {
				Some(child) => {
					if let Some(value) = self.sanitize_node(child, Some(value), root) {
						out.insert(key.clone(), value);
					}
				}
				None if !self.strict => {
					out.insert(key.clone(), value.clone());
				}
				None => {}
			}
		}
		for (name, child) in props {
			if !out.contains_key(name)
				&& let Some(default) = child.default_tree()
			{
				out.insert(name.clone(), default);
			}
		}
		out
	}
}

impl std::fmt::Debug for Validator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Validator").field("strict", &self.strict).finish_non_exhaustive()
	}
}


// vim: ts=4
