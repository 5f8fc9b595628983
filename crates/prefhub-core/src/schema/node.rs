//! Recursive schema node describing the allowed shape of a preference tree

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::prelude::*;
use prefhub_types::utils::split_path;

/// JSON value kinds a schema node can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
	String,
	Number,
	Boolean,
	Array,
	Object,
}

impl ValueKind {
	/// Kind of a JSON value, `None` for `null`
	pub fn of(value: &Value) -> Option<ValueKind> {
		match value {
			Value::Null => None,
			Value::Bool(_) => Some(ValueKind::Boolean),
			Value::Number(_) => Some(ValueKind::Number),
			Value::String(_) => Some(ValueKind::String),
			Value::Array(_) => Some(ValueKind::Array),
			Value::Object(_) => Some(ValueKind::Object),
		}
	}

	/// Type check; non-finite numbers never match `Number`
	pub fn matches(self, value: &Value) -> bool {
		match (self, value) {
			(ValueKind::Number, Value::Number(n)) => n.as_f64().is_some_and(f64::is_finite),
			_ => ValueKind::of(value) == Some(self),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ValueKind::String => "string",
			ValueKind::Number => "number",
			ValueKind::Boolean => "boolean",
			ValueKind::Array => "array",
			ValueKind::Object => "object",
		}
	}
}

impl std::fmt::Display for ValueKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Information available to custom validators
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
	/// Dotted path of the value being validated
	pub path: &'a str,
	/// The whole tree the value belongs to
	pub root: &'a Value,
	pub strict: bool,
}

/// Custom rule: returns an error message, or `None` when the value is fine
pub type CustomValidator =
	Arc<dyn Fn(&Value, &ValidationContext<'_>) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct SchemaNode {
	pub kind: ValueKind,
	pub description: Option<String>,
	pub required: bool,
	pub default: Option<Value>,
	/// Enumeration of allowed values
	pub allowed: Option<Vec<Value>>,
	/// Inclusive numeric bounds
	pub min: Option<f64>,
	pub max: Option<f64>,
	/// Inclusive string length bounds, in characters
	pub min_length: Option<usize>,
	pub max_length: Option<usize>,
	pub pattern: Option<Regex>,
	/// Inclusive array size bounds
	pub min_items: Option<usize>,
	pub max_items: Option<usize>,
	pub items: Option<Box<SchemaNode>>,
	pub properties: Option<BTreeMap<String, SchemaNode>>,
	pub validator: Option<CustomValidator>,
	/// Sibling properties expected to be present alongside this one
	pub dependencies: Vec<String>,
}

impl Debug for SchemaNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SchemaNode")
			.field("kind", &self.kind)
			.field("required", &self.required)
			.field("default", &self.default)
			.field("allowed", &self.allowed)
			.field("min", &self.min)
			.field("max", &self.max)
			.field("pattern", &self.pattern.as_ref().map(Regex::as_str))
			.field("items", &self.items)
			.field("properties", &self.properties)
			.field("validator", &self.validator.is_some())
			.field("dependencies", &self.dependencies)
			.finish_non_exhaustive()
	}
}

impl SchemaNode {
	pub fn builder(kind: ValueKind) -> SchemaNodeBuilder {
		SchemaNodeBuilder::new(kind)
	}

	/// Look up the node addressed by a dotted path ("" is this node)
	pub fn node_at(&self, path: &str) -> Option<&SchemaNode> {
		let mut node = self;
		for part in split_path(path)? {
			node = node.properties.as_ref()?.get(part)?;
		}
		Some(node)
	}

	/// First non-object node strictly above the end of `path`, with its path.
	///
	/// Writes below such a node would turn a scalar or array into an object.
	/// Returns `None` when the walk leaves the schema under an object node.
	pub fn leaf_ancestor(&self, path: &str) -> Option<(String, &SchemaNode)> {
		let parts = split_path(path)?;
		let (_, parents) = parts.split_last()?;
		let mut node = self;
		for (depth, part) in parents.iter().enumerate() {
			node = node.properties.as_ref()?.get(*part)?;
			if node.kind != ValueKind::Object {
				return Some((parents[..=depth].join("."), node));
			}
		}
		None
	}

	/// The value this node falls back to when absent.
	///
	/// An explicit default wins; object nodes without one are assembled from
	/// their properties' defaults.
	pub fn default_tree(&self) -> Option<Value> {
		if let Some(default) = &self.default {
			return Some(default.clone());
		}
		let props = self.properties.as_ref()?;
		let obj: Map<String, Value> = props
			.iter()
			.filter_map(|(name, child)| child.default_tree().map(|value| (name.clone(), value)))
			.collect();
		Some(Value::Object(obj))
	}

	/// Replace or add top-level property nodes from `partial`
	pub fn merge_shallow(&mut self, partial: SchemaNode) -> ClResult<()> {
		let Some(patch) = partial.properties else {
			return Err(Error::InvalidArgument("schema update must be an object schema".into()));
		};
		let props = self.properties.get_or_insert_with(BTreeMap::new);
		for (name, node) in patch {
			props.insert(name, node);
		}
		Ok(())
	}
}

/// Builder for SchemaNode with fluent API
pub struct SchemaNodeBuilder {
	node: SchemaNode,
	pattern: Option<String>,
}

impl SchemaNodeBuilder {
	pub fn new(kind: ValueKind) -> Self {
		Self {
			node: SchemaNode {
				kind,
				description: None,
				required: false,
				default: None,
				allowed: None,
				min: None,
				max: None,
				min_length: None,
				max_length: None,
				pattern: None,
				min_items: None,
				max_items: None,
				items: None,
				properties: None,
				validator: None,
				dependencies: Vec::new(),
			},
			pattern: None,
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.node.description = Some(description.into());
		self
	}

	pub fn required(mut self) -> Self {
		self.node.required = true;
		self
	}

	pub fn default(mut self, value: impl Into<Value>) -> Self {
		self.node.default = Some(value.into());
		self
	}

	/// Restrict the value to a fixed set
	pub fn allowed<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
		self.node.allowed = Some(values.into_iter().map(Into::into).collect());
		self
	}

	pub fn min(mut self, min: f64) -> Self {
		self.node.min = Some(min);
		self
	}

	pub fn max(mut self, max: f64) -> Self {
		self.node.max = Some(max);
		self
	}

	pub fn range(self, min: f64, max: f64) -> Self {
		self.min(min).max(max)
	}

	pub fn min_length(mut self, len: usize) -> Self {
		self.node.min_length = Some(len);
		self
	}

	pub fn max_length(mut self, len: usize) -> Self {
		self.node.max_length = Some(len);
		self
	}

	/// Regular expression the whole string must match (compiled in `build`)
	pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
		self.pattern = Some(pattern.into());
		self
	}

	pub fn min_items(mut self, n: usize) -> Self {
		self.node.min_items = Some(n);
		self
	}

	pub fn max_items(mut self, n: usize) -> Self {
		self.node.max_items = Some(n);
		self
	}

	pub fn items(mut self, items: SchemaNode) -> Self {
		self.node.items = Some(Box::new(items));
		self
	}

	pub fn property(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
		self.node.properties.get_or_insert_with(BTreeMap::new).insert(name.into(), node);
		self
	}

	pub fn validator<F>(mut self, f: F) -> Self
	where
		F: Fn(&Value, &ValidationContext<'_>) -> Option<String> + Send + Sync + 'static,
	{
		self.node.validator = Some(Arc::new(f));
		self
	}

	pub fn depends_on(mut self, sibling: impl Into<String>) -> Self {
		self.node.dependencies.push(sibling.into());
		self
	}

	pub fn build(self) -> ClResult<SchemaNode> {
		let mut node = self.node;
		let kind = node.kind;

		if let (Some(min), Some(max)) = (node.min, node.max)
			&& min > max
		{
			return Err(Error::Config(format!("schema min {} is greater than max {}", min, max)));
		}
		if let (Some(min), Some(max)) = (node.min_length, node.max_length)
			&& min > max
		{
			return Err(Error::Config("schema minLength is greater than maxLength".into()));
		}
		if let (Some(min), Some(max)) = (node.min_items, node.max_items)
			&& min > max
		{
			return Err(Error::Config("schema minItems is greater than maxItems".into()));
		}
		if node.properties.is_some() && kind != ValueKind::Object {
			return Err(Error::Config(format!("{} schema cannot have properties", kind)));
		}
		if node.items.is_some() && kind != ValueKind::Array {
			return Err(Error::Config(format!("{} schema cannot have items", kind)));
		}
		if let Some(default) = &node.default
			&& !kind.matches(default)
		{
			return Err(Error::Config(format!("schema default {} is not a {}", default, kind)));
		}

		if let Some(pattern) = self.pattern {
			let regex = Regex::new(&format!("^(?:{})$", pattern))
				.map_err(|e| Error::Config(format!("invalid schema pattern '{}': {}", pattern, e)))?;
			node.pattern = Some(regex);
		}
		Ok(node)
	}
}


// vim: ts=4
