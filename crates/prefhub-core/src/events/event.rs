//! Change events published by the preferences service

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prelude::*;

/// Class of a change event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
	PreferenceChanged,
	PreferencesReset,
	PreferencesImported,
	PresetSaved,
	PresetDeleted,
	RecentJobAdded,
	RecentJobsCleared,
	SchemaUpdated,
	/// Collaborator-defined event
	Custom(Box<str>),
}

impl EventKind {
	pub fn custom(name: impl Into<Box<str>>) -> Self {
		EventKind::Custom(name.into())
	}

	pub fn as_str(&self) -> &str {
		match self {
			EventKind::PreferenceChanged => "preference_changed",
			EventKind::PreferencesReset => "preferences_reset",
			EventKind::PreferencesImported => "preferences_imported",
			EventKind::PresetSaved => "preset_saved",
			EventKind::PresetDeleted => "preset_deleted",
			EventKind::RecentJobAdded => "recent_job_added",
			EventKind::RecentJobsCleared => "recent_jobs_cleared",
			EventKind::SchemaUpdated => "schema_updated",
			EventKind::Custom(name) => name,
		}
	}

	/// Parse a wire name; unknown names become `Custom`
	pub fn from_name(name: &str) -> Self {
		match name {
			"preference_changed" => EventKind::PreferenceChanged,
			"preferences_reset" => EventKind::PreferencesReset,
			"preferences_imported" => EventKind::PreferencesImported,
			"preset_saved" => EventKind::PresetSaved,
			"preset_deleted" => EventKind::PresetDeleted,
			"recent_job_added" => EventKind::RecentJobAdded,
			"recent_jobs_cleared" => EventKind::RecentJobsCleared,
			"schema_updated" => EventKind::SchemaUpdated,
			other => EventKind::Custom(other.into()),
		}
	}
}

impl std::fmt::Display for EventKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for EventKind {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for EventKind {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(EventKind::from_name(&String::deserialize(deserializer)?))
	}
}

/// A published change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefEvent {
	/// Global publish order, assigned by the dispatcher
	#[serde(default)]
	pub seq: u64,
	#[serde(rename = "type")]
	pub kind: EventKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tenant_id: Option<TenantId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub old_value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new_value: Option<Value>,
	pub timestamp: Timestamp,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub metadata: Map<String, Value>,
}

impl PrefEvent {
	pub fn new(kind: EventKind) -> Self {
		Self {
			seq: 0,
			kind,
			tenant_id: None,
			path: None,
			old_value: None,
			new_value: None,
			timestamp: Timestamp::now(),
			metadata: Map::new(),
		}
	}

	/// `preference_changed` for one path
	pub fn changed(
		tenant_id: TenantId,
		path: impl Into<String>,
		old_value: Option<Value>,
		new_value: Option<Value>,
	) -> Self {
		let mut event = Self::new(EventKind::PreferenceChanged).tenant(tenant_id).path(path);
		event.old_value = old_value;
		event.new_value = new_value;
		event
	}

	pub fn tenant(mut self, tenant_id: TenantId) -> Self {
		self.tenant_id = Some(tenant_id);
		self
	}

	pub fn path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn new_value(mut self, value: Value) -> Self {
		self.new_value = Some(value);
		self
	}

	pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.metadata.insert(key.into(), value.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_kind_wire_names() {
		assert_eq!(EventKind::RecentJobsCleared.to_string(), "recent_jobs_cleared");
		assert_eq!(EventKind::from_name("preset_saved"), EventKind::PresetSaved);
		assert_eq!(EventKind::from_name("file_converted"), EventKind::custom("file_converted"));
	}

	#[test]
	fn test_event_serialization() {
		let event = PrefEvent::changed(
			TenantId::from("alice"),
			"appearance.theme",
			Some(json!("light")),
			Some(json!("dark")),
		);
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["type"], json!("preference_changed"));
		assert_eq!(json["tenantId"], json!("alice"));
		assert_eq!(json["oldValue"], json!("light"));
		assert!(json.get("metadata").is_none());

		let back: PrefEvent = serde_json::from_value(json).unwrap();
		assert_eq!(back, event);
	}
}

// vim: ts=4
