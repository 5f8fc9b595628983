//! Persisted preferences document
//!
//! The same shape is used for store payloads, exports/imports and backups:
//!
//! ```json
//! {
//!   "tenantId": "default",
//!   "version": 1,
//!   "createdAt": 1700000000,
//!   "updatedAt": 1700000000,
//!   "preferences": { "appearance": { "theme": "dark" } },
//!   "savedPresets": [],
//!   "recentJobs": [],
//!   "recentJobsSettings": { "maxCount": 50, "maxAgeDays": 30 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClResult, Error};

use crate::types::{TenantId, Timestamp};

/// Current document format version
pub const DOCUMENT_VERSION: u32 = 1;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A complete snapshot of one tenant's preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefsDocument {
	pub tenant_id: TenantId,
	pub version: u32,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	#[serde(default = "empty_object")]
	pub preferences: Value,
	#[serde(default)]
	pub saved_presets: Vec<SavedPreset>,
	#[serde(default)]
	pub recent_jobs: Vec<RecentJob>,
	#[serde(default)]
	pub recent_jobs_settings: RecentJobsSettings,
}

fn empty_object() -> Value {
	Value::Object(Map::new())
}

impl PrefsDocument {
	/// Create an empty document for a tenant
	pub fn new(tenant_id: TenantId) -> Self {
		let now = Timestamp::now();
		Self {
			tenant_id,
			version: DOCUMENT_VERSION,
			created_at: now,
			updated_at: now,
			preferences: empty_object(),
			saved_presets: Vec::new(),
			recent_jobs: Vec::new(),
			recent_jobs_settings: RecentJobsSettings::default(),
		}
	}

	/// Bump `updated_at` after a mutation
	pub fn touch(&mut self) {
		self.updated_at = Timestamp::now();
	}
}

/// A named, reusable set of conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPreset {
	pub id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default = "empty_object")]
	pub settings: Value,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl SavedPreset {
	pub fn new(id: impl Into<String>, name: impl Into<String>, settings: Value) -> Self {
		let now = Timestamp::now();
		Self {
			id: id.into(),
			name: name.into(),
			description: None,
			settings,
			created_at: now,
			updated_at: now,
		}
	}
}

/// One entry of the recent-activity history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentJob {
	pub id: String,
	pub label: String,
	#[serde(default)]
	pub data: Value,
	pub created_at: Timestamp,
}

impl RecentJob {
	pub fn new(id: impl Into<String>, label: impl Into<String>, data: Value) -> Self {
		Self { id: id.into(), label: label.into(), data, created_at: Timestamp::now() }
	}
}

/// Bounds applied to the recent jobs list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentJobsSettings {
	pub max_count: usize,
	pub max_age_days: u32,
}

impl Default for RecentJobsSettings {
	fn default() -> Self {
		Self { max_count: 50, max_age_days: 30 }
	}
}

impl RecentJobsSettings {
	/// Reject settings that would empty the list on every prune
	pub fn check(&self) -> ClResult<()> {
		if self.max_count == 0 {
			return Err(Error::InvalidArgument("recent jobs maxCount must be at least 1".into()));
		}
		Ok(())
	}

	/// Drop jobs older than `max_age_days`, then the oldest ones beyond `max_count`.
	///
	/// Returns the number of removed jobs.
	pub fn prune(&self, jobs: &mut Vec<RecentJob>, now: Timestamp) -> usize {
		let before = jobs.len();
		let max_age = i64::from(self.max_age_days) * SECONDS_PER_DAY;
		jobs.retain(|job| job.created_at.seconds_until(now) <= max_age);

		if jobs.len() > self.max_count {
			let excess = jobs.len() - self.max_count;
			jobs.drain(..excess);
		}
		before - jobs.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn job(id: &str, created_at: i64) -> RecentJob {
		RecentJob { id: id.into(), label: id.into(), data: Value::Null, created_at: Timestamp(created_at) }
	}

	#[test]
	fn test_document_roundtrip_shape() {
		let doc = PrefsDocument::new(TenantId::from("default"));
		let json = serde_json::to_value(&doc).unwrap();
		assert_eq!(json["tenantId"], json!("default"));
		assert_eq!(json["version"], json!(DOCUMENT_VERSION));
		assert_eq!(json["recentJobsSettings"], json!({ "maxCount": 50, "maxAgeDays": 30 }));
		assert!(json["preferences"].is_object());
	}

	#[test]
	fn test_document_missing_collections_default() {
		let doc: PrefsDocument = serde_json::from_value(json!({
			"tenantId": "t1",
			"version": 1,
			"createdAt": 1,
			"updatedAt": 2
		}))
		.unwrap();
		assert!(doc.saved_presets.is_empty());
		assert!(doc.recent_jobs.is_empty());
		assert_eq!(doc.preferences, json!({}));
	}

	#[test]
	fn test_prune_by_count_drops_oldest() {
		let settings = RecentJobsSettings { max_count: 2, max_age_days: 365 };
		let mut jobs = vec![job("a", 100), job("b", 200), job("c", 300)];
		let removed = settings.prune(&mut jobs, Timestamp(400));
		assert_eq!(removed, 1);
		let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
		assert_eq!(ids, vec!["b", "c"]);
	}

	#[test]
	fn test_settings_check() {
		assert!(RecentJobsSettings::default().check().is_ok());
		let settings = RecentJobsSettings { max_count: 0, max_age_days: 30 };
		assert!(matches!(settings.check(), Err(Error::InvalidArgument(_))));
	}

	#[test]
	fn test_prune_by_age() {
		let settings = RecentJobsSettings { max_count: 10, max_age_days: 1 };
		let now = Timestamp(10 * SECONDS_PER_DAY);
		let mut jobs = vec![job("old", 0), job("fresh", now.0 - 60)];
		settings.prune(&mut jobs, now);
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].id, "fresh");
	}
}

// vim: ts=4
