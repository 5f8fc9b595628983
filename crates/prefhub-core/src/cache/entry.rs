//! Cache entry with recency, hit count, TTL, tags and priority metadata

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Relative importance of a cache entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
	Low,
	#[default]
	Normal,
	High,
}

/// A single cached value and its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
	pub key: String,
	pub value: Value,
	pub created_at: Instant,
	pub last_accessed: Instant,
	pub access_count: u64,
	/// `None` = never expires on its own
	pub ttl: Option<Duration>,
	pub priority: CachePriority,
	pub tags: BTreeSet<String>,
	pub metadata: Map<String, Value>,
}

impl CacheEntry {
	pub fn new(key: impl Into<String>, value: Value, ttl: Option<Duration>) -> Self {
		let now = Instant::now();
		Self {
			key: key.into(),
			value,
			created_at: now,
			last_accessed: now,
			access_count: 0,
			ttl,
			priority: CachePriority::Normal,
			tags: BTreeSet::new(),
			metadata: Map::new(),
		}
	}

	/// `created_at + ttl`, or `None` when the entry never expires
	pub fn expires_at(&self) -> Option<Instant> {
		self.ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| self.created_at + ttl)
	}

	pub fn is_expired_at(&self, now: Instant) -> bool {
		self.expires_at().is_some_and(|expires_at| now >= expires_at)
	}

	pub fn is_expired(&self) -> bool {
		self.is_expired_at(Instant::now())
	}

	/// Record a read access
	pub fn touch(&mut self, now: Instant) {
		self.last_accessed = now;
		self.access_count += 1;
	}

	pub fn has_tag(&self, tag: &str) -> bool {
		self.tags.contains(tag)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_entry_without_ttl_never_expires() {
		let entry = CacheEntry::new("k", json!(1), None);
		assert!(entry.expires_at().is_none());
		assert!(!entry.is_expired_at(Instant::now() + Duration::from_secs(3600 * 24 * 365)));
	}

	#[test]
	fn test_entry_expiry_boundary() {
		let entry = CacheEntry::new("k", json!(1), Some(Duration::from_millis(10)));
		let expires_at = entry.expires_at().unwrap();
		assert_eq!(expires_at, entry.created_at + Duration::from_millis(10));
		assert!(!entry.is_expired_at(entry.created_at));
		assert!(entry.is_expired_at(expires_at));
	}

	#[test]
	fn test_touch_counts_accesses() {
		let mut entry = CacheEntry::new("k", json!("v"), None);
		let later = entry.created_at + Duration::from_millis(5);
		entry.touch(later);
		entry.touch(later);
		assert_eq!(entry.access_count, 2);
		assert_eq!(entry.last_accessed, later);
	}
}

// vim: ts=4
