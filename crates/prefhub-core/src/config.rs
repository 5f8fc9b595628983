//! Engine configuration
//!
//! All config structs deserialize from camelCase JSON (or any serde format)
//! with every field optional; durations are given in milliseconds.

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

use crate::prelude::*;

/// PreferencesCache configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
	/// Maximum number of live entries
	pub max_size: usize,
	/// TTL applied when a `set` does not specify one (`None` = never expires)
	#[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
	#[serde(rename = "defaultTtlMs")]
	pub default_ttl: Option<Duration>,
	/// Period of the background expiry sweep
	#[serde_as(as = "DurationMilliSeconds<u64>")]
	#[serde(rename = "cleanupIntervalMs")]
	pub cleanup_interval: Duration,
	/// Share of `max_size` evicted at once under size pressure
	pub eviction_ratio: f64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_size: 100,
			default_ttl: Some(Duration::from_secs(5 * 60)),
			cleanup_interval: Duration::from_secs(60),
			eviction_ratio: 0.1,
		}
	}
}

impl CacheConfig {
	pub fn validate(&self) -> ClResult<()> {
		if self.max_size == 0 {
			return Err(Error::Config("cache maxSize must be greater than zero".into()));
		}
		if !(self.eviction_ratio > 0.0 && self.eviction_ratio <= 1.0) {
			return Err(Error::Config(format!(
				"cache evictionRatio must be in (0, 1], got {}",
				self.eviction_ratio
			)));
		}
		if self.default_ttl == Some(Duration::ZERO) {
			return Err(Error::Config("cache defaultTtlMs must be positive".into()));
		}
		if self.cleanup_interval.is_zero() {
			return Err(Error::Config("cache cleanupIntervalMs must be positive".into()));
		}
		Ok(())
	}

	/// Number of entries evicted when the cache is full and a new key arrives
	pub fn eviction_batch(&self) -> usize {
		let batch = (self.max_size as f64 * self.eviction_ratio).ceil();
		// Bounded by max_size, so the cast cannot truncate meaningfully
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let batch = batch as usize;
		batch.clamp(1, self.max_size)
	}
}

/// EventDispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatcherConfig {
	/// Maximum number of events waiting in the re-entrancy queue
	pub max_queue: usize,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self { max_queue: 1000 }
	}
}

/// Per-tenant PreferencesService configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
	pub cache: CacheConfig,
	pub dispatcher: DispatcherConfig,
	/// Report keys missing from the schema as errors
	pub strict_validation: bool,
	/// Validate values on `set`/`update` unless the call opts out
	pub validate_on_set: bool,
	pub max_saved_presets: usize,
	/// Recent jobs bounds for newly created documents
	pub max_recent_jobs: usize,
	pub recent_jobs_max_age_days: u32,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			cache: CacheConfig::default(),
			dispatcher: DispatcherConfig::default(),
			strict_validation: false,
			validate_on_set: true,
			max_saved_presets: 100,
			max_recent_jobs: 50,
			recent_jobs_max_age_days: 30,
		}
	}
}

impl ServiceConfig {
	pub fn validate(&self) -> ClResult<()> {
		self.cache.validate()?;
		if self.dispatcher.max_queue == 0 {
			return Err(Error::Config("dispatcher maxQueue must be greater than zero".into()));
		}
		if self.max_recent_jobs == 0 {
			return Err(Error::Config("maxRecentJobs must be greater than zero".into()));
		}
		Ok(())
	}
}

/// PreferencesManager configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
	/// Maximum number of concurrently live tenants
	pub max_instances: usize,
	pub max_backups_per_tenant: usize,
	pub auto_backup: bool,
	#[serde_as(as = "DurationMilliSeconds<u64>")]
	#[serde(rename = "autoBackupIntervalMs")]
	pub auto_backup_interval: Duration,
	pub service: ServiceConfig,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			max_instances: 100,
			max_backups_per_tenant: 10,
			auto_backup: false,
			auto_backup_interval: Duration::from_secs(60 * 60),
			service: ServiceConfig::default(),
		}
	}
}

impl ManagerConfig {
	/// Parse and validate a JSON configuration
	pub fn from_json_str(json: &str) -> ClResult<Self> {
		let config: ManagerConfig = serde_json::from_str(json)
			.map_err(|e| Error::Config(format!("invalid preferences config: {}", e)))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> ClResult<()> {
		if self.max_instances == 0 {
			return Err(Error::Config("maxInstances must be greater than zero".into()));
		}
		if self.max_backups_per_tenant == 0 {
			return Err(Error::Config("maxBackupsPerTenant must be greater than zero".into()));
		}
		if self.auto_backup && self.auto_backup_interval.is_zero() {
			return Err(Error::Config("autoBackupIntervalMs must be positive".into()));
		}
		self.service.validate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_are_valid() {
		assert!(ManagerConfig::default().validate().is_ok());
	}

	#[test]
	fn test_from_json_partial() {
		let config = ManagerConfig::from_json_str(
			r#"{
				"maxInstances": 4,
				"autoBackup": true,
				"autoBackupIntervalMs": 250,
				"service": { "strictValidation": true, "cache": { "maxSize": 8, "defaultTtlMs": null } }
			}"#,
		)
		.unwrap();
		assert_eq!(config.max_instances, 4);
		assert_eq!(config.auto_backup_interval, Duration::from_millis(250));
		assert!(config.service.strict_validation);
		assert_eq!(config.service.cache.max_size, 8);
		assert_eq!(config.service.cache.default_ttl, None);
		assert_eq!(config.service.cache.cleanup_interval, Duration::from_secs(60));
	}

	#[test]
	fn test_zero_capacity_rejected() {
		let err = ManagerConfig::from_json_str(r#"{ "service": { "cache": { "maxSize": 0 } } }"#);
		assert!(matches!(err, Err(Error::Config(_))));
	}

	#[test]
	fn test_eviction_batch() {
		let mut config = CacheConfig { max_size: 2, ..CacheConfig::default() };
		assert_eq!(config.eviction_batch(), 1);
		config.max_size = 100;
		assert_eq!(config.eviction_batch(), 10);
		config.max_size = 15;
		assert_eq!(config.eviction_batch(), 2);
	}
}

// vim: ts=4
