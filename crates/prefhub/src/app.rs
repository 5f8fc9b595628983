//! Builder that assembles a ready-to-use preferences manager

use std::sync::Arc;
use std::time::Duration;

use crate::prelude::*;
use prefhub_core::config::ManagerConfig;
use prefhub_core::schema::{SchemaNode, default_schema};
use prefhub_types::store_adapter::PrefsStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
	let res = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.try_init();
	if res.is_err() {
		debug!("tracing subscriber already installed");
	}
}

pub struct PrefHubBuilder {
	config: ManagerConfig,
	store: Option<Arc<dyn PrefsStore>>,
	schema: Option<SchemaNode>,
}

impl PrefHubBuilder {
	pub fn new() -> Self {
		PrefHubBuilder { config: ManagerConfig::default(), store: None, schema: None }
	}

	// Opts
	pub fn config(&mut self, config: ManagerConfig) -> &mut Self {
		self.config = config;
		self
	}

	/// Replace the configuration with one parsed from JSON
	pub fn config_json(&mut self, json: &str) -> ClResult<&mut Self> {
		self.config = ManagerConfig::from_json_str(json)?;
		Ok(self)
	}

	pub fn max_instances(&mut self, max_instances: usize) -> &mut Self {
		self.config.max_instances = max_instances;
		self
	}

	pub fn auto_backup(&mut self, interval: Duration) -> &mut Self {
		self.config.auto_backup = true;
		self.config.auto_backup_interval = interval;
		self
	}

	pub fn strict_validation(&mut self, strict: bool) -> &mut Self {
		self.config.service.strict_validation = strict;
		self
	}

	pub fn cache_ttl(&mut self, ttl: Option<Duration>) -> &mut Self {
		self.config.service.cache.default_ttl = ttl;
		self
	}

	// Collaborators
	pub fn store(&mut self, store: Arc<dyn PrefsStore>) -> &mut Self {
		self.store = Some(store);
		self
	}

	/// Schema for every tenant; the built-in application schema is used if unset
	pub fn schema(&mut self, schema: SchemaNode) -> &mut Self {
		self.schema = Some(schema);
		self
	}

	pub fn build(&self) -> ClResult<Arc<PreferencesManager>> {
		let Some(store) = self.store.clone() else {
			error!("FATAL: No store adapter configured");
			return Err(Error::Config("No store adapter configured".to_string()));
		};
		let schema = match &self.schema {
			Some(schema) => schema.clone(),
			None => default_schema()?,
		};

		info!("prefhub V{}", VERSION);
		let manager = PreferencesManager::new(self.config.clone(), store, schema)?;
		info!(
			max_instances = self.config.max_instances,
			auto_backup = self.config.auto_backup,
			"preferences manager ready"
		);
		Ok(manager)
	}
}

impl Default for PrefHubBuilder {
	fn default() -> Self {
		Self::new()
	}
}

// vim: ts=4
