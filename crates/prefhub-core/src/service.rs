//! Per-tenant preferences facade
//!
//! [`PreferencesService`] is the only entry point collaborators use. It
//! composes the TTL cache, the validator and the event dispatcher over an
//! injected [`PrefsStore`]:
//!
//! - reads go cache first, then to the stored document (sanitized, so missing
//!   or invalid values resolve to schema defaults)
//! - writes validate, persist the whole document once, invalidate the touched
//!   cache sections and publish change events after the write lock is released
//!
//! Validation failures are returned as outcome values, never as errors.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::cache::{CacheStats, PreferencesCache, SetOptions};
use crate::config::ServiceConfig;
use crate::events::{
	DispatcherStats, EventDispatcher, EventKind, EventTarget, PrefEvent, SubscribeOptions,
	SubscriptionId,
};
use crate::merge::{deep_merge, get_path, parse_path, remove_path, set_path};
use crate::prelude::*;
use crate::schema::SchemaNode;
use crate::validation::{ValidationResult, Validator};
use prefhub_types::document::{
	DOCUMENT_VERSION, PrefsDocument, RecentJob, RecentJobsSettings, SavedPreset,
};
use prefhub_types::store_adapter::PrefsStore;
use prefhub_types::utils::path_section;
use prefhub_types::validation::{ValidationCode, ValidationIssue};

/// Cache key of the whole sanitized tree; `parse_path` rejects it, so no
/// preference path can collide with it
const ROOT_CACHE_KEY: &str = ".";

// Options //
//*********//
/// Options of a single `set`
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
	/// Override `ServiceConfig::validate_on_set`
	pub validate: Option<bool>,
	/// Do not publish a change event
	pub silent: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
	/// All writes land or none do
	pub transaction: bool,
	pub validate: Option<bool>,
	pub silent: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
	/// Deep-merge into the current document instead of replacing it
	pub merge: bool,
	pub validate: bool,
}

impl Default for ImportOptions {
	fn default() -> Self {
		Self { merge: false, validate: true }
	}
}

// Outcomes //
//**********//
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOutcome {
	pub success: bool,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFailure {
	pub path: String,
	pub errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
	pub success: bool,
	pub updated: Vec<String>,
	pub failed: Vec<UpdateFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
	pub success: bool,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
	pub tenant_id: TenantId,
	pub reads: u64,
	pub writes: u64,
	pub validation_failures: u64,
	pub cache: CacheStats,
	pub events: DispatcherStats,
}

/// How a batch of writes is applied
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteMode {
	pub atomic: bool,
	pub validate: bool,
	pub silent: bool,
}

#[derive(Debug, Default)]
struct Counters {
	reads: AtomicU64,
	writes: AtomicU64,
	validation_failures: AtomicU64,
}

/// Releases the tenant's transaction flag when dropped
pub(crate) struct TransactionGuard<'a>(&'a AtomicBool);

impl Drop for TransactionGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

pub struct PreferencesService {
	tenant_id: TenantId,
	config: ServiceConfig,
	store: Arc<dyn PrefsStore>,
	cache: Arc<PreferencesCache>,
	validator: parking_lot::RwLock<Arc<Validator>>,
	dispatcher: EventDispatcher,
	/// Serializes read-modify-write cycles of the stored document
	write_lock: tokio::sync::Mutex<()>,
	in_transaction: AtomicBool,
	counters: Counters,
}

impl PreferencesService {
	pub fn new(
		tenant_id: TenantId,
		store: Arc<dyn PrefsStore>,
		schema: SchemaNode,
		config: ServiceConfig,
	) -> ClResult<Arc<Self>> {
		config.validate()?;
		let cache = Arc::new(PreferencesCache::new(config.cache.clone())?);
		cache.start_sweeper();

		Ok(Arc::new(Self {
			tenant_id,
			store,
			cache,
			validator: parking_lot::RwLock::new(Arc::new(Validator::new(
				schema,
				config.strict_validation,
			))),
			dispatcher: EventDispatcher::new(config.dispatcher.clone()),
			write_lock: tokio::sync::Mutex::new(()),
			in_transaction: AtomicBool::new(false),
			counters: Counters::default(),
			config,
		}))
	}

	pub fn tenant_id(&self) -> &TenantId {
		&self.tenant_id
	}

	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	fn validator(&self) -> Arc<Validator> {
		self.validator.read().clone()
	}

	fn new_document(&self) -> PrefsDocument {
		let mut doc = PrefsDocument::new(self.tenant_id.clone());
		doc.recent_jobs_settings = RecentJobsSettings {
			max_count: self.config.max_recent_jobs,
			max_age_days: self.config.recent_jobs_max_age_days,
		};
		doc
	}

	async fn load(&self) -> ClResult<PrefsDocument> {
		Ok(self.store.read(&self.tenant_id).await?.unwrap_or_else(|| self.new_document()))
	}

	async fn persist(&self, doc: &mut PrefsDocument) -> ClResult<()> {
		doc.touch();
		self.store.write(&self.tenant_id, doc).await?;
		self.counters.writes.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	/// Drop cached values of every section touched by `paths`
	fn invalidate<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
		for path in paths {
			self.cache.delete_by_tag(path_section(path));
		}
		self.cache.delete(ROOT_CACHE_KEY);
	}

	fn publish(&self, event: PrefEvent) {
		self.dispatcher.publish(event.tenant(self.tenant_id.clone()));
	}

	/// Create the stored document if the tenant has none yet.
	///
	/// `initial` is merged over the schema defaults and sanitized.
	pub async fn init(&self, initial: Option<Value>) -> ClResult<()> {
		let _guard = self.write_lock.lock().await;
		if self.store.read(&self.tenant_id).await?.is_some() {
			if initial.is_some() {
				debug!(tenant = %self.tenant_id, "document exists, initial data ignored");
			}
			return Ok(());
		}

		let mut doc = self.new_document();
		if let Some(initial) = initial {
			doc.preferences = self.validator().sanitize(&initial);
		}
		self.persist(&mut doc).await?;
		info!(tenant = %self.tenant_id, "preferences document created");
		Ok(())
	}

	// Reads //
	//*******//
	/// Value at `path`; missing values resolve to the schema default
	pub async fn get(&self, path: &str) -> ClResult<Option<Value>> {
		parse_path(path)?;
		self.counters.reads.fetch_add(1, Ordering::Relaxed);
		let key = if path.is_empty() { ROOT_CACHE_KEY } else { path };
		if let Some(value) = self.cache.get(key) {
			return Ok(Some(value));
		}

		// Holding the write lock keeps a concurrent write from being cached over
		let _guard = self.write_lock.lock().await;
		if let Some(value) = self.cache.get(key) {
			return Ok(Some(value));
		}
		let doc = self.load().await?;
		let tree = self.validator().sanitize(&doc.preferences);
		let value = get_path(&tree, path)?.cloned();
		if let Some(value) = &value {
			let tag = if path.is_empty() { ROOT_CACHE_KEY } else { path_section(path) };
			self.cache.set(key, value.clone(), SetOptions::default().tag(tag))?;
		}
		Ok(value)
	}

	pub async fn get_or(&self, path: &str, default: Value) -> ClResult<Value> {
		Ok(self.get(path).await?.unwrap_or(default))
	}

	pub fn validate(&self, data: &Value) -> ValidationResult {
		self.validator().validate(data)
	}

	// Writes //
	//********//
	/// Write one value; setting `null` resets the path to its default
	pub async fn set(&self, path: &str, value: Value, opts: WriteOptions) -> ClResult<SetOutcome> {
		let mode = WriteMode {
			atomic: true,
			validate: opts.validate.unwrap_or(self.config.validate_on_set),
			silent: opts.silent,
		};
		let outcome = self.apply_writes(vec![(path.to_string(), value)], mode).await?;
		let errors = outcome.failed.into_iter().flat_map(|failure| failure.errors).collect();
		Ok(SetOutcome { success: outcome.success, errors })
	}

	/// Write several values.
	///
	/// Each path is applied independently unless `transaction` is set, in which
	/// case the writes are all-or-nothing and the tenant's transaction slot is
	/// held for the duration.
	pub async fn update(
		&self,
		writes: Vec<(String, Value)>,
		opts: UpdateOptions,
	) -> ClResult<UpdateOutcome> {
		let mode = WriteMode {
			atomic: opts.transaction,
			validate: opts.validate.unwrap_or(self.config.validate_on_set),
			silent: opts.silent,
		};
		if opts.transaction {
			let _tx = self.claim_transaction()?;
			self.apply_writes(writes, mode).await
		} else {
			self.apply_writes(writes, mode).await
		}
	}

	pub(crate) fn claim_transaction(&self) -> ClResult<TransactionGuard<'_>> {
		if self.in_transaction.swap(true, Ordering::AcqRel) {
			return Err(Error::TransactionConflict(self.tenant_id.clone()));
		}
		Ok(TransactionGuard(&self.in_transaction))
	}

	/// Mark a long-lived (registry) transaction as open
	pub(crate) fn begin_transaction(&self) -> ClResult<()> {
		if self.in_transaction.swap(true, Ordering::AcqRel) {
			return Err(Error::TransactionConflict(self.tenant_id.clone()));
		}
		Ok(())
	}

	pub(crate) fn end_transaction(&self) {
		self.in_transaction.store(false, Ordering::Release);
	}

	pub fn in_transaction(&self) -> bool {
		self.in_transaction.load(Ordering::Acquire)
	}

	/// Stage writes on a copy of the tree, persist once, then publish
	pub(crate) async fn apply_writes(
		&self,
		writes: Vec<(String, Value)>,
		mode: WriteMode,
	) -> ClResult<UpdateOutcome> {
		for (path, _) in &writes {
			if parse_path(path)?.is_empty() {
				return Err(Error::InvalidArgument("cannot write the root of the preference tree".into()));
			}
		}

		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		let validator = self.validator();
		let mut staged = doc.preferences.clone();
		let mut changes: Vec<(String, Option<Value>, Option<Value>)> = Vec::new();
		let mut failed = Vec::new();

		for (path, value) in writes {
			if let Some(issue) = validator.check_placement(&path) {
				failed.push(UpdateFailure { path, errors: vec![issue] });
				continue;
			}
			if mode.validate {
				let result = validator.validate_property(&path, &value, &staged)?;
				if !result.valid {
					failed.push(UpdateFailure { path, errors: result.errors });
					continue;
				}
			}
			let new_value = (!value.is_null()).then(|| value.clone());
			match set_path(&mut staged, &path, value) {
				Ok(old_value) => changes.push((path, old_value, new_value)),
				Err(err) => {
					let issue = ValidationIssue::new(&path, ValidationCode::InvalidType, err.to_string());
					failed.push(UpdateFailure { path, errors: vec![issue] });
				}
			}
		}

		if !failed.is_empty() {
			self.counters.validation_failures.fetch_add(failed.len() as u64, Ordering::Relaxed);
			if mode.atomic {
				debug!(tenant = %self.tenant_id, failed = failed.len(), "atomic write rejected");
				return Ok(UpdateOutcome { success: false, updated: Vec::new(), failed });
			}
		}

		if !changes.is_empty() {
			doc.preferences = staged;
			self.persist(&mut doc).await?;
			self.invalidate(changes.iter().map(|(path, ..)| path.as_str()));
		}
		drop(guard);

		let updated = changes.iter().map(|(path, ..)| path.clone()).collect();
		if !mode.silent {
			for (path, old_value, new_value) in changes {
				debug!(tenant = %self.tenant_id, path = %path, "preference changed");
				self.publish(PrefEvent::changed(self.tenant_id.clone(), path, old_value, new_value));
			}
		}
		Ok(UpdateOutcome { success: failed.is_empty(), updated, failed })
	}

	/// Reset the given paths (or everything) to schema defaults
	pub async fn reset(&self, paths: Option<&[&str]>) -> ClResult<()> {
		if let Some(paths) = paths {
			for path in paths {
				parse_path(path)?;
			}
		}

		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		match paths {
			Some(paths) => {
				for path in paths.iter().filter(|path| !path.is_empty()) {
					remove_path(&mut doc.preferences, path)?;
				}
			}
			None => doc.preferences = Value::Object(Map::new()),
		}
		self.persist(&mut doc).await?;
		self.cache.clear();
		drop(guard);

		info!(tenant = %self.tenant_id, "preferences reset");
		let mut event = PrefEvent::new(EventKind::PreferencesReset);
		if let Some(paths) = paths {
			event = event.meta("paths", paths.iter().map(|p| Value::from(*p)).collect::<Vec<_>>());
		}
		self.publish(event);
		Ok(())
	}

	// Snapshots //
	//***********//
	/// Snapshot of the stored document
	pub async fn export(&self) -> ClResult<PrefsDocument> {
		let mut doc = self.load().await?;
		let settings = doc.recent_jobs_settings;
		settings.prune(&mut doc.recent_jobs, Timestamp::now());
		Ok(doc)
	}

	/// Load a snapshot.
	///
	/// With `merge` the imported preferences are deep-merged over the current
	/// ones, presets are merged by id and recent jobs are unioned. Invalid
	/// input leaves the tenant untouched.
	pub async fn import(&self, doc: PrefsDocument, opts: ImportOptions) -> ClResult<ImportOutcome> {
		if doc.version > DOCUMENT_VERSION {
			return Err(Error::InvalidArgument(format!(
				"unsupported document version {}",
				doc.version
			)));
		}
		doc.recent_jobs_settings.check()?;
		if opts.validate {
			let result = self.validator().validate(&doc.preferences);
			if !result.valid {
				self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
				return Ok(ImportOutcome { success: false, errors: result.errors });
			}
		}

		let guard = self.write_lock.lock().await;
		let mut current = self.load().await?;
		if opts.merge {
			deep_merge(&mut current.preferences, &doc.preferences);
			for preset in doc.saved_presets {
				match current.saved_presets.iter_mut().find(|p| p.id == preset.id) {
					Some(existing) => *existing = preset,
					None => current.saved_presets.push(preset),
				}
			}
			for job in doc.recent_jobs {
				if !current.recent_jobs.iter().any(|j| j.id == job.id) {
					current.recent_jobs.push(job);
				}
			}
			current.recent_jobs.sort_by_key(|job| job.created_at);
		} else {
			current.preferences = doc.preferences;
			current.saved_presets = doc.saved_presets;
			current.recent_jobs = doc.recent_jobs;
			current.recent_jobs_settings = doc.recent_jobs_settings;
		}

		if current.saved_presets.len() > self.config.max_saved_presets {
			return Err(Error::CapacityExceeded {
				what: "saved presets",
				limit: self.config.max_saved_presets,
			});
		}
		let settings = current.recent_jobs_settings;
		settings.prune(&mut current.recent_jobs, Timestamp::now());

		self.persist(&mut current).await?;
		self.cache.clear();
		drop(guard);

		info!(tenant = %self.tenant_id, merge = opts.merge, "preferences imported");
		self.publish(PrefEvent::new(EventKind::PreferencesImported).meta("merge", opts.merge));
		Ok(ImportOutcome { success: true, errors: Vec::new() })
	}

	/// Overwrite the stored document without validation.
	///
	/// Subscribers get a `preferences_imported` event whose `source` metadata
	/// names where the document came from (`"backup"`, `"rollback"`).
	pub async fn restore_document(&self, mut doc: PrefsDocument, source: &str) -> ClResult<()> {
		doc.tenant_id = self.tenant_id.clone();
		let guard = self.write_lock.lock().await;
		self.persist(&mut doc).await?;
		self.cache.clear();
		drop(guard);

		self.publish(
			PrefEvent::new(EventKind::PreferencesImported).meta("merge", false).meta("source", source),
		);
		Ok(())
	}

	// Presets //
	//*********//
	/// Save a preset; an existing id is replaced in place
	pub async fn save_preset(&self, mut preset: SavedPreset) -> ClResult<()> {
		if preset.id.is_empty() {
			return Err(Error::InvalidArgument("preset id must not be empty".into()));
		}

		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		match doc.saved_presets.iter_mut().find(|p| p.id == preset.id) {
			Some(existing) => {
				preset.created_at = existing.created_at;
				preset.updated_at = Timestamp::now();
				*existing = preset.clone();
			}
			None => {
				if doc.saved_presets.len() >= self.config.max_saved_presets {
					return Err(Error::CapacityExceeded {
						what: "saved presets",
						limit: self.config.max_saved_presets,
					});
				}
				doc.saved_presets.push(preset.clone());
			}
		}
		self.persist(&mut doc).await?;
		drop(guard);

		self.publish(
			PrefEvent::new(EventKind::PresetSaved).meta("id", preset.id).meta("name", preset.name),
		);
		Ok(())
	}

	pub async fn delete_preset(&self, id: &str) -> ClResult<bool> {
		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		let before = doc.saved_presets.len();
		doc.saved_presets.retain(|p| p.id != id);
		if doc.saved_presets.len() == before {
			return Ok(false);
		}
		self.persist(&mut doc).await?;
		drop(guard);

		self.publish(PrefEvent::new(EventKind::PresetDeleted).meta("id", id));
		Ok(true)
	}

	pub async fn get_preset(&self, id: &str) -> ClResult<Option<SavedPreset>> {
		Ok(self.load().await?.saved_presets.into_iter().find(|p| p.id == id))
	}

	pub async fn list_presets(&self) -> ClResult<Vec<SavedPreset>> {
		Ok(self.load().await?.saved_presets)
	}

	// Recent jobs //
	//*************//
	/// Append a job (re-adding an id moves it to the newest position)
	pub async fn add_recent_job(&self, job: RecentJob) -> ClResult<()> {
		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		let job_id = job.id.clone();
		doc.recent_jobs.retain(|j| j.id != job.id);
		doc.recent_jobs.push(job);
		let settings = doc.recent_jobs_settings;
		let pruned = settings.prune(&mut doc.recent_jobs, Timestamp::now());
		self.persist(&mut doc).await?;
		drop(guard);

		if pruned > 0 {
			debug!(tenant = %self.tenant_id, pruned, "recent jobs pruned");
		}
		self.publish(PrefEvent::new(EventKind::RecentJobAdded).meta("id", job_id));
		Ok(())
	}

	/// Recent jobs, oldest first, with expired ones filtered out
	pub async fn recent_jobs(&self) -> ClResult<Vec<RecentJob>> {
		let mut doc = self.load().await?;
		let settings = doc.recent_jobs_settings;
		settings.prune(&mut doc.recent_jobs, Timestamp::now());
		Ok(doc.recent_jobs)
	}

	pub async fn clear_recent_jobs(&self) -> ClResult<usize> {
		let guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		let cleared = doc.recent_jobs.len();
		doc.recent_jobs.clear();
		self.persist(&mut doc).await?;
		drop(guard);

		self.publish(PrefEvent::new(EventKind::RecentJobsCleared).meta("count", cleared));
		Ok(cleared)
	}

	pub async fn update_recent_jobs_settings(&self, settings: RecentJobsSettings) -> ClResult<()> {
		settings.check()?;
		let _guard = self.write_lock.lock().await;
		let mut doc = self.load().await?;
		doc.recent_jobs_settings = settings;
		settings.prune(&mut doc.recent_jobs, Timestamp::now());
		self.persist(&mut doc).await
	}

	// Events //
	//********//
	pub fn subscribe(
		&self,
		target: impl Into<EventTarget>,
		callback: impl Fn(&[PrefEvent]) -> ClResult<()> + Send + Sync + 'static,
		options: SubscribeOptions,
	) -> ClResult<SubscriptionId> {
		self.dispatcher.subscribe(target, callback, options)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.dispatcher.unsubscribe(id)
	}

	/// Publish a collaborator-defined event for this tenant
	pub fn publish_custom(&self, name: &str, metadata: Map<String, Value>) {
		let mut event = PrefEvent::new(EventKind::custom(name));
		event.metadata = metadata;
		self.publish(event);
	}

	/// Deliver every pending batched event now
	pub fn flush_events(&self) -> usize {
		self.dispatcher.flush_all()
	}

	// Schema //
	//********//
	/// Shallow-merge top-level property nodes into the live schema
	pub fn update_schema(&self, partial: SchemaNode) -> ClResult<()> {
		let sections: Vec<String> =
			partial.properties.iter().flat_map(|props| props.keys().cloned()).collect();
		{
			let mut validator = self.validator.write();
			let strict = validator.is_strict();
			let mut schema = validator.schema().clone();
			schema.merge_shallow(partial)?;
			*validator = Arc::new(Validator::new(schema, strict));
		}
		self.cache.clear();

		info!(tenant = %self.tenant_id, sections = ?sections, "schema updated");
		self.publish(PrefEvent::new(EventKind::SchemaUpdated).meta(
			"sections",
			sections.into_iter().map(Value::from).collect::<Vec<_>>(),
		));
		Ok(())
	}

	pub fn stats(&self) -> ServiceStats {
		ServiceStats {
			tenant_id: self.tenant_id.clone(),
			reads: self.counters.reads.load(Ordering::Relaxed),
			writes: self.counters.writes.load(Ordering::Relaxed),
			validation_failures: self.counters.validation_failures.load(Ordering::Relaxed),
			cache: self.cache.stats(),
			events: self.dispatcher.stats(),
		}
	}

	/// Stop timers, flush pending batches and drop subscriptions
	pub async fn destroy(&self) {
		self.cache.destroy().await;
		self.dispatcher.clear();
		debug!(tenant = %self.tenant_id, "preferences service destroyed");
	}
}

impl std::fmt::Debug for PreferencesService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PreferencesService")
			.field("tenant_id", &self.tenant_id)
			.field("store", &self.store)
			.field("in_transaction", &self.in_transaction())
			.finish_non_exhaustive()
	}
}


// vim: ts=4
