//! TTL-aware preferences cache
//!
//! [`PreferencesCache`] composes a [`BoundedRecencyCache`] of [`CacheEntry`]s
//! with time-based expiry, tag-based bulk invalidation, a periodic sweep and
//! hit/miss statistics. All state lives behind a single mutex, so a `get`
//! never observes a half-inserted or half-evicted entry.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::entry::{CacheEntry, CachePriority};
use super::recency::{BoundedRecencyCache, EvictionReason};
use crate::config::CacheConfig;
use crate::prelude::*;

/// Expiry requested for a single `set`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheTtl {
	/// Use `CacheConfig::default_ttl`
	#[default]
	Default,
	Never,
	/// Must be positive
	After(Duration),
}

/// Per-entry options of [`PreferencesCache::set`]
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
	pub ttl: CacheTtl,
	pub tags: BTreeSet<String>,
	pub priority: CachePriority,
	pub metadata: Map<String, Value>,
}

impl SetOptions {
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { ttl: CacheTtl::After(ttl), ..Self::default() }
	}

	pub fn tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.insert(tag.into());
		self
	}

	pub fn priority(mut self, priority: CachePriority) -> Self {
		self.priority = priority;
		self
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	pub sets: u64,
	pub deletes: u64,
	pub evictions: u64,
	pub expirations: u64,
	pub size: usize,
	/// `hits / (hits + misses)`, 0 before the first request
	pub hit_rate: f64,
}

/// Notification delivered to the cache listener
#[derive(Debug, Clone)]
pub enum CacheEvent {
	Evicted { key: String, entry: CacheEntry, reason: EvictionReason },
	Expired { key: String, entry: CacheEntry },
}

pub type CacheListener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct Counters {
	hits: u64,
	misses: u64,
	sets: u64,
	deletes: u64,
	evictions: u64,
	expirations: u64,
}

#[derive(Debug)]
struct CacheState {
	entries: BoundedRecencyCache<CacheEntry>,
	counters: Counters,
}

impl CacheState {
	/// Remove every entry expired at `now`
	fn purge_expired(&mut self, now: Instant, events: &mut Vec<CacheEvent>) -> usize {
		let expired: Vec<String> = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.is_expired_at(now))
			.map(|(key, _)| key.to_string())
			.collect();

		let mut removed = 0;
		for key in expired {
			if let Some(entry) = self.entries.remove(&key) {
				self.counters.expirations += 1;
				removed += 1;
				events.push(CacheEvent::Expired { key, entry });
			}
		}
		removed
	}

	/// Evict up to `count` least recently used entries
	fn evict(&mut self, count: usize, events: &mut Vec<CacheEvent>) {
		for _ in 0..count {
			let Some(evicted) = self.entries.pop_lru() else { break };
			self.counters.evictions += 1;
			events.push(CacheEvent::Evicted {
				key: evicted.key,
				entry: evicted.value,
				reason: evicted.reason,
			});
		}
	}
}

pub struct PreferencesCache {
	config: CacheConfig,
	state: Mutex<CacheState>,
	listener: RwLock<Option<CacheListener>>,
	sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl PreferencesCache {
	pub fn new(config: CacheConfig) -> ClResult<Self> {
		config.validate()?;
		let entries = BoundedRecencyCache::new(config.max_size)?;
		Ok(Self {
			config,
			state: Mutex::new(CacheState { entries, counters: Counters::default() }),
			listener: RwLock::new(None),
			sweeper: Mutex::new(None),
		})
	}

	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	pub fn set_listener(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) {
		*self.listener.write() = Some(Arc::new(listener));
	}

	pub fn clear_listener(&self) {
		*self.listener.write() = None;
	}

	/// Deliver notifications with no cache lock held
	fn notify(&self, events: Vec<CacheEvent>) {
		if events.is_empty() {
			return;
		}
		let Some(listener) = self.listener.read().clone() else { return };
		for event in &events {
			if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
				let key = match event {
					CacheEvent::Evicted { key, .. } | CacheEvent::Expired { key, .. } => key,
				};
				warn!(key = %key, "cache listener panicked");
			}
		}
	}

	fn resolve_ttl(&self, ttl: CacheTtl) -> ClResult<Option<Duration>> {
		match ttl {
			CacheTtl::Default => Ok(self.config.default_ttl),
			CacheTtl::Never => Ok(None),
			CacheTtl::After(ttl) if ttl.is_zero() => {
				Err(Error::InvalidArgument("cache TTL must be positive".into()))
			}
			CacheTtl::After(ttl) => Ok(Some(ttl)),
		}
	}

	/// Returns a copy of the cached value.
	///
	/// An expired entry is treated as a miss: it is removed and counted as an
	/// expiration.
	pub fn get(&self, key: &str) -> Option<Value> {
		let now = Instant::now();
		let mut events = Vec::new();

		let value = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			match state.entries.peek(key).map(|entry| entry.is_expired_at(now)) {
				None => {
					state.counters.misses += 1;
					None
				}
				Some(true) => {
					if let Some(entry) = state.entries.remove(key) {
						events.push(CacheEvent::Expired { key: key.to_string(), entry });
					}
					state.counters.expirations += 1;
					state.counters.misses += 1;
					None
				}
				Some(false) => {
					state.counters.hits += 1;
					state.entries.get_mut(key).map(|entry| {
						entry.touch(now);
						entry.value.clone()
					})
				}
			}
		};

		self.notify(events);
		value
	}

	/// Insert or replace a value.
	///
	/// A zero TTL is rejected before anything is mutated. When the cache is
	/// full and `key` is new, expired entries are purged first; if that does
	/// not free a slot, `CacheConfig::eviction_batch()` least recently used
	/// entries are evicted.
	pub fn set(&self, key: &str, value: Value, opts: SetOptions) -> ClResult<()> {
		let ttl = self.resolve_ttl(opts.ttl)?;
		if key.is_empty() {
			return Err(Error::InvalidKey(key.to_string()));
		}

		let now = Instant::now();
		let mut entry = CacheEntry::new(key, value, ttl);
		entry.priority = opts.priority;
		entry.tags = opts.tags;
		entry.metadata = opts.metadata;

		let mut events = Vec::new();
		{
			let mut guard = self.state.lock();
			let state = &mut *guard;
			if !state.entries.has(key) && state.entries.len() >= state.entries.capacity() {
				state.purge_expired(now, &mut events);
				if state.entries.len() >= state.entries.capacity() {
					state.evict(self.config.eviction_batch(), &mut events);
				}
			}
			state.entries.set(key, entry)?;
			state.counters.sets += 1;
		}

		let evicted =
			events.iter().filter(|event| matches!(event, CacheEvent::Evicted { .. })).count();
		if evicted > 0 {
			debug!(evicted, "cache evicted entries under size pressure");
		}
		self.notify(events);
		Ok(())
	}

	pub fn delete(&self, key: &str) -> bool {
		let mut state = self.state.lock();
		let removed = state.entries.delete(key);
		if removed {
			state.counters.deletes += 1;
		}
		removed
	}

	/// True if a live (non-expired) entry exists; does not touch recency
	pub fn has(&self, key: &str) -> bool {
		let now = Instant::now();
		self.state.lock().entries.peek(key).is_some_and(|entry| !entry.is_expired_at(now))
	}

	pub fn clear(&self) {
		self.state.lock().entries.clear();
	}

	/// Look up several keys at once, absent keys are omitted
	pub fn get_multiple<'a>(
		&self,
		keys: impl IntoIterator<Item = &'a str>,
	) -> HashMap<String, Value> {
		keys.into_iter()
			.filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
			.collect()
	}

	/// Insert several values sharing the same options.
	///
	/// The TTL is checked once up front so an invalid TTL inserts nothing.
	pub fn set_multiple(
		&self,
		items: impl IntoIterator<Item = (String, Value)>,
		opts: &SetOptions,
	) -> ClResult<()> {
		self.resolve_ttl(opts.ttl)?;
		for (key, value) in items {
			self.set(&key, value, opts.clone())?;
		}
		Ok(())
	}

	/// Remove every entry carrying `tag`, returns the number removed
	pub fn delete_by_tag(&self, tag: &str) -> usize {
		let mut guard = self.state.lock();
		let state = &mut *guard;
		let tagged: Vec<String> = state
			.entries
			.iter()
			.filter(|(_, entry)| entry.has_tag(tag))
			.map(|(key, _)| key.to_string())
			.collect();
		for key in &tagged {
			state.entries.delete(key);
		}
		state.counters.deletes += tagged.len() as u64;
		tagged.len()
	}

	/// Live values carrying `tag`; recency is not touched
	pub fn get_by_tag(&self, tag: &str) -> HashMap<String, Value> {
		let now = Instant::now();
		self.state
			.lock()
			.entries
			.iter()
			.filter(|(_, entry)| entry.has_tag(tag) && !entry.is_expired_at(now))
			.map(|(key, entry)| (key.to_string(), entry.value.clone()))
			.collect()
	}

	/// Delete all currently expired entries, returns the number removed
	pub fn cleanup(&self) -> usize {
		let mut events = Vec::new();
		let removed = self.state.lock().purge_expired(Instant::now(), &mut events);
		if removed > 0 {
			debug!(removed, "cache cleanup removed expired entries");
		}
		self.notify(events);
		removed
	}

	pub fn stats(&self) -> CacheStats {
		let state = self.state.lock();
		let c = &state.counters;
		let requests = c.hits + c.misses;
		let hit_rate = if requests == 0 { 0.0 } else { c.hits as f64 / requests as f64 };
		CacheStats {
			hits: c.hits,
			misses: c.misses,
			sets: c.sets,
			deletes: c.deletes,
			evictions: c.evictions,
			expirations: c.expirations,
			size: state.entries.len(),
			hit_rate,
		}
	}

	/// Keys currently held (expired ones included until swept), least recently used first
	pub fn keys(&self) -> Vec<String> {
		self.state.lock().entries.keys()
	}

	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Start the periodic expiry sweep on the current tokio runtime.
	///
	/// Returns false when called outside a runtime; `cleanup()` then has to be
	/// driven by the caller.
	pub fn start_sweeper(self: &Arc<Self>) -> bool {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!("no tokio runtime, cache sweeper not started");
			return false;
		};

		let cache = Arc::downgrade(self);
		let period = self.config.cleanup_interval;
		let handle = runtime.spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately
			interval.tick().await;
			loop {
				interval.tick().await;
				let Some(cache) = cache.upgrade() else { break };
				cache.cleanup();
			}
		});

		if let Some(previous) = self.sweeper.lock().replace(handle) {
			previous.abort();
		}
		true
	}

	/// Stop the sweeper and drop every entry
	pub async fn destroy(&self) {
		let sweeper = self.sweeper.lock().take();
		if let Some(sweeper) = sweeper {
			sweeper.abort();
			if let Err(err) = sweeper.await
				&& !err.is_cancelled()
			{
				warn!("cache sweeper ended abnormally: {}", err);
			}
		}
		self.clear();
	}
}

impl Drop for PreferencesCache {
	fn drop(&mut self) {
		if let Some(sweeper) = self.sweeper.get_mut().take() {
			sweeper.abort();
		}
	}
}

impl std::fmt::Debug for PreferencesCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PreferencesCache")
			.field("config", &self.config)
			.field("len", &self.len())
			.finish_non_exhaustive()
	}
}


// vim: ts=4
