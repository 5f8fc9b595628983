//! Fixed-capacity key/value map with least-recently-used eviction
//!
//! Recency is tracked by a logical clock bumped on every `get`/`set` of a key.
//! The underlying LRU list keeps a total order, so two keys can never share
//! the same recency and the least recently touched key is always unique.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;

use crate::prelude::*;

/// Why an entry left the cache without being deleted explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionReason {
	Capacity,
}

/// Notification payload for an evicted entry
#[derive(Debug, Clone)]
pub struct Evicted<V> {
	pub key: String,
	pub value: V,
	pub reason: EvictionReason,
}

/// Observer called for every eviction
pub type EvictionListener<V> = Box<dyn Fn(&Evicted<V>) + Send + Sync>;

struct Slot<V> {
	value: V,
	recency: u64,
}

pub struct BoundedRecencyCache<V> {
	entries: LruCache<String, Slot<V>>,
	clock: u64,
	listener: Option<EvictionListener<V>>,
}

impl<V> BoundedRecencyCache<V> {
	/// Create a cache holding at most `capacity` entries
	pub fn new(capacity: usize) -> ClResult<Self> {
		let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
			Error::Config("recency cache capacity must be greater than zero".into())
		})?;
		Ok(Self { entries: LruCache::new(capacity), clock: 0, listener: None })
	}

	pub fn set_eviction_listener(&mut self, listener: EvictionListener<V>) {
		self.listener = Some(listener);
	}

	/// Look up a key and mark it as most recently used
	pub fn get(&mut self, key: &str) -> Option<&V> {
		self.get_mut(key).map(|value| &*value)
	}

	/// Mutable lookup, also marks the key as most recently used
	pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
		let tick = self.clock + 1;
		match self.entries.get_mut(key) {
			Some(slot) => {
				slot.recency = tick;
				self.clock = tick;
				Some(&mut slot.value)
			}
			None => None,
		}
	}

	/// Look up a key without touching its recency
	pub fn peek(&self, key: &str) -> Option<&V> {
		self.entries.peek(key).map(|slot| &slot.value)
	}

	/// Insert or replace a value.
	///
	/// When the cache is full and `key` is new, the least recently used entry
	/// is evicted first and returned.
	pub fn set(&mut self, key: impl Into<String>, value: V) -> ClResult<Option<Evicted<V>>> {
		let key = key.into();
		if key.is_empty() {
			return Err(Error::InvalidKey(key));
		}

		self.clock += 1;
		let tick = self.clock;
		if let Some(slot) = self.entries.get_mut(&key) {
			slot.value = value;
			slot.recency = tick;
			return Ok(None);
		}

		let evicted =
			if self.entries.len() >= self.entries.cap().get() { self.pop_lru() } else { None };
		self.entries.put(key, Slot { value, recency: tick });
		Ok(evicted)
	}

	/// Evict the least recently used entry (reason: capacity)
	pub fn pop_lru(&mut self) -> Option<Evicted<V>> {
		let (key, slot) = self.entries.pop_lru()?;
		let evicted = Evicted { key, value: slot.value, reason: EvictionReason::Capacity };
		if let Some(listener) = &self.listener {
			listener(&evicted);
		}
		Some(evicted)
	}

	pub fn delete(&mut self, key: &str) -> bool {
		self.entries.pop(key).is_some()
	}

	/// Remove a key and hand back its value
	pub fn remove(&mut self, key: &str) -> Option<V> {
		self.entries.pop(key).map(|slot| slot.value)
	}

	pub fn has(&self, key: &str) -> bool {
		self.entries.contains(key)
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.entries.cap().get()
	}

	/// Logical timestamp of the last access of `key`
	pub fn recency(&self, key: &str) -> Option<u64> {
		self.entries.peek(key).map(|slot| slot.recency)
	}

	/// Iterate from the least to the most recently used entry
	pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
		self.entries.iter().rev().map(|(key, slot)| (key.as_str(), &slot.value))
	}

	/// Snapshot of the keys, least recently used first
	pub fn keys(&self) -> Vec<String> {
		self.iter().map(|(key, _)| key.to_string()).collect()
	}
}

impl<V: Clone> BoundedRecencyCache<V> {
	/// Snapshot of the values, least recently used first
	pub fn values(&self) -> Vec<V> {
		self.iter().map(|(_, value)| value.clone()).collect()
	}
}

impl<V> std::fmt::Debug for BoundedRecencyCache<V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BoundedRecencyCache")
			.field("len", &self.entries.len())
			.field("capacity", &self.entries.cap())
			.field("clock", &self.clock)
			.field("listener", &self.listener.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::Mutex;

	#[test]
	fn test_zero_capacity_is_config_error() {
		assert!(matches!(BoundedRecencyCache::<u32>::new(0), Err(Error::Config(_))));
	}

	#[test]
	fn test_empty_key_rejected() {
		let mut cache = BoundedRecencyCache::new(2).unwrap();
		assert!(matches!(cache.set("", 1), Err(Error::InvalidKey(_))));
		assert!(cache.is_empty());
	}

	#[test]
	fn test_get_refreshes_recency() {
		let mut cache = BoundedRecencyCache::new(2).unwrap();
		cache.set("A", 1).unwrap();
		cache.set("B", 2).unwrap();
		assert_eq!(cache.get("A"), Some(&1));

		let evicted = cache.set("C", 3).unwrap().unwrap();
		assert_eq!(evicted.key, "B");
		assert_eq!(evicted.reason, EvictionReason::Capacity);
		assert!(cache.has("A"));
		assert!(cache.has("C"));
		assert!(!cache.has("B"));
	}

	#[test]
	fn test_capacity_invariant_holds_after_every_set() {
		let mut cache = BoundedRecencyCache::new(3).unwrap();
		for i in 0..50 {
			cache.set(format!("k{}", i % 7), i).unwrap();
			if i % 3 == 0 {
				cache.get(&format!("k{}", i % 5));
			}
			assert!(cache.len() <= 3);
		}
	}

	#[test]
	fn test_overwrite_existing_key_never_evicts() {
		let mut cache = BoundedRecencyCache::new(2).unwrap();
		cache.set("a", 1).unwrap();
		cache.set("b", 2).unwrap();
		assert!(cache.set("a", 10).unwrap().is_none());
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.peek("a"), Some(&10));
	}

	#[test]
	fn test_recency_clock_is_monotonic() {
		let mut cache = BoundedRecencyCache::new(4).unwrap();
		cache.set("a", 1).unwrap();
		cache.set("b", 2).unwrap();
		let a_before = cache.recency("a").unwrap();
		assert!(cache.recency("b").unwrap() > a_before);
		cache.get("a");
		assert!(cache.recency("a").unwrap() > cache.recency("b").unwrap());
		// peek does not touch
		let a_now = cache.recency("a");
		cache.peek("a");
		assert_eq!(cache.recency("a"), a_now);
	}

	#[test]
	fn test_keys_and_values_in_recency_order() {
		let mut cache = BoundedRecencyCache::new(3).unwrap();
		cache.set("x", 1).unwrap();
		cache.set("y", 2).unwrap();
		cache.set("z", 3).unwrap();
		cache.get("x");
		assert_eq!(cache.keys(), vec!["y", "z", "x"]);
		assert_eq!(cache.values(), vec![2, 3, 1]);
	}

	#[test]
	fn test_eviction_listener_notified() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let mut cache = BoundedRecencyCache::new(1).unwrap();
		let sink = seen.clone();
		cache.set_eviction_listener(Box::new(move |evicted: &Evicted<i32>| {
			sink.lock().unwrap().push((evicted.key.clone(), evicted.value));
		}));
		cache.set("first", 1).unwrap();
		cache.set("second", 2).unwrap();
		assert_eq!(*seen.lock().unwrap(), vec![("first".to_string(), 1)]);
	}

	#[test]
	fn test_delete_and_clear() {
		let mut cache = BoundedRecencyCache::new(3).unwrap();
		cache.set("a", 1).unwrap();
		cache.set("b", 2).unwrap();
		assert!(cache.delete("a"));
		assert!(!cache.delete("a"));
		assert_eq!(cache.remove("b"), Some(2));
		cache.set("c", 3).unwrap();
		cache.clear();
		assert!(cache.is_empty());
		assert_eq!(cache.capacity(), 3);
	}
}

// vim: ts=4
