//! Cache behavior tests
//!
//! Capacity, recency eviction and TTL expiry of the two cache layers

use prefhub::cache::{BoundedRecencyCache, PreferencesCache, SetOptions};
use prefhub::config::CacheConfig;
use prefhub::prelude::*;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_capacity_invariant_holds_after_every_set() {
	let mut cache = BoundedRecencyCache::new(7).expect("capacity is valid");
	for i in 0..200_u64 {
		// Mix fresh keys with re-sets and reads of older ones
		let key = format!("k{}", (i * 31) % 23);
		cache.set(key.as_str(), i).expect("key is valid");
		if i % 3 == 0 {
			let _ = cache.get(&format!("k{}", i % 11));
		}
		assert!(cache.len() <= 7, "size {} after set #{}", cache.len(), i);
	}
}

#[test]
fn test_lru_correctness() {
	let mut cache = BoundedRecencyCache::new(2).expect("capacity is valid");
	cache.set("A", 1).expect("set A");
	cache.set("B", 2).expect("set B");
	assert_eq!(cache.get("A"), Some(&1));

	let evicted = cache.set("C", 3).expect("set C").expect("B is evicted");
	assert_eq!(evicted.key, "B");
	assert!(cache.has("A"));
	assert!(cache.has("C"));
	assert!(!cache.has("B"));
}

#[test]
fn test_invalid_construction_and_keys() {
	assert!(matches!(BoundedRecencyCache::<u8>::new(0), Err(Error::Config(_))));
	let mut cache = BoundedRecencyCache::new(1).expect("capacity is valid");
	assert!(matches!(cache.set("", 1), Err(Error::InvalidKey(_))));
}

#[test]
fn test_ttl_expiry_counts_expiration_not_eviction() {
	let cache = PreferencesCache::new(CacheConfig::default()).expect("valid config");
	cache.set("k", json!("v"), SetOptions::with_ttl(Duration::from_millis(10))).expect("set k");
	std::thread::sleep(Duration::from_millis(25));

	assert_eq!(cache.get("k"), None);
	let stats = cache.stats();
	assert_eq!(stats.expirations, 1);
	assert_eq!(stats.evictions, 0);
	assert_eq!(stats.misses, 1);
}

#[test]
fn test_size_pressure_scenario() {
	let config = CacheConfig { max_size: 2, ..CacheConfig::default() };
	let cache = PreferencesCache::new(config).expect("valid config");
	cache.set("a", json!(1), SetOptions::default()).expect("set a");
	cache.set("b", json!(2), SetOptions::default()).expect("set b");
	cache.set("c", json!(3), SetOptions::default()).expect("set c");

	let stats = cache.stats();
	assert_eq!(stats.evictions, 1);
	assert_eq!(stats.size, 2);
	assert!(cache.has("c"));
	assert_eq!(usize::from(cache.has("a")) + usize::from(cache.has("b")), 1);
}

#[test]
fn test_zero_ttl_rejected_without_mutation() {
	let cache = PreferencesCache::new(CacheConfig::default()).expect("valid config");
	cache.set("k", json!(1), SetOptions::default()).expect("set k");

	let res = cache.set("k", json!(2), SetOptions::with_ttl(Duration::ZERO));
	assert!(matches!(res, Err(Error::InvalidArgument(_))));
	assert_eq!(cache.get("k"), Some(json!(1)));
	assert_eq!(cache.stats().sets, 1);
}

#[test]
fn test_hit_rate() {
	let cache = PreferencesCache::new(CacheConfig::default()).expect("valid config");
	assert!(cache.stats().hit_rate.abs() < f64::EPSILON);
	cache.set("k", json!(1), SetOptions::default()).expect("set k");
	cache.get("k");
	cache.get("missing");
	assert!((cache.stats().hit_rate - 0.5).abs() < f64::EPSILON);
}

// vim: ts=4
