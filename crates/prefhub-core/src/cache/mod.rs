//! Caching layer: entries, the bounded recency cache and the TTL cache on top

pub mod entry;
pub mod recency;
pub mod ttl;

pub use entry::{CacheEntry, CachePriority};
pub use recency::{BoundedRecencyCache, Evicted, EvictionListener, EvictionReason};
pub use ttl::{CacheEvent, CacheListener, CacheStats, CacheTtl, PreferencesCache, SetOptions};

// vim: ts=4
