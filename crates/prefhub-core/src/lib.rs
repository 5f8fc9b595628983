//! Preferences engine for prefhub.
//!
//! The engine backs an application's user-settings store. It is built from
//! four layers, leaf-first:
//!
//! - [`cache`]: a bounded recency cache and the TTL-aware [`PreferencesCache`]
//! - [`schema`] and [`validation`]: recursive schema trees and the [`Validator`]
//! - [`events`]: the priority-ordered, filterable, batching [`EventDispatcher`]
//! - [`service`] and [`manager`]: the per-tenant [`PreferencesService`] facade and
//!   the [`PreferencesManager`] that owns them, with backups and transactions
//!
//! Storage I/O is delegated to a [`PrefsStore`](prefhub_types::store_adapter::PrefsStore)
//! adapter injected at construction.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod events;
pub mod manager;
pub mod merge;
pub mod prelude;
pub mod schema;
pub mod service;
pub mod validation;

pub use cache::{BoundedRecencyCache, CacheEntry, CacheStats, PreferencesCache};
pub use config::{CacheConfig, DispatcherConfig, ManagerConfig, ServiceConfig};
pub use events::{EventDispatcher, EventKind, PrefEvent, SubscribeOptions, SubscriptionId};
pub use manager::PreferencesManager;
pub use schema::{SchemaNode, ValueKind};
pub use service::PreferencesService;
pub use validation::{ValidationResult, Validator};

// vim: ts=4
