//! prefhub is an embeddable, multi-tenant user preferences engine.
//!
//! # Features
//!
//! - Per-tenant preference trees addressed by dotted paths
//! - Recursive schemas with defaults, ranges, patterns and custom rules
//!     - invalid writes are rejected with structured issues
//!     - invalid stored data is sanitized on read
//! - TTL cache with recency eviction, tag invalidation and a background sweep
//! - Change events with priorities, filters and batching
//! - Saved presets and a bounded recent-jobs history
//! - Backups and all-or-nothing transactions
//! - Pluggable storage (in-memory and JSON-on-disk adapters included)

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

// Re-export shared types and the store adapter trait from prefhub-types
pub use prefhub_types::document;
pub use prefhub_types::error;
pub use prefhub_types::store_adapter;
pub use prefhub_types::types;
pub use prefhub_types::utils;
pub use prefhub_types::validation as issues;

// Engine re-exports
pub use prefhub_core::cache;
pub use prefhub_core::config;
pub use prefhub_core::events;
pub use prefhub_core::manager;
pub use prefhub_core::merge;
pub use prefhub_core::schema;
pub use prefhub_core::service;
pub use prefhub_core::validation;

// Local modules
pub mod app;
pub mod prelude;

pub use crate::app::PrefHubBuilder;
pub use prefhub_core::{
	ManagerConfig, PreferencesManager, PreferencesService, SchemaNode, ServiceConfig,
};

// vim: ts=4
