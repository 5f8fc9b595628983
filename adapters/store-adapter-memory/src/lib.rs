//! In-memory preferences store.
//!
//! Documents live in a process-local map and are lost on shutdown. Write
//! failures can be injected to exercise the engine's error paths.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use prefhub::{document::PrefsDocument, prelude::*, store_adapter::PrefsStore};

#[derive(Debug, Default)]
pub struct MemoryPrefsStore {
	documents: RwLock<HashMap<TenantId, PrefsDocument>>,
	writes: AtomicU64,
	fail_writes: AtomicBool,
}

impl MemoryPrefsStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of successful writes so far
	pub fn write_count(&self) -> u64 {
		self.writes.load(Ordering::Relaxed)
	}

	/// Make every subsequent write fail with `Error::Store`
	pub fn set_fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::Relaxed);
	}

	pub fn tenants(&self) -> Vec<TenantId> {
		let mut tenants: Vec<TenantId> = self.documents.read().keys().cloned().collect();
		tenants.sort();
		tenants
	}

	pub fn remove(&self, tenant_id: &TenantId) -> bool {
		self.documents.write().remove(tenant_id).is_some()
	}
}

#[async_trait]
impl PrefsStore for MemoryPrefsStore {
	async fn read(&self, tenant_id: &TenantId) -> ClResult<Option<PrefsDocument>> {
		Ok(self.documents.read().get(tenant_id).cloned())
	}

	async fn write(&self, tenant_id: &TenantId, doc: &PrefsDocument) -> ClResult<()> {
		if self.fail_writes.load(Ordering::Relaxed) {
			warn!(tenant = %tenant_id, "memory store: injected write failure");
			return Err(Error::Store(format!("write rejected for tenant '{}'", tenant_id)));
		}
		self.documents.write().insert(tenant_id.clone(), doc.clone());
		self.writes.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}
}

// vim: ts=4
