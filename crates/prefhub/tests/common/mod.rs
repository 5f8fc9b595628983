//! Common test utilities and helpers
//!
//! Shared setup for the integration tests: manager builders over the memory
//! store and an event recorder.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use prefhub::PrefHubBuilder;
use prefhub::events::{EventTarget, PrefEvent, SubscribeOptions};
use prefhub::prelude::*;
use prefhub_store_adapter_memory::MemoryPrefsStore;

pub fn tenant(id: &str) -> TenantId {
	TenantId::from(id)
}

/// Manager over a fresh in-memory store
pub fn memory_manager() -> (Arc<PreferencesManager>, Arc<MemoryPrefsStore>) {
	let store = Arc::new(MemoryPrefsStore::new());
	let mut builder = PrefHubBuilder::new();
	builder.store(store.clone());
	let manager = builder.build().expect("Failed to build manager");
	(manager, store)
}

pub async fn memory_service(id: &str) -> (Arc<PreferencesManager>, Arc<PreferencesService>) {
	let (manager, _store) = memory_manager();
	let service = manager.create_instance(tenant(id), None).await.expect("Failed to create instance");
	(manager, service)
}

/// Collects every delivered event in delivery order
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<PrefEvent>>>);

impl EventLog {
	pub fn attach(service: &PreferencesService, target: impl Into<EventTarget>) -> Self {
		let log = EventLog::default();
		let sink = log.0.clone();
		service
			.subscribe(
				target,
				move |batch: &[PrefEvent]| {
					sink.lock().extend_from_slice(batch);
					Ok(())
				},
				SubscribeOptions::default(),
			)
			.expect("Failed to subscribe");
		log
	}

	pub fn events(&self) -> Vec<PrefEvent> {
		self.0.lock().clone()
	}

	pub fn kinds(&self) -> Vec<EventKind> {
		self.0.lock().iter().map(|e| e.kind.clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.0.lock().len()
	}
}

// vim: ts=4
