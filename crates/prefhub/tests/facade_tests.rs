//! Preferences service tests
//!
//! End-to-end reads and writes through the manager, over both store adapters

mod common;

use std::path::Path;
use std::sync::Arc;

use prefhub::PrefHubBuilder;
use prefhub::document::{RecentJob, SavedPreset};
use prefhub::events::EventTarget;
use prefhub::prelude::*;
use prefhub_store_adapter_fs::FsPrefsStore;
use serde_json::json;
use tempfile::TempDir;

use common::*;

async fn open_fs_manager(dir: &Path) -> Arc<PreferencesManager> {
	let store = FsPrefsStore::new(dir.into()).await.expect("Failed to create store");
	let mut builder = PrefHubBuilder::new();
	builder.store(Arc::new(store));
	builder.build().expect("Failed to build manager")
}

#[tokio::test]
async fn test_failed_set_is_invisible() {
	let (manager, store) = memory_manager();
	let service = manager.create_instance(tenant("alice"), None).await.expect("create");
	let log = EventLog::attach(&service, EventTarget::All);
	let writes = store.write_count();

	let outcome =
		service.set("conversion.defaultFormat", json!("bmp"), WriteOptions::default()).await.expect("set");
	assert!(!outcome.success);
	assert_eq!(outcome.errors.len(), 1);
	assert_eq!(store.write_count(), writes);
	assert_eq!(log.len(), 0);
	assert_eq!(service.get("conversion.defaultFormat").await.expect("get"), Some(json!("pdf")));
}

#[tokio::test]
async fn test_root_read_does_not_shadow_paths() {
	let (_manager, service) = memory_service("alice").await;
	service.set("$root", json!(5), WriteOptions::default()).await.expect("set");

	let tree = service.get("").await.expect("get root").expect("root exists");
	assert_eq!(tree["$root"], json!(5));
	assert_eq!(service.get("$root").await.expect("get"), Some(json!(5)));
	assert!(matches!(service.get(".").await, Err(Error::InvalidArgument(_))));

	service.set("$root", json!(6), WriteOptions::default()).await.expect("set");
	assert_eq!(service.get("$root").await.expect("get"), Some(json!(6)));
	let tree = service.get("").await.expect("get root").expect("root exists");
	assert_eq!(tree["$root"], json!(6));
}

#[tokio::test]
async fn test_export_import_between_tenants() {
	let (manager, _store) = memory_manager();
	let alice = manager.create_instance(tenant("alice"), None).await.expect("create");
	let bob = manager.create_instance(tenant("bob"), None).await.expect("create");

	alice.set("appearance.theme", json!("dark"), WriteOptions::default()).await.expect("set");
	alice.save_preset(SavedPreset::new("web", "Web", json!({ "quality": 60 }))).await.expect("preset");
	alice.add_recent_job(RecentJob::new("j1", "report.docx", json!({}))).await.expect("job");

	bob.set("general.language", json!("fr"), WriteOptions::default()).await.expect("set");
	let log = EventLog::attach(&bob, EventTarget::All);

	let snapshot = alice.export().await.expect("export");
	let outcome =
		bob.import(snapshot, ImportOptions { merge: true, validate: true }).await.expect("import");
	assert!(outcome.success);

	assert_eq!(bob.get("appearance.theme").await.expect("get"), Some(json!("dark")));
	assert_eq!(bob.get("general.language").await.expect("get"), Some(json!("fr")));
	assert_eq!(bob.list_presets().await.expect("presets").len(), 1);
	assert_eq!(bob.recent_jobs().await.expect("jobs").len(), 1);
	assert_eq!(bob.export().await.expect("export").tenant_id, tenant("bob"));
	assert_eq!(log.kinds(), vec![EventKind::PreferencesImported]);
}

#[tokio::test]
async fn test_snapshot_wire_shape() {
	let (_manager, service) = memory_service("alice").await;
	service.set("appearance.theme", json!("dark"), WriteOptions::default()).await.expect("set");

	let json = serde_json::to_value(service.export().await.expect("export")).expect("serialize");
	for key in [
		"tenantId",
		"version",
		"createdAt",
		"updatedAt",
		"preferences",
		"savedPresets",
		"recentJobs",
		"recentJobsSettings",
	] {
		assert!(json.get(key).is_some(), "missing {}", key);
	}
	assert_eq!(json["preferences"]["appearance"]["theme"], json!("dark"));
}

#[tokio::test]
async fn test_update_reports_partial_success() {
	let (_manager, service) = memory_service("alice").await;
	let outcome = service
		.update(
			vec![
				("appearance.theme".into(), json!("dark")),
				("performance.workerThreads".into(), json!(64)),
				("privacy.telemetry".into(), json!(true)),
			],
			UpdateOptions::default(),
		)
		.await
		.expect("update");

	assert!(!outcome.success);
	assert_eq!(outcome.updated, vec!["appearance.theme", "privacy.telemetry"]);
	assert_eq!(outcome.failed.len(), 1);
	assert_eq!(outcome.failed[0].path, "performance.workerThreads");
}

#[tokio::test]
async fn test_documents_survive_restart_on_disk() {
	let temp = TempDir::new().expect("Failed to create temp directory");

	let manager = open_fs_manager(temp.path()).await;
	let service = manager.create_instance(tenant("alice"), None).await.expect("create");
	service.set("appearance.fontSize", json!(20), WriteOptions::default()).await.expect("set");
	manager.destroy().await;

	let manager = open_fs_manager(temp.path()).await;
	let service = manager
		.create_instance(tenant("alice"), Some(json!({ "appearance": { "fontSize": 9 } })))
		.await
		.expect("create");
	// Initial data never overrides a stored document
	assert_eq!(service.get("appearance.fontSize").await.expect("get"), Some(json!(20)));
	manager.destroy().await;
}

#[tokio::test]
async fn test_builder_requires_store() {
	let res = PrefHubBuilder::new().build();
	assert!(matches!(res, Err(Error::Config(_))));
}

// vim: ts=4
