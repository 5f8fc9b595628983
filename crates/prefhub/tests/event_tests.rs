//! Event dispatch tests
//!
//! Priority ordering, batching and re-entrant publishing, both on a bare
//! dispatcher and through the preferences service

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prefhub::config::DispatcherConfig;
use prefhub::events::{EventDispatcher, EventTarget, PathFilter};
use prefhub::prelude::*;
use serde_json::json;

use common::*;

fn event(name: &str) -> PrefEvent {
	PrefEvent::new(EventKind::custom(name))
}

#[test]
fn test_priority_ordering() {
	let dispatcher = EventDispatcher::new(DispatcherConfig::default());
	let order = Arc::new(Mutex::new(Vec::new()));
	for priority in [1, 10, 5] {
		let order = order.clone();
		dispatcher
			.subscribe(
				EventTarget::All,
				move |_: &[PrefEvent]| {
					order.lock().push(priority);
					Ok(())
				},
				SubscribeOptions::default().priority(priority),
			)
			.expect("subscribe");
	}

	dispatcher.publish(event("ping"));
	assert_eq!(*order.lock(), vec![10, 5, 1]);
}

#[test]
fn test_batches_of_three_in_publish_order() {
	let dispatcher = EventDispatcher::new(DispatcherConfig::default());
	let batches: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
	let sink = batches.clone();
	dispatcher
		.subscribe(
			EventTarget::All,
			move |batch: &[PrefEvent]| {
				sink.lock().push(batch.iter().map(|e| e.kind.to_string()).collect());
				Ok(())
			},
			SubscribeOptions::default().batch(3, Duration::ZERO),
		)
		.expect("subscribe");

	for name in ["e1", "e2", "e3", "e4", "e5", "e6", "e7"] {
		dispatcher.publish(event(name));
	}
	assert_eq!(*batches.lock(), vec![vec!["e1", "e2", "e3"], vec!["e4", "e5", "e6"]]);
}

#[test]
fn test_reentrant_publish_is_queued() {
	let dispatcher = EventDispatcher::new(DispatcherConfig::default());
	let log = Arc::new(Mutex::new(Vec::new()));

	// First subscriber of "a" publishes "b" from inside its callback
	{
		let log = log.clone();
		let nested = dispatcher.clone();
		dispatcher
			.subscribe(
				EventKind::custom("a"),
				move |_: &[PrefEvent]| {
					log.lock().push("a:first");
					nested.publish(event("b"));
					Ok(())
				},
				SubscribeOptions::default().priority(2),
			)
			.expect("subscribe");
	}
	for (target, label) in [("a", "a:second"), ("b", "b")] {
		let log = log.clone();
		dispatcher
			.subscribe(
				EventKind::custom(target),
				move |_: &[PrefEvent]| {
					log.lock().push(label);
					Ok(())
				},
				SubscribeOptions::default(),
			)
			.expect("subscribe");
	}

	dispatcher.publish(event("a"));
	assert_eq!(*log.lock(), vec!["a:first", "a:second", "b"]);
}

#[tokio::test]
async fn test_service_events_respect_path_filters() {
	let (_manager, service) = memory_service("alice").await;
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = seen.clone();
	service
		.subscribe(
			EventKind::PreferenceChanged,
			move |batch: &[PrefEvent]| {
				sink.lock().extend(batch.iter().filter_map(|e| e.path.clone()));
				Ok(())
			},
			SubscribeOptions::default().path(PathFilter::prefix("appearance")),
		)
		.expect("subscribe");

	service.set("appearance.theme", json!("dark"), WriteOptions::default()).await.expect("set");
	service.set("general.language", json!("de"), WriteOptions::default()).await.expect("set");
	service.set("appearance.fontSize", json!(18), WriteOptions::default()).await.expect("set");
	assert_eq!(*seen.lock(), vec!["appearance.theme", "appearance.fontSize"]);
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_others() {
	let (_manager, service) = memory_service("alice").await;
	service
		.subscribe(
			EventTarget::All,
			|_: &[PrefEvent]| Err(Error::Internal("subscriber is broken".into())),
			SubscribeOptions::default().priority(10),
		)
		.expect("subscribe");
	let log = EventLog::attach(&service, EventTarget::All);

	let outcome =
		service.set("appearance.theme", json!("dark"), WriteOptions::default()).await.expect("set");
	assert!(outcome.success);
	assert_eq!(log.kinds(), vec![EventKind::PreferenceChanged]);
	assert_eq!(service.stats().events.errors, 1);
}

#[tokio::test]
async fn test_batch_timeout_flushes_partial_batch() {
	let (_manager, service) = memory_service("alice").await;
	let batches: Arc<Mutex<Vec<usize>>> = Arc::default();
	let sink = batches.clone();
	service
		.subscribe(
			EventTarget::All,
			move |batch: &[PrefEvent]| {
				sink.lock().push(batch.len());
				Ok(())
			},
			SubscribeOptions::default().batch(10, Duration::from_millis(20)),
		)
		.expect("subscribe");

	service.set("appearance.theme", json!("dark"), WriteOptions::default()).await.expect("set");
	service.set("appearance.fontSize", json!(20), WriteOptions::default()).await.expect("set");
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(*batches.lock(), vec![2]);
}

// vim: ts=4
