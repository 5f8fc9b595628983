//! Priority-ordered, filterable, batching event dispatcher
//!
//! `publish` appends the event to a FIFO queue. If no dispatch is running the
//! caller drains the queue; otherwise (a subscriber publishing from inside its
//! callback, or another thread publishing concurrently) the event waits in the
//! queue and is dispatched by the running drain loop after the current event
//! has reached all of its subscribers. Filters and callbacks always run with
//! no dispatcher lock held.
//!
//! A batch that reaches its size and its timeout in the same tick is flushed
//! by the timeout first: expired batches are delivered before the next event
//! is appended to any buffer.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::event::PrefEvent;
use super::subscription::{
	EventPredicate, EventSubscription, EventTarget, SubscribeOptions, SubscriptionId,
};
use crate::config::DispatcherConfig;
use crate::prelude::*;

/// Handle of a global filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

/// Reported when a subscriber fails or an event cannot be dispatched
#[derive(Debug, Clone)]
pub struct DispatchFailure {
	/// `None` for failures not tied to one subscriber (queue overflow, global filter)
	pub subscription_id: Option<SubscriptionId>,
	pub events: Vec<PrefEvent>,
	pub message: String,
}

pub type ErrorHandler = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
	pub published: u64,
	/// Events handed to callbacks (a batch of 3 counts 3)
	pub delivered: u64,
	pub callbacks: u64,
	pub batches: u64,
	/// Events stopped by a global filter
	pub filtered: u64,
	/// Events rejected because the queue was full
	pub dropped: u64,
	pub errors: u64,
	pub subscriptions: usize,
	pub pending: usize,
	pub queued: usize,
}

#[derive(Default)]
struct Counters {
	published: AtomicU64,
	delivered: AtomicU64,
	callbacks: AtomicU64,
	batches: AtomicU64,
	filtered: AtomicU64,
	dropped: AtomicU64,
	errors: AtomicU64,
}

struct SubscriptionSlot {
	sub: Arc<EventSubscription>,
	pending: Vec<PrefEvent>,
	batch_started: Option<Instant>,
	/// Bumped every time a new batch starts, so stale timers are ignored
	generation: u64,
}

impl SubscriptionSlot {
	fn take_batch(&mut self) -> Vec<PrefEvent> {
		self.batch_started = None;
		std::mem::take(&mut self.pending)
	}

	fn batch_expired(&self, now: Instant) -> bool {
		let timeout = self.sub.options.batch_timeout;
		!timeout.is_zero()
			&& !self.pending.is_empty()
			&& self.batch_started.is_some_and(|started| now >= started + timeout)
	}
}

#[derive(Default)]
struct Registry {
	subs: BTreeMap<SubscriptionId, SubscriptionSlot>,
	global_filters: BTreeMap<FilterId, EventPredicate>,
}

#[derive(Default)]
struct Queue {
	events: VecDeque<PrefEvent>,
	draining: bool,
}

struct DispatcherInner {
	config: DispatcherConfig,
	registry: Mutex<Registry>,
	queue: Mutex<Queue>,
	error_handler: RwLock<Option<ErrorHandler>>,
	next_id: AtomicU64,
	next_seq: AtomicU64,
	counters: Counters,
}

/// Cloneable handle to a shared dispatcher
#[derive(Clone)]
pub struct EventDispatcher {
	inner: Arc<DispatcherInner>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"subscriber panicked".to_string()
	}
}

impl EventDispatcher {
	pub fn new(config: DispatcherConfig) -> Self {
		Self {
			inner: Arc::new(DispatcherInner {
				config,
				registry: Mutex::new(Registry::default()),
				queue: Mutex::new(Queue::default()),
				error_handler: RwLock::new(None),
				next_id: AtomicU64::new(1),
				next_seq: AtomicU64::new(1),
				counters: Counters::default(),
			}),
		}
	}

	/// Register a callback for one event kind or for all kinds
	pub fn subscribe(
		&self,
		target: impl Into<EventTarget>,
		callback: impl Fn(&[PrefEvent]) -> ClResult<()> + Send + Sync + 'static,
		options: SubscribeOptions,
	) -> ClResult<SubscriptionId> {
		let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
		let sub = EventSubscription::new(id, target.into(), Arc::new(callback), options)?;
		debug!(subscription = %id, target = ?sub.target, "subscribed");

		self.inner.registry.lock().subs.insert(
			id,
			SubscriptionSlot {
				sub: Arc::new(sub),
				pending: Vec::new(),
				batch_started: None,
				generation: 0,
			},
		);
		Ok(id)
	}

	/// Remove a subscription; a pending batch is delivered first
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let slot = self.inner.registry.lock().subs.remove(&id);
		let Some(mut slot) = slot else { return false };

		let pending = slot.take_batch();
		if !pending.is_empty() {
			self.deliver(&slot.sub, pending);
		}
		slot.sub.deactivate();
		debug!(subscription = %id, "unsubscribed");
		true
	}

	pub fn subscription_count(&self) -> usize {
		self.inner.registry.lock().subs.len()
	}

	/// Add a filter every event must pass before reaching any subscriber
	pub fn add_global_filter(&self, f: impl Fn(&PrefEvent) -> bool + Send + Sync + 'static) -> FilterId {
		let id = FilterId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
		self.inner.registry.lock().global_filters.insert(id, Arc::new(f));
		id
	}

	pub fn remove_global_filter(&self, id: FilterId) -> bool {
		self.inner.registry.lock().global_filters.remove(&id).is_some()
	}

	/// Receive subscriber failures and dropped events
	pub fn set_error_handler(&self, handler: impl Fn(&DispatchFailure) + Send + Sync + 'static) {
		*self.inner.error_handler.write() = Some(Arc::new(handler));
	}

	/// Publish an event to every matching subscription
	pub fn publish(&self, mut event: PrefEvent) {
		event.seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
		self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

		{
			let mut queue = self.inner.queue.lock();
			if queue.events.len() >= self.inner.config.max_queue {
				drop(queue);
				self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
				self.report(DispatchFailure {
					subscription_id: None,
					events: vec![event],
					message: format!("event queue is full ({} events)", self.inner.config.max_queue),
				});
				return;
			}
			queue.events.push_back(event);
			if queue.draining {
				return;
			}
			queue.draining = true;
		}

		loop {
			let next = {
				let mut queue = self.inner.queue.lock();
				match queue.events.pop_front() {
					Some(event) => event,
					None => {
						queue.draining = false;
						break;
					}
				}
			};
			self.dispatch(next);
		}
	}

	fn dispatch(&self, event: PrefEvent) {
		self.flush_expired_batches();

		let (candidates, filters) = {
			let registry = self.inner.registry.lock();
			let candidates: Vec<Arc<EventSubscription>> = registry
				.subs
				.values()
				.filter(|slot| slot.sub.target.matches(&event.kind))
				.map(|slot| slot.sub.clone())
				.collect();
			let filters: Vec<EventPredicate> = registry.global_filters.values().cloned().collect();
			(candidates, filters)
		};

		for filter in filters {
			match catch_unwind(AssertUnwindSafe(|| filter(&event))) {
				Ok(true) => {}
				Ok(false) => {
					self.inner.counters.filtered.fetch_add(1, Ordering::Relaxed);
					return;
				}
				Err(payload) => {
					self.inner.counters.filtered.fetch_add(1, Ordering::Relaxed);
					self.report(DispatchFailure {
						subscription_id: None,
						events: vec![event],
						message: format!("global filter panicked: {}", panic_message(&*payload)),
					});
					return;
				}
			}
		}

		let mut matched: Vec<Arc<EventSubscription>> = Vec::with_capacity(candidates.len());
		for sub in candidates {
			match catch_unwind(AssertUnwindSafe(|| sub.matches(&event))) {
				Ok(true) => matched.push(sub),
				Ok(false) => {}
				Err(payload) => self.report(DispatchFailure {
					subscription_id: Some(sub.id),
					events: vec![event.clone()],
					message: format!("subscription filter panicked: {}", panic_message(&*payload)),
				}),
			}
		}
		matched.sort_by(|a, b| b.options.priority.cmp(&a.options.priority).then(a.id.cmp(&b.id)));

		for sub in matched {
			if !sub.is_active() {
				continue;
			}
			if !sub.is_batched() {
				self.deliver(&sub, vec![event.clone()]);
				continue;
			}

			let mut timer = None;
			let ready = {
				let mut registry = self.inner.registry.lock();
				let Some(slot) = registry.subs.get_mut(&sub.id) else { continue };
				if slot.pending.is_empty() {
					slot.batch_started = Some(Instant::now());
					slot.generation += 1;
					timer = Some(slot.generation);
				}
				slot.pending.push(event.clone());
				if slot.pending.len() >= sub.options.batch_size { Some(slot.take_batch()) } else { None }
			};

			match ready {
				Some(batch) => self.deliver(&sub, batch),
				None => {
					if let Some(generation) = timer {
						self.schedule_batch_timer(sub.id, generation, sub.options.batch_timeout);
					}
				}
			}
		}
	}

	/// Deliver a partial batch once its timeout elapses (needs a tokio runtime)
	fn schedule_batch_timer(&self, id: SubscriptionId, generation: u64, timeout: Duration) {
		if timeout.is_zero() {
			return;
		}
		let Ok(runtime) = tokio::runtime::Handle::try_current() else { return };
		let inner: Weak<DispatcherInner> = Arc::downgrade(&self.inner);
		runtime.spawn(async move {
			tokio::time::sleep(timeout).await;
			if let Some(inner) = inner.upgrade() {
				EventDispatcher { inner }.flush_generation(id, generation);
			}
		});
	}

	fn flush_generation(&self, id: SubscriptionId, generation: u64) {
		let batch = {
			let mut registry = self.inner.registry.lock();
			match registry.subs.get_mut(&id) {
				Some(slot) if slot.generation == generation && !slot.pending.is_empty() => {
					Some((slot.sub.clone(), slot.take_batch()))
				}
				_ => None,
			}
		};
		if let Some((sub, events)) = batch {
			self.deliver(&sub, events);
		}
	}

	/// Deliver every batch whose timeout elapsed, returns the number delivered.
	///
	/// Runs automatically before each dispatch; hosts without a tokio runtime
	/// can also call it periodically.
	pub fn flush_expired_batches(&self) -> usize {
		let now = Instant::now();
		let batches: Vec<(Arc<EventSubscription>, Vec<PrefEvent>)> = {
			let mut registry = self.inner.registry.lock();
			registry
				.subs
				.values_mut()
				.filter(|slot| slot.batch_expired(now))
				.map(|slot| (slot.sub.clone(), slot.take_batch()))
				.collect()
		};
		let count = batches.len();
		for (sub, events) in batches {
			self.deliver(&sub, events);
		}
		count
	}

	/// Deliver all pending batches regardless of size or age
	pub fn flush_all(&self) -> usize {
		let batches: Vec<(Arc<EventSubscription>, Vec<PrefEvent>)> = {
			let mut registry = self.inner.registry.lock();
			registry
				.subs
				.values_mut()
				.filter(|slot| !slot.pending.is_empty())
				.map(|slot| (slot.sub.clone(), slot.take_batch()))
				.collect()
		};
		let count = batches.len();
		for (sub, events) in batches {
			self.deliver(&sub, events);
		}
		count
	}

	/// Invoke a callback in isolation; failures are reported, never propagated
	fn deliver(&self, sub: &EventSubscription, events: Vec<PrefEvent>) {
		let counters = &self.inner.counters;
		counters.callbacks.fetch_add(1, Ordering::Relaxed);
		counters.delivered.fetch_add(events.len() as u64, Ordering::Relaxed);
		if events.len() > 1 || sub.is_batched() {
			counters.batches.fetch_add(1, Ordering::Relaxed);
		}

		let message = match catch_unwind(AssertUnwindSafe(|| (sub.callback)(&events))) {
			Ok(Ok(())) => return,
			Ok(Err(err)) => err.to_string(),
			Err(payload) => panic_message(&*payload),
		};
		self.report(DispatchFailure { subscription_id: Some(sub.id), events, message });
	}

	fn report(&self, failure: DispatchFailure) {
		self.inner.counters.errors.fetch_add(1, Ordering::Relaxed);
		match failure.subscription_id {
			Some(id) => warn!(subscription = %id, "event delivery failed: {}", failure.message),
			None => warn!("event dispatch failed: {}", failure.message),
		}

		let handler = self.inner.error_handler.read().clone();
		if let Some(handler) = handler
			&& catch_unwind(AssertUnwindSafe(|| handler(&failure))).is_err()
		{
			error!("dispatcher error handler panicked");
		}
	}

	pub fn stats(&self) -> DispatcherStats {
		let c = &self.inner.counters;
		let (subscriptions, pending) = {
			let registry = self.inner.registry.lock();
			(registry.subs.len(), registry.subs.values().map(|slot| slot.pending.len()).sum::<usize>())
		};
		DispatcherStats {
			published: c.published.load(Ordering::Relaxed),
			delivered: c.delivered.load(Ordering::Relaxed),
			callbacks: c.callbacks.load(Ordering::Relaxed),
			batches: c.batches.load(Ordering::Relaxed),
			filtered: c.filtered.load(Ordering::Relaxed),
			dropped: c.dropped.load(Ordering::Relaxed),
			errors: c.errors.load(Ordering::Relaxed),
			subscriptions,
			pending,
			queued: self.inner.queue.lock().events.len(),
		}
	}

	/// Unsubscribe everything (pending batches are delivered) and drop global filters
	pub fn clear(&self) {
		let ids: Vec<SubscriptionId> = self.inner.registry.lock().subs.keys().copied().collect();
		for id in ids {
			self.unsubscribe(id);
		}
		self.inner.registry.lock().global_filters.clear();
	}
}

impl Default for EventDispatcher {
	fn default() -> Self {
		Self::new(DispatcherConfig::default())
	}
}

impl std::fmt::Debug for EventDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventDispatcher").field("stats", &self.stats()).finish()
	}
}


// vim: ts=4
