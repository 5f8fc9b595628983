//! Event subscriptions and their filters

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::event::{EventKind, PrefEvent};
use crate::prelude::*;

/// Opaque handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "sub-{}", self.0)
	}
}

/// Receives one event, or a whole batch for batched subscriptions
pub type EventCallback = Arc<dyn Fn(&[PrefEvent]) -> ClResult<()> + Send + Sync>;
pub type EventPredicate = Arc<dyn Fn(&PrefEvent) -> bool + Send + Sync>;
/// Tests the event's new value (`None` when the value was removed)
pub type ValuePredicate = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Filter on the dotted path carried by an event
#[derive(Debug, Clone)]
pub enum PathFilter {
	Exact(String),
	/// The path itself or anything below it (segment aware)
	Prefix(String),
	Pattern(Regex),
}

impl PathFilter {
	pub fn exact(path: impl Into<String>) -> Self {
		PathFilter::Exact(path.into())
	}

	pub fn prefix(path: impl Into<String>) -> Self {
		PathFilter::Prefix(path.into())
	}

	pub fn pattern(pattern: &str) -> ClResult<Self> {
		Regex::new(pattern)
			.map(PathFilter::Pattern)
			.map_err(|e| Error::InvalidArgument(format!("invalid path pattern: {}", e)))
	}

	/// Events without a path never match a path filter
	pub fn matches(&self, path: Option<&str>) -> bool {
		let Some(path) = path else { return false };
		match self {
			PathFilter::Exact(expected) => path == expected,
			PathFilter::Prefix(prefix) => {
				prefix.is_empty()
					|| path.strip_prefix(prefix.as_str())
						.is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
			}
			PathFilter::Pattern(regex) => regex.is_match(path),
		}
	}
}

/// Which event kinds a subscription receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
	Kind(EventKind),
	All,
}

impl EventTarget {
	pub fn matches(&self, kind: &EventKind) -> bool {
		match self {
			EventTarget::Kind(target) => target == kind,
			EventTarget::All => true,
		}
	}
}

impl From<EventKind> for EventTarget {
	fn from(kind: EventKind) -> Self {
		EventTarget::Kind(kind)
	}
}

/// Filters, priority and batching of a subscription
#[derive(Clone)]
pub struct SubscribeOptions {
	pub path_filter: Option<PathFilter>,
	pub value_filter: Option<ValuePredicate>,
	pub tenant_filter: Option<TenantId>,
	pub custom_filter: Option<EventPredicate>,
	/// Events per delivery, at least 1
	pub batch_size: usize,
	/// Deliver a partial batch this long after its first event (zero = only by size)
	pub batch_timeout: Duration,
	/// Higher dispatches first
	pub priority: i32,
}

impl Default for SubscribeOptions {
	fn default() -> Self {
		Self {
			path_filter: None,
			value_filter: None,
			tenant_filter: None,
			custom_filter: None,
			batch_size: 1,
			batch_timeout: Duration::ZERO,
			priority: 0,
		}
	}
}

impl SubscribeOptions {
	pub fn path(mut self, filter: PathFilter) -> Self {
		self.path_filter = Some(filter);
		self
	}

	pub fn value_filter(mut self, f: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static) -> Self {
		self.value_filter = Some(Arc::new(f));
		self
	}

	pub fn tenant(mut self, tenant_id: TenantId) -> Self {
		self.tenant_filter = Some(tenant_id);
		self
	}

	pub fn filter(mut self, f: impl Fn(&PrefEvent) -> bool + Send + Sync + 'static) -> Self {
		self.custom_filter = Some(Arc::new(f));
		self
	}

	pub fn batch(mut self, size: usize, timeout: Duration) -> Self {
		self.batch_size = size;
		self.batch_timeout = timeout;
		self
	}

	pub fn priority(mut self, priority: i32) -> Self {
		self.priority = priority;
		self
	}
}

impl std::fmt::Debug for SubscribeOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscribeOptions")
			.field("path_filter", &self.path_filter)
			.field("value_filter", &self.value_filter.is_some())
			.field("tenant_filter", &self.tenant_filter)
			.field("custom_filter", &self.custom_filter.is_some())
			.field("batch_size", &self.batch_size)
			.field("batch_timeout", &self.batch_timeout)
			.field("priority", &self.priority)
			.finish()
	}
}

/// A registered interest in a class of events
pub struct EventSubscription {
	pub id: SubscriptionId,
	pub target: EventTarget,
	pub(crate) callback: EventCallback,
	pub options: SubscribeOptions,
	active: AtomicBool,
}

impl EventSubscription {
	pub(crate) fn new(
		id: SubscriptionId,
		target: EventTarget,
		callback: EventCallback,
		options: SubscribeOptions,
	) -> ClResult<Self> {
		if options.batch_size == 0 {
			return Err(Error::InvalidArgument("batch size must be at least 1".into()));
		}
		Ok(Self { id, target, callback, options, active: AtomicBool::new(true) })
	}

	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Acquire)
	}

	pub(crate) fn deactivate(&self) {
		self.active.store(false, Ordering::Release);
	}

	pub fn is_batched(&self) -> bool {
		self.options.batch_size > 1
	}

	/// All present filters must match
	pub fn matches(&self, event: &PrefEvent) -> bool {
		let opts = &self.options;
		self.target.matches(&event.kind)
			&& opts.tenant_filter.as_ref().is_none_or(|t| event.tenant_id.as_ref() == Some(t))
			&& opts.path_filter.as_ref().is_none_or(|f| f.matches(event.path.as_deref()))
			&& opts.value_filter.as_ref().is_none_or(|f| f(event.new_value.as_ref()))
			&& opts.custom_filter.as_ref().is_none_or(|f| f(event))
	}
}

impl std::fmt::Debug for EventSubscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventSubscription")
			.field("id", &self.id)
			.field("target", &self.target)
			.field("options", &self.options)
			.field("active", &self.is_active())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn noop() -> EventCallback {
		Arc::new(|_: &[PrefEvent]| -> ClResult<()> { Ok(()) })
	}

	fn sub(options: SubscribeOptions) -> EventSubscription {
		EventSubscription::new(SubscriptionId(1), EventKind::PreferenceChanged.into(), noop(), options)
			.unwrap()
	}

	fn changed(path: &str, value: Value) -> PrefEvent {
		PrefEvent::changed(TenantId::from("t1"), path, None, Some(value))
	}

	#[test]
	fn test_prefix_filter_is_segment_aware() {
		let filter = PathFilter::prefix("appearance");
		assert!(filter.matches(Some("appearance")));
		assert!(filter.matches(Some("appearance.theme")));
		assert!(!filter.matches(Some("appearanceX.theme")));
		assert!(!filter.matches(None));
	}

	#[test]
	fn test_pattern_filter() {
		let filter = PathFilter::pattern(r"^conversion\.(quality|defaultFormat)$").unwrap();
		assert!(filter.matches(Some("conversion.quality")));
		assert!(!filter.matches(Some("conversion.preserveMetadata")));
		assert!(PathFilter::pattern("(").is_err());
	}

	#[test]
	fn test_filters_combine_with_and() {
		let s = sub(SubscribeOptions::default()
			.path(PathFilter::prefix("appearance"))
			.tenant(TenantId::from("t1"))
			.value_filter(|v| v.is_some_and(Value::is_string)));
		assert!(s.matches(&changed("appearance.theme", json!("dark"))));
		assert!(!s.matches(&changed("appearance.fontSize", json!(12))));
		assert!(!s.matches(&changed("general.language", json!("en"))));

		let other_tenant =
			PrefEvent::changed(TenantId::from("t2"), "appearance.theme", None, Some(json!("x")));
		assert!(!s.matches(&other_tenant));
		assert!(!s.matches(&PrefEvent::new(EventKind::PresetSaved)));
	}

	#[test]
	fn test_zero_batch_size_rejected() {
		let res = EventSubscription::new(
			SubscriptionId(1),
			EventTarget::All,
			noop(),
			SubscribeOptions::default().batch(0, Duration::ZERO),
		);
		assert!(matches!(res, Err(Error::InvalidArgument(_))));
	}
}

// vim: ts=4
