//! Change events: kinds, subscriptions and the dispatcher

pub mod dispatcher;
pub mod event;
pub mod subscription;

pub use dispatcher::{DispatchFailure, DispatcherStats, ErrorHandler, EventDispatcher, FilterId};
pub use event::{EventKind, PrefEvent};
pub use subscription::{
	EventCallback, EventPredicate, EventSubscription, EventTarget, PathFilter, SubscribeOptions,
	SubscriptionId, ValuePredicate,
};

// vim: ts=4
