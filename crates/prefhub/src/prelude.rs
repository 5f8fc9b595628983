pub use prefhub_core::prelude::*;

pub use prefhub_core::events::{EventKind, PrefEvent, SubscribeOptions};
pub use prefhub_core::service::{ImportOptions, UpdateOptions, WriteOptions};
pub use prefhub_core::{PreferencesManager, PreferencesService};

// vim: ts=4
