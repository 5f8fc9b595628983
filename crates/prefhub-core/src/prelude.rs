pub use prefhub_types::prelude::*;

// vim: ts=4
