//! Shared types, the store adapter trait, and core utilities for prefhub.
//!
//! This crate contains the foundational types that are shared between the
//! preferences engine and all store adapter implementations. Keeping them in
//! a separate crate lets adapter crates compile without pulling in the engine.

pub mod document;
pub mod error;
pub mod prelude;
pub mod store_adapter;
pub mod types;
pub mod utils;
pub mod validation;

// vim: ts=4
