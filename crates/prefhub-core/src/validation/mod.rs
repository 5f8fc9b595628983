//! Validation of preference trees against a schema

pub mod validator;

pub use validator::{ValidationResult, Validator};

// vim: ts=4
