//! Schema trees for preference validation

pub mod defaults;
pub mod node;

pub use defaults::default_schema;
pub use node::{CustomValidator, SchemaNode, SchemaNodeBuilder, ValidationContext, ValueKind};

// vim: ts=4
