//! Error type shared by every prefhub crate

use crate::types::TenantId;
use crate::validation::ValidationIssue;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Bad TTL, malformed path, out-of-range option
	InvalidArgument(String),
	/// Empty or otherwise unusable cache key
	InvalidKey(String),
	/// Unknown tenant, subscription, transaction or backup id
	NotFound(String),
	/// A bounded collection is full
	CapacityExceeded { what: &'static str, limit: usize },
	/// A transaction is already open on this tenant
	TransactionConflict(TenantId),
	/// Validation failed; only used inside the engine, never across the service boundary
	ValidationFailed(Vec<ValidationIssue>),
	/// Failure reported by a store adapter
	Store(String),
	Serialization(String),
	/// Invalid configuration detected at construction time
	Config(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Serialization(err.to_string())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
			Error::InvalidKey(key) => write!(f, "Invalid cache key: '{}'", key),
			Error::NotFound(what) => write!(f, "Not found: {}", what),
			Error::CapacityExceeded { what, limit } => {
				write!(f, "Capacity exceeded: at most {} {} allowed", limit, what)
			}
			Error::TransactionConflict(tenant_id) => {
				write!(f, "Transaction already in progress for tenant '{}'", tenant_id)
			}
			Error::ValidationFailed(issues) => {
				write!(f, "Validation failed")?;
				for issue in issues {
					write!(f, "; {}", issue)?;
				}
				Ok(())
			}
			Error::Store(msg) => write!(f, "Store error: {}", msg),
			Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
			Error::Config(msg) => write!(f, "Configuration error: {}", msg),
			Error::Internal(msg) => write!(f, "Internal error: {}", msg),
			Error::Io(err) => write!(f, "I/O error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}


// vim: ts=4
