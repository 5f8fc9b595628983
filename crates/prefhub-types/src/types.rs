//! Common types used throughout prefhub.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

// TenantId //
//**********//
/// Identifier of an isolated preferences namespace (e.g. one per user profile)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Box<str>);

impl TenantId {
	pub fn new(id: impl Into<Box<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for TenantId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for TenantId {
	fn from(id: &str) -> Self {
		Self(id.into())
	}
}

impl From<String> for TenantId {
	fn from(id: String) -> Self {
		Self(id.into_boxed_str())
	}
}

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(i64::try_from(res.as_secs()).unwrap_or(i64::MAX))
	}

	pub fn add_seconds(self, seconds: i64) -> Self {
		Timestamp(self.0.saturating_add(seconds))
	}

	/// Seconds elapsed between `self` and `later` (zero if `later` is earlier)
	pub fn seconds_until(self, later: Timestamp) -> i64 {
		(later.0 - self.0).max(0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}


// vim: ts=4
