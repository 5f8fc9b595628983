//! Utility functions

/// Generate a random opaque identifier (backups, transactions, presets)
pub fn random_id() -> String {
	uuid::Uuid::new_v4().simple().to_string()
}

/// Split a dotted preference path into segments.
///
/// Returns `None` for malformed paths (empty segments such as `"a..b"` or
/// a trailing dot). The empty string addresses the root and yields no segments.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
	if path.is_empty() {
		return Some(Vec::new());
	}
	let parts: Vec<&str> = path.split('.').collect();
	if parts.iter().any(|p| p.is_empty() || p.trim() != *p) {
		return None;
	}
	Some(parts)
}

/// Top-level section of a dotted path ("" for the root)
pub fn path_section(path: &str) -> &str {
	path.split('.').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_random_id_is_unique() {
		let a = random_id();
		let b = random_id();
		assert_eq!(a.len(), 32);
		assert_ne!(a, b);
	}

	#[test]
	fn test_split_path() {
		assert_eq!(split_path(""), Some(vec![]));
		assert_eq!(split_path("appearance.theme"), Some(vec!["appearance", "theme"]));
		assert_eq!(split_path("a..b"), None);
		assert_eq!(split_path("a."), None);
		assert_eq!(split_path(" a"), None);
	}

	#[test]
	fn test_path_section() {
		assert_eq!(path_section("appearance.theme"), "appearance");
		assert_eq!(path_section("general"), "general");
		assert_eq!(path_section(""), "");
	}
}

// vim: ts=4
