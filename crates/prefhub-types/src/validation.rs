//! Validation issue types shared by the validator and the error type

use serde::{Deserialize, Serialize};

/// Machine-readable classification of a validation problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
	MissingRequired,
	UnknownProperty,
	InvalidType,
	InvalidEnum,
	InvalidRange,
	InvalidLength,
	InvalidPattern,
	InvalidArraySize,
	CustomValidationFailed,
	DependencyViolation,
}

impl ValidationCode {
	pub fn as_str(self) -> &'static str {
		match self {
			ValidationCode::MissingRequired => "MISSING_REQUIRED",
			ValidationCode::UnknownProperty => "UNKNOWN_PROPERTY",
			ValidationCode::InvalidType => "INVALID_TYPE",
			ValidationCode::InvalidEnum => "INVALID_ENUM",
			ValidationCode::InvalidRange => "INVALID_RANGE",
			ValidationCode::InvalidLength => "INVALID_LENGTH",
			ValidationCode::InvalidPattern => "INVALID_PATTERN",
			ValidationCode::InvalidArraySize => "INVALID_ARRAY_SIZE",
			ValidationCode::CustomValidationFailed => "CUSTOM_VALIDATION_FAILED",
			ValidationCode::DependencyViolation => "DEPENDENCY_VIOLATION",
		}
	}
}

impl std::fmt::Display for ValidationCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single error or warning produced while validating a preference tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
	/// Dotted path of the offending node ("" for the root)
	pub path: String,
	pub code: ValidationCode,
	pub message: String,
}

impl ValidationIssue {
	pub fn new(path: impl Into<String>, code: ValidationCode, message: impl Into<String>) -> Self {
		Self { path: path.into(), code, message: message.into() }
	}
}

impl std::fmt::Display for ValidationIssue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.path.is_empty() {
			write!(f, "{}: {}", self.code, self.message)
		} else {
			write!(f, "{} at '{}': {}", self.code, self.path, self.message)
		}
	}
}

// vim: ts=4
