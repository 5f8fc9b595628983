//! Built-in preference schema
//!
//! Registers the seven fixed sections of the preference tree with their
//! defaults and constraints. Hosts may extend it at runtime through
//! `PreferencesService::update_schema`.

use serde_json::json;

use super::node::{SchemaNode, ValueKind};
use crate::prelude::*;

fn string() -> super::node::SchemaNodeBuilder {
	SchemaNode::builder(ValueKind::String)
}

fn number() -> super::node::SchemaNodeBuilder {
	SchemaNode::builder(ValueKind::Number)
}

fn boolean(default: bool) -> ClResult<SchemaNode> {
	SchemaNode::builder(ValueKind::Boolean).default(default).build()
}

fn section(
	description: &str,
	props: impl IntoIterator<Item = (&'static str, SchemaNode)>,
) -> ClResult<SchemaNode> {
	props
		.into_iter()
		.fold(SchemaNode::builder(ValueKind::Object).description(description), |b, (name, node)| {
			b.property(name, node)
		})
		.build()
}

fn general() -> ClResult<SchemaNode> {
	section(
		"General application behavior",
		[
			(
				"language",
				string()
					.description("UI language as an ISO 639-1 code with optional region")
					.pattern(r"^[a-z]{2}(-[A-Z]{2})?$")
					.default("en")
					.build()?,
			),
			("autoSave", boolean(true)?),
			("confirmOnExit", boolean(true)?),
			(
				"defaultOutputDir",
				string()
					.max_length(4096)
					.default("")
					.validator(|value, _ctx| {
						let dir = value.as_str()?;
						dir.split(['/', '\\'])
							.any(|segment| segment == "..")
							.then(|| "output directory must not contain '..' segments".to_string())
					})
					.build()?,
			),
		],
	)
}

fn appearance() -> ClResult<SchemaNode> {
	section(
		"Look and feel",
		[
			("theme", string().allowed(["light", "dark", "system"]).default("system").build()?),
			("fontSize", number().range(8.0, 32.0).default(14).build()?),
			("compactMode", boolean(false)?),
			(
				"accentColor",
				string().pattern(r"^#[0-9a-fA-F]{6}$").default("#3b82f6").build()?,
			),
		],
	)
}

fn conversion() -> ClResult<SchemaNode> {
	section(
		"Defaults applied to new conversion jobs",
		[
			(
				"defaultFormat",
				string()
					.allowed(["pdf", "docx", "odt", "txt", "png", "jpg", "webp", "mp3", "mp4"])
					.default("pdf")
					.build()?,
			),
			("quality", number().range(1.0, 100.0).default(90).build()?),
			("preserveMetadata", boolean(true)?),
			("maxConcurrentJobs", number().range(1.0, 16.0).default(2).build()?),
			("overwriteExisting", boolean(false)?),
		],
	)
}

fn notifications() -> ClResult<SchemaNode> {
	section(
		"Desktop notifications",
		[
			("enabled", boolean(true)?),
			(
				"sound",
				SchemaNode::builder(ValueKind::Boolean).default(false).depends_on("enabled").build()?,
			),
			("onComplete", boolean(true)?),
			("onError", boolean(true)?),
		],
	)
}

fn performance() -> ClResult<SchemaNode> {
	section(
		"Resource usage",
		[
			("cacheSize", number().range(10.0, 1000.0).default(100).build()?),
			("workerThreads", number().range(1.0, 32.0).default(4).build()?),
			("hardwareAcceleration", boolean(true)?),
		],
	)
}

fn privacy() -> ClResult<SchemaNode> {
	section(
		"Data collection and history",
		[
			("telemetry", boolean(false)?),
			("crashReports", boolean(true)?),
			("clearHistoryOnExit", boolean(false)?),
		],
	)
}

fn advanced() -> ClResult<SchemaNode> {
	section(
		"Diagnostics and experimental switches",
		[
			(
				"logLevel",
				string()
					.allowed(["error", "warn", "info", "debug", "trace"])
					.default("info")
					.build()?,
			),
			(
				"experimentalFeatures",
				SchemaNode::builder(ValueKind::Array)
					.items(string().min_length(1).max_length(64).build()?)
					.max_items(32)
					.default(json!([]))
					.build()?,
			),
			("debugMode", boolean(false)?),
		],
	)
}

/// The full default preference schema
pub fn default_schema() -> ClResult<SchemaNode> {
	SchemaNode::builder(ValueKind::Object)
		.property("general", general()?)
		.property("appearance", appearance()?)
		.property("conversion", conversion()?)
		.property("notifications", notifications()?)
		.property("performance", performance()?)
		.property("privacy", privacy()?)
		.property("advanced", advanced()?)
		.build()
}


// vim: ts=4
