//! Adapter that persists raw preference documents.
//!
//! The engine never assumes a particular persistence medium: it reads and
//! writes whole [`PrefsDocument`]s through this trait. Implementations live in
//! the `adapters/` directory.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::document::PrefsDocument;
use crate::prelude::*;

#[async_trait]
pub trait PrefsStore: Debug + Send + Sync {
	/// Reads the stored document of a tenant, `None` if nothing was stored yet
	async fn read(&self, tenant_id: &TenantId) -> ClResult<Option<PrefsDocument>>;

	/// Replaces the stored document of a tenant
	async fn write(&self, tenant_id: &TenantId, doc: &PrefsDocument) -> ClResult<()>;
}

// vim: ts=4
