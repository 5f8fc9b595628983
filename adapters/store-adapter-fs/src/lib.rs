//! Filesystem-backed preferences store.
//!
//! Every tenant's document is kept as `<base_dir>/<tenant_id>.json`. Writes go
//! to a temporary file in the same directory which is then renamed over the
//! target, so readers never observe a half-written document.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use std::{
	fmt::Debug,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
	fs::{File, create_dir_all, read, remove_file, rename},
	io::AsyncWriteExt,
};

use prefhub::{document::PrefsDocument, prelude::*, store_adapter::PrefsStore, utils::random_id};

const MAX_TENANT_ID_LEN: usize = 128;

/// Tenant ids become file names, so only a conservative character set is allowed
fn check_tenant_id(tenant_id: &TenantId) -> ClResult<()> {
	let id = tenant_id.as_str();
	let valid = !id.is_empty()
		&& id.len() <= MAX_TENANT_ID_LEN
		&& !id.starts_with('.')
		&& id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
	if valid {
		Ok(())
	} else {
		Err(Error::InvalidArgument(format!("tenant id '{}' is not usable as a file name", id)))
	}
}

fn doc_path(base_dir: &Path, tenant_id: &TenantId) -> ClResult<PathBuf> {
	check_tenant_id(tenant_id)?;
	Ok(base_dir.join(format!("{}.json", tenant_id)))
}

#[derive(Debug)]
pub struct FsPrefsStore {
	base_dir: Box<Path>,
}

impl FsPrefsStore {
	pub async fn new(base_dir: Box<Path>) -> ClResult<Self> {
		create_dir_all(&base_dir).await?;
		Ok(Self { base_dir })
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}
}

#[async_trait]
impl PrefsStore for FsPrefsStore {
	async fn read(&self, tenant_id: &TenantId) -> ClResult<Option<PrefsDocument>> {
		let path = doc_path(&self.base_dir, tenant_id)?;
		let data = match read(&path).await {
			Ok(data) => data,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		let doc = serde_json::from_slice(&data).map_err(|err| {
			Error::Serialization(format!("corrupt document {}: {}", path.display(), err))
		})?;
		Ok(Some(doc))
	}

	async fn write(&self, tenant_id: &TenantId, doc: &PrefsDocument) -> ClResult<()> {
		let path = doc_path(&self.base_dir, tenant_id)?;
		let data = serde_json::to_vec_pretty(doc)?;
		let tmp_path = self.base_dir.join(format!("tmp-{}", random_id()));

		let res = async {
			let mut file = File::create(&tmp_path).await?;
			file.write_all(&data).await?;
			file.sync_all().await?;
			rename(&tmp_path, &path).await?;
			Ok::<(), Error>(())
		}
		.await;
		if let Err(err) = res {
			warn!(tenant = %tenant_id, "document write failed, removing tmpfile: {:?}", &tmp_path);
			if let Err(rm_err) = remove_file(&tmp_path).await {
				debug!("tmpfile cleanup failed: {}", rm_err);
			}
			return Err(err);
		}

		debug!(tenant = %tenant_id, "document written: {:?}", &path);
		Ok(())
	}
}


// vim: ts=4
