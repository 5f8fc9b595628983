//! Tenant registry
//!
//! The [`PreferencesManager`] owns one [`PreferencesService`] per tenant and
//! layers backups and multi-step transactions on top of them.
//!
//! Transactions are tenant scoped and exclusive: a second `begin_transaction`
//! on a tenant with an open transaction fails with `TransactionConflict`.
//! Transactions on different tenants never interact.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::merge::parse_path;
use crate::prelude::*;
use crate::schema::SchemaNode;
use crate::service::{PreferencesService, UpdateFailure, WriteMode};
use prefhub_types::document::PrefsDocument;
use prefhub_types::store_adapter::PrefsStore;
use prefhub_types::utils::random_id;

/// A point-in-time copy of a tenant's document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
	pub id: String,
	pub tenant_id: TenantId,
	pub created_at: Timestamp,
	pub document: PrefsDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
	pub id: String,
	pub created_at: Timestamp,
}

impl From<&Backup> for BackupInfo {
	fn from(backup: &Backup) -> Self {
		Self { id: backup.id.clone(), created_at: backup.created_at }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
	pub success: bool,
	pub updates_applied: usize,
	pub updates_failed: usize,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<UpdateFailure>,
}

#[derive(Debug)]
struct Transaction {
	tenant_id: TenantId,
	writes: Vec<(String, Value)>,
	started_at: Timestamp,
	/// Document as it was when the transaction began
	snapshot: PrefsDocument,
}

pub struct PreferencesManager {
	config: ManagerConfig,
	store: Arc<dyn PrefsStore>,
	/// Schema every new instance starts from
	schema: SchemaNode,
	instances: parking_lot::RwLock<HashMap<TenantId, Arc<PreferencesService>>>,
	backups: parking_lot::Mutex<HashMap<TenantId, VecDeque<Backup>>>,
	transactions: parking_lot::Mutex<HashMap<String, Transaction>>,
	/// Serializes instance creation so the capacity check stays exact
	create_lock: tokio::sync::Mutex<()>,
	auto_backup: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PreferencesManager {
	pub fn new(
		config: ManagerConfig,
		store: Arc<dyn PrefsStore>,
		schema: SchemaNode,
	) -> ClResult<Arc<Self>> {
		config.validate()?;
		let manager = Arc::new(Self {
			config,
			store,
			schema,
			instances: parking_lot::RwLock::new(HashMap::new()),
			backups: parking_lot::Mutex::new(HashMap::new()),
			transactions: parking_lot::Mutex::new(HashMap::new()),
			create_lock: tokio::sync::Mutex::new(()),
			auto_backup: parking_lot::Mutex::new(None),
		});
		if manager.config.auto_backup {
			manager.start_auto_backup();
		}
		Ok(manager)
	}

	pub fn config(&self) -> &ManagerConfig {
		&self.config
	}

	fn require_instance(&self, tenant_id: &TenantId) -> ClResult<Arc<PreferencesService>> {
		self.get_instance(tenant_id)
			.ok_or_else(|| Error::NotFound(format!("tenant '{}'", tenant_id)))
	}

	// Instances //
	//***********//
	/// Return the tenant's service, creating and initializing it if needed.
	///
	/// `initial` only applies when the tenant has no stored document yet.
	pub async fn create_instance(
		&self,
		tenant_id: TenantId,
		initial: Option<Value>,
	) -> ClResult<Arc<PreferencesService>> {
		let _guard = self.create_lock.lock().await;
		if let Some(existing) = self.get_instance(&tenant_id) {
			return Ok(existing);
		}
		if self.instances.read().len() >= self.config.max_instances {
			return Err(Error::CapacityExceeded {
				what: "preference instances",
				limit: self.config.max_instances,
			});
		}

		let service = PreferencesService::new(
			tenant_id.clone(),
			self.store.clone(),
			self.schema.clone(),
			self.config.service.clone(),
		)?;
		service.init(initial).await?;
		self.instances.write().insert(tenant_id.clone(), service.clone());
		info!(tenant = %tenant_id, "preferences instance created");
		Ok(service)
	}

	pub fn get_instance(&self, tenant_id: &TenantId) -> Option<Arc<PreferencesService>> {
		self.instances.read().get(tenant_id).cloned()
	}

	pub fn list_instances(&self) -> Vec<TenantId> {
		let mut tenants: Vec<TenantId> = self.instances.read().keys().cloned().collect();
		tenants.sort();
		tenants
	}

	/// Drop a tenant's service together with its backups and open transactions
	pub async fn destroy_instance(&self, tenant_id: &TenantId) -> bool {
		let Some(service) = self.instances.write().remove(tenant_id) else {
			return false;
		};
		self.transactions.lock().retain(|_, tx| &tx.tenant_id != tenant_id);
		self.backups.lock().remove(tenant_id);
		service.destroy().await;
		info!(tenant = %tenant_id, "preferences instance destroyed");
		true
	}

	// Backups //
	//*********//
	pub async fn create_backup(&self, tenant_id: &TenantId) -> ClResult<String> {
		let service = self.require_instance(tenant_id)?;
		let document = service.export().await?;
		let backup =
			Backup { id: random_id(), tenant_id: tenant_id.clone(), created_at: Timestamp::now(), document };
		let backup_id = backup.id.clone();

		let mut backups = self.backups.lock();
		let ring = backups.entry(tenant_id.clone()).or_default();
		ring.push_back(backup);
		while ring.len() > self.config.max_backups_per_tenant {
			ring.pop_front();
		}
		debug!(tenant = %tenant_id, backup = %backup_id, "backup created");
		Ok(backup_id)
	}

	/// Returns false when the backup id is unknown for this tenant
	pub async fn restore_backup(&self, tenant_id: &TenantId, backup_id: &str) -> ClResult<bool> {
		let service = self.require_instance(tenant_id)?;
		let document = self
			.backups
			.lock()
			.get(tenant_id)
			.and_then(|ring| ring.iter().find(|b| b.id == backup_id))
			.map(|b| b.document.clone());
		let Some(document) = document else {
			return Ok(false);
		};

		service.restore_document(document, "backup").await?;
		info!(tenant = %tenant_id, backup = %backup_id, "backup restored");
		Ok(true)
	}

	/// Backups of a tenant, oldest first
	pub fn list_backups(&self, tenant_id: &TenantId) -> Vec<BackupInfo> {
		self.backups
			.lock()
			.get(tenant_id)
			.map(|ring| ring.iter().map(BackupInfo::from).collect())
			.unwrap_or_default()
	}

	pub fn delete_backup(&self, tenant_id: &TenantId, backup_id: &str) -> bool {
		let mut backups = self.backups.lock();
		let Some(ring) = backups.get_mut(tenant_id) else { return false };
		let before = ring.len();
		ring.retain(|b| b.id != backup_id);
		ring.len() != before
	}

	/// Snapshot every live tenant; returns the number of backups taken
	pub async fn backup_all(&self) -> usize {
		let mut count = 0;
		for tenant_id in self.list_instances() {
			match self.create_backup(&tenant_id).await {
				Ok(_) => count += 1,
				Err(err) => warn!(tenant = %tenant_id, "backup failed: {}", err),
			}
		}
		count
	}

	// Transactions //
	//**************//
	/// Open a transaction; the tenant's current document is kept for rollback
	pub async fn begin_transaction(&self, tenant_id: &TenantId) -> ClResult<String> {
		let service = self.require_instance(tenant_id)?;
		service.begin_transaction()?;
		let snapshot = match service.export().await {
			Ok(snapshot) => snapshot,
			Err(err) => {
				service.end_transaction();
				return Err(err);
			}
		};

		let tx_id = random_id();
		self.transactions.lock().insert(
			tx_id.clone(),
			Transaction {
				tenant_id: tenant_id.clone(),
				writes: Vec::new(),
				started_at: Timestamp::now(),
				snapshot,
			},
		);
		debug!(tenant = %tenant_id, tx = %tx_id, "transaction started");
		Ok(tx_id)
	}

	pub fn add_to_transaction(&self, tx_id: &str, path: &str, value: Value) -> ClResult<()> {
		if parse_path(path)?.is_empty() {
			return Err(Error::InvalidArgument("cannot write the root of the preference tree".into()));
		}
		let mut transactions = self.transactions.lock();
		let tx = transactions
			.get_mut(tx_id)
			.ok_or_else(|| Error::NotFound(format!("transaction '{}'", tx_id)))?;
		tx.writes.push((path.to_string(), value));
		Ok(())
	}

	/// Apply every pending write or none of them.
	///
	/// A backup is taken first. Rejected writes persist nothing, so the
	/// document is left alone; a store error restores the tenant from the
	/// backup. The transaction is discarded either way.
	pub async fn commit_transaction(&self, tx_id: &str) -> ClResult<CommitOutcome> {
		let tx = self
			.transactions
			.lock()
			.remove(tx_id)
			.ok_or_else(|| Error::NotFound(format!("transaction '{}'", tx_id)))?;
		let service = self.require_instance(&tx.tenant_id)?;
		let result = self.commit_on(&service, tx).await;
		service.end_transaction();
		result
	}

	async fn commit_on(&self, service: &PreferencesService, tx: Transaction) -> ClResult<CommitOutcome> {
		let tenant_id = tx.tenant_id;
		let backup_id = self.create_backup(&tenant_id).await?;
		let mode = WriteMode {
			atomic: true,
			validate: service.config().validate_on_set,
			silent: false,
		};

		match service.apply_writes(tx.writes, mode).await {
			Ok(outcome) if outcome.success => {
				debug!(tenant = %tenant_id, applied = outcome.updated.len(), "transaction committed");
				Ok(CommitOutcome {
					success: true,
					updates_applied: outcome.updated.len(),
					updates_failed: 0,
					failures: Vec::new(),
				})
			}
			Ok(outcome) => {
				warn!(tenant = %tenant_id, failed = outcome.failed.len(), "transaction rejected");
				Ok(CommitOutcome {
					success: false,
					updates_applied: 0,
					updates_failed: outcome.failed.len(),
					failures: outcome.failed,
				})
			}
			Err(err) => {
				if let Err(restore_err) = self.restore_backup(&tenant_id, &backup_id).await {
					error!(tenant = %tenant_id, "restore after failed commit failed: {}", restore_err);
				}
				Err(err)
			}
		}
	}

	/// Discard pending writes and restore the document from when the
	/// transaction began.
	///
	/// The restored state is the snapshot taken by `begin_transaction`, not the
	/// tenant's latest backup, so writes made outside the transaction since
	/// then are undone too. Returns false for an unknown transaction.
	pub async fn rollback_transaction(&self, tx_id: &str) -> ClResult<bool> {
		let Some(tx) = self.transactions.lock().remove(tx_id) else {
			return Ok(false);
		};
		let service = self.require_instance(&tx.tenant_id)?;
		let result = service.restore_document(tx.snapshot, "rollback").await;
		service.end_transaction();
		result?;
		debug!(
			tenant = %tx.tenant_id,
			tx = %tx_id,
			age = tx.started_at.seconds_until(Timestamp::now()),
			"transaction rolled back"
		);
		Ok(true)
	}

	/// Ids of open transactions
	pub fn list_transactions(&self) -> Vec<String> {
		self.transactions.lock().keys().cloned().collect()
	}

	// Lifecycle //
	//***********//
	/// Start the periodic auto-backup task on the current tokio runtime
	pub fn start_auto_backup(self: &Arc<Self>) -> bool {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!("no tokio runtime, auto-backup not started");
			return false;
		};

		let manager = Arc::downgrade(self);
		let period = self.config.auto_backup_interval;
		let handle = runtime.spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			interval.tick().await;
			loop {
				interval.tick().await;
				let Some(manager) = manager.upgrade() else { break };
				let count = manager.backup_all().await;
				debug!(count, "auto-backup finished");
			}
		});

		if let Some(previous) = self.auto_backup.lock().replace(handle) {
			previous.abort();
		}
		info!(interval = ?period, "auto-backup started");
		true
	}

	pub fn stop_auto_backup(&self) -> bool {
		match self.auto_backup.lock().take() {
			Some(handle) => {
				handle.abort();
				true
			}
			None => false,
		}
	}

	/// Stop timers and destroy every instance
	pub async fn destroy(&self) {
		let auto_backup = self.auto_backup.lock().take();
		if let Some(handle) = auto_backup {
			handle.abort();
			if let Err(err) = handle.await
				&& !err.is_cancelled()
			{
				warn!("auto-backup task ended abnormally: {}", err);
			}
		}

		let services: Vec<Arc<PreferencesService>> =
			self.instances.write().drain().map(|(_, service)| service).collect();
		self.transactions.lock().clear();
		self.backups.lock().clear();
		for service in services {
			service.destroy().await;
		}
		info!("preferences manager destroyed");
	}
}

impl Drop for PreferencesManager {
	fn drop(&mut self) {
		if let Some(handle) = self.auto_backup.get_mut().take() {
			handle.abort();
		}
	}
}

impl std::fmt::Debug for PreferencesManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PreferencesManager")
			.field("config", &self.config)
			.field("store", &self.store)
			.field("instances", &self.instances.read().len())
			.finish_non_exhaustive()
	}
}


// vim: ts=4
