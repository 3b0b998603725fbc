//! Download ledger: which module version each device holds.
//!
//! One row per `(user, module, device)`. A download overwrites the row's
//! version and timestamp unconditionally, even with an older version, since a
//! device may be forced to reinstall an older cached copy. Rows are never
//! deleted, including when the module is later deactivated.

use crate::{DeviceId, Identity, ItemId, Timestamp, UserId, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Composite key of a download record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadKey {
    pub user_id: UserId,
    pub module_id: ItemId,
    pub device_id: DeviceId,
}

impl DownloadKey {
    pub fn new(identity: &Identity, module_id: ItemId) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            module_id,
            device_id: identity.device_id.clone(),
        }
    }
}

/// Last download of a module on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub module_id: ItemId,
    pub downloaded_version: Version,
    pub downloaded_at: Timestamp,
}

/// Staleness of one downloaded module, computed at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub module_id: ItemId,
    pub downloaded_version: Version,
    pub current_version: Version,
    pub needs_update: bool,
    pub downloaded_at: Timestamp,
    /// False once the module has been retired
    pub is_active: bool,
}

impl DownloadStatus {
    /// Join a ledger row with the module's current version.
    pub fn from_parts(record: &DownloadRecord, current_version: Version, is_active: bool) -> Self {
        Self {
            module_id: record.module_id,
            downloaded_version: record.downloaded_version,
            current_version,
            needs_update: record.downloaded_version < current_version,
            downloaded_at: record.downloaded_at,
            is_active,
        }
    }
}

/// Current `(version, is_active)` of a module.
pub type ModuleState = (Version, bool);

/// Compute status for every ledger row whose module still exists, ordered by module id.
pub fn download_statuses(
    records: &[DownloadRecord],
    modules: &HashMap<ItemId, ModuleState>,
) -> Vec<DownloadStatus> {
    let mut statuses: Vec<DownloadStatus> = records
        .iter()
        .filter_map(|r| {
            modules
                .get(&r.module_id)
                .map(|&(version, active)| DownloadStatus::from_parts(r, version, active))
        })
        .collect();
    statuses.sort_by_key(|s| s.module_id);
    statuses
}

/// In-memory download ledger.
#[derive(Debug, Clone, Default)]
pub struct DownloadLedger {
    rows: BTreeMap<DownloadKey, DownloadRecord>,
}

impl DownloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a download; last write wins.
    pub fn record(
        &mut self,
        identity: &Identity,
        module_id: ItemId,
        version: Version,
        now: Timestamp,
    ) -> DownloadRecord {
        let record = DownloadRecord {
            module_id,
            downloaded_version: version,
            downloaded_at: now,
        };
        self.rows
            .insert(DownloadKey::new(identity, module_id), record.clone());
        record
    }

    pub fn get(&self, key: &DownloadKey) -> Option<&DownloadRecord> {
        self.rows.get(key)
    }

    /// All rows for one device of one user.
    pub fn for_device(&self, identity: &Identity) -> Vec<DownloadRecord> {
        self.rows
            .iter()
            .filter(|(k, _)| k.user_id == identity.user_id && k.device_id == identity.device_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
