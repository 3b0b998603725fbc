//! SyncStore - an in-memory implementation of the whole sync core.
//!
//! Holds a content catalog, the download ledger, the checkpoint log and the
//! activity log, and implements every sync operation against them. The
//! server runs the same engine functions against PostgreSQL; this store is
//! what tests and embedders use when no database is involved.

use crate::activity::{prepare_batch, prepare_one, AppendOutcome, BatchSummary, NewActivity};
use crate::checkpoint::{CheckpointLog, SyncCheckpoint, SyncKind};
use crate::content::{ContentItem, ContentKind, DiagnosticStep, Setting};
use crate::delta::{parent_ids, ChangeCounts, ChangeFilter, SyncDelta, UpdateCheck};
use crate::ledger::{download_statuses, DownloadLedger, DownloadRecord, DownloadStatus};
use crate::{error::Result, Error, Identity, ItemId, Timestamp, Version};
use std::collections::{BTreeMap, HashMap, HashSet};

/// In-memory content catalog plus per-device sync state.
#[derive(Debug, Clone, Default)]
pub struct SyncStore {
    items: BTreeMap<(ContentKind, ItemId), ContentItem>,
    steps: Vec<DiagnosticStep>,
    settings: BTreeMap<String, serde_json::Value>,
    ledger: DownloadLedger,
    checkpoints: CheckpointLog,
    activities: Vec<NewActivity>,
    event_ids: HashSet<(Identity, String)>,
    /// Number of child-fetch queries issued, one per delta at most
    child_fetches: usize,
}

impl SyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Content repository
    // ------------------------------------------------------------------

    /// Add a new item to the catalog.
    pub fn insert_item(&mut self, item: ContentItem) -> Result<()> {
        let key = (item.kind, item.id);
        if self.items.contains_key(&key) {
            return Err(Error::ItemAlreadyExists {
                kind: item.kind,
                id: item.id,
            });
        }
        self.items.insert(key, item);
        Ok(())
    }

    pub fn insert_step(&mut self, step: DiagnosticStep) {
        self.steps.push(step);
    }

    pub fn put_setting(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.settings.insert(key.into(), value);
    }

    pub fn get_item(&self, kind: ContentKind, id: ItemId) -> Option<&ContentItem> {
        self.items.get(&(kind, id))
    }

    /// Update an item's fields, bumping its version.
    pub fn update_item(
        &mut self,
        kind: ContentKind,
        id: ItemId,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Result<Version> {
        let item = self
            .items
            .get_mut(&(kind, id))
            .ok_or(Error::ItemNotFound { kind, id })?;
        Ok(item.apply_update(payload, now))
    }

    /// Soft-delete an item. Download records referencing it are kept.
    pub fn deactivate_item(
        &mut self,
        kind: ContentKind,
        id: ItemId,
        now: Timestamp,
    ) -> Result<bool> {
        let item = self
            .items
            .get_mut(&(kind, id))
            .ok_or(Error::ItemNotFound { kind, id })?;
        Ok(item.deactivate(now))
    }

    fn items_of(&self, kind: ContentKind) -> Vec<ContentItem> {
        self.items
            .range((kind, ItemId::MIN)..=(kind, ItemId::MAX))
            .map(|(_, item)| item.clone())
            .collect()
    }

    fn active_changed_since(&self, kind: ContentKind, filter: &ChangeFilter) -> Vec<ContentItem> {
        filter.select(
            self.items
                .range((kind, ItemId::MIN)..=(kind, ItemId::MAX))
                .map(|(_, item)| item),
        )
    }

    fn steps_bulk(&mut self, aid_ids: &[ItemId]) -> Vec<DiagnosticStep> {
        self.child_fetches += 1;
        let wanted: HashSet<ItemId> = aid_ids.iter().copied().collect();
        self.steps
            .iter()
            .filter(|s| wanted.contains(&s.aid_id))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Sync orchestration
    // ------------------------------------------------------------------

    /// Compute the delta for a device and append a checkpoint.
    pub fn compute_delta(
        &mut self,
        identity: &Identity,
        since: Option<Timestamp>,
        now: Timestamp,
    ) -> SyncDelta {
        let filter = ChangeFilter::new(since);

        let modules = self.active_changed_since(ContentKind::Module, &filter);
        let aids = self.active_changed_since(ContentKind::DiagnosticAid, &filter);
        let categories = self.active_changed_since(ContentKind::Category, &filter);
        let steps = if aids.is_empty() {
            Vec::new()
        } else {
            self.steps_bulk(&parent_ids(&aids))
        };
        let settings = self
            .settings
            .iter()
            .map(|(key, value)| Setting {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        let delta = SyncDelta::assemble(&filter, &modules, &aids, steps, &categories, settings);

        self.checkpoints.append(SyncCheckpoint {
            identity: identity.clone(),
            kind: SyncKind::for_since(since),
            item_count: delta.item_count() as u64,
            synced_at: now,
        });

        delta
    }

    /// Count-only check for pending changes.
    pub fn check_for_updates(&self, since: Option<Timestamp>) -> UpdateCheck {
        let filter = ChangeFilter::new(since);
        UpdateCheck::evaluate(&filter, ChangeCounts::tally(&filter, self.items.values()))
    }

    /// Record that a device downloaded a module.
    ///
    /// With `version` absent the module's current version is recorded. The
    /// module must exist and be active.
    pub fn record_download(
        &mut self,
        identity: &Identity,
        module_id: ItemId,
        version: Option<Version>,
        now: Timestamp,
    ) -> Result<DownloadRecord> {
        let module = self
            .get_item(ContentKind::Module, module_id)
            .ok_or(Error::ItemNotFound {
                kind: ContentKind::Module,
                id: module_id,
            })?;
        if !module.is_active {
            return Err(Error::ItemInactive {
                kind: ContentKind::Module,
                id: module_id,
            });
        }
        let version = version.unwrap_or(module.version);
        Ok(self.ledger.record(identity, module_id, version, now))
    }

    /// Staleness of every module the device has downloaded.
    pub fn download_status(&self, identity: &Identity) -> Vec<DownloadStatus> {
        let modules: HashMap<ItemId, (Version, bool)> = self
            .items_of(ContentKind::Module)
            .into_iter()
            .map(|m| (m.id, (m.version, m.is_active)))
            .collect();
        download_statuses(&self.ledger.for_device(identity), &modules)
    }

    pub fn latest_checkpoint(&self, identity: &Identity) -> Option<&SyncCheckpoint> {
        self.checkpoints.latest(identity)
    }

    // ------------------------------------------------------------------
    // Activity reconciliation
    // ------------------------------------------------------------------

    fn append_activity(&mut self, event: NewActivity) -> AppendOutcome {
        if let Some(id) = &event.event_id {
            if !self.event_ids.insert((event.identity.clone(), id.clone())) {
                return AppendOutcome::Duplicate;
            }
        }
        self.activities.push(event);
        AppendOutcome::Inserted
    }

    /// Ingest a batch of offline events with partial success.
    pub fn ingest_batch(
        &mut self,
        identity: &Identity,
        raw: Vec<serde_json::Value>,
        now: Timestamp,
    ) -> Result<BatchSummary> {
        let prepared = prepare_batch(identity, raw, now)?;
        let mut summary = prepared.summary;
        for (_, event) in prepared.events {
            self.append_activity(event);
            summary.accept();
        }
        Ok(summary)
    }

    /// Ingest one event; invalid input fails the call.
    pub fn ingest_one(
        &mut self,
        identity: &Identity,
        raw: serde_json::Value,
        now: Timestamp,
    ) -> Result<AppendOutcome> {
        let event = prepare_one(identity, raw, now)?;
        Ok(self.append_activity(event))
    }

    pub fn activities(&self) -> &[NewActivity] {
        &self.activities
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn child_fetch_count(&self) -> usize {
        self.child_fetches
    }
}
