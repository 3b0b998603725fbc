//! Delta computation for device sync.
//!
//! A device sends the server time of its last successful sync (or nothing on
//! first sync). The delta is every active item whose `updated_at` is strictly
//! after that instant. Deltas are derived from content timestamps alone; sync
//! checkpoints are never consulted, so a failed or partial sync cannot make
//! the server skip content.
//!
//! Children (diagnostic steps) are fetched in one bulk query for all parent
//! ids in the delta and joined here in memory by parent id.

use crate::content::{ContentItem, ContentKind, DiagnosticStep, Setting};
use crate::{ItemId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Predicate selecting which items belong in a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFilter {
    since: Option<Timestamp>,
}

impl ChangeFilter {
    pub fn new(since: Option<Timestamp>) -> Self {
        Self { since }
    }

    /// Filter selecting the complete active catalog.
    pub fn full() -> Self {
        Self { since: None }
    }

    pub fn since(&self) -> Option<Timestamp> {
        self.since
    }

    /// No previous sync: the whole active catalog is due.
    pub fn is_first_sync(&self) -> bool {
        self.since.is_none()
    }

    /// Whether `item` must be sent to the device.
    pub fn matches(&self, item: &ContentItem) -> bool {
        item.is_active && self.since.map_or(true, |since| item.updated_at > since)
    }

    /// Select matching items, ordered by id.
    pub fn select<'a, I>(&self, items: I) -> Vec<ContentItem>
    where
        I: IntoIterator<Item = &'a ContentItem>,
    {
        let mut selected: Vec<ContentItem> =
            items.into_iter().filter(|i| self.matches(i)).cloned().collect();
        selected.sort_by_key(|i| i.id);
        selected
    }
}

/// Group bulk-fetched steps by their parent aid, each group in step order.
pub fn group_steps(steps: Vec<DiagnosticStep>) -> HashMap<ItemId, Vec<DiagnosticStep>> {
    let mut grouped: HashMap<ItemId, Vec<DiagnosticStep>> = HashMap::new();
    for step in steps {
        grouped.entry(step.aid_id).or_default().push(step);
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|s| (s.step_order, s.id));
    }
    grouped
}

/// Ids of the given items, for a bulk child fetch.
pub fn parent_ids(items: &[ContentItem]) -> Vec<ItemId> {
    items.iter().map(|i| i.id).collect()
}

/// A diagnostic aid together with its ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidWithSteps {
    #[serde(flatten)]
    pub aid: ContentItem,
    pub steps: Vec<DiagnosticStep>,
}

/// Content a device must apply to reach current server state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelta {
    pub modules: Vec<ContentItem>,
    pub diagnostic_aids: Vec<AidWithSteps>,
    pub categories: Vec<ContentItem>,
    /// All settings, regardless of `since`
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl SyncDelta {
    /// Assemble a delta from already-fetched rows.
    ///
    /// Rows that do not match `filter` are dropped, so callers may pass a
    /// superset. `steps` should hold the children of every aid in `aids`;
    /// steps whose parent is not in the delta are ignored.
    pub fn assemble(
        filter: &ChangeFilter,
        modules: &[ContentItem],
        aids: &[ContentItem],
        steps: Vec<DiagnosticStep>,
        categories: &[ContentItem],
        settings: Vec<Setting>,
    ) -> Self {
        let mut steps_by_aid = group_steps(steps);

        let diagnostic_aids = filter
            .select(aids)
            .into_iter()
            .map(|aid| {
                let steps = steps_by_aid.remove(&aid.id).unwrap_or_default();
                AidWithSteps { aid, steps }
            })
            .collect();

        Self {
            modules: filter.select(modules),
            diagnostic_aids,
            categories: filter.select(categories),
            settings: settings.into_iter().map(|s| (s.key, s.value)).collect(),
        }
    }

    /// Number of versioned items in the delta (settings excluded).
    pub fn item_count(&self) -> usize {
        self.modules.len() + self.diagnostic_aids.len() + self.categories.len()
    }

    /// Ids of the delta's items of one kind.
    pub fn ids(&self, kind: ContentKind) -> Vec<ItemId> {
        match kind {
            ContentKind::Module => parent_ids(&self.modules),
            ContentKind::DiagnosticAid => self.diagnostic_aids.iter().map(|a| a.aid.id).collect(),
            ContentKind::Category => parent_ids(&self.categories),
        }
    }
}

/// Per-kind counts of changed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCounts {
    pub modules: u64,
    pub diagnostic_aids: u64,
    pub categories: u64,
}

impl ChangeCounts {
    pub fn total(&self) -> u64 {
        self.modules + self.diagnostic_aids + self.categories
    }

    /// Count matching items by kind.
    pub fn tally<'a, I>(filter: &ChangeFilter, items: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentItem>,
    {
        let mut counts = Self::default();
        for item in items.into_iter().filter(|i| filter.matches(i)) {
            match item.kind {
                ContentKind::Module => counts.modules += 1,
                ContentKind::DiagnosticAid => counts.diagnostic_aids += 1,
                ContentKind::Category => counts.categories += 1,
            }
        }
        counts
    }
}

/// Result of a lightweight update-availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub has_updates: bool,
    pub counts: ChangeCounts,
}

impl UpdateCheck {
    /// A first sync always has updates, even against an empty catalog.
    pub fn evaluate(filter: &ChangeFilter, counts: ChangeCounts) -> Self {
        Self {
            has_updates: filter.is_first_sync() || counts.total() > 0,
            counts,
        }
    }
}

/// Full sync response sent to devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    #[serde(flatten)]
    pub delta: SyncDelta,
    /// Server time captured before reading content; the device's next `lastSync`
    pub server_time: Timestamp,
    /// Recommended delay before the next sync
    pub next_sync_after_secs: u64,
    pub is_full_sync: bool,
    pub item_count: usize,
}

impl SyncPayload {
    pub fn new(
        filter: &ChangeFilter,
        delta: SyncDelta,
        server_time: Timestamp,
        next_sync_after_secs: u64,
    ) -> Self {
        let item_count = delta.item_count();
        Self {
            delta,
            server_time,
            next_sync_after_secs,
            is_full_sync: filter.is_first_sync(),
            item_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(id: ItemId, kind: ContentKind, updated: i64) -> ContentItem {
        ContentItem::new(id, kind, json!({"title": format!("item {}", id)}), at(updated))
    }

    fn step(id: ItemId, aid_id: ItemId, order: i32) -> DiagnosticStep {
        DiagnosticStep {
            id,
            aid_id,
            step_order: order,
            payload: json!({"text": format!("step {}", id)}),
        }
    }

    #[test]
    fn filter_is_strictly_after_since() {
        let filter = ChangeFilter::new(Some(at(100)));

        assert!(!filter.matches(&item(1, ContentKind::Module, 100)));
        assert!(filter.matches(&item(2, ContentKind::Module, 101)));
        assert!(!filter.matches(&item(3, ContentKind::Module, 50)));
    }

    #[test]
    fn filter_excludes_inactive() {
        let mut retired = item(1, ContentKind::Module, 200);
        retired.deactivate(at(300));

        assert!(!ChangeFilter::full().matches(&retired));
        assert!(!ChangeFilter::new(Some(at(100))).matches(&retired));
    }

    #[test]
    fn group_steps_orders_each_parent() {
        let grouped = group_steps(vec![
            step(10, 1, 3),
            step(11, 2, 1),
            step(12, 1, 1),
            step(13, 1, 2),
        ]);

        let order: Vec<ItemId> = grouped[&1].iter().map(|s| s.id).collect();
        assert_eq!(order, vec![12, 13, 10]);
        assert_eq!(grouped[&2].len(), 1);
        assert!(!grouped.contains_key(&3));
    }

    #[test]
    fn assemble_joins_steps_by_parent() {
        let aids = vec![
            item(1, ContentKind::DiagnosticAid, 10),
            item(2, ContentKind::DiagnosticAid, 10),
        ];
        let steps = vec![step(100, 1, 2), step(101, 1, 1), step(102, 9, 1)];

        let delta = SyncDelta::assemble(&ChangeFilter::full(), &[], &aids, steps, &[], vec![]);

        assert_eq!(delta.diagnostic_aids.len(), 2);
        let first: Vec<ItemId> = delta.diagnostic_aids[0].steps.iter().map(|s| s.id).collect();
        assert_eq!(first, vec![101, 100]);
        assert!(delta.diagnostic_aids[1].steps.is_empty());
    }

    #[test]
    fn assemble_drops_stale_rows_and_keeps_all_settings() {
        let modules = vec![
            item(2, ContentKind::Module, 50),
            item(1, ContentKind::Module, 150),
        ];
        let categories = vec![item(5, ContentKind::Category, 10)];
        let settings = vec![Setting {
            key: "supportEmail".into(),
            value: json!("help@example.com"),
        }];

        let delta = SyncDelta::assemble(
            &ChangeFilter::new(Some(at(100))),
            &modules,
            &[],
            vec![],
            &categories,
            settings,
        );

        assert_eq!(delta.ids(ContentKind::Module), vec![1]);
        assert!(delta.categories.is_empty());
        assert_eq!(delta.settings["supportEmail"], json!("help@example.com"));
        assert_eq!(delta.item_count(), 1);
    }

    #[test]
    fn first_sync_always_has_updates() {
        let check = UpdateCheck::evaluate(&ChangeFilter::full(), ChangeCounts::default());
        assert!(check.has_updates);

        let check = UpdateCheck::evaluate(&ChangeFilter::new(Some(at(1))), ChangeCounts::default());
        assert!(!check.has_updates);
    }

    #[test]
    fn tally_counts_by_kind() {
        let items = vec![
            item(1, ContentKind::Module, 10),
            item(2, ContentKind::Module, 10),
            item(3, ContentKind::DiagnosticAid, 10),
            item(4, ContentKind::Category, 1),
        ];

        let counts = ChangeCounts::tally(&ChangeFilter::new(Some(at(5))), &items);
        assert_eq!(
            counts,
            ChangeCounts {
                modules: 2,
                diagnostic_aids: 1,
                categories: 0,
            }
        );
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn payload_wire_shape() {
        let aids = vec![item(1, ContentKind::DiagnosticAid, 10)];
        let delta = SyncDelta::assemble(
            &ChangeFilter::full(),
            &[],
            &aids,
            vec![step(7, 1, 1)],
            &[],
            vec![],
        );
        let payload = SyncPayload::new(&ChangeFilter::full(), delta, at(20), 3600);
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["isFullSync"], true);
        assert_eq!(value["itemCount"], 1);
        assert_eq!(value["nextSyncAfterSecs"], 3600);
        assert_eq!(value["serverTime"], "1970-01-01T00:00:20Z");
        assert_eq!(value["diagnosticAids"][0]["id"], 1);
        assert_eq!(value["diagnosticAids"][0]["steps"][0]["aidId"], 1);
        assert!(value["modules"].as_array().unwrap().is_empty());
        assert!(value["settings"].as_object().unwrap().is_empty());
    }
}
