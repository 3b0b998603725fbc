//! Sync checkpoints: an append-only, informational log of syncs per device.
//!
//! Checkpoints are never read when computing a delta.

use crate::{Identity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a sync delivered the whole catalog or only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Full,
    Incremental,
}

impl SyncKind {
    pub fn for_since(since: Option<Timestamp>) -> Self {
        match since {
            None => SyncKind::Full,
            Some(_) => SyncKind::Incremental,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Full => "full",
            SyncKind::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(SyncKind::Full),
            "incremental" => Some(SyncKind::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed sync of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    #[serde(flatten)]
    pub identity: Identity,
    pub kind: SyncKind,
    pub item_count: u64,
    pub synced_at: Timestamp,
}

/// In-memory checkpoint log.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLog {
    entries: Vec<SyncCheckpoint>,
}

impl CheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, checkpoint: SyncCheckpoint) {
        self.entries.push(checkpoint);
    }

    /// Most recent checkpoint of a device; later appends win ties on `synced_at`.
    pub fn latest(&self, identity: &Identity) -> Option<&SyncCheckpoint> {
        self.entries
            .iter()
            .filter(|c| &c.identity == identity)
            .max_by_key(|c| c.synced_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn checkpoint(device: &str, count: u64, secs: i64) -> SyncCheckpoint {
        SyncCheckpoint {
            identity: Identity::new("u1", Some(device)),
            kind: SyncKind::Incremental,
            item_count: count,
            synced_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn latest_per_device() {
        let mut log = CheckpointLog::new();
        log.append(checkpoint("phone", 10, 100));
        log.append(checkpoint("phone", 2, 200));
        log.append(checkpoint("tablet", 5, 300));

        let phone = Identity::new("u1", Some("phone"));
        assert_eq!(log.latest(&phone).unwrap().item_count, 2);
        assert_eq!(log.len(), 3);
        assert!(log.latest(&Identity::new("u2", Some("phone"))).is_none());
    }

    #[test]
    fn kind_from_since() {
        assert_eq!(SyncKind::for_since(None), SyncKind::Full);
        assert_eq!(
            SyncKind::for_since(Some(Utc.timestamp_opt(1, 0).unwrap())),
            SyncKind::Incremental
        );
        assert_eq!(SyncKind::parse("full"), Some(SyncKind::Full));
        assert_eq!(SyncKind::parse("bogus"), None);
    }

    #[test]
    fn checkpoint_wire_shape() {
        let value = serde_json::to_value(checkpoint("phone", 3, 0)).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["deviceId"], "phone");
        assert_eq!(value["kind"], "incremental");
        assert_eq!(value["itemCount"], 3);
    }
}
