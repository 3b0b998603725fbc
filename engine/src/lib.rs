//! # Torque Engine
//!
//! The delta-synchronization and offline-reconciliation core of Torque, a
//! reference app for mechanics (manuals, diagnostic aids, error codes) that
//! has to work on flaky connections.
//!
//! This crate decides *what* a device must receive and *how* its offline
//! activity is accepted. It does no IO: the server fetches rows and hands
//! them to these functions, and [`SyncStore`] runs the same logic in memory.
//!
//! ## Core Concepts
//!
//! ### Content
//!
//! [`ContentItem`]s (modules, diagnostic aids, categories) carry a `version`
//! that grows by exactly one per update and an `updated_at` that strictly
//! increases with it. Deletion is a soft delete.
//!
//! ### Delta sync
//!
//! [`ChangeFilter`] selects active items updated strictly after the device's
//! last sync; no `since` means the full active catalog. [`SyncDelta::assemble`]
//! joins bulk-fetched [`DiagnosticStep`]s to their aids in memory.
//! [`UpdateCheck`] answers "is there anything new?" from counts alone.
//!
//! ### Download ledger
//!
//! One [`DownloadRecord`] per `(user, module, device)`, last write wins.
//! [`DownloadStatus`] compares it with the module's current version at read
//! time.
//!
//! ### Activity reconciliation
//!
//! [`prepare_batch`] validates each uploaded event on its own and reports a
//! [`BatchSummary`]; one bad event never sinks a batch.
//!
//! ## Quick Start
//!
//! ```rust
//! use torque_engine::{ContentItem, ContentKind, Identity, SyncStore};
//! use chrono::{TimeZone, Utc};
//! use serde_json::json;
//!
//! let t = |secs| Utc.timestamp_opt(secs, 0).unwrap();
//! let mut store = SyncStore::new();
//! store
//!     .insert_item(ContentItem::new(1, ContentKind::Module, json!({"title": "Brakes"}), t(10)))
//!     .unwrap();
//!
//! let device = Identity::new("user-1", Some("phone"));
//! let delta = store.compute_delta(&device, None, t(20));
//! assert_eq!(delta.modules.len(), 1);
//!
//! store.record_download(&device, 1, Some(1), t(30)).unwrap();
//! store.update_item(ContentKind::Module, 1, json!({"title": "Brakes (rev)"}), t(40)).unwrap();
//!
//! let status = store.download_status(&device);
//! assert!(status[0].needs_update);
//! ```

pub mod activity;
pub mod checkpoint;
pub mod content;
pub mod delta;
pub mod device;
pub mod error;
pub mod ledger;
pub mod store;

// Re-export main types at crate root
pub use activity::{
    prepare_batch, prepare_one, ActivityInput, AppendOutcome, BatchSummary, NewActivity,
    PreparedBatch, Rejection,
};
pub use checkpoint::{CheckpointLog, SyncCheckpoint, SyncKind};
pub use content::{next_update_time, ContentItem, ContentKind, DiagnosticStep, Setting};
pub use delta::{
    group_steps, parent_ids, AidWithSteps, ChangeCounts, ChangeFilter, SyncDelta, SyncPayload,
    UpdateCheck,
};
pub use device::{DeviceSeen, Identity, UNKNOWN_DEVICE};
pub use error::Error;
pub use ledger::{download_statuses, DownloadKey, DownloadLedger, DownloadRecord, DownloadStatus};
pub use store::SyncStore;

/// Type aliases for clarity
pub type ItemId = i64;
pub type UserId = String;
pub type DeviceId = String;
pub type Version = i64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
