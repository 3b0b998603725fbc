//! Versioned content entities served to devices.
//!
//! Content is authored elsewhere; the engine only relies on three facts about
//! it: every mutation bumps `version` by exactly one, `updated_at` strictly
//! increases with each bump, and deletion is a soft delete (`is_active = false`).

use crate::{ItemId, Timestamp, Version};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of versioned content entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    /// A manual module
    Module,
    /// A diagnostic aid with ordered steps
    DiagnosticAid,
    /// A category grouping modules and aids
    Category,
}

impl ContentKind {
    /// All kinds, in the order they appear in sync payloads.
    pub const ALL: [ContentKind; 3] = [
        ContentKind::Module,
        ContentKind::DiagnosticAid,
        ContentKind::Category,
    ];

    /// Name of the backing table.
    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Module => "modules",
            ContentKind::DiagnosticAid => "diagnostic_aids",
            ContentKind::Category => "categories",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Module => "module",
            ContentKind::DiagnosticAid => "diagnostic aid",
            ContentKind::Category => "category",
        };
        f.write_str(name)
    }
}

/// A versioned content entity (module, diagnostic aid or category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Stable identity
    pub id: ItemId,
    /// What kind of entity this is
    pub kind: ContentKind,
    /// Owning category, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<ItemId>,
    /// Mutable fields (title, body, codes, ...)
    pub payload: serde_json::Value,
    /// Starts at 1, incremented once per successful update
    pub version: Version,
    /// Set on every mutation
    pub updated_at: Timestamp,
    /// Soft delete flag
    pub is_active: bool,
}

impl ContentItem {
    /// Create a new active item at version 1.
    pub fn new(id: ItemId, kind: ContentKind, payload: serde_json::Value, now: Timestamp) -> Self {
        Self {
            id,
            kind,
            category_id: None,
            payload,
            version: 1,
            updated_at: now,
            is_active: true,
        }
    }

    /// Attach the item to a category.
    pub fn with_category(mut self, category_id: ItemId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Replace the mutable fields, bumping the version.
    ///
    /// Returns the new version.
    pub fn apply_update(&mut self, payload: serde_json::Value, now: Timestamp) -> Version {
        self.payload = payload;
        self.touch(now)
    }

    /// Soft-delete the item.
    ///
    /// Returns `false` if it was already inactive, in which case nothing changes.
    pub fn deactivate(&mut self, now: Timestamp) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.touch(now);
        true
    }

    fn touch(&mut self, now: Timestamp) -> Version {
        self.version += 1;
        self.updated_at = next_update_time(self.updated_at, now);
        self.version
    }
}

/// Timestamp for the next mutation of an item last updated at `previous`.
///
/// Clocks can stall or step backwards; the result is always strictly after
/// `previous` so `updated_at` keeps increasing with every version bump.
pub fn next_update_time(previous: Timestamp, now: Timestamp) -> Timestamp {
    let floor = previous + Duration::microseconds(1);
    if now > previous {
        now
    } else {
        floor
    }
}

/// One ordered step of a diagnostic aid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticStep {
    pub id: ItemId,
    /// Parent diagnostic aid
    pub aid_id: ItemId,
    /// Position within the aid, ascending
    pub step_order: i32,
    pub payload: serde_json::Value,
}

/// A global key/value setting pushed to every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
}
