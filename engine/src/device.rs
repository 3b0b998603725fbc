//! Caller identity as seen by the sync core.

use crate::{DeviceId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Ledger key used when the caller did not identify its device.
///
/// All device-less callers of a user share this identity and therefore
/// collide in the download ledger.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Authenticated `(user, device)` pair attached to every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub device_id: DeviceId,
}

impl Identity {
    /// Build an identity, substituting [`UNKNOWN_DEVICE`] for a missing or blank device id.
    pub fn new(user_id: impl Into<UserId>, device_id: Option<&str>) -> Self {
        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DEVICE);

        Self {
            user_id: user_id.into(),
            device_id: device_id.to_string(),
        }
    }

    /// Whether the caller sent no device id.
    pub fn is_unknown_device(&self) -> bool {
        self.device_id == UNKNOWN_DEVICE
    }
}

/// Last-seen metadata for a device in the device registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSeen {
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    pub seen_at: Timestamp,
}
