//! Activity reconciliation for events recorded offline.
//!
//! Devices queue activity events while offline and upload them in batches.
//! Each event is decoded and validated on its own: a bad event is reported in
//! the batch summary and skipped, never failing the whole batch. Only a
//! structurally invalid request (no events at all) is rejected outright.
//!
//! Events carrying a client-generated `eventId` are idempotent: a repeat of the
//! same id from the same device is counted as accepted but stored once.

use crate::{error::Result, Error, Identity, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Longest accepted `activityType`.
pub const MAX_ACTIVITY_TYPE_LEN: usize = 64;

/// Longest accepted client `eventId`.
pub const MAX_EVENT_ID_LEN: usize = 128;

/// An activity event as uploaded by a device, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInput {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub activity_type: Option<String>,
    /// String or numeric id of the referenced entity
    #[serde(default)]
    pub reference_id: Option<serde_json::Value>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, alias = "duration")]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub client_timestamp: Option<Timestamp>,
}

impl ActivityInput {
    /// Decode one event from raw JSON.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::MalformedEvent("event must be a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| Error::MalformedEvent(e.to_string()))
    }

    /// Validate and stamp the event for storage.
    pub fn validate(self, identity: &Identity, received_at: Timestamp) -> Result<NewActivity> {
        let activity_type = self
            .activity_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::MissingRequiredField("activityType".into()))?;
        if activity_type.len() > MAX_ACTIVITY_TYPE_LEN {
            return Err(invalid("activityType", "too long"));
        }

        let event_id = match self.event_id.map(|id| id.trim().to_string()) {
            Some(id) if id.is_empty() => None,
            Some(id) if id.len() > MAX_EVENT_ID_LEN => return Err(invalid("eventId", "too long")),
            other => other,
        };

        let reference_id = match self.reference_id {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(_) => return Err(invalid("referenceId", "must be a string or number")),
        };

        if let Some(duration) = self.duration_seconds {
            if duration < 0 {
                return Err(invalid("durationSeconds", "must not be negative"));
            }
        }

        Ok(NewActivity {
            identity: identity.clone(),
            event_id,
            activity_type,
            reference_id,
            reference_type: self.reference_type,
            metadata: self.metadata,
            duration_seconds: self.duration_seconds,
            client_timestamp: self.client_timestamp,
            occurred_at: self.client_timestamp.unwrap_or(received_at),
            received_at,
        })
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// A validated activity event ready to append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    #[serde(flatten)]
    pub identity: Identity,
    pub event_id: Option<String>,
    pub activity_type: String,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub duration_seconds: Option<i64>,
    /// Stored verbatim; advisory only
    pub client_timestamp: Option<Timestamp>,
    /// Ordering column: client timestamp when given, else `received_at`
    pub occurred_at: Timestamp,
    pub received_at: Timestamp,
}

/// Outcome of appending one validated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// An event with the same `eventId` was already stored
    Duplicate,
}

/// An event that was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    /// Position in the uploaded batch
    pub index: usize,
    pub reason: String,
}

/// Partial-success result of a batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    #[serde(rename = "syncedCount")]
    pub accepted: usize,
    #[serde(rename = "totalCount")]
    pub total: usize,
    #[serde(rename = "failedCount")]
    pub failed: usize,
    /// Events never attempted; the client should resubmit them
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deadline_exceeded: bool,
    #[serde(skip)]
    pub rejections: Vec<Rejection>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            accepted: 0,
            total,
            failed: 0,
            skipped: 0,
            deadline_exceeded: false,
            rejections: Vec::new(),
        }
    }

    pub fn accept(&mut self) {
        self.accepted += 1;
    }

    pub fn reject(&mut self, index: usize, reason: impl Into<String>) {
        self.failed += 1;
        self.rejections.push(Rejection {
            index,
            reason: reason.into(),
        });
    }

    /// Stop processing; `remaining` events are left unattempted.
    pub fn skip_remaining(&mut self, remaining: usize) {
        self.skipped += remaining;
    }

    /// Stop processing because the request deadline passed.
    pub fn abort_at_deadline(&mut self, remaining: usize) {
        self.deadline_exceeded = true;
        self.skip_remaining(remaining);
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// A batch after per-event validation, with storage still to do.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Valid events to append, with their batch index
    pub events: Vec<(usize, NewActivity)>,
    pub summary: BatchSummary,
}

/// Decode and validate every event of a batch.
///
/// Fails only when the batch is empty. Invalid events become rejections;
/// repeated `eventId`s within the batch are accepted once and not re-appended.
pub fn prepare_batch(
    identity: &Identity,
    raw: Vec<serde_json::Value>,
    received_at: Timestamp,
) -> Result<PreparedBatch> {
    if raw.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let mut summary = BatchSummary::new(raw.len());
    let mut events = Vec::with_capacity(raw.len());
    let mut seen_ids = HashSet::new();

    for (index, value) in raw.into_iter().enumerate() {
        let validated = ActivityInput::from_value(value)
            .and_then(|input| input.validate(identity, received_at));

        match validated {
            Ok(event) => {
                if let Some(id) = &event.event_id {
                    if !seen_ids.insert(id.clone()) {
                        summary.accept();
                        continue;
                    }
                }
                events.push((index, event));
            }
            Err(e) => summary.reject(index, e.to_string()),
        }
    }

    Ok(PreparedBatch { events, summary })
}

/// Decode and validate a single event; any problem fails the call.
pub fn prepare_one(
    identity: &Identity,
    raw: serde_json::Value,
    received_at: Timestamp,
) -> Result<NewActivity> {
    ActivityInput::from_value(raw)?.validate(identity, received_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn device() -> Identity {
        Identity::new("u1", Some("phone"))
    }

    #[test]
    fn validate_minimal_event() {
        let event = prepare_one(&device(), json!({"activityType": "view_module"}), at(50)).unwrap();

        assert_eq!(event.activity_type, "view_module");
        assert_eq!(event.occurred_at, at(50));
        assert_eq!(event.client_timestamp, None);
        assert_eq!(event.identity.device_id, "phone");
    }

    #[test]
    fn client_timestamp_is_kept_verbatim() {
        let event = prepare_one(
            &device(),
            json!({
                "activityType": "view_module",
                "clientTimestamp": "2030-01-01T00:00:00Z",
                "referenceId": 12,
                "referenceType": "module",
                "duration": 30
            }),
            at(50),
        )
        .unwrap();

        let future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(event.client_timestamp, Some(future));
        assert_eq!(event.occurred_at, future);
        assert_eq!(event.received_at, at(50));
        assert_eq!(event.reference_id.as_deref(), Some("12"));
        assert_eq!(event.duration_seconds, Some(30));
    }

    #[test]
    fn missing_activity_type_fails_single_ingest() {
        let err = prepare_one(&device(), json!({"referenceId": "x"}), at(0)).unwrap_err();
        assert_eq!(err, Error::MissingRequiredField("activityType".into()));

        let err = prepare_one(&device(), json!({"activityType": "  "}), at(0)).unwrap_err();
        assert_eq!(err, Error::MissingRequiredField("activityType".into()));
    }

    #[test]
    fn bad_field_values_are_rejected() {
        let negative = json!({"activityType": "t", "durationSeconds": -1});
        assert!(matches!(
            prepare_one(&device(), negative, at(0)),
            Err(Error::InvalidField { .. })
        ));

        let nested_ref = json!({"activityType": "t", "referenceId": {"a": 1}});
        assert!(matches!(
            prepare_one(&device(), nested_ref, at(0)),
            Err(Error::InvalidField { .. })
        ));

        let bad_time = json!({"activityType": "t", "clientTimestamp": "yesterday"});
        assert!(matches!(
            prepare_one(&device(), bad_time, at(0)),
            Err(Error::MalformedEvent(_))
        ));

        assert!(matches!(
            prepare_one(&device(), json!("view"), at(0)),
            Err(Error::MalformedEvent(_))
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_eq!(
            prepare_batch(&device(), vec![], at(0)).unwrap_err(),
            Error::EmptyBatch
        );
    }

    #[test]
    fn batch_skips_bad_events() {
        let raw = vec![
            json!({"activityType": "a"}),
            json!({"metadata": {"k": 1}}),
            json!(42),
            json!({"activityType": "b"}),
        ];

        let batch = prepare_batch(&device(), raw, at(0)).unwrap();

        let indexes: Vec<usize> = batch.events.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 3]);
        assert_eq!(batch.summary.total, 4);
        assert_eq!(batch.summary.failed, 2);
        assert_eq!(batch.summary.rejections[0].index, 1);
        assert_eq!(batch.summary.rejections[1].index, 2);
    }

    #[test]
    fn repeated_event_id_in_batch_is_stored_once() {
        let raw = vec![
            json!({"activityType": "a", "eventId": "e-1"}),
            json!({"activityType": "a", "eventId": "e-1"}),
            json!({"activityType": "a"}),
            json!({"activityType": "a"}),
        ];

        let batch = prepare_batch(&device(), raw, at(0)).unwrap();

        assert_eq!(batch.events.len(), 3);
        assert_eq!(batch.summary.accepted, 1);
    }

    #[test]
    fn summary_wire_shape() {
        let mut summary = BatchSummary::new(3);
        summary.accept();
        summary.reject(1, "missing required field: activityType");

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value,
            json!({"syncedCount": 1, "totalCount": 3, "failedCount": 1})
        );

        summary.abort_at_deadline(1);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["deadlineExceeded"], true);
        assert_eq!(value["skipped"], 1);
        assert!(!summary.is_complete());
    }

    #[test]
    fn skipped_events_without_deadline() {
        let mut summary = BatchSummary::new(4);
        summary.accept();
        summary.skip_remaining(3);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["skipped"], 3);
        assert!(value.get("deadlineExceeded").is_none());
        assert!(!summary.is_complete());
    }
}
