//! Trigger payloads consumed from the external event-delivery layer.
//!
//! Delivery is at-least-once, so a create or delete may arrive more than
//! once. Two guards keep redelivery from double-counting:
//!
//! 1. When the transport supplies a delivery id, a key derived from it plus
//!    the event's identity fields is recorded in the `applied_events` ledger
//!    inside the same transaction as the update; a second arrival is a no-op.
//! 2. Without a delivery id, the scan record itself is the guard: a create
//!    whose `(user_id, code_id)` row already exists, or a delete whose row
//!    is already gone, is treated as a redelivered duplicate. This keeps a
//!    legitimate create → delete → create sequence working.

use serde::{Deserialize, Serialize};

use crate::model::ScanRecord;

/// Whether the trigger describes a newly created or a just-deleted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanEventKind {
    Created,
    Deleted,
}

impl std::fmt::Display for ScanEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Optional location payload attached to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub geo_hash: String,
}

/// One trigger event. For deletes, the fields describe the record as it
/// existed immediately before deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub kind: ScanEventKind,
    pub user_id: String,
    pub code_id: String,
    pub score: u32,
    #[serde(default)]
    pub location: Option<Location>,
    /// Transport-assigned delivery identity, when the trigger layer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
}

impl ScanEvent {
    /// The location fingerprint as persisted on scan records.
    pub fn location_fingerprint(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.geo_hash.as_str())
    }

    /// The scan record this event creates or deletes.
    pub fn record(&self) -> ScanRecord {
        ScanRecord {
            user_id: self.user_id.clone(),
            code_id: self.code_id.clone(),
            score: self.score,
            location: self.location.as_ref().map(|l| l.geo_hash.clone()),
        }
    }

    /// Ledger key for redelivery detection, present only when the transport
    /// assigned a delivery id. The identity fields are folded in so distinct
    /// events can never collide on a reused delivery id.
    pub fn idempotency_key(&self) -> Option<String> {
        let delivery_id = self.delivery_id.as_deref()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(delivery_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.kind.to_string().as_bytes());
        hasher.update(&[0]);
        hasher.update(self.user_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.code_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.score.to_le_bytes());
        if let Some(geo) = self.location_fingerprint() {
            hasher.update(&[0]);
            hasher.update(geo.as_bytes());
        }
        Some(format!("blake3:{}", hasher.finalize().to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ScanEventKind, delivery_id: Option<&str>) -> ScanEvent {
        ScanEvent {
            kind,
            user_id: "u1".into(),
            code_id: "c1".into(),
            score: 12,
            location: Some(Location {
                geo_hash: "u4pruyd".into(),
            }),
            delivery_id: delivery_id.map(str::to_string),
        }
    }

    #[test]
    fn payload_round_trips_wire_shape() {
        let json = r#"{"kind":"created","userId":"u1","codeId":"c1","score":12,"location":{"geoHash":"u4pruyd"}}"#;
        let parsed: ScanEvent = serde_json::from_str(json).expect("parse trigger payload");
        assert_eq!(parsed, event(ScanEventKind::Created, None));
    }

    #[test]
    fn location_is_optional() {
        let json = r#"{"kind":"deleted","userId":"u1","codeId":"c1","score":0}"#;
        let parsed: ScanEvent = serde_json::from_str(json).expect("parse trigger payload");
        assert!(parsed.location.is_none());
        assert!(parsed.location_fingerprint().is_none());
    }

    #[test]
    fn idempotency_key_requires_delivery_id() {
        assert!(event(ScanEventKind::Created, None).idempotency_key().is_none());
        assert!(
            event(ScanEventKind::Created, Some("d-1"))
                .idempotency_key()
                .is_some()
        );
    }

    #[test]
    fn idempotency_key_distinguishes_kind_and_delivery() {
        let create = event(ScanEventKind::Created, Some("d-1"));
        let delete = event(ScanEventKind::Deleted, Some("d-1"));
        let redelivered = event(ScanEventKind::Created, Some("d-1"));
        let other = event(ScanEventKind::Created, Some("d-2"));

        assert_eq!(create.idempotency_key(), redelivered.idempotency_key());
        assert_ne!(create.idempotency_key(), delete.idempotency_key());
        assert_ne!(create.idempotency_key(), other.idempotency_key());
    }
}
