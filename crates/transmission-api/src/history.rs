//! # Audit History
//!
//! Every mutation of a shipment, access request or document records the
//! top-level fields that changed between the previous and the new JSON
//! snapshot. Creation records the full initial field set with `old = null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use transmission_core::{HistoryId, ShipmentId};
use utoipa::ToSchema;
use uuid::Uuid;

/// Keys never reported as changes.
const IGNORED_FIELDS: &[&str] = &["updated_at"];

/// Kind of record a history entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Shipment,
    AccessRequest,
    Document,
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub record_type: RecordType,
    pub record_id: Uuid,
    pub shipment_id: ShipmentId,
    /// User who made the change. `None` for device and storage callbacks.
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
}

/// Field-level changes between two snapshots. Non-object snapshots are
/// treated as empty.
pub fn diff(old: Option<&Value>, new: &Value) -> Vec<FieldChange> {
    let empty = Map::new();
    let old = old.and_then(Value::as_object).unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    let mut fields: Vec<&String> = old.keys().chain(new.keys()).collect();
    fields.sort();
    fields.dedup();

    fields
        .into_iter()
        .filter(|field| !IGNORED_FIELDS.contains(&field.as_str()))
        .filter_map(|field| {
            let before = old.get(field).cloned().unwrap_or(Value::Null);
            let after = new.get(field).cloned().unwrap_or(Value::Null);
            (before != after).then(|| FieldChange {
                field: field.clone(),
                old: before,
                new: after,
            })
        })
        .collect()
}

impl HistoryEntry {
    /// Entry for a mutation, or `None` when nothing changed.
    pub fn record(
        record_type: RecordType,
        record_id: Uuid,
        shipment_id: ShipmentId,
        actor: Option<String>,
        before: Option<&Value>,
        after: &Value,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let changes = diff(before, after);
        if changes.is_empty() {
            return None;
        }
        Some(Self {
            id: HistoryId::new(),
            record_type,
            record_id,
            shipment_id,
            actor,
            at,
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creation_lists_every_field() {
        let changes = diff(None, &json!({"a": 1, "b": "x"}));
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.old.is_null()));
    }

    #[test]
    fn only_changed_fields_are_reported() {
        let before = json!({"state": "AWAITING_PICKUP", "name": "n", "updated_at": "t0"});
        let after = json!({"state": "IN_TRANSIT", "name": "n", "updated_at": "t1"});
        let changes = diff(Some(&before), &after);
        assert_eq!(
            changes,
            vec![FieldChange {
                field: "state".into(),
                old: json!("AWAITING_PICKUP"),
                new: json!("IN_TRANSIT"),
            }]
        );
    }

    #[test]
    fn removed_and_added_keys() {
        let changes = diff(Some(&json!({"a": 1})), &json!({"b": 2}));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "a");
        assert!(changes[0].new.is_null());
        assert_eq!(changes[1].field, "b");
    }

    #[test]
    fn no_change_records_nothing() {
        let v = json!({"a": 1, "updated_at": "t"});
        let entry = HistoryEntry::record(
            RecordType::Shipment,
            Uuid::new_v4(),
            ShipmentId::new(),
            None,
            Some(&v),
            &json!({"a": 1, "updated_at": "t2"}),
            Utc::now(),
        );
        assert!(entry.is_none());
    }
}
