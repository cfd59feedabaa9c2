//! Typed payload structs for each event type.
//!
//! Payloads that accept "one or many" (`dataChange`, `rowDelete`,
//! `updateRows`) normalize to a `Vec` on parse and always serialize as an
//! array.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{ServerModel, Unit};
use crate::rows::{GroupId, MarkupId, ModelId, PlaceholderId, RowData, RowId};

/// Accept either a single value or an array of values.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

// ---------------------------------------------------------------------------
// Cell changes
// ---------------------------------------------------------------------------

/// Before/after value of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    #[serde(default)]
    pub old_value: Value,
    pub new_value: Value,
}

impl CellChange {
    pub fn new(old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Pending cell edits for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub id: RowId,
    #[serde(default)]
    pub data: BTreeMap<String, CellChange>,
}

impl RowChange {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style helper adding one cell change.
    #[must_use]
    pub fn with(
        mut self,
        field: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) -> Self {
        self.data
            .insert(field.into(), CellChange::new(old_value, new_value));
        self
    }
}

/// Payload for `dataChange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataChangePayload {
    #[serde(deserialize_with = "one_or_many")]
    pub changes: Vec<RowChange>,
}

// ---------------------------------------------------------------------------
// Row structure
// ---------------------------------------------------------------------------

/// A placeholder row to create locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlaceholder {
    pub id: PlaceholderId,
    #[serde(default)]
    pub data: RowData,
}

impl NewPlaceholder {
    /// An empty placeholder with a freshly generated id.
    pub fn blank<R: Rng>(rng: &mut R) -> Self {
        Self {
            id: PlaceholderId::generate(rng),
            data: RowData::new(),
        }
    }
}

/// Payload for `rowAdd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowAddPayload {
    pub placeholders: Vec<NewPlaceholder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
}

impl RowAddPayload {
    /// `count` empty placeholders with generated ids.
    pub fn blank<R: Rng>(count: usize, rng: &mut R) -> Self {
        Self {
            placeholders: (0..count).map(|_| NewPlaceholder::blank(rng)).collect(),
            group: None,
        }
    }
}

/// Payload for `rowInsert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsertPayload {
    pub previous: RowId,
    pub placeholder: NewPlaceholder,
}

/// Payload for `rowDelete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowDeletePayload {
    #[serde(deserialize_with = "one_or_many")]
    pub ids: Vec<RowId>,
}

/// Payload for `rowAddToGroup` and `rowRemoveFromGroup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembershipPayload {
    pub group: GroupId,
    pub rows: Vec<RowId>,
}

/// Payload for `rowRemoveFromMarkup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupMembershipPayload {
    pub markup: MarkupId,
    pub rows: Vec<RowId>,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Fields a `groupUpdate` may change. Absent fields are left alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Full replacement membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ModelId>>,
}

/// Payload for `groupUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdatePayload {
    pub id: GroupId,
    pub data: GroupPatch,
}

/// Payload for `groupDelete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDeletePayload {
    pub id: GroupId,
}

/// Fields a `markupUpdate` may change. Absent fields are left alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Full replacement membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ModelId>>,
}

/// Payload for `markupUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupUpdatePayload {
    pub id: MarkupId,
    pub data: MarkupPatch,
}

/// Payload for `markupDelete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupDeletePayload {
    pub id: MarkupId,
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Payload for `modelsAdded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsAddedPayload {
    pub models: Vec<ServerModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
}

/// Payload for `modelsUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsUpdatedPayload {
    pub models: Vec<ServerModel>,
}

/// Payload for `placeholdersActivated`.
///
/// `placeholder_ids[i]` is promoted using `models[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholdersActivatedPayload {
    pub placeholder_ids: Vec<PlaceholderId>,
    pub models: Vec<ServerModel>,
}

/// One row's field values pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub id: RowId,
    #[serde(default)]
    pub data: RowData,
}

/// Payload for `updateRows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateRowsPayload {
    #[serde(deserialize_with = "one_or_many")]
    pub rows: Vec<RowUpdate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    #[test]
    fn data_change_accepts_single_object() {
        let payload: DataChangePayload = serde_json::from_value(json!({
            "id": 3,
            "data": {"rate": {"oldValue": 1, "newValue": 2}}
        }))
        .expect("single change");
        assert_eq!(payload.changes.len(), 1);
        assert_eq!(payload.changes[0].id, RowId::Model(3));
        assert_eq!(payload.changes[0].data["rate"].new_value, json!(2));
    }

    #[test]
    fn data_change_serializes_as_array() {
        let payload = DataChangePayload {
            changes: vec![RowChange::new(3).with("rate", 1, 2)],
        };
        let json = serde_json::to_value(&payload).expect("ser");
        assert!(json.is_array());
        assert_eq!(json[0]["data"]["rate"]["oldValue"], 1);
    }

    #[test]
    fn missing_old_value_defaults_to_null() {
        let change: CellChange =
            serde_json::from_value(json!({"newValue": "x"})).expect("cell change");
        assert_eq!(change.old_value, Value::Null);
    }

    #[test]
    fn row_delete_accepts_mixed_id_spaces() {
        let payload: RowDeletePayload =
            serde_json::from_value(json!([4, "placeholder-ab", "group-2"])).expect("ids");
        assert_eq!(payload.ids.len(), 3);
        let single: RowDeletePayload = serde_json::from_value(json!("markup-1")).expect("id");
        assert_eq!(single.ids, vec![RowId::Markup(MarkupId(1))]);
    }

    #[test]
    fn activation_uses_camel_case() {
        let payload: PlaceholdersActivatedPayload = serde_json::from_value(json!({
            "placeholderIds": ["placeholder-a"],
            "models": [{"id": 9}]
        }))
        .expect("activation");
        assert_eq!(payload.placeholder_ids[0].token(), "a");
        assert_eq!(payload.models[0].id, 9);
    }

    #[test]
    fn blank_row_add_generates_distinct_ids() {
        let mut rng = StdRng::seed_from_u64(3);
        let payload = RowAddPayload::blank(3, &mut rng);
        assert_eq!(payload.placeholders.len(), 3);
        assert_ne!(payload.placeholders[0].id, payload.placeholders[1].id);
        assert!(payload.placeholders.iter().all(|p| p.data.is_empty()));
    }

    #[test]
    fn patch_omits_absent_fields() {
        let patch = GroupPatch {
            name: Some("Crew".into()),
            ..GroupPatch::default()
        };
        assert_eq!(serde_json::to_value(&patch).expect("ser"), json!({"name": "Crew"}));
    }
}
