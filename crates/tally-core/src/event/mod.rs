//! Table change events.
//!
//! Every event travels as a JSON envelope:
//!
//! ```text
//! { "type": "<eventType>", "payload": <type-specific shape> }
//! ```
//!
//! [`TableEvent`] pairs the discriminant with its typed payload. Parsing is
//! two-pass: the envelope is read first, then `type` selects the payload
//! schema, so an unknown tag and a malformed payload are reported
//! separately.

pub mod data;
pub mod types;

pub use data::{
    CellChange, DataChangePayload, GroupDeletePayload, GroupMembershipPayload, GroupPatch,
    GroupUpdatePayload, MarkupDeletePayload, MarkupMembershipPayload, MarkupPatch,
    MarkupUpdatePayload, ModelsAddedPayload, ModelsUpdatedPayload, NewPlaceholder,
    PlaceholdersActivatedPayload, RowAddPayload, RowChange, RowDeletePayload, RowInsertPayload,
    RowUpdate, UpdateRowsPayload,
};
pub use types::{EventType, UnknownEventType};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Group, Markup};
use crate::rows::RowId;

/// Error raised while parsing an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error(transparent)]
    UnknownType(#[from] UnknownEventType),

    #[error("invalid {event_type} payload: {source}")]
    Payload {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

/// A table change event with its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum TableEvent {
    DataChange(DataChangePayload),
    RowAdd(RowAddPayload),
    RowInsert(RowInsertPayload),
    RowDelete(RowDeletePayload),
    RowAddToGroup(GroupMembershipPayload),
    RowRemoveFromGroup(GroupMembershipPayload),
    RowRemoveFromMarkup(MarkupMembershipPayload),
    GroupAdd(Group),
    GroupUpdate(GroupUpdatePayload),
    GroupDelete(GroupDeletePayload),
    MarkupAdd(Markup),
    MarkupUpdate(MarkupUpdatePayload),
    MarkupDelete(MarkupDeletePayload),
    ModelsAdded(ModelsAddedPayload),
    ModelsUpdated(ModelsUpdatedPayload),
    PlaceholdersActivated(PlaceholdersActivatedPayload),
    UpdateRows(UpdateRowsPayload),
}

impl TableEvent {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::DataChange(_) => EventType::DataChange,
            Self::RowAdd(_) => EventType::RowAdd,
            Self::RowInsert(_) => EventType::RowInsert,
            Self::RowDelete(_) => EventType::RowDelete,
            Self::RowAddToGroup(_) => EventType::RowAddToGroup,
            Self::RowRemoveFromGroup(_) => EventType::RowRemoveFromGroup,
            Self::RowRemoveFromMarkup(_) => EventType::RowRemoveFromMarkup,
            Self::GroupAdd(_) => EventType::GroupAdd,
            Self::GroupUpdate(_) => EventType::GroupUpdate,
            Self::GroupDelete(_) => EventType::GroupDelete,
            Self::MarkupAdd(_) => EventType::MarkupAdd,
            Self::MarkupUpdate(_) => EventType::MarkupUpdate,
            Self::MarkupDelete(_) => EventType::MarkupDelete,
            Self::ModelsAdded(_) => EventType::ModelsAdded,
            Self::ModelsUpdated(_) => EventType::ModelsUpdated,
            Self::PlaceholdersActivated(_) => EventType::PlaceholdersActivated,
            Self::UpdateRows(_) => EventType::UpdateRows,
        }
    }

    /// Deserialize a payload into the variant selected by `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Payload`] if the payload does not match
    /// the schema for `event_type`.
    pub fn deserialize_for(event_type: EventType, payload: Value) -> Result<Self, EventParseError> {
        let result = match event_type {
            EventType::DataChange => serde_json::from_value(payload).map(Self::DataChange),
            EventType::RowAdd => serde_json::from_value(payload).map(Self::RowAdd),
            EventType::RowInsert => serde_json::from_value(payload).map(Self::RowInsert),
            EventType::RowDelete => serde_json::from_value(payload).map(Self::RowDelete),
            EventType::RowAddToGroup => serde_json::from_value(payload).map(Self::RowAddToGroup),
            EventType::RowRemoveFromGroup => {
                serde_json::from_value(payload).map(Self::RowRemoveFromGroup)
            }
            EventType::RowRemoveFromMarkup => {
                serde_json::from_value(payload).map(Self::RowRemoveFromMarkup)
            }
            EventType::GroupAdd => serde_json::from_value(payload).map(Self::GroupAdd),
            EventType::GroupUpdate => serde_json::from_value(payload).map(Self::GroupUpdate),
            EventType::GroupDelete => serde_json::from_value(payload).map(Self::GroupDelete),
            EventType::MarkupAdd => serde_json::from_value(payload).map(Self::MarkupAdd),
            EventType::MarkupUpdate => serde_json::from_value(payload).map(Self::MarkupUpdate),
            EventType::MarkupDelete => serde_json::from_value(payload).map(Self::MarkupDelete),
            EventType::ModelsAdded => serde_json::from_value(payload).map(Self::ModelsAdded),
            EventType::ModelsUpdated => serde_json::from_value(payload).map(Self::ModelsUpdated),
            EventType::PlaceholdersActivated => {
                serde_json::from_value(payload).map(Self::PlaceholdersActivated)
            }
            EventType::UpdateRows => serde_json::from_value(payload).map(Self::UpdateRows),
        };

        result.map_err(|source| EventParseError::Payload { event_type, source })
    }

    /// Parse an event envelope from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Envelope`] if `type`/`payload` are missing,
    /// [`EventParseError::UnknownType`] for an unrecognized tag and
    /// [`EventParseError::Payload`] for a payload of the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, EventParseError> {
        #[derive(Deserialize)]
        struct EventRaw {
            #[serde(rename = "type")]
            event_type: String,
            #[serde(default)]
            payload: Value,
        }

        let raw: EventRaw = serde_json::from_value(value).map_err(EventParseError::Envelope)?;
        let event_type: EventType = raw.event_type.parse()?;
        Self::deserialize_for(event_type, raw.payload)
    }

    /// Parse an event envelope from JSON text.
    ///
    /// # Errors
    ///
    /// See [`TableEvent::from_value`].
    pub fn from_json(json: &str) -> Result<Self, EventParseError> {
        let value: Value = serde_json::from_str(json).map_err(EventParseError::Envelope)?;
        Self::from_value(value)
    }

    /// Convenience constructor for a `dataChange` event.
    #[must_use]
    pub const fn data_change(changes: Vec<RowChange>) -> Self {
        Self::DataChange(DataChangePayload { changes })
    }

    /// Convenience constructor for a `rowDelete` event.
    #[must_use]
    pub const fn row_delete(ids: Vec<RowId>) -> Self {
        Self::RowDelete(RowDeletePayload { ids })
    }
}

impl<'de> Deserialize<'de> for TableEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for TableEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_type())?;
        match self {
            Self::DataChange(p) => write!(f, " ({} rows)", p.changes.len()),
            Self::RowAdd(p) => write!(f, " ({} placeholders)", p.placeholders.len()),
            Self::RowInsert(p) => write!(f, " after {}", p.previous),
            Self::RowDelete(p) => write!(f, " ({} ids)", p.ids.len()),
            Self::RowAddToGroup(p) | Self::RowRemoveFromGroup(p) => {
                write!(f, " {} ({} rows)", p.group, p.rows.len())
            }
            Self::RowRemoveFromMarkup(p) => write!(f, " {} ({} rows)", p.markup, p.rows.len()),
            Self::GroupAdd(g) => write!(f, " group-{}", g.id),
            Self::GroupUpdate(p) => write!(f, " {}", p.id),
            Self::GroupDelete(p) => write!(f, " {}", p.id),
            Self::MarkupAdd(m) => write!(f, " markup-{}", m.id),
            Self::MarkupUpdate(p) => write!(f, " {}", p.id),
            Self::MarkupDelete(p) => write!(f, " {}", p.id),
            Self::ModelsAdded(p) => write!(f, " ({} models)", p.models.len()),
            Self::ModelsUpdated(p) => write!(f, " ({} models)", p.models.len()),
            Self::PlaceholdersActivated(p) => write!(f, " ({} placeholders)", p.placeholder_ids.len()),
            Self::UpdateRows(p) => write!(f, " ({} rows)", p.rows.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{GroupId, PlaceholderId};
    use serde_json::json;

    #[test]
    fn parse_data_change_envelope() {
        let event = TableEvent::from_json(
            r#"{"type":"dataChange","payload":{"id":1,"data":{"rate":{"oldValue":1,"newValue":5}}}}"#,
        )
        .expect("parse");
        assert_eq!(event.event_type(), EventType::DataChange);
        let TableEvent::DataChange(payload) = event else {
            panic!("wrong variant");
        };
        assert_eq!(payload.changes[0].data["rate"].new_value, json!(5));
    }

    #[test]
    fn unknown_type_is_distinct_from_bad_payload() {
        let err = TableEvent::from_value(json!({"type": "rowMove", "payload": {}}))
            .expect_err("unknown");
        assert!(matches!(err, EventParseError::UnknownType(ref e) if e.raw == "rowMove"));

        let err = TableEvent::from_value(json!({"type": "groupDelete", "payload": {"id": 3}}))
            .expect_err("bad payload");
        assert!(matches!(
            err,
            EventParseError::Payload {
                event_type: EventType::GroupDelete,
                ..
            }
        ));
    }

    #[test]
    fn missing_type_is_an_envelope_error() {
        let err = TableEvent::from_value(json!({"payload": []})).expect_err("envelope");
        assert!(matches!(err, EventParseError::Envelope(_)));
    }

    #[test]
    fn serialize_uses_type_and_payload() {
        let event = TableEvent::GroupDelete(GroupDeletePayload { id: GroupId(4) });
        let json = serde_json::to_value(&event).expect("ser");
        assert_eq!(json, json!({"type": "groupDelete", "payload": {"id": "group-4"}}));
    }

    #[test]
    fn serde_roundtrip_through_text() {
        let event = TableEvent::RowAdd(RowAddPayload {
            placeholders: vec![NewPlaceholder {
                id: PlaceholderId::new("n1").expect("token"),
                data: std::iter::once(("description".to_string(), json!("Lumber"))).collect(),
            }],
            group: Some(GroupId(2)),
        });
        let text = serde_json::to_string(&event).expect("ser");
        let back: TableEvent = serde_json::from_str(&text).expect("de");
        assert_eq!(back, event);
    }

    #[test]
    fn display_summarizes() {
        let event = TableEvent::row_delete(vec![RowId::Model(1), RowId::Model(2)]);
        assert_eq!(event.to_string(), "rowDelete (2 ids)");
    }
}
