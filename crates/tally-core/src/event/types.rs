//! Event type enum covering every table change event.
//!
//! String forms are the camelCase tags carried in the event envelope's
//! `type` field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The table change event catalog.
///
/// User-originated events are applied optimistically before the server
/// answers; control events carry server-confirmed state back into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Edit cells of one or more rows.
    DataChange,
    /// Append placeholder rows.
    RowAdd,
    /// Insert a placeholder row after another row.
    RowInsert,
    /// Remove rows by id.
    RowDelete,
    /// Move rows into a group.
    RowAddToGroup,
    /// Take rows out of a group.
    RowRemoveFromGroup,
    /// Take rows out of a markup.
    RowRemoveFromMarkup,
    /// Create (or replace) a group.
    GroupAdd,
    /// Change a group's fields or membership.
    GroupUpdate,
    /// Remove a group, keeping its members.
    GroupDelete,
    /// Create (or replace) a markup.
    MarkupAdd,
    /// Change a markup's fields or membership.
    MarkupUpdate,
    /// Remove a markup, keeping its members.
    MarkupDelete,
    /// Server created models.
    ModelsAdded,
    /// Server updated models.
    ModelsUpdated,
    /// Server assigned ids to placeholders.
    PlaceholdersActivated,
    /// Server pushed field values for existing rows.
    UpdateRows,
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type '{}': expected one of ", self.raw)?;
        for (i, et) in EventType::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(et.as_str())?;
        }
        Ok(())
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 17] = [
        Self::DataChange,
        Self::RowAdd,
        Self::RowInsert,
        Self::RowDelete,
        Self::RowAddToGroup,
        Self::RowRemoveFromGroup,
        Self::RowRemoveFromMarkup,
        Self::GroupAdd,
        Self::GroupUpdate,
        Self::GroupDelete,
        Self::MarkupAdd,
        Self::MarkupUpdate,
        Self::MarkupDelete,
        Self::ModelsAdded,
        Self::ModelsUpdated,
        Self::PlaceholdersActivated,
        Self::UpdateRows,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataChange => "dataChange",
            Self::RowAdd => "rowAdd",
            Self::RowInsert => "rowInsert",
            Self::RowDelete => "rowDelete",
            Self::RowAddToGroup => "rowAddToGroup",
            Self::RowRemoveFromGroup => "rowRemoveFromGroup",
            Self::RowRemoveFromMarkup => "rowRemoveFromMarkup",
            Self::GroupAdd => "groupAdd",
            Self::GroupUpdate => "groupUpdate",
            Self::GroupDelete => "groupDelete",
            Self::MarkupAdd => "markupAdd",
            Self::MarkupUpdate => "markupUpdate",
            Self::MarkupDelete => "markupDelete",
            Self::ModelsAdded => "modelsAdded",
            Self::ModelsUpdated => "modelsUpdated",
            Self::PlaceholdersActivated => "placeholdersActivated",
            Self::UpdateRows => "updateRows",
        }
    }

    /// Whether the event carries server-confirmed state.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Self::ModelsAdded | Self::ModelsUpdated | Self::PlaceholdersActivated | Self::UpdateRows
        )
    }

    /// Whether applying the event can change row count or membership.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        !matches!(
            self,
            Self::DataChange | Self::ModelsUpdated | Self::PlaceholdersActivated | Self::UpdateRows
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
