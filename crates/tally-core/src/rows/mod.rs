//! Row data model for the budgeting grid.
//!
//! A grid is an ordered [`RowCollection`] of [`Row`]s. Each row is one of
//! four variants:
//!
//! - **model**: backed by a server-confirmed entity with an integer id.
//! - **placeholder**: created locally, waiting for a server-assigned id.
//! - **group**: named, colored summary of a contiguous bundle of data rows.
//! - **markup**: flat or percentage adjustment applied across a set of rows.
//!
//! The `rowType` tag is the discriminant. Its JSON form is cross-checked
//! against the id space on parse; disagreement is reported as a
//! [`TaxonomyError`] rather than silently coerced.

pub mod collection;
pub mod id;

pub use collection::{CollectionError, RowCollection};
pub use id::{GroupId, MarkupId, ModelId, PlaceholderId, RowId, RowIdError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::{Group, Markup, ServerModel, Unit};

/// Field name → value mapping for a row's cells.
pub type RowData = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// RowType
// ---------------------------------------------------------------------------

/// The closed set of row categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowType {
    Model,
    Placeholder,
    Group,
    Markup,
}

impl RowType {
    pub const ALL: [Self; 4] = [Self::Model, Self::Placeholder, Self::Group, Self::Markup];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Placeholder => "placeholder",
            Self::Group => "group",
            Self::Markup => "markup",
        }
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowType {
    type Err = TaxonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaxonomyError::UnknownRowType { raw: s.to_string() })
    }
}

/// A row value that cannot be placed in the taxonomy.
///
/// Any of these means the row was built incorrectly upstream; callers must
/// not attempt to repair it.
#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    #[error("row is not a JSON object")]
    NotAnObject,

    #[error("row is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("unknown row type '{raw}': expected one of model, placeholder, group, markup")]
    UnknownRowType { raw: String },

    #[error(transparent)]
    InvalidId(#[from] RowIdError),

    #[error("row tagged '{row_type}' carries id '{id}' from the {} id space", .id.row_type())]
    Mismatch { row_type: RowType, id: RowId },

    #[error("malformed {row_type} row: {source}")]
    Shape {
        row_type: RowType,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Row variants
// ---------------------------------------------------------------------------

/// Data row backed by a persisted server model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRow {
    pub id: ModelId,
    #[serde(default)]
    pub data: RowData,
    /// Child model ids when this row is a parent in a two-level hierarchy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ModelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markups: Vec<MarkupId>,
}

impl ModelRow {
    /// Build a row from a server model, outside of any group or markup.
    #[must_use]
    pub fn from_model(model: &ServerModel) -> Self {
        Self {
            id: model.id,
            data: model.fields.clone(),
            children: model.children.clone(),
            group: None,
            markups: Vec::new(),
        }
    }
}

/// Data row created locally, pending a server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderRow {
    pub id: PlaceholderId,
    #[serde(default)]
    pub data: RowData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markups: Vec<MarkupId>,
}

/// Summary row closing a contiguous run of member rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: GroupId,
    pub data: GroupData,
}

/// Fields carried by a group row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Member model ids in display order.
    #[serde(default)]
    pub children: Vec<ModelId>,
}

impl From<&Group> for GroupRow {
    fn from(group: &Group) -> Self {
        Self {
            id: GroupId(group.id),
            data: GroupData {
                name: group.name.clone(),
                color: group.color.clone(),
                children: group.children.clone(),
            },
        }
    }
}

/// Adjustment row applied across its member rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupRow {
    pub id: MarkupId,
    #[serde(default)]
    pub data: MarkupData,
}

/// Fields carried by a markup row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkupData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub rate: Option<f64>,
    /// Member model ids in display order.
    #[serde(default)]
    pub children: Vec<ModelId>,
}

impl From<&Markup> for MarkupRow {
    fn from(markup: &Markup) -> Self {
        Self {
            id: MarkupId(markup.id),
            data: MarkupData {
                identifier: markup.identifier.clone(),
                description: markup.description.clone(),
                unit: markup.unit,
                rate: markup.rate,
                children: markup.children.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One grid row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rowType", rename_all = "lowercase")]
pub enum Row {
    Model(ModelRow),
    Placeholder(PlaceholderRow),
    Group(GroupRow),
    Markup(MarkupRow),
}

impl Row {
    #[must_use]
    pub fn id(&self) -> RowId {
        match self {
            Self::Model(r) => RowId::Model(r.id),
            Self::Placeholder(r) => RowId::Placeholder(r.id.clone()),
            Self::Group(r) => RowId::Group(r.id),
            Self::Markup(r) => RowId::Markup(r.id),
        }
    }

    /// Cheap id comparison that avoids cloning placeholder tokens.
    #[must_use]
    pub fn has_id(&self, id: &RowId) -> bool {
        match (self, id) {
            (Self::Model(r), RowId::Model(other)) => r.id == *other,
            (Self::Placeholder(r), RowId::Placeholder(other)) => r.id == *other,
            (Self::Group(r), RowId::Group(other)) => r.id == *other,
            (Self::Markup(r), RowId::Markup(other)) => r.id == *other,
            _ => false,
        }
    }

    #[must_use]
    pub const fn row_type(&self) -> RowType {
        match self {
            Self::Model(_) => RowType::Model,
            Self::Placeholder(_) => RowType::Placeholder,
            Self::Group(_) => RowType::Group,
            Self::Markup(_) => RowType::Markup,
        }
    }

    /// Cell data of a data row; aggregates carry typed fields instead.
    #[must_use]
    pub const fn data(&self) -> Option<&RowData> {
        match self {
            Self::Model(r) => Some(&r.data),
            Self::Placeholder(r) => Some(&r.data),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut RowData> {
        match self {
            Self::Model(r) => Some(&mut r.data),
            Self::Placeholder(r) => Some(&mut r.data),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    /// Enclosing group of a data row.
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        match self {
            Self::Model(r) => r.group,
            Self::Placeholder(r) => r.group,
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    /// Markups applied to a data row.
    #[must_use]
    pub fn markups(&self) -> &[MarkupId] {
        match self {
            Self::Model(r) => &r.markups,
            Self::Placeholder(r) => &r.markups,
            Self::Group(_) | Self::Markup(_) => &[],
        }
    }

    pub(crate) fn set_group(&mut self, group: Option<GroupId>) {
        match self {
            Self::Model(r) => r.group = group,
            Self::Placeholder(r) => r.group = group,
            Self::Group(_) | Self::Markup(_) => {}
        }
    }

    pub(crate) fn markups_mut(&mut self) -> Option<&mut Vec<MarkupId>> {
        match self {
            Self::Model(r) => Some(&mut r.markups),
            Self::Placeholder(r) => Some(&mut r.markups),
            Self::Group(_) | Self::Markup(_) => None,
        }
    }

    /// Parse a row from raw JSON, validating the taxonomy first.
    ///
    /// # Errors
    ///
    /// Returns a [`TaxonomyError`] when the value is not an object, lacks
    /// `rowType`/`id`, names an unknown row type, carries an id from a
    /// different id space than its tag, or does not match the variant shape.
    pub fn from_value(value: Value) -> Result<Self, TaxonomyError> {
        let row_type = classify(&value)?;
        let shape = |source| TaxonomyError::Shape { row_type, source };
        match row_type {
            RowType::Model => serde_json::from_value(value).map(Self::Model).map_err(shape),
            RowType::Placeholder => serde_json::from_value(value)
                .map(Self::Placeholder)
                .map_err(shape),
            RowType::Group => serde_json::from_value(value).map(Self::Group).map_err(shape),
            RowType::Markup => serde_json::from_value(value).map(Self::Markup).map_err(shape),
        }
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Determine the category of a raw JSON row.
///
/// The `rowType` tag decides; the id space must agree with it.
///
/// # Errors
///
/// See [`Row::from_value`].
pub fn classify(value: &Value) -> Result<RowType, TaxonomyError> {
    let object = value.as_object().ok_or(TaxonomyError::NotAnObject)?;
    let raw_type = object
        .get("rowType")
        .and_then(Value::as_str)
        .ok_or(TaxonomyError::MissingField { field: "rowType" })?;
    let row_type: RowType = raw_type.parse()?;

    let raw_id = object
        .get("id")
        .ok_or(TaxonomyError::MissingField { field: "id" })?;
    let id = parse_raw_id(raw_id)?;

    if id.row_type() == row_type {
        Ok(row_type)
    } else {
        Err(TaxonomyError::Mismatch { row_type, id })
    }
}

fn parse_raw_id(raw: &Value) -> Result<RowId, RowIdError> {
    match raw {
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(0), _) => Err(RowIdError::NonPositiveModel { raw: 0 }),
            (Some(id), _) => Ok(RowId::Model(id)),
            (None, Some(neg)) => Err(RowIdError::NonPositiveModel { raw: neg }),
            (None, None) => Err(RowIdError::Malformed { raw: n.to_string() }),
        },
        Value::String(s) => s.parse(),
        other => Err(RowIdError::Malformed {
            raw: other.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Typeguards
// ---------------------------------------------------------------------------

#[must_use]
pub const fn is_model_row(row: &Row) -> bool {
    matches!(row, Row::Model(_))
}

#[must_use]
pub const fn is_placeholder_row(row: &Row) -> bool {
    matches!(row, Row::Placeholder(_))
}

#[must_use]
pub const fn is_group_row(row: &Row) -> bool {
    matches!(row, Row::Group(_))
}

#[must_use]
pub const fn is_markup_row(row: &Row) -> bool {
    matches!(row, Row::Markup(_))
}

/// Model or placeholder: a row whose cells are editable.
#[must_use]
pub const fn is_data_row(row: &Row) -> bool {
    is_model_row(row) || is_placeholder_row(row)
}

/// Group or markup: a row summarizing other rows.
#[must_use]
pub const fn is_aggregate_row(row: &Row) -> bool {
    is_group_row(row) || is_markup_row(row)
}
