//! Ordered, id-unique collection of grid rows.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{GroupId, GroupRow, MarkupId, MarkupRow, ModelRow, Row, RowId};
use crate::model::TableResponse;
use crate::order::normalize_rows;

/// Error raised when a collection would violate id uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("row id {id} appears more than once")]
    DuplicateId { id: RowId },
}

/// The grid's rows in display order.
///
/// Every id appears at most once. Values are never mutated in place by the
/// reducer; each reduction produces a new collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Row>", into = "Vec<Row>")]
pub struct RowCollection {
    rows: Vec<Row>,
}

impl RowCollection {
    /// Wrap rows as given, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::DuplicateId`] if two rows share an id.
    pub fn new(rows: Vec<Row>) -> Result<Self, CollectionError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            let id = row.id();
            if !seen.insert(id.clone()) {
                return Err(CollectionError::DuplicateId { id });
            }
        }
        Ok(Self { rows })
    }

    /// Build the grid from a bulk server response.
    ///
    /// Membership is taken from each group's and markup's `children`.
    /// Children that reference unknown models are dropped, aggregates left
    /// without members are discarded, and the rows are put in display order.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::DuplicateId`] if the response repeats a
    /// model, group or markup id.
    pub fn from_response(response: &TableResponse) -> Result<Self, CollectionError> {
        let mut rows: Vec<Row> = response
            .models
            .iter()
            .map(|model| Row::Model(ModelRow::from_model(model)))
            .collect();

        for group in &response.groups {
            let id = GroupId(group.id);
            for row in &mut rows {
                if let Row::Model(model) = row
                    && group.children.contains(&model.id)
                {
                    model.group = Some(id);
                }
            }
        }
        for markup in &response.markups {
            let id = MarkupId(markup.id);
            for row in &mut rows {
                if let Row::Model(model) = row
                    && markup.children.contains(&model.id)
                    && !model.markups.contains(&id)
                {
                    model.markups.push(id);
                }
            }
        }

        rows.extend(response.groups.iter().map(|g| Row::Group(GroupRow::from(g))));
        rows.extend(
            response
                .markups
                .iter()
                .map(|m| Row::Markup(MarkupRow::from(m))),
        );

        let collection = Self::new(rows)?;
        Ok(Self {
            rows: normalize_rows(collection.rows),
        })
    }

    /// Wrap rows that the caller has already checked for unique ids.
    pub(crate) const fn from_rows_unchecked(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    #[must_use]
    pub fn position(&self, id: &RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.has_id(id))
    }

    #[must_use]
    pub fn get(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|row| row.has_id(id))
    }

    #[must_use]
    pub fn contains(&self, id: &RowId) -> bool {
        self.get(id).is_some()
    }

    /// Data rows belonging to `group`, in display order.
    pub fn group_members(&self, group: GroupId) -> impl Iterator<Item = &Row> {
        self.rows
            .iter()
            .filter(move |row| row.group() == Some(group))
    }

    /// Data rows carrying `markup`, in display order.
    pub fn markup_members(&self, markup: MarkupId) -> impl Iterator<Item = &Row> {
        self.rows
            .iter()
            .filter(move |row| row.markups().contains(&markup))
    }
}

impl TryFrom<Vec<Row>> for RowCollection {
    type Error = CollectionError;

    fn try_from(rows: Vec<Row>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<RowCollection> for Vec<Row> {
    fn from(collection: RowCollection) -> Self {
        collection.rows
    }
}

impl<'a> IntoIterator for &'a RowCollection {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
