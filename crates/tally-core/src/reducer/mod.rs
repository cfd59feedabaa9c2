//! The row collection reducer.
//!
//! [`Reducer::reduce`] takes the current [`RowCollection`] and one
//! [`TableEvent`] and returns a new collection. The input is never
//! modified. References to rows that are not there (deleted locally while a
//! server confirmation was in flight, a typo in an event log, a row of the
//! wrong kind) do not fail the reduction: they are skipped and reported in
//! [`Reduction::stale`]. When an event changes nothing the input collection
//! is returned as is.
//!
//! Events that can change row count or membership re-derive aggregate
//! `children`, drop aggregates left without members and restore display
//! order. Cell-level events leave row positions untouched.

mod aggregate;
mod data;
mod structure;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::consolidate::ConsolidationError;
use crate::error::ErrorCode;
use crate::event::{EventParseError, EventType, TableEvent};
use crate::order::{order_rows, sync_aggregates};
use crate::rows::{Row, RowCollection, RowId, RowType};

/// Reducer behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducerConfig {
    /// Restore display order after `updateRows`.
    pub reorder_on_update: bool,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            reorder_on_update: true,
        }
    }
}

/// Why an event reference was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "rowType")]
pub enum StaleReason {
    /// No row with this id exists.
    Missing,
    /// The row exists but the event cannot apply to its kind.
    WrongRowType(RowType),
    /// The row is not a member of the aggregate named by the event.
    NotMember,
    /// None of the aggregate's listed children exist.
    NoMembers,
    /// A row with the activated model id already exists.
    AlreadyPresent,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("not present"),
            Self::WrongRowType(t) => write!(f, "not applicable to {t} rows"),
            Self::NotMember => f.write_str("not a member"),
            Self::NoMembers => f.write_str("no listed children present"),
            Self::AlreadyPresent => f.write_str("model id already present"),
        }
    }
}

/// A skipped reference produced while reducing one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleReference {
    pub event_type: EventType,
    pub id: RowId,
    pub reason: StaleReason,
}

impl fmt::Display for StaleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.event_type, self.id, self.reason)
    }
}

/// Result of a reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub rows: RowCollection,
    pub stale: Vec<StaleReference>,
}

/// Caller errors: the event cannot be applied at all.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    #[error("placeholdersActivated lists {placeholders} placeholder ids but {models} models")]
    MisalignedActivation { placeholders: usize, models: usize },

    #[error("event would introduce duplicate row id {id}")]
    DuplicateRow { id: RowId },

    #[error(transparent)]
    Event(#[from] EventParseError),
}

impl ReduceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Consolidation(ConsolidationError::Empty) => ErrorCode::EmptyRowChanges,
            Self::Consolidation(ConsolidationError::MixedIds { .. }) => ErrorCode::MixedRowChanges,
            Self::MisalignedActivation { .. } => ErrorCode::MisalignedActivation,
            Self::DuplicateRow { .. } => ErrorCode::DuplicateRowId,
            Self::Event(EventParseError::UnknownType(_)) => ErrorCode::UnknownEventType,
            Self::Event(_) => ErrorCode::MalformedPayload,
        }
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Mutable working copy of the rows for one reduction.
pub(crate) struct Draft {
    pub(crate) rows: Vec<Row>,
    stale: Vec<StaleReference>,
    event_type: EventType,
    config: ReducerConfig,
    changed: bool,
    resync: bool,
    reorder: bool,
}

impl Draft {
    fn new(rows: Vec<Row>, event_type: EventType, config: ReducerConfig) -> Self {
        Self {
            rows,
            stale: Vec::new(),
            event_type,
            config,
            changed: false,
            resync: false,
            reorder: false,
        }
    }

    pub(crate) fn position(&self, id: &RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.has_id(id))
    }

    pub(crate) fn contains(&self, id: &RowId) -> bool {
        self.position(id).is_some()
    }

    pub(crate) fn stale(&mut self, id: RowId, reason: StaleReason) {
        debug!(event = %self.event_type, %id, %reason, "skipping stale reference");
        self.stale.push(StaleReference {
            event_type: self.event_type,
            id,
            reason,
        });
    }

    pub(crate) fn ensure_absent(&self, id: &RowId) -> Result<(), ReduceError> {
        if self.contains(id) {
            Err(ReduceError::DuplicateRow { id: id.clone() })
        } else {
            Ok(())
        }
    }

    /// Record a cell-level change: positions stay put.
    pub(crate) const fn touch(&mut self) {
        self.changed = true;
    }

    /// Record a membership change that does not move rows.
    pub(crate) const fn touch_membership(&mut self) {
        self.changed = true;
        self.resync = true;
    }

    /// Record a structural change: resync and restore display order.
    pub(crate) const fn touch_structure(&mut self) {
        self.changed = true;
        self.resync = true;
        self.reorder = true;
    }

    pub(crate) const fn config(&self) -> ReducerConfig {
        self.config
    }

    fn finish(self, original: &RowCollection) -> Reduction {
        if !self.changed {
            return Reduction {
                rows: original.clone(),
                stale: self.stale,
            };
        }
        let mut rows = self.rows;
        if self.reorder {
            rows = order_rows(rows);
        }
        if self.resync {
            sync_aggregates(&mut rows);
        }
        Reduction {
            rows: RowCollection::from_rows_unchecked(rows),
            stale: self.stale,
        }
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Applies table events to row collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reducer {
    config: ReducerConfig,
}

impl Reducer {
    #[must_use]
    pub const fn new(config: ReducerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> ReducerConfig {
        self.config
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns a [`ReduceError`] for caller errors: row changes that cannot
    /// be merged, misaligned `placeholdersActivated` lists, or an event that
    /// would create a second row with an existing id. Stale references are
    /// not errors.
    pub fn reduce(
        &self,
        rows: &RowCollection,
        event: &TableEvent,
    ) -> Result<Reduction, ReduceError> {
        let mut draft = Draft::new(rows.rows().to_vec(), event.event_type(), self.config);

        match event {
            TableEvent::DataChange(p) => data::data_change(&mut draft, p)?,
            TableEvent::UpdateRows(p) => data::update_rows(&mut draft, p),
            TableEvent::ModelsUpdated(p) => data::models_updated(&mut draft, p),
            TableEvent::PlaceholdersActivated(p) => data::placeholders_activated(&mut draft, p)?,
            TableEvent::RowAdd(p) => structure::row_add(&mut draft, p)?,
            TableEvent::RowInsert(p) => structure::row_insert(&mut draft, p)?,
            TableEvent::RowDelete(p) => structure::row_delete(&mut draft, p),
            TableEvent::ModelsAdded(p) => structure::models_added(&mut draft, p),
            TableEvent::RowAddToGroup(p) => aggregate::row_add_to_group(&mut draft, p),
            TableEvent::RowRemoveFromGroup(p) => aggregate::row_remove_from_group(&mut draft, p),
            TableEvent::RowRemoveFromMarkup(p) => {
                aggregate::row_remove_from_markup(&mut draft, p);
            }
            TableEvent::GroupAdd(g) => aggregate::group_add(&mut draft, g),
            TableEvent::GroupUpdate(p) => aggregate::group_update(&mut draft, p),
            TableEvent::GroupDelete(p) => aggregate::group_delete(&mut draft, p.id),
            TableEvent::MarkupAdd(m) => aggregate::markup_add(&mut draft, m),
            TableEvent::MarkupUpdate(p) => aggregate::markup_update(&mut draft, p),
            TableEvent::MarkupDelete(p) => aggregate::markup_delete(&mut draft, p.id),
        }

        let reduction = draft.finish(rows);
        debug!(
            event = %event.event_type(),
            before = rows.len(),
            after = reduction.rows.len(),
            stale = reduction.stale.len(),
            "reduced"
        );
        Ok(reduction)
    }

    /// Parse an event envelope and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::Event`] if the envelope cannot be parsed
    /// (including an unknown event type), otherwise as [`Reducer::reduce`].
    pub fn reduce_json(&self, rows: &RowCollection, json: &str) -> Result<Reduction, ReduceError> {
        let event = TableEvent::from_json(json)?;
        self.reduce(rows, &event)
    }
}

/// Apply one event with the default configuration.
///
/// # Errors
///
/// See [`Reducer::reduce`].
pub fn reduce(rows: &RowCollection, event: &TableEvent) -> Result<Reduction, ReduceError> {
    Reducer::default().reduce(rows, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RowChange, RowDeletePayload, UpdateRowsPayload, RowUpdate};
    use crate::rows::{ModelRow, RowData};
    use serde_json::json;

    fn collection(ids: &[u64]) -> RowCollection {
        RowCollection::new(
            ids.iter()
                .map(|&id| {
                    Row::Model(ModelRow {
                        id,
                        data: std::iter::once(("rate".to_string(), json!(id))).collect(),
                        children: vec![],
                        group: None,
                        markups: vec![],
                    })
                })
                .collect(),
        )
        .expect("unique ids")
    }

    #[test]
    fn unchanged_input_comes_back_equal() {
        let rows = collection(&[1, 2]);
        let event = TableEvent::data_change(vec![RowChange::new(2).with("rate", 2, 2)]);
        let reduction = reduce(&rows, &event).expect("reduce");
        assert_eq!(reduction.rows, rows);
        assert!(reduction.stale.is_empty());
    }

    #[test]
    fn stale_update_rows_is_a_no_op() {
        let rows = collection(&[1, 2]);
        let event = TableEvent::UpdateRows(UpdateRowsPayload {
            rows: vec![RowUpdate {
                id: RowId::Model(99),
                data: RowData::new(),
            }],
        });
        let reduction = reduce(&rows, &event).expect("reduce");
        assert_eq!(reduction.rows, rows);
        assert_eq!(
            reduction.stale,
            vec![StaleReference {
                event_type: EventType::UpdateRows,
                id: RowId::Model(99),
                reason: StaleReason::Missing,
            }]
        );
    }

    #[test]
    fn delete_of_missing_row_is_reported() {
        let rows = collection(&[1]);
        let event = TableEvent::RowDelete(RowDeletePayload {
            ids: vec![RowId::Model(1), RowId::Model(5)],
        });
        let reduction = reduce(&rows, &event).expect("reduce");
        assert!(reduction.rows.is_empty());
        assert_eq!(reduction.stale.len(), 1);
        assert_eq!(reduction.stale[0].to_string(), "rowDelete: 5 not present");
    }

    #[test]
    fn reduce_json_rejects_unknown_type() {
        let rows = collection(&[1]);
        let err = Reducer::default()
            .reduce_json(&rows, r#"{"type":"rowMove","payload":{}}"#)
            .expect_err("unknown");
        assert_eq!(err.code(), ErrorCode::UnknownEventType);
    }

    #[test]
    fn mixed_ids_in_one_change_list_are_fine() {
        let rows = collection(&[1, 2]);
        let event = TableEvent::data_change(vec![
            RowChange::new(1).with("rate", 1, 10),
            RowChange::new(2).with("rate", 2, 20),
            RowChange::new(1).with("rate", 10, 11),
        ]);
        let reduction = reduce(&rows, &event).expect("reduce");
        let rates: Vec<_> = reduction
            .rows
            .iter()
            .map(|r| r.data().expect("data row")["rate"].clone())
            .collect();
        assert_eq!(rates, [json!(11), json!(20)]);
    }

    #[test]
    fn stale_reason_serializes_with_kind() {
        let json = serde_json::to_value(StaleReason::WrongRowType(RowType::Group)).expect("ser");
        assert_eq!(json, json!({"kind": "wrongRowType", "rowType": "group"}));
    }
}
