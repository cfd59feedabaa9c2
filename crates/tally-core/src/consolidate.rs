//! Consolidation of pending cell changes.
//!
//! A burst of edits to one row (typing, paste, fill-down) produces many
//! [`RowChange`]s. They are folded into a single change per row before
//! being applied or sent to the server: for each field the earliest
//! `oldValue` and the latest `newValue` survive.

use std::collections::HashMap;

use crate::event::RowChange;
use crate::rows::{RowData, RowId};

/// Errors from merging row changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsolidationError {
    #[error("cannot merge an empty list of row changes")]
    Empty,

    #[error("cannot merge changes for different rows: expected {expected}, found {found}")]
    MixedIds { expected: RowId, found: RowId },
}

/// Merge changes that all target the same row, in order.
///
/// # Errors
///
/// Returns [`ConsolidationError::Empty`] for an empty slice and
/// [`ConsolidationError::MixedIds`] if any change targets a different row
/// than the first.
pub fn merge_row_changes(changes: &[RowChange]) -> Result<RowChange, ConsolidationError> {
    let (first, rest) = changes.split_first().ok_or(ConsolidationError::Empty)?;
    let mut merged = first.clone();

    for change in rest {
        if change.id != merged.id {
            return Err(ConsolidationError::MixedIds {
                expected: merged.id,
                found: change.id.clone(),
            });
        }
        for (field, cell) in &change.data {
            merged
                .data
                .entry(field.clone())
                .and_modify(|existing| existing.new_value = cell.new_value.clone())
                .or_insert_with(|| cell.clone());
        }
    }

    Ok(merged)
}

/// Group changes by row id and merge each group.
///
/// The output holds one change per distinct id, ordered by each id's first
/// appearance in `changes`.
///
/// # Errors
///
/// Never fails for well-formed input; the `Result` carries
/// [`merge_row_changes`] errors through unchanged.
pub fn consolidate_row_changes(changes: &[RowChange]) -> Result<Vec<RowChange>, ConsolidationError> {
    let mut order: Vec<&RowId> = Vec::new();
    let mut buckets: HashMap<&RowId, Vec<RowChange>> = HashMap::new();
    for change in changes {
        buckets
            .entry(&change.id)
            .or_insert_with(|| {
                order.push(&change.id);
                Vec::new()
            })
            .push(change.clone());
    }

    order
        .into_iter()
        .filter_map(|id| buckets.remove(id))
        .map(|bucket| merge_row_changes(&bucket))
        .collect()
}

/// Apply a change's new values onto row data (shallow, field by field).
pub fn apply_row_change(data: &mut RowData, change: &RowChange) {
    for (field, cell) in &change.data {
        data.insert(field.clone(), cell.new_value.clone());
    }
}
