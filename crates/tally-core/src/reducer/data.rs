//! Cell-level events: edits, server field pushes and placeholder promotion.

use tracing::debug;

use super::{Draft, ReduceError, StaleReason};
use crate::consolidate::{apply_row_change, consolidate_row_changes};
use crate::event::{
    DataChangePayload, ModelsUpdatedPayload, PlaceholdersActivatedPayload, UpdateRowsPayload,
};
use crate::model::ServerModel;
use crate::rows::{ModelRow, Row, RowData, RowId};

pub(super) fn data_change(draft: &mut Draft, payload: &DataChangePayload) -> Result<(), ReduceError> {
    for change in consolidate_row_changes(&payload.changes)? {
        let Some(idx) = draft.position(&change.id) else {
            draft.stale(change.id, StaleReason::Missing);
            continue;
        };
        let row = &mut draft.rows[idx];
        let row_type = row.row_type();
        let Some(data) = row.data_mut() else {
            draft.stale(change.id, StaleReason::WrongRowType(row_type));
            continue;
        };
        let differs = change
            .data
            .iter()
            .any(|(field, cell)| data.get(field) != Some(&cell.new_value));
        if differs {
            apply_row_change(data, &change);
            draft.touch();
        }
    }
    Ok(())
}

/// Shallow-merge fields into a row's data; returns whether anything changed.
fn merge_fields(data: &mut RowData, fields: &RowData) -> bool {
    let mut changed = false;
    for (field, value) in fields {
        if data.get(field) != Some(value) {
            data.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

pub(super) fn update_rows(draft: &mut Draft, payload: &UpdateRowsPayload) {
    let mut changed = false;
    for update in &payload.rows {
        match draft.position(&update.id) {
            None => draft.stale(update.id.clone(), StaleReason::Missing),
            Some(idx) => match &mut draft.rows[idx] {
                Row::Model(model) => changed |= merge_fields(&mut model.data, &update.data),
                other => {
                    let row_type = other.row_type();
                    draft.stale(update.id.clone(), StaleReason::WrongRowType(row_type));
                }
            },
        }
    }
    if changed {
        if draft.config().reorder_on_update {
            draft.touch_structure();
        } else {
            draft.touch();
        }
    }
}

/// Replace a model row's server-owned fields, keeping its membership.
fn refresh_model(row: &mut ModelRow, model: &ServerModel) -> bool {
    if row.data == model.fields && row.children == model.children {
        return false;
    }
    row.data.clone_from(&model.fields);
    row.children.clone_from(&model.children);
    true
}

pub(super) fn models_updated(draft: &mut Draft, payload: &ModelsUpdatedPayload) {
    for model in &payload.models {
        let id = RowId::Model(model.id);
        match draft.position(&id) {
            Some(idx) => {
                if let Row::Model(row) = &mut draft.rows[idx]
                    && refresh_model(row, model)
                {
                    draft.touch();
                }
            }
            None => draft.stale(id, StaleReason::Missing),
        }
    }
}

pub(super) fn placeholders_activated(
    draft: &mut Draft,
    payload: &PlaceholdersActivatedPayload,
) -> Result<(), ReduceError> {
    if payload.placeholder_ids.len() != payload.models.len() {
        return Err(ReduceError::MisalignedActivation {
            placeholders: payload.placeholder_ids.len(),
            models: payload.models.len(),
        });
    }

    for (placeholder, model) in payload.placeholder_ids.iter().zip(&payload.models) {
        let placeholder_id = RowId::Placeholder(placeholder.clone());
        let Some(idx) = draft.position(&placeholder_id) else {
            draft.stale(placeholder_id, StaleReason::Missing);
            continue;
        };
        let Row::Placeholder(pending) = &draft.rows[idx] else {
            continue;
        };
        let (group, markups) = (pending.group, pending.markups.clone());

        let model_id = RowId::Model(model.id);
        if draft.contains(&model_id) {
            // The model already arrived (e.g. via modelsAdded); keep that row.
            draft.rows.remove(idx);
            if let Some(existing) = draft.position(&model_id)
                && let Row::Model(row) = &mut draft.rows[existing]
            {
                refresh_model(row, model);
            }
            draft.stale(model_id, StaleReason::AlreadyPresent);
            draft.touch_structure();
            continue;
        }

        debug!(%placeholder_id, model = model.id, "activating placeholder");
        draft.rows[idx] = Row::Model(ModelRow {
            group,
            markups,
            ..ModelRow::from_model(model)
        });
        draft.touch_membership();
    }
    Ok(())
}
