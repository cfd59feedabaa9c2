//! Group and markup events.
//!
//! Membership lives on the data rows: a row names at most one group and any
//! number of markups. A `children` list in an add or update event replaces
//! the aggregate's model membership outright. Placeholders cannot appear in
//! a `children` list, so an update leaves their membership alone.

use std::collections::HashSet;

use super::{Draft, StaleReason};
use crate::event::{
    GroupMembershipPayload, GroupUpdatePayload, MarkupMembershipPayload, MarkupUpdatePayload,
};
use crate::model::{Group, Markup};
use crate::rows::{
    GroupId, GroupRow, MarkupId, MarkupRow, ModelId, Row, RowId, is_data_row, is_model_row,
};

/// Positions of the listed model ids that are present; absent ones are
/// reported as stale.
fn present_children(draft: &mut Draft, children: &[ModelId]) -> Vec<usize> {
    let mut positions = Vec::with_capacity(children.len());
    for &child in children {
        let id = RowId::Model(child);
        match draft.position(&id) {
            Some(idx) => positions.push(idx),
            None => draft.stale(id, StaleReason::Missing),
        }
    }
    positions
}

fn member_ids(draft: &Draft, is_member: impl Fn(&Row) -> bool) -> HashSet<RowId> {
    draft
        .rows
        .iter()
        .filter(|row| is_member(row))
        .map(Row::id)
        .collect()
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Clear every member's reference to `group` and drop its row.
fn detach_group(draft: &mut Draft, group: GroupId) {
    for row in &mut draft.rows {
        if row.group() == Some(group) {
            row.set_group(None);
        }
    }
    if let Some(idx) = draft.position(&RowId::Group(group)) {
        draft.rows.remove(idx);
    }
}

/// Make exactly the present `children` the model members of `group`.
fn replace_group_members(draft: &mut Draft, group: GroupId, children: &[ModelId]) {
    let positions = present_children(draft, children);
    let before = member_ids(draft, |row| is_model_row(row) && row.group() == Some(group));
    let after: HashSet<RowId> = positions.iter().map(|&idx| draft.rows[idx].id()).collect();
    if before == after {
        return;
    }
    for row in draft.rows.iter_mut().filter(|row| is_model_row(row)) {
        if row.group() == Some(group) {
            row.set_group(None);
        }
    }
    for idx in positions {
        draft.rows[idx].set_group(Some(group));
    }
    draft.touch_structure();
}

pub(super) fn group_add(draft: &mut Draft, group: &Group) {
    let id = GroupId(group.id);
    let positions = present_children(draft, &group.children);
    if positions.is_empty() {
        draft.stale(RowId::Group(id), StaleReason::NoMembers);
        return;
    }

    let members: Vec<RowId> = positions.iter().map(|&idx| draft.rows[idx].id()).collect();
    detach_group(draft, id);

    let mut last = 0;
    for member in &members {
        if let Some(idx) = draft.position(member) {
            draft.rows[idx].set_group(Some(id));
            last = last.max(idx);
        }
    }
    draft.rows.insert(last + 1, Row::Group(GroupRow::from(group)));
    draft.touch_structure();
}

pub(super) fn group_update(draft: &mut Draft, payload: &GroupUpdatePayload) {
    let id = RowId::Group(payload.id);
    let Some(idx) = draft.position(&id) else {
        draft.stale(id, StaleReason::Missing);
        return;
    };

    let mut changed = false;
    if let Row::Group(row) = &mut draft.rows[idx] {
        if let Some(name) = &payload.data.name
            && row.data.name != *name
        {
            row.data.name.clone_from(name);
            changed = true;
        }
        if let Some(color) = &payload.data.color
            && row.data.color.as_ref() != Some(color)
        {
            row.data.color = Some(color.clone());
            changed = true;
        }
    }
    if changed {
        draft.touch();
    }

    if let Some(children) = &payload.data.children {
        replace_group_members(draft, payload.id, children);
    }
}

pub(super) fn group_delete(draft: &mut Draft, group: GroupId) {
    let id = RowId::Group(group);
    if draft.contains(&id) {
        detach_group(draft, group);
        draft.touch_structure();
    } else {
        draft.stale(id, StaleReason::Missing);
    }
}

pub(super) fn row_add_to_group(draft: &mut Draft, payload: &GroupMembershipPayload) {
    let group_id = RowId::Group(payload.group);
    if !draft.contains(&group_id) {
        draft.stale(group_id, StaleReason::Missing);
        return;
    }
    for id in &payload.rows {
        let Some(idx) = draft.position(id) else {
            draft.stale(id.clone(), StaleReason::Missing);
            continue;
        };
        let row = &mut draft.rows[idx];
        if !is_data_row(row) {
            let row_type = row.row_type();
            draft.stale(id.clone(), StaleReason::WrongRowType(row_type));
        } else if row.group() != Some(payload.group) {
            row.set_group(Some(payload.group));
            draft.touch_structure();
        }
    }
}

pub(super) fn row_remove_from_group(draft: &mut Draft, payload: &GroupMembershipPayload) {
    for id in &payload.rows {
        let Some(idx) = draft.position(id) else {
            draft.stale(id.clone(), StaleReason::Missing);
            continue;
        };
        if draft.rows[idx].group() == Some(payload.group) {
            draft.rows[idx].set_group(None);
            draft.touch_structure();
        } else {
            draft.stale(id.clone(), StaleReason::NotMember);
        }
    }
}

// ---------------------------------------------------------------------------
// Markups
// ---------------------------------------------------------------------------

/// Strip `markup` from every row and drop its row.
fn detach_markup(draft: &mut Draft, markup: MarkupId) {
    for row in &mut draft.rows {
        if let Some(refs) = row.markups_mut() {
            refs.retain(|m| *m != markup);
        }
    }
    if let Some(idx) = draft.position(&RowId::Markup(markup)) {
        draft.rows.remove(idx);
    }
}

fn attach_markup(row: &mut Row, markup: MarkupId) {
    if let Some(refs) = row.markups_mut()
        && !refs.contains(&markup)
    {
        refs.push(markup);
    }
}

/// Make exactly the present `children` the model rows carrying `markup`.
fn replace_markup_members(draft: &mut Draft, markup: MarkupId, children: &[ModelId]) {
    let positions = present_children(draft, children);
    let before = member_ids(draft, |row| is_model_row(row) && row.markups().contains(&markup));
    let after: HashSet<RowId> = positions.iter().map(|&idx| draft.rows[idx].id()).collect();
    if before == after {
        return;
    }
    for row in draft.rows.iter_mut().filter(|row| is_model_row(row)) {
        if let Some(refs) = row.markups_mut() {
            refs.retain(|m| *m != markup);
        }
    }
    for idx in positions {
        attach_markup(&mut draft.rows[idx], markup);
    }
    draft.touch_structure();
}

pub(super) fn markup_add(draft: &mut Draft, markup: &Markup) {
    let id = MarkupId(markup.id);
    let positions = present_children(draft, &markup.children);
    if positions.is_empty() {
        draft.stale(RowId::Markup(id), StaleReason::NoMembers);
        return;
    }

    let members: Vec<RowId> = positions.iter().map(|&idx| draft.rows[idx].id()).collect();
    detach_markup(draft, id);
    for member in &members {
        if let Some(idx) = draft.position(member) {
            attach_markup(&mut draft.rows[idx], id);
        }
    }
    draft.rows.push(Row::Markup(MarkupRow::from(markup)));
    draft.touch_structure();
}

pub(super) fn markup_update(draft: &mut Draft, payload: &MarkupUpdatePayload) {
    let id = RowId::Markup(payload.id);
    let Some(idx) = draft.position(&id) else {
        draft.stale(id, StaleReason::Missing);
        return;
    };

    let patch = &payload.data;
    let mut changed = false;
    if let Row::Markup(row) = &mut draft.rows[idx] {
        let data = &mut row.data;
        if patch.identifier.is_some() && data.identifier != patch.identifier {
            data.identifier.clone_from(&patch.identifier);
            changed = true;
        }
        if patch.description.is_some() && data.description != patch.description {
            data.description.clone_from(&patch.description);
            changed = true;
        }
        if patch.unit.is_some() && data.unit != patch.unit {
            data.unit = patch.unit;
            changed = true;
        }
        if patch.rate.is_some() && data.rate != patch.rate {
            data.rate = patch.rate;
            changed = true;
        }
    }
    if changed {
        draft.touch();
    }

    if let Some(children) = &patch.children {
        replace_markup_members(draft, payload.id, children);
    }
}

pub(super) fn markup_delete(draft: &mut Draft, markup: MarkupId) {
    let id = RowId::Markup(markup);
    if draft.contains(&id) {
        detach_markup(draft, markup);
        draft.touch_structure();
    } else {
        draft.stale(id, StaleReason::Missing);
    }
}

pub(super) fn row_remove_from_markup(draft: &mut Draft, payload: &MarkupMembershipPayload) {
    for id in &payload.rows {
        let Some(idx) = draft.position(id) else {
            draft.stale(id.clone(), StaleReason::Missing);
            continue;
        };
        let removed = draft.rows[idx].markups_mut().is_some_and(|refs| {
            let before = refs.len();
            refs.retain(|m| *m != payload.markup);
            refs.len() != before
        });
        if removed {
            draft.touch_structure();
        } else {
            draft.stale(id.clone(), StaleReason::NotMember);
        }
    }
}
