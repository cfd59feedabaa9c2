//! Display-order maintenance.
//!
//! Layout rules for a row collection:
//!
//! 1. Rows of one group are contiguous and immediately followed by the
//!    group row. The block sits where the group's first member was.
//! 2. Ungrouped data rows keep their relative order.
//! 3. Markup rows trail every data row, in their prior relative order.
//!
//! [`sync_aggregates`] complements the layout: it drops membership
//! references to aggregates that no longer exist, removes aggregates that
//! have no members left and re-derives each aggregate's `children`.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::rows::{GroupId, MarkupId, ModelId, Row, RowId, is_data_row};

/// Reorder rows to satisfy the layout rules. Stable and idempotent.
#[must_use]
pub fn order_rows(rows: Vec<Row>) -> Vec<Row> {
    let total = rows.len();
    let mut blocks: Vec<(Option<GroupId>, Vec<Row>)> = Vec::with_capacity(total);
    let mut block_of_group: HashMap<GroupId, usize> = HashMap::new();
    let mut group_rows: Vec<Option<Row>> = Vec::new();
    let mut group_row_index: HashMap<GroupId, usize> = HashMap::new();
    let mut markup_rows: Vec<Row> = Vec::new();

    for row in rows {
        match &row {
            Row::Group(g) => {
                group_row_index.insert(g.id, group_rows.len());
                group_rows.push(Some(row));
            }
            Row::Markup(_) => markup_rows.push(row),
            Row::Model(_) | Row::Placeholder(_) => match row.group() {
                Some(group) => {
                    if let Some(&idx) = block_of_group.get(&group) {
                        blocks[idx].1.push(row);
                    } else {
                        block_of_group.insert(group, blocks.len());
                        blocks.push((Some(group), vec![row]));
                    }
                }
                None => blocks.push((None, vec![row])),
            },
        }
    }

    let mut ordered = Vec::with_capacity(total);
    for (group, members) in blocks {
        ordered.extend(members);
        if let Some(slot) = group
            .and_then(|g| group_row_index.get(&g))
            .and_then(|&idx| group_rows[idx].take())
        {
            ordered.push(slot);
        }
    }
    // Groups without members.
    ordered.extend(group_rows.into_iter().flatten());
    ordered.extend(markup_rows);
    ordered
}

/// Reconcile aggregate rows with the membership recorded on data rows.
pub fn sync_aggregates(rows: &mut Vec<Row>) {
    let groups: HashSet<GroupId> = rows
        .iter()
        .filter_map(|row| match row {
            Row::Group(g) => Some(g.id),
            _ => None,
        })
        .collect();
    let markups: HashSet<MarkupId> = rows
        .iter()
        .filter_map(|row| match row {
            Row::Markup(m) => Some(m.id),
            _ => None,
        })
        .collect();

    for row in rows.iter_mut() {
        if row.group().is_some_and(|g| !groups.contains(&g)) {
            row.set_group(None);
        }
        if let Some(refs) = row.markups_mut() {
            let mut seen = HashSet::new();
            refs.retain(|m| markups.contains(m) && seen.insert(*m));
        }
    }

    let mut live_groups: HashSet<GroupId> = HashSet::new();
    let mut live_markups: HashSet<MarkupId> = HashSet::new();
    let mut group_children: HashMap<GroupId, Vec<ModelId>> = HashMap::new();
    let mut markup_children: HashMap<MarkupId, Vec<ModelId>> = HashMap::new();
    for row in rows.iter().filter(|row| is_data_row(row)) {
        let model = row.id().as_model();
        if let Some(group) = row.group() {
            live_groups.insert(group);
            if let Some(id) = model {
                group_children.entry(group).or_default().push(id);
            }
        }
        for markup in row.markups() {
            live_markups.insert(*markup);
            if let Some(id) = model {
                markup_children.entry(*markup).or_default().push(id);
            }
        }
    }

    rows.retain(|row| match row {
        Row::Group(g) if !live_groups.contains(&g.id) => {
            debug!(group = %g.id, "dropping group without members");
            false
        }
        Row::Markup(m) if !live_markups.contains(&m.id) => {
            debug!(markup = %m.id, "dropping markup without members");
            false
        }
        _ => true,
    });

    for row in rows.iter_mut() {
        match row {
            Row::Group(g) => g.data.children = group_children.remove(&g.id).unwrap_or_default(),
            Row::Markup(m) => m.data.children = markup_children.remove(&m.id).unwrap_or_default(),
            Row::Model(_) | Row::Placeholder(_) => {}
        }
    }
}

/// Order rows, then reconcile aggregates against the final order.
#[must_use]
pub fn normalize_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut rows = order_rows(rows);
    sync_aggregates(&mut rows);
    rows
}

// ---------------------------------------------------------------------------
// Checking
// ---------------------------------------------------------------------------

/// A broken collection invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderViolation {
    #[error("row id {id} appears more than once")]
    DuplicateId { id: RowId },

    #[error("members of {group} are not contiguous")]
    NonContiguousGroup { group: GroupId },

    #[error("{group} row does not directly follow its last member")]
    GroupRowMisplaced { group: GroupId },

    #[error("{markup} row precedes a data row")]
    MarkupBeforeData { markup: MarkupId },

    #[error("aggregate {id} has no members")]
    EmptyAggregate { id: RowId },

    #[error("children of {id} do not match its members")]
    StaleChildren { id: RowId },

    #[error("row {row} references missing aggregate {aggregate}")]
    DanglingMembership { row: RowId, aggregate: RowId },
}

/// Report every layout or aggregate invariant the rows break.
///
/// An empty result means the collection is well-formed.
#[must_use]
pub fn check_order(rows: &[Row]) -> Vec<OrderViolation> {
    let mut violations = Vec::new();

    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        let id = row.id();
        if !seen.insert(id.clone()) {
            violations.push(OrderViolation::DuplicateId { id });
        }
    }

    let last_data = rows.iter().rposition(is_data_row);

    for (idx, row) in rows.iter().enumerate() {
        match row {
            Row::Group(g) => {
                let positions: Vec<usize> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.group() == Some(g.id))
                    .map(|(i, _)| i)
                    .collect();
                check_aggregate(
                    &mut violations,
                    RowId::Group(g.id),
                    &g.data.children,
                    rows,
                    &positions,
                );
                if let Some(&last) = positions.last() {
                    if positions.windows(2).any(|w| w[1] != w[0] + 1) {
                        violations.push(OrderViolation::NonContiguousGroup { group: g.id });
                    }
                    if last + 1 != idx {
                        violations.push(OrderViolation::GroupRowMisplaced { group: g.id });
                    }
                }
            }
            Row::Markup(m) => {
                let positions: Vec<usize> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.markups().contains(&m.id))
                    .map(|(i, _)| i)
                    .collect();
                check_aggregate(
                    &mut violations,
                    RowId::Markup(m.id),
                    &m.data.children,
                    rows,
                    &positions,
                );
                if last_data.is_some_and(|last| last > idx) {
                    violations.push(OrderViolation::MarkupBeforeData { markup: m.id });
                }
            }
            Row::Model(_) | Row::Placeholder(_) => {
                let dangling_group = row.group().filter(|g| {
                    !rows
                        .iter()
                        .any(|r| matches!(r, Row::Group(other) if other.id == *g))
                });
                if let Some(group) = dangling_group {
                    violations.push(OrderViolation::DanglingMembership {
                        row: row.id(),
                        aggregate: RowId::Group(group),
                    });
                }
                for markup in row.markups() {
                    let present = rows
                        .iter()
                        .any(|r| matches!(r, Row::Markup(other) if other.id == *markup));
                    if !present {
                        violations.push(OrderViolation::DanglingMembership {
                            row: row.id(),
                            aggregate: RowId::Markup(*markup),
                        });
                    }
                }
            }
        }
    }

    violations
}

fn check_aggregate(
    violations: &mut Vec<OrderViolation>,
    id: RowId,
    children: &[ModelId],
    rows: &[Row],
    positions: &[usize],
) {
    if positions.is_empty() {
        violations.push(OrderViolation::EmptyAggregate { id: id.clone() });
    }
    let members: Vec<ModelId> = positions
        .iter()
        .filter_map(|&i| rows[i].id().as_model())
        .collect();
    if members != children {
        violations.push(OrderViolation::StaleChildren { id });
    }
}
