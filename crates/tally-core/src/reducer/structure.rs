//! Row creation and removal.

use super::{Draft, ReduceError, StaleReason, aggregate};
use crate::event::{
    ModelsAddedPayload, NewPlaceholder, RowAddPayload, RowDeletePayload, RowInsertPayload,
};
use crate::rows::{GroupId, ModelRow, PlaceholderRow, Row, RowId, is_data_row};

/// The group to place new rows in, if it exists.
fn target_group(draft: &mut Draft, group: Option<GroupId>) -> Option<GroupId> {
    let group = group?;
    if draft.contains(&RowId::Group(group)) {
        Some(group)
    } else {
        draft.stale(RowId::Group(group), StaleReason::Missing);
        None
    }
}

fn placeholder_row(new: &NewPlaceholder, group: Option<GroupId>) -> Row {
    Row::Placeholder(PlaceholderRow {
        id: new.id.clone(),
        data: new.data.clone(),
        group,
        markups: Vec::new(),
    })
}

pub(super) fn row_add(draft: &mut Draft, payload: &RowAddPayload) -> Result<(), ReduceError> {
    let group = target_group(draft, payload.group);
    for new in &payload.placeholders {
        draft.ensure_absent(&RowId::Placeholder(new.id.clone()))?;
        draft.rows.push(placeholder_row(new, group));
        draft.touch_structure();
    }
    Ok(())
}

pub(super) fn row_insert(draft: &mut Draft, payload: &RowInsertPayload) -> Result<(), ReduceError> {
    draft.ensure_absent(&RowId::Placeholder(payload.placeholder.id.clone()))?;
    let Some(idx) = draft.position(&payload.previous) else {
        draft.stale(payload.previous.clone(), StaleReason::Missing);
        return Ok(());
    };
    let previous = &draft.rows[idx];
    let group = if is_data_row(previous) {
        previous.group()
    } else {
        None
    };
    draft
        .rows
        .insert(idx + 1, placeholder_row(&payload.placeholder, group));
    draft.touch_structure();
    Ok(())
}

pub(super) fn row_delete(draft: &mut Draft, payload: &RowDeletePayload) {
    for id in &payload.ids {
        match id {
            RowId::Group(group) => aggregate::group_delete(draft, *group),
            RowId::Markup(markup) => aggregate::markup_delete(draft, *markup),
            RowId::Model(_) | RowId::Placeholder(_) => match draft.position(id) {
                Some(idx) => {
                    draft.rows.remove(idx);
                    draft.touch_structure();
                }
                None => draft.stale(id.clone(), StaleReason::Missing),
            },
        }
    }
}

pub(super) fn models_added(draft: &mut Draft, payload: &ModelsAddedPayload) {
    let group = target_group(draft, payload.group);
    for model in &payload.models {
        let id = RowId::Model(model.id);
        if let Some(idx) = draft.position(&id) {
            if let Row::Model(row) = &mut draft.rows[idx] {
                let fresh = ModelRow {
                    group: group.or(row.group),
                    markups: row.markups.clone(),
                    ..ModelRow::from_model(model)
                };
                let changed = *row != fresh;
                *row = fresh;
                if changed {
                    draft.touch_structure();
                }
            }
        } else {
            draft.rows.push(Row::Model(ModelRow {
                group,
                ..ModelRow::from_model(model)
            }));
            draft.touch_structure();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{
        ModelsAddedPayload, NewPlaceholder, RowAddPayload, RowInsertPayload, TableEvent,
    };
    use crate::model::{Group, ServerModel};
    use crate::order::check_order;
    use crate::reducer::{ReduceError, StaleReason, reduce};
    use crate::rows::{GroupId, PlaceholderId, Row, RowCollection, RowData, RowId};

    fn server(id: u64) -> ServerModel {
        ServerModel {
            id,
            children: vec![],
            fields: RowData::new(),
        }
    }

    fn grouped() -> RowCollection {
        let rows = RowCollection::default();
        let rows = reduce(
            &rows,
            &TableEvent::ModelsAdded(ModelsAddedPayload {
                models: vec![server(1), server(2), server(3)],
                group: None,
            }),
        )
        .expect("models")
        .rows;
        reduce(
            &rows,
            &TableEvent::GroupAdd(Group {
                id: 1,
                name: "Props".into(),
                color: None,
                children: vec![1, 2],
            }),
        )
        .expect("group")
        .rows
    }

    fn new_placeholder(token: &str) -> NewPlaceholder {
        NewPlaceholder {
            id: PlaceholderId::new(token).expect("token"),
            data: RowData::new(),
        }
    }

    fn ids(rows: &RowCollection) -> Vec<String> {
        rows.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn row_add_into_group_joins_block() {
        let rows = grouped();
        let event = TableEvent::RowAdd(RowAddPayload {
            placeholders: vec![new_placeholder("a")],
            group: Some(GroupId(1)),
        });
        let out = reduce(&rows, &event).expect("reduce").rows;
        assert_eq!(ids(&out), ["1", "2", "placeholder-a", "group-1", "3"]);
        assert!(check_order(out.rows()).is_empty());
    }

    #[test]
    fn row_add_to_missing_group_adds_ungrouped() {
        let rows = grouped();
        let event = TableEvent::RowAdd(RowAddPayload {
            placeholders: vec![new_placeholder("a")],
            group: Some(GroupId(42)),
        });
        let reduction = reduce(&rows, &event).expect("reduce");
        assert_eq!(ids(&reduction.rows).last().map(String::as_str), Some("placeholder-a"));
        assert_eq!(reduction.stale[0].id, RowId::Group(GroupId(42)));
    }

    #[test]
    fn duplicate_placeholder_is_an_error() {
        let rows = grouped();
        let event = TableEvent::RowAdd(RowAddPayload {
            placeholders: vec![new_placeholder("a"), new_placeholder("a")],
            group: None,
        });
        assert!(matches!(
            reduce(&rows, &event),
            Err(ReduceError::DuplicateRow { .. })
        ));
    }

    #[test]
    fn row_insert_inherits_group() {
        let rows = grouped();
        let event = TableEvent::RowInsert(RowInsertPayload {
            previous: RowId::Model(1),
            placeholder: new_placeholder("b"),
        });
        let out = reduce(&rows, &event).expect("reduce").rows;
        assert_eq!(ids(&out), ["1", "placeholder-b", "2", "group-1", "3"]);
        assert_eq!(out.rows()[1].group(), Some(GroupId(1)));
    }

    #[test]
    fn row_insert_after_missing_row_is_stale() {
        let rows = grouped();
        let event = TableEvent::RowInsert(RowInsertPayload {
            previous: RowId::Model(77),
            placeholder: new_placeholder("b"),
        });
        let reduction = reduce(&rows, &event).expect("reduce");
        assert_eq!(reduction.rows, rows);
        assert_eq!(reduction.stale[0].reason, StaleReason::Missing);
    }

    #[test]
    fn deleting_last_member_destroys_group() {
        let rows = grouped();
        let out = reduce(
            &rows,
            &TableEvent::row_delete(vec![RowId::Model(1), RowId::Model(2)]),
        )
        .expect("reduce")
        .rows;
        assert_eq!(ids(&out), ["3"]);
    }

    #[test]
    fn deleting_group_id_keeps_members() {
        let rows = grouped();
        let out = reduce(&rows, &TableEvent::row_delete(vec![RowId::Group(GroupId(1))]))
            .expect("reduce")
            .rows;
        assert_eq!(ids(&out), ["1", "2", "3"]);
        assert!(out.iter().all(|r| r.group().is_none()));
    }

    #[test]
    fn models_added_upserts() {
        let rows = grouped();
        let mut updated = server(2);
        updated.fields.insert("rate".into(), serde_json::json!(5));
        let reduction = reduce(
            &rows,
            &TableEvent::ModelsAdded(ModelsAddedPayload {
                models: vec![updated, server(4)],
                group: None,
            }),
        )
        .expect("reduce");
        let out = reduction.rows;
        assert_eq!(ids(&out), ["1", "2", "group-1", "3", "4"]);
        let Some(Row::Model(two)) = out.get(&RowId::Model(2)) else {
            panic!("row 2");
        };
        assert_eq!(two.group, Some(GroupId(1)), "membership survives upsert");
        assert_eq!(two.data["rate"], serde_json::json!(5));
    }
}
