//! Property tests for display ordering and aggregate bookkeeping.
//!
//! Every reduction from a well-formed collection must yield a well-formed
//! collection, whatever the event mix and however stale its references.

use proptest::prelude::*;
use serde_json::json;
use tally_core::consolidate::{consolidate_row_changes, merge_row_changes};
use tally_core::event::{RowChange, TableEvent};
use tally_core::order::{check_order, normalize_rows, order_rows};
use tally_core::reducer::{Reducer, ReducerConfig};
use tally_core::rows::{Row, RowCollection, RowId};


use generators::{arb_event, arb_grouping_event, arb_model_id};

fn seed_rows() -> RowCollection {
    let rows: Vec<_> = (1..=8)
        .map(|id| json!({"rowType": "model", "id": id, "data": {"rate": id * 10, "quantity": 1}}))
        .collect();
    serde_json::from_value(json!(rows)).expect("seed rows")
}

fn assert_well_formed(rows: &RowCollection, event: &TableEvent) -> Result<(), TestCaseError> {
    let violations = check_order(rows.rows());
    prop_assert!(
        violations.is_empty(),
        "after {event}: {:?}\nrows: {}",
        violations,
        serde_json::to_string(rows).unwrap_or_default()
    );
    Ok(())
}

fn run(reducer: &Reducer, events: &[TableEvent]) -> Result<RowCollection, TestCaseError> {
    let mut rows = seed_rows();
    for event in events {
        // Caller errors leave the collection as it was.
        if let Ok(reduction) = reducer.reduce(&rows, event) {
            rows = reduction.rows;
        }
        assert_well_formed(&rows, event)?;
    }
    Ok(rows)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Group members stay contiguous and directly precede their group row.
    #[test]
    fn groups_stay_contiguous(events in prop::collection::vec(arb_grouping_event(), 1..25)) {
        run(&Reducer::default(), &events)?;
    }

    #[test]
    fn any_event_sequence_keeps_collection_well_formed(
        events in prop::collection::vec(arb_event(), 1..30),
    ) {
        run(&Reducer::default(), &events)?;
    }

    #[test]
    fn without_reorder_on_update_collection_stays_well_formed(
        events in prop::collection::vec(arb_event(), 1..30),
    ) {
        let reducer = Reducer::new(ReducerConfig { reorder_on_update: false });
        run(&reducer, &events)?;
    }

    #[test]
    fn ids_stay_unique(events in prop::collection::vec(arb_event(), 1..30)) {
        let rows = run(&Reducer::default(), &events)?;
        let mut ids: Vec<RowId> = rows.iter().map(Row::id).collect();
        let total = ids.len();
        ids.sort_by_key(ToString::to_string);
        ids.dedup();
        prop_assert_eq!(ids.len(), total);
    }

    #[test]
    fn normalized_rows_are_a_fixed_point(events in prop::collection::vec(arb_event(), 1..20)) {
        let rows = run(&Reducer::default(), &events)?.into_rows();
        prop_assert_eq!(order_rows(rows.clone()), rows.clone());
        prop_assert_eq!(normalize_rows(rows.clone()), rows);
    }

    /// Reducing never mutates the input collection.
    #[test]
    fn input_collection_is_untouched(event in arb_event()) {
        let rows = seed_rows();
        let before = rows.clone();
        let _ = Reducer::default().reduce(&rows, &event);
        prop_assert_eq!(rows, before);
    }

    #[test]
    fn stale_data_change_is_a_no_op(id in 100u64..200, value in 0i64..1000) {
        let rows = seed_rows();
        let event = TableEvent::data_change(vec![RowChange::new(id).with("rate", (), value)]);
        let reduction = Reducer::default().reduce(&rows, &event).expect("reduce");
        prop_assert_eq!(reduction.rows, rows);
        prop_assert_eq!(reduction.stale.len(), 1);
    }

    /// Merged edits keep the first old value and the last new value per field.
    #[test]
    fn merge_keeps_first_old_and_last_new(
        id in arb_model_id(),
        values in prop::collection::vec(0i64..1000, 1..8),
    ) {
        let changes: Vec<RowChange> = values
            .windows(2)
            .map(|w| RowChange::new(id).with("rate", w[0], w[1]))
            .chain(std::iter::once(RowChange::new(id).with("rate", values[values.len() - 1], 0)))
            .collect();
        let merged = merge_row_changes(&changes).expect("merge");
        let cell = &merged.data["rate"];
        prop_assert_eq!(&cell.old_value, &json!(values[0]));
        prop_assert_eq!(&cell.new_value, &json!(0));
    }

    #[test]
    fn consolidation_yields_one_change_per_row(
        edits in prop::collection::vec((arb_model_id(), 0i64..100), 1..20),
    ) {
        let changes: Vec<RowChange> = edits
            .iter()
            .map(|(id, v)| RowChange::new(*id).with("rate", (), *v))
            .collect();
        let consolidated = consolidate_row_changes(&changes).expect("consolidate");

        let mut expected: Vec<u64> = Vec::new();
        for (id, _) in &edits {
            if !expected.contains(id) {
                expected.push(*id);
            }
        }
        let ids: Vec<RowId> = consolidated.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<RowId> = expected.into_iter().map(RowId::Model).collect();
        prop_assert_eq!(ids, expected);

        for change in &consolidated {
            let last = edits
                .iter()
                .rev()
                .find(|(id, _)| RowId::Model(*id) == change.id)
                .map(|(_, v)| *v);
            prop_assert_eq!(change.data["rate"].new_value.as_i64(), last);
        }
    }
}
