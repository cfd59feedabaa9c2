#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::order::check_order;
use tally_core::rows::RowCollection;
use tally_core::{Reducer, TableEvent};

// Each input line is one event. Every accepted event must leave the grid
// in display order, and must not touch the input collection.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let reducer = Reducer::default();
    let mut rows = RowCollection::default();
    for line in text.lines() {
        let Ok(event) = TableEvent::from_json(line) else {
            continue;
        };
        let before = rows.clone();
        let Ok(reduction) = reducer.reduce(&rows, &event) else {
            continue;
        };
        assert_eq!(rows, before);
        let violations = check_order(reduction.rows.rows());
        assert!(violations.is_empty(), "{event}: {violations:?}");
        rows = reduction.rows;
    }
});
