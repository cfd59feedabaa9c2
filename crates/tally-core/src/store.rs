//! Single owner of the current row collection.

use tracing::warn;

use crate::event::TableEvent;
use crate::reducer::{ReduceError, Reducer, StaleReference};
use crate::rows::RowCollection;

/// Holds the current collection and swaps it on every dispatched event.
#[derive(Debug, Clone, Default)]
pub struct Store {
    rows: RowCollection,
    reducer: Reducer,
}

impl Store {
    #[must_use]
    pub const fn new(rows: RowCollection, reducer: Reducer) -> Self {
        Self { rows, reducer }
    }

    #[must_use]
    pub const fn rows(&self) -> &RowCollection {
        &self.rows
    }

    #[must_use]
    pub const fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// Apply an event and replace the current collection.
    ///
    /// Stale references are logged and returned; they do not fail the
    /// dispatch.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error unchanged; the collection is left as it
    /// was.
    pub fn dispatch(&mut self, event: &TableEvent) -> Result<Vec<StaleReference>, ReduceError> {
        let reduction = self.reducer.reduce(&self.rows, event)?;
        for stale in &reduction.stale {
            warn!(
                event = %stale.event_type,
                id = %stale.id,
                reason = %stale.reason,
                "stale reference in dispatched event"
            );
        }
        self.rows = reduction.rows;
        Ok(reduction.stale)
    }

    #[must_use]
    pub fn into_rows(self) -> RowCollection {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RowAddPayload, RowChange};
    use crate::rows::RowId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn dispatch_replaces_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = Store::default();
        let payload = RowAddPayload::blank(2, &mut rng);
        let first = RowId::Placeholder(payload.placeholders[0].id.clone());
        store.dispatch(&TableEvent::RowAdd(payload)).expect("add");
        assert_eq!(store.rows().len(), 2);

        let stale = store
            .dispatch(&TableEvent::data_change(vec![
                RowChange::new(first.clone()).with("description", (), "Camera"),
            ]))
            .expect("edit");
        assert!(stale.is_empty());
        let row = store.rows().get(&first).expect("row");
        assert_eq!(row.data().expect("data")["description"], "Camera");
    }

    #[test]
    fn failed_dispatch_keeps_previous_rows() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut store = Store::default();
        let payload = RowAddPayload::blank(1, &mut rng);
        store
            .dispatch(&TableEvent::RowAdd(payload.clone()))
            .expect("add");
        let before = store.rows().clone();
        assert!(store.dispatch(&TableEvent::RowAdd(payload)).is_err());
        assert_eq!(store.rows(), &before);
    }

    #[test]
    fn stale_references_are_returned() {
        let mut store = Store::default();
        let stale = store
            .dispatch(&TableEvent::row_delete(vec![RowId::Model(3)]))
            .expect("delete");
        assert_eq!(stale.len(), 1);
    }
}
