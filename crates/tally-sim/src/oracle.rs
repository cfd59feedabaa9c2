use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tally_core::business::Calculator;
use tally_core::event::TableEvent;
use tally_core::order::check_order;
use tally_core::reducer::{ReduceError, Reducer, Reduction};
use tally_core::rows::{RowCollection, RowId};
use tally_core::EventType;

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The collection broke a layout or aggregate rule.
    Layout { step: u64, detail: String },

    /// The reducer rejected an event the generator considers valid.
    Rejected {
        step: u64,
        event_type: EventType,
        error: String,
    },

    /// Every reference of a field-level event was stale, yet rows changed.
    StaleNotNoop { step: u64, event_type: EventType },

    /// A promoted placeholder did not keep its index.
    ActivationMoved {
        step: u64,
        model: u64,
        before: usize,
        after: Option<usize>,
    },

    /// Reducing the same event against the same rows gave another result.
    Nondeterministic { step: u64, event_type: EventType },

    /// A derived total is NaN or infinite.
    NonFiniteTotal { row: String },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout { step, detail } => write!(f, "Layout at step {step}: {detail}"),
            Self::Rejected {
                step,
                event_type,
                error,
            } => write!(f, "Rejected {event_type} at step {step}: {error}"),
            Self::StaleNotNoop { step, event_type } => write!(
                f,
                "StaleNotNoop: fully stale {event_type} at step {step} changed rows"
            ),
            Self::ActivationMoved {
                step,
                model,
                before,
                after,
            } => write!(
                f,
                "ActivationMoved: model {model} at step {step} moved from {before} to {after:?}"
            ),
            Self::Nondeterministic { step, event_type } => write!(
                f,
                "Nondeterministic: {event_type} at step {step} reduced differently on replay"
            ),
            Self::NonFiniteTotal { row } => write!(f, "NonFiniteTotal: row {row}"),
        }
    }
}

// ── Step checks ──────────────────────────────────────────────────────────────

/// Check one reduction of `event` against `before`.
pub fn check_step(
    step: u64,
    reducer: &Reducer,
    before: &RowCollection,
    event: &TableEvent,
    result: &Result<Reduction, ReduceError>,
) -> Vec<InvariantViolation> {
    let event_type = event.event_type();
    let reduction = match result {
        Ok(reduction) => reduction,
        Err(err) => {
            return vec![InvariantViolation::Rejected {
                step,
                event_type,
                error: err.to_string(),
            }];
        }
    };

    let mut violations: Vec<InvariantViolation> = check_order(reduction.rows.rows())
        .into_iter()
        .map(|v| InvariantViolation::Layout {
            step,
            detail: v.to_string(),
        })
        .collect();

    let replay = reducer.reduce(before, event);
    if !replay.as_ref().is_ok_and(|again| again == reduction) {
        violations.push(InvariantViolation::Nondeterministic { step, event_type });
    }

    if let Some(references) = field_references(event)
        && references > 0
        && reduction.stale.len() == references
        && reduction.rows != *before
    {
        violations.push(InvariantViolation::StaleNotNoop { step, event_type });
    }

    if let TableEvent::PlaceholdersActivated(payload) = event
        && let ([placeholder], [model]) = (&payload.placeholder_ids[..], &payload.models[..])
        && let Some(index) = before.position(&RowId::Placeholder(placeholder.clone()))
        && !before.contains(&RowId::Model(model.id))
    {
        let after = reduction.rows.position(&RowId::Model(model.id));
        if after != Some(index) || reduction.rows.len() != before.len() {
            violations.push(InvariantViolation::ActivationMoved {
                step,
                model: model.id,
                before: index,
                after,
            });
        }
    }

    violations
}

/// How many stale references make `event` a complete no-op, for events
/// that only touch row fields.
fn field_references(event: &TableEvent) -> Option<usize> {
    match event {
        TableEvent::DataChange(payload) => Some(
            payload
                .changes
                .iter()
                .map(|c| &c.id)
                .collect::<BTreeSet<_>>()
                .len(),
        ),
        TableEvent::UpdateRows(payload) => Some(payload.rows.len()),
        TableEvent::ModelsUpdated(payload) => Some(payload.models.len()),
        _ => None,
    }
}

/// Every derived total of `rows` must be finite.
#[must_use]
pub fn check_totals(rows: &RowCollection) -> Vec<InvariantViolation> {
    let report = Calculator::default().totals(rows);
    report
        .rows
        .iter()
        .filter(|r| {
            let t = r.totals;
            ![t.nominal, t.fringe_contribution, t.markup_contribution, t.estimated, t.actual, t.variance]
                .iter()
                .all(|v| v.is_finite())
        })
        .map(|r| InvariantViolation::NonFiniteTotal {
            row: r.id.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::event::RowChange;
    use tally_core::reducer::reduce;

    fn rows(value: serde_json::Value) -> RowCollection {
        serde_json::from_value(value).expect("rows")
    }

    #[test]
    fn clean_reduction_passes() {
        let before = rows(json!([{"rowType": "model", "id": 1, "data": {"rate": 1}}]));
        let event = TableEvent::data_change(vec![RowChange::new(1).with("rate", 1, 2)]);
        let result = reduce(&before, &event);
        assert!(check_step(0, &Reducer::default(), &before, &event, &result).is_empty());
    }

    #[test]
    fn broken_layout_is_reported() {
        let before = rows(json!([]));
        let event = TableEvent::row_delete(vec![RowId::Model(4)]);
        // A forged result whose group row precedes its member.
        let forged = Ok(Reduction {
            rows: rows(json!([
                {"rowType": "group", "id": "group-1", "data": {"name": "G", "children": [1]}},
                {"rowType": "model", "id": 1, "data": {}, "group": "group-1"},
            ])),
            stale: vec![],
        });
        let violations = check_step(3, &Reducer::default(), &before, &event, &forged);
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, InvariantViolation::Layout { step: 3, .. }))
        );
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, InvariantViolation::Nondeterministic { .. }))
        );
    }

    #[test]
    fn rejected_events_are_reported() {
        let before = rows(json!([{"rowType": "placeholder", "id": "placeholder-a", "data": {}}]));
        let event: TableEvent = serde_json::from_value(json!({
            "type": "rowAdd",
            "payload": {"placeholders": [{"id": "placeholder-a"}]},
        }))
        .expect("event");
        let result = reduce(&before, &event);
        let violations = check_step(0, &Reducer::default(), &before, &event, &result);
        assert!(matches!(
            violations.as_slice(),
            [InvariantViolation::Rejected { event_type: EventType::RowAdd, .. }]
        ));
    }

    #[test]
    fn finite_totals_pass() {
        let collection = rows(json!([
            {"rowType": "model", "id": 1, "data": {"quantity": 2, "rate": "12.5"}},
        ]));
        assert!(check_totals(&collection).is_empty());
    }

    #[test]
    fn display_names_the_invariant() {
        let v = InvariantViolation::ActivationMoved {
            step: 9,
            model: 7,
            before: 1,
            after: Some(2),
        };
        assert!(v.to_string().starts_with("ActivationMoved"));
    }
}
