//! Derived budget values.
//!
//! Per data row:
//!
//! ```text
//! nominal    = quantity * rate * multiplier      (see budgeting::nominal_value)
//! fringe     = Σ fringes listed in data.fringes, applied to nominal
//! markup     = Σ PERCENT markups on the row, applied to nominal + fringe
//! estimated  = nominal + fringe + markup
//! variance   = estimated - actual
//! ```
//!
//! Group rows sum their members. A PERCENT markup row shows what it adds
//! across its members; a FLAT markup adds its rate once, at the markup row
//! and in the grand total.

pub mod budgeting;
pub mod fringes;
pub mod markups;

pub use budgeting::{actual_value, fringe_ids, nominal_value, numeric};
pub use fringes::{contribution_from_fringes, fringe_value, unfringe_value};
pub use markups::{contribution_from_markups, markup_contribution};

use serde::Serialize;
use std::collections::HashMap;
use std::ops::{Add, AddAssign};
use tracing::debug;

use crate::model::{Fringe, Markup, Unit};
use crate::rows::{MarkupData, MarkupId, Row, RowCollection, RowId, RowType};

/// A rate-based adjustment: fringes and markups.
pub trait Adjustment {
    fn unit(&self) -> Option<Unit>;
    fn rate(&self) -> Option<f64>;
    /// Ceiling on the base a PERCENT rate applies to.
    fn cutoff(&self) -> Option<f64> {
        None
    }
}

impl Adjustment for Fringe {
    fn unit(&self) -> Option<Unit> {
        self.unit
    }
    fn rate(&self) -> Option<f64> {
        self.rate
    }
    fn cutoff(&self) -> Option<f64> {
        self.cutoff
    }
}

impl Adjustment for Markup {
    fn unit(&self) -> Option<Unit> {
        self.unit
    }
    fn rate(&self) -> Option<f64> {
        self.rate
    }
}

impl Adjustment for MarkupData {
    fn unit(&self) -> Option<Unit> {
        self.unit
    }
    fn rate(&self) -> Option<f64> {
        self.rate
    }
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Decimal places beyond which an f64 carries no more information.
pub const MAX_PRECISION: u32 = 15;

/// Derived values for one row or a sum of rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    pub nominal: f64,
    pub fringe_contribution: f64,
    pub markup_contribution: f64,
    pub estimated: f64,
    pub actual: f64,
    pub variance: f64,
}

impl Totals {
    /// Totals contributed only by a markup (no base, no actuals).
    fn markup_only(contribution: f64) -> Self {
        Self {
            markup_contribution: contribution,
            estimated: contribution,
            variance: contribution,
            ..Self::default()
        }
    }

    /// Round every component to `precision` decimal places.
    ///
    /// Precision is capped at [`MAX_PRECISION`]; values too large to scale
    /// are returned as they are.
    #[must_use]
    pub fn rounded(self, precision: u32) -> Self {
        let exponent = i32::try_from(precision.min(MAX_PRECISION)).unwrap_or_default();
        let factor = 10_f64.powi(exponent);
        let round = |v: f64| {
            let scaled = v * factor;
            if scaled.is_finite() {
                // `+ 0.0` turns a rounded -0.0 into 0.0.
                scaled.round() / factor + 0.0
            } else {
                v
            }
        };
        Self {
            nominal: round(self.nominal),
            fringe_contribution: round(self.fringe_contribution),
            markup_contribution: round(self.markup_contribution),
            estimated: round(self.estimated),
            actual: round(self.actual),
            variance: round(self.variance),
        }
    }
}

impl Add for Totals {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        self.nominal += rhs.nominal;
        self.fringe_contribution += rhs.fringe_contribution;
        self.markup_contribution += rhs.markup_contribution;
        self.estimated += rhs.estimated;
        self.actual += rhs.actual;
        self.variance += rhs.variance;
    }
}

/// Totals for one row of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowTotals {
    pub id: RowId,
    pub row_type: RowType,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Totals for every row plus the grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsReport {
    pub rows: Vec<RowTotals>,
    pub grand_total: Totals,
}

impl TotalsReport {
    #[must_use]
    pub fn get(&self, id: &RowId) -> Option<&Totals> {
        self.rows.iter().find(|r| r.id == *id).map(|r| &r.totals)
    }

    #[must_use]
    pub fn rounded(self, precision: u32) -> Self {
        Self {
            rows: self
                .rows
                .into_iter()
                .map(|r| RowTotals {
                    totals: r.totals.rounded(precision),
                    ..r
                })
                .collect(),
            grand_total: self.grand_total.rounded(precision),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Derives totals for a row collection against a fringe catalog.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    fringes: HashMap<u64, Fringe>,
}

impl Calculator {
    pub fn new(fringes: impl IntoIterator<Item = Fringe>) -> Self {
        Self {
            fringes: fringes.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    /// Fringes referenced by a row; unknown ids are skipped.
    fn fringes_for(&self, row: &Row) -> Vec<&Fringe> {
        let Some(data) = row.data() else {
            return Vec::new();
        };
        fringe_ids(data)
            .into_iter()
            .filter_map(|id| {
                let fringe = self.fringes.get(&id);
                if fringe.is_none() {
                    debug!(row = %row.id(), fringe = id, "row references unknown fringe");
                }
                fringe
            })
            .collect()
    }

    /// Totals of a single data row, without markups.
    #[must_use]
    pub fn base_totals(&self, row: &Row) -> Totals {
        let Some(data) = row.data() else {
            return Totals::default();
        };
        let nominal = nominal_value(data);
        let fringe = contribution_from_fringes(nominal, self.fringes_for(row));
        let actual = actual_value(data);
        Totals {
            nominal,
            fringe_contribution: fringe,
            markup_contribution: 0.0,
            estimated: nominal + fringe,
            actual,
            variance: nominal + fringe - actual,
        }
    }

    /// Totals for every row of `rows`, in display order, and the grand total.
    #[must_use]
    pub fn totals(&self, rows: &RowCollection) -> TotalsReport {
        let markups: HashMap<MarkupId, &MarkupData> = rows
            .iter()
            .filter_map(|row| match row {
                Row::Markup(m) => Some((m.id, &m.data)),
                _ => None,
            })
            .collect();

        let mut per_row: HashMap<RowId, Totals> = HashMap::new();
        let mut per_markup: HashMap<MarkupId, f64> = HashMap::new();
        let mut grand_total = Totals::default();

        for row in rows.iter().filter(|r| r.data().is_some()) {
            let mut totals = self.base_totals(row);
            let base = totals.estimated;
            for markup_id in row.markups() {
                let Some(markup) = markups.get(markup_id) else {
                    continue;
                };
                if markup.unit == Some(Unit::Percent) {
                    let added = markup_contribution(base, *markup);
                    totals.markup_contribution += added;
                    *per_markup.entry(*markup_id).or_default() += added;
                }
            }
            totals.estimated += totals.markup_contribution;
            totals.variance += totals.markup_contribution;
            grand_total += totals;
            per_row.insert(row.id(), totals);
        }

        let mut report = Vec::with_capacity(rows.len());
        for row in rows {
            let totals = match row {
                Row::Model(_) | Row::Placeholder(_) => {
                    per_row.get(&row.id()).copied().unwrap_or_default()
                }
                Row::Group(g) => rows
                    .group_members(g.id)
                    .filter_map(|member| per_row.get(&member.id()).copied())
                    .fold(Totals::default(), Add::add),
                Row::Markup(m) => match (m.data.unit, m.data.rate) {
                    (Some(Unit::Flat), Some(rate)) => {
                        let flat = Totals::markup_only(rate);
                        grand_total += flat;
                        flat
                    }
                    _ => Totals::markup_only(per_markup.get(&m.id).copied().unwrap_or(0.0)),
                },
            };
            report.push(RowTotals {
                id: row.id(),
                row_type: row.row_type(),
                totals,
            });
        }

        TotalsReport {
            rows: report,
            grand_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{GroupData, GroupId, GroupRow, MarkupRow, ModelRow, RowData};
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn line(id: u64, data: serde_json::Value, group: Option<u64>, markups: &[u64]) -> Row {
        let data: RowData = serde_json::from_value(data).expect("data");
        Row::Model(ModelRow {
            id,
            data,
            children: vec![],
            group: group.map(GroupId),
            markups: markups.iter().copied().map(MarkupId).collect(),
        })
    }

    fn markup_row(id: u64, unit: Unit, rate: f64, children: &[u64]) -> Row {
        Row::Markup(MarkupRow {
            id: MarkupId(id),
            data: MarkupData {
                unit: Some(unit),
                rate: Some(rate),
                children: children.to_vec(),
                ..MarkupData::default()
            },
        })
    }

    fn calculator() -> Calculator {
        Calculator::new([
            Fringe {
                id: 1,
                name: Some("Payroll".into()),
                rate: Some(0.1),
                unit: Some(Unit::Percent),
                cutoff: Some(200.0),
            },
            Fringe {
                id: 2,
                name: Some("Kit".into()),
                rate: Some(25.0),
                unit: Some(Unit::Flat),
                cutoff: None,
            },
        ])
    }

    #[test]
    fn data_row_totals_apply_listed_fringes() {
        let row = line(1, json!({"quantity": 5, "rate": 100, "fringes": [1, 2], "actual": 500}), None, &[]);
        let totals = calculator().base_totals(&row);
        assert!(close(totals.nominal, 500.0));
        assert!(close(totals.fringe_contribution, 45.0));
        assert!(close(totals.estimated, 545.0));
        assert!(close(totals.variance, 45.0));
    }

    #[test]
    fn unknown_fringe_ids_are_ignored() {
        let row = line(1, json!({"nominal_value": 100, "fringes": [99]}), None, &[]);
        assert!(close(calculator().base_totals(&row).estimated, 100.0));
    }

    #[test]
    fn collection_totals_with_group_and_markups() {
        let rows = RowCollection::new(vec![
            line(1, json!({"quantity": 1, "rate": 100}), Some(1), &[1]),
            line(2, json!({"quantity": 2, "rate": 50, "fringes": [2]}), Some(1), &[1, 2]),
            Row::Group(GroupRow {
                id: GroupId(1),
                data: GroupData {
                    name: "Props".into(),
                    color: None,
                    children: vec![1, 2],
                },
            }),
            line(3, json!({"nominal_value": 40, "actual": 60}), None, &[]),
            markup_row(1, Unit::Percent, 0.1, &[1, 2]),
            markup_row(2, Unit::Flat, 30.0, &[2]),
        ])
        .expect("rows");

        let report = calculator().totals(&rows);
        let one = report.get(&RowId::Model(1)).expect("row 1");
        assert!(close(one.markup_contribution, 10.0));
        assert!(close(one.estimated, 110.0));

        let two = report.get(&RowId::Model(2)).expect("row 2");
        assert!(close(two.fringe_contribution, 25.0));
        assert!(close(two.markup_contribution, 12.5), "flat markup not charged per row");

        let group = report.get(&RowId::Group(GroupId(1))).expect("group");
        assert!(close(group.estimated, 110.0 + 137.5));

        let percent = report.get(&RowId::Markup(MarkupId(1))).expect("markup 1");
        assert!(close(percent.markup_contribution, 22.5));
        let flat = report.get(&RowId::Markup(MarkupId(2))).expect("markup 2");
        assert!(close(flat.estimated, 30.0));

        assert!(close(report.grand_total.estimated, 110.0 + 137.5 + 40.0 + 30.0));
        assert!(close(report.grand_total.actual, 60.0));
        assert!(close(
            report.grand_total.variance,
            report.grand_total.estimated - report.grand_total.actual
        ));
    }

    #[test]
    fn rounding_applies_precision() {
        let totals = Totals {
            nominal: 1.23456,
            ..Totals::default()
        }
        .rounded(2);
        assert!(close(totals.nominal, 1.23));
    }

    #[test]
    fn rounding_with_huge_precision_stays_finite() {
        let totals = Totals {
            nominal: 1e10,
            estimated: 1.5,
            ..Totals::default()
        };
        for precision in [MAX_PRECISION, 300, 400, u32::MAX] {
            let rounded = totals.rounded(precision);
            assert!((rounded.nominal - 1e10).abs() < 1e-3, "precision {precision}");
            assert!(close(rounded.estimated, 1.5), "precision {precision}");
        }
        let huge = Totals {
            nominal: f64::MAX,
            ..Totals::default()
        }
        .rounded(2);
        assert!(huge.nominal.is_finite());
    }

    #[test]
    fn rounding_never_yields_negative_zero() {
        let totals = Totals {
            variance: -0.001,
            ..Totals::default()
        }
        .rounded(2);
        assert!(close(totals.variance, 0.0));
        assert!(totals.variance.is_sign_positive());
    }

    #[test]
    fn row_without_fringes_or_markups_reports_positive_zero() {
        let row = line(1, json!({"quantity": 1, "rate": 100}), None, &[]);
        let rows = RowCollection::new(vec![row]).expect("rows");
        let report = Calculator::default().totals(&rows);
        let totals = report.get(&RowId::Model(1)).expect("row 1");
        assert!(totals.fringe_contribution.is_sign_positive());
        assert!(totals.markup_contribution.is_sign_positive());
        assert!(report.grand_total.fringe_contribution.is_sign_positive());
    }
}
