//! Reading budget quantities out of row data.
//!
//! Cell values arrive as loosely typed JSON: numbers, numeric strings from
//! an editor, or `null`. Anything that is not a finite number reads as
//! absent.

use serde_json::Value;

use crate::rows::RowData;

/// Numeric value of a cell, if it holds one.
#[must_use]
pub fn numeric(data: &RowData, field: &str) -> Option<f64> {
    let value = match data.get(field)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// The row's nominal (pre-fringe, pre-markup) value.
///
/// `quantity * rate * multiplier` when quantity and rate are both set
/// (multiplier defaults to 1), else an explicit `nominal_value` cell,
/// else zero.
#[must_use]
pub fn nominal_value(data: &RowData) -> f64 {
    match (numeric(data, "quantity"), numeric(data, "rate")) {
        (Some(quantity), Some(rate)) => {
            quantity * rate * numeric(data, "multiplier").unwrap_or(1.0)
        }
        _ => numeric(data, "nominal_value").unwrap_or(0.0),
    }
}

/// Actual spend recorded against the row.
#[must_use]
pub fn actual_value(data: &RowData) -> f64 {
    numeric(data, "actual").unwrap_or(0.0)
}

/// Fringe ids attached to the row via its `fringes` cell.
#[must_use]
pub fn fringe_ids(data: &RowData) -> Vec<u64> {
    match data.get("fringes") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_u64).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> RowData {
        serde_json::from_value(value).expect("row data")
    }

    #[test]
    fn nominal_from_quantity_rate_multiplier() {
        let row = data(json!({"quantity": 3, "rate": "25.5", "multiplier": 2}));
        assert!((nominal_value(&row) - 153.0).abs() < 1e-9);
    }

    #[test]
    fn multiplier_defaults_to_one() {
        let row = data(json!({"quantity": 4, "rate": 10}));
        assert!((nominal_value(&row) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn nominal_falls_back_to_explicit_value_then_zero() {
        let row = data(json!({"rate": 10, "nominal_value": 99}));
        assert!((nominal_value(&row) - 99.0).abs() < 1e-9);
        assert!(nominal_value(&RowData::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_cells_read_as_absent() {
        let row = data(json!({"quantity": "lots", "rate": null, "actual": true}));
        assert_eq!(numeric(&row, "quantity"), None);
        assert_eq!(numeric(&row, "rate"), None);
        assert!(actual_value(&row).abs() < f64::EPSILON);
    }

    #[test]
    fn fringe_ids_skip_garbage() {
        let row = data(json!({"fringes": [1, "x", 3, -2]}));
        assert_eq!(fringe_ids(&row), vec![1, 3]);
    }
}
