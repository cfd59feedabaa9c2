pub mod check;
pub mod replay;
pub mod sim;
pub mod totals;

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tally_core::model::{Fringe, TableResponse};
use tally_core::rows::RowCollection;

/// Load a row collection from `path`.
///
/// A JSON array is taken as rows in display order, exactly as written. A
/// JSON object is taken as a bulk table response (`models`, `groups`,
/// `markups`) and laid out in display order.
pub fn load_rows(path: &Path) -> Result<RowCollection> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if value.is_array() {
        return serde_json::from_value(value)
            .with_context(|| format!("Invalid rows in {}", path.display()));
    }

    let response: TableResponse = serde_json::from_value(value)
        .with_context(|| format!("Invalid table response in {}", path.display()))?;
    RowCollection::from_response(&response)
        .with_context(|| format!("Invalid table response in {}", path.display()))
}

/// Rows from `path`, or an empty grid.
pub fn load_rows_or_empty(path: Option<&Path>) -> Result<RowCollection> {
    path.map_or_else(|| Ok(RowCollection::default()), load_rows)
}

/// Load a fringe catalog (a JSON array of fringes) from `path`.
pub fn load_fringes(path: &Path) -> Result<Vec<Fringe>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid fringes in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::RowId;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write");
        path
    }

    #[test]
    fn array_rows_keep_their_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(
            dir.path(),
            "rows.json",
            r#"[
                {"rowType": "model", "id": 2, "data": {}},
                {"rowType": "model", "id": 1, "data": {}}
            ]"#,
        );
        let rows = load_rows(&path).expect("load");
        let ids: Vec<RowId> = rows.iter().map(tally_core::Row::id).collect();
        assert_eq!(ids, [RowId::Model(2), RowId::Model(1)]);
    }

    #[test]
    fn table_response_is_laid_out() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(
            dir.path(),
            "table.json",
            r#"{
                "models": [{"id": 1}, {"id": 2}, {"id": 3}],
                "groups": [{"id": 4, "name": "Crew", "children": [3]}]
            }"#,
        );
        let rows = load_rows(&path).expect("load");
        let ids: Vec<String> = rows.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, ["1", "2", "3", "group-4"]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_rows(Path::new("/no/such/rows.json")).expect_err("missing");
        assert!(format!("{err:#}").contains("/no/such/rows.json"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(
            dir.path(),
            "rows.json",
            r#"[
                {"rowType": "model", "id": 1, "data": {}},
                {"rowType": "model", "id": 1, "data": {}}
            ]"#,
        );
        assert!(load_rows(&path).is_err());
    }

    #[test]
    fn no_rows_path_gives_an_empty_grid() {
        assert!(load_rows_or_empty(None).expect("empty").is_empty());
    }

    #[test]
    fn fringes_load_from_an_array() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(
            dir.path(),
            "fringes.json",
            r#"[{"id": 1, "rate": 0.1, "unit": "PERCENT", "cutoff": 500}]"#,
        );
        let fringes = load_fringes(&path).expect("load");
        assert_eq!(fringes.len(), 1);
        assert_eq!(fringes[0].cutoff, Some(500.0));
    }
}
