//! tally-core library.
//!
//! Row state model for budgeting grids: the row taxonomy, the table change
//! event catalog, the pure reducer that applies events to a row collection,
//! consolidation of pending cell edits, display-order maintenance and the
//! derived budget arithmetic (fringes, markups, totals).
//!
//! ```
//! use tally_core::event::{RowChange, TableEvent};
//! use tally_core::reducer::reduce;
//! use tally_core::rows::RowCollection;
//!
//! let rows: RowCollection = serde_json::from_str(
//!     r#"[{"rowType":"model","id":1,"data":{"rate":100}}]"#,
//! ).unwrap();
//! let event = TableEvent::data_change(vec![RowChange::new(1).with("rate", 100, 120)]);
//! let reduction = reduce(&rows, &event).unwrap();
//! assert_eq!(reduction.rows.rows()[0].data().unwrap()["rate"], 120);
//! ```

pub mod business;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod event;
pub mod model;
pub mod order;
pub mod reducer;
pub mod rows;
pub mod store;

// Conventions
//
// - Errors: `thiserror` enums per module in library code; `anyhow::Result`
//   for config loading and binaries.
// - Logging: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
// - The reducer never mutates its input and performs no I/O.

pub use error::ErrorCode;
pub use event::{EventType, TableEvent};
pub use reducer::{Reducer, ReducerConfig, Reduction, reduce};
pub use rows::{Row, RowCollection, RowId};
pub use store::Store;
