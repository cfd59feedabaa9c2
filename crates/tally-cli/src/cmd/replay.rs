//! `tally replay` — fold a JSON Lines event log over a starting grid.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use tally_core::config::ProjectConfig;
use tally_core::order::check_order;
use tally_core::reducer::{Reducer, ReducerConfig, StaleReference};
use tally_core::rows::RowCollection;
use tally_core::{Row, Store, TableEvent};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Starting rows: a JSON array of rows or a bulk table response.
    /// Defaults to an empty grid.
    #[arg(long)]
    pub rows: Option<PathBuf>,

    /// Event log, one `{"type": ..., "payload": ...}` object per line.
    #[arg(long)]
    pub events: PathBuf,

    /// Keep the row order after `updateRows` instead of re-sorting.
    #[arg(long)]
    pub no_reorder: bool,

    /// Exit non-zero if any event carried a stale reference.
    #[arg(long)]
    pub strict: bool,
}

/// A stale reference with the log line that produced it.
#[derive(Debug, Serialize)]
struct StaleLine {
    line: usize,
    #[serde(flatten)]
    reference: StaleReference,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    events: usize,
    stale: Vec<StaleLine>,
    violations: Vec<String>,
    rows: RowCollection,
}

/// Read the event log, skipping blank lines and `#` comments.
fn read_events(path: &Path) -> Result<Vec<(usize, TableEvent)>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = TableEvent::from_json(trimmed)
            .with_context(|| format!("{}:{line_no}", path.display()))?;
        events.push((line_no, event));
    }
    Ok(events)
}

fn row_line(row: &Row) -> String {
    let mut line = format!("{} {}", row.row_type(), row.id());
    if let Some(group) = row.group() {
        line.push_str(&format!(" group={group}"));
    }
    let markups = row.markups();
    if !markups.is_empty() {
        let names: Vec<String> = markups.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" markups={}", names.join(",")));
    }
    line
}

/// Execute `tally replay`.
pub fn run_replay(args: &ReplayArgs, output: OutputMode, project: &ProjectConfig) -> Result<()> {
    let rows = super::load_rows_or_empty(args.rows.as_deref())?;
    let events = read_events(&args.events)?;

    let mut config = ReducerConfig::from(&project.table);
    if args.no_reorder {
        config.reorder_on_update = false;
    }
    let mut store = Store::new(rows, Reducer::new(config));

    let mut stale = Vec::new();
    for (line, event) in &events {
        let skipped = store
            .dispatch(event)
            .with_context(|| format!("{}:{line}: {}", args.events.display(), event.event_type()))?;
        debug!(line, event = %event.event_type(), stale = skipped.len(), "applied");
        stale.extend(skipped.into_iter().map(|reference| StaleLine {
            line: *line,
            reference,
        }));
    }

    let rows = store.into_rows();
    let out = ReplayOutput {
        events: events.len(),
        stale,
        violations: check_order(rows.rows())
            .iter()
            .map(ToString::to_string)
            .collect(),
        rows,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "replay events={} rows={} stale={} violations={}",
                out.events,
                out.rows.len(),
                out.stale.len(),
                out.violations.len()
            )?;
            for row in out.rows.iter() {
                writeln!(w, "row {}", row_line(row))?;
            }
            for s in &out.stale {
                writeln!(
                    w,
                    "stale line={} event={} id={} reason=\"{}\"",
                    s.line, s.reference.event_type, s.reference.id, s.reference.reason
                )?;
            }
            for v in &out.violations {
                writeln!(w, "violation {v}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Replay")?;
            pretty_kv(w, "Events", out.events.to_string())?;
            pretty_kv(w, "Rows", out.rows.len().to_string())?;
            pretty_kv(w, "Stale", out.stale.len().to_string())?;
            writeln!(w)?;
            pretty_section(w, "Rows")?;
            for (idx, row) in out.rows.iter().enumerate() {
                writeln!(w, "{idx:>4}  {}", row_line(row))?;
            }
            if !out.stale.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Stale References")?;
                for s in &out.stale {
                    writeln!(w, "line {:<5} {}", s.line, s.reference)?;
                }
            }
            if !out.violations.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Order Violations")?;
                for v in &out.violations {
                    writeln!(w, "- {v}")?;
                }
            }
            Ok(())
        },
    )?;

    if !out.violations.is_empty() || (args.strict && !out.stale.is_empty()) {
        std::process::exit(1);
    }
    Ok(())
}
