//! `tally totals` — derived budget values for every row.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use tally_core::business::{Calculator, MAX_PRECISION, Totals, TotalsReport};
use tally_core::config::ProjectConfig;

use crate::output::{OutputMode, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct TotalsArgs {
    /// Rows: a JSON array of rows or a bulk table response.
    #[arg(long)]
    pub rows: PathBuf,

    /// Fringe catalog: a JSON array of fringes.
    #[arg(long)]
    pub fringes: Option<PathBuf>,

    /// Decimal places (defaults to `[totals] precision` in the project config).
    #[arg(long)]
    pub precision: Option<u32>,
}

const COLUMNS: [&str; 8] = [
    "ID", "TYPE", "NOMINAL", "FRINGES", "MARKUPS", "ESTIMATED", "ACTUAL", "VARIANCE",
];

fn values(t: &Totals) -> [f64; 6] {
    [
        t.nominal,
        t.fringe_contribution,
        t.markup_contribution,
        t.estimated,
        t.actual,
        t.variance,
    ]
}

fn write_text(report: &TotalsReport, precision: usize, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}", COLUMNS.join("  "))?;
    for row in &report.rows {
        let cells: Vec<String> = values(&row.totals)
            .iter()
            .map(|v| format!("{v:.precision$}"))
            .collect();
        writeln!(w, "{}  {}  {}", row.id, row.row_type, cells.join("  "))?;
    }
    let cells: Vec<String> = values(&report.grand_total)
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect();
    writeln!(w, "total  -  {}", cells.join("  "))
}

fn write_pretty(report: &TotalsReport, precision: usize, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Budget Totals")?;
    let header: Vec<String> = COLUMNS[2..].iter().map(|c| format!("{c:>10}")).collect();
    writeln!(w, "{:<18} {:<12}{}", COLUMNS[0], COLUMNS[1], header.join(""))?;
    for row in &report.rows {
        let cells: Vec<String> = values(&row.totals)
            .iter()
            .map(|v| format!("{v:>10.precision$}"))
            .collect();
        writeln!(
            w,
            "{:<18} {:<12}{}",
            row.id.to_string(),
            row.row_type.as_str(),
            cells.join("")
        )?;
    }
    pretty_rule(w)?;
    let cells: Vec<String> = values(&report.grand_total)
        .iter()
        .map(|v| format!("{v:>10.precision$}"))
        .collect();
    writeln!(w, "{:<18} {:<12}{}", "Grand total", "", cells.join(""))
}

/// Execute `tally totals`.
pub fn run_totals(args: &TotalsArgs, output: OutputMode, project: &ProjectConfig) -> Result<()> {
    let rows = super::load_rows(&args.rows)?;
    let fringes = match &args.fringes {
        Some(path) => super::load_fringes(path)?,
        None => Vec::new(),
    };
    let precision = args
        .precision
        .unwrap_or(project.totals.precision)
        .min(MAX_PRECISION);
    let report = Calculator::new(fringes).totals(&rows).rounded(precision);
    let width = usize::try_from(precision).unwrap_or(usize::MAX);

    render_mode(
        output,
        &report,
        |report, w| write_text(report, width, w),
        |report, w| write_pretty(report, width, w),
    )
}
