//! `tally check` — verify a row file against the collection invariants.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use tally_core::ErrorCode;
use tally_core::order::{OrderViolation, check_order};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Rows: a JSON array of rows in display order.
    #[arg(long)]
    pub rows: PathBuf,
}

#[derive(Debug, Serialize)]
struct ViolationOutput {
    code: &'static str,
    message: String,
}

impl From<&OrderViolation> for ViolationOutput {
    fn from(violation: &OrderViolation) -> Self {
        Self {
            code: ErrorCode::OrderViolation.code(),
            message: violation.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    rows: usize,
    ok: bool,
    violations: Vec<ViolationOutput>,
}

/// Execute `tally check`.
pub fn run_check(args: &CheckArgs, output: OutputMode) -> Result<()> {
    let rows = super::load_rows(&args.rows)?;
    let violations: Vec<ViolationOutput> = check_order(rows.rows())
        .iter()
        .map(ViolationOutput::from)
        .collect();
    let out = CheckOutput {
        rows: rows.len(),
        ok: violations.is_empty(),
        violations,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "check rows={} violations={}",
                out.rows,
                out.violations.len()
            )?;
            for v in &out.violations {
                writeln!(w, "violation code={} {}", v.code, v.message)?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Row Check")?;
            pretty_kv(w, "Rows", out.rows.to_string())?;
            if out.ok {
                pretty_kv(w, "Status", "ok")?;
            } else {
                pretty_kv(w, "Status", format!("{} violations", out.violations.len()))?;
                writeln!(w)?;
                for v in &out.violations {
                    writeln!(w, "- [{}] {}", v.code, v.message)?;
                }
                if let Some(hint) = ErrorCode::OrderViolation.hint() {
                    writeln!(w)?;
                    pretty_kv(w, "Hint", hint)?;
                }
            }
            Ok(())
        },
    )?;

    if !out.ok {
        std::process::exit(1);
    }
    Ok(())
}
