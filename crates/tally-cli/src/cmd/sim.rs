//! `tally sim` — deterministic simulation campaigns against the reducer.
//!
//! `tally sim --seeds 0..100` runs a campaign; `tally sim --replay 42`
//! replays one seed with its full event trace.

use std::io::Write;
use std::ops::Range;
use std::process;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;

use tally_sim::TraceStep;
use tally_sim::generator::Origin;
use tally_sim::campaign::{CampaignConfig, replay_seed, run_campaign};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Seed range to run, `start..end` (end exclusive).
    #[arg(long, default_value = "0..100", value_parser = parse_seed_range)]
    pub seeds: Range<u64>,

    /// Replay a single seed with its full trace instead of a campaign.
    #[arg(long, conflicts_with = "seeds")]
    pub replay: Option<u64>,

    /// Models in the table before the first event.
    #[arg(long, default_value = "6")]
    pub initial_rows: usize,

    /// Generated events per seed.
    #[arg(long, default_value = "64")]
    pub steps: u64,

    /// Percent of references aimed at ids that never existed.
    #[arg(long, default_value = "10")]
    pub stale: u8,

    /// Maximum server confirmation delay in steps.
    #[arg(long, default_value = "4")]
    pub max_delay: u64,

    /// Percent of deletes aimed at rows whose create is unconfirmed.
    #[arg(long, default_value = "30")]
    pub delete_race: u8,

    /// Keep the row order after `updateRows` instead of re-sorting.
    #[arg(long)]
    pub no_reorder: bool,
}

/// Parse `a..b` into a seed range.
fn parse_seed_range(raw: &str) -> Result<Range<u64>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected start..end, got '{raw}'"))?;
    let start: u64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid range start '{start}': {e}"))?;
    let end: u64 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid range end '{end}': {e}"))?;
    if end <= start {
        return Err(format!("empty seed range {start}..{end}"));
    }
    Ok(start..end)
}

const fn origin_name(origin: Origin) -> &'static str {
    match origin {
        Origin::User => "user",
        Origin::Server => "server",
    }
}

impl SimArgs {
    fn campaign_config(&self) -> CampaignConfig {
        CampaignConfig {
            seed_range: self.seeds.clone(),
            initial_rows: self.initial_rows,
            steps: self.steps,
            stale_percent: self.stale,
            max_confirm_delay: self.max_delay,
            delete_race_percent: self.delete_race,
            reorder_on_update: !self.no_reorder,
        }
    }
}

/// JSON output for a campaign.
#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    races_observed: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

/// JSON output for a replay.
#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    seed: u64,
    steps: usize,
    rows: usize,
    races: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    trace: &'a [TraceStep],
}

fn run_sim_campaign(args: &SimArgs, output: OutputMode) -> Result<()> {
    let report = run_campaign(&args.campaign_config())?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        races_observed: report.races_observed,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "campaign seeds={}..{} steps={} stale_pct={}",
                args.seeds.start, args.seeds.end, args.steps, args.stale
            )?;
            writeln!(
                w,
                "results passed={} failed={} races={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.races_observed, out.all_passed
            )?;
            for failure in out.failures.iter().take(5) {
                writeln!(
                    w,
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                )?;
            }
            if out.failures.len() > 5 {
                writeln!(w, "failures_truncated count={}", out.failures.len() - 5)?;
            }
            if let Some(seed) = out.first_failure {
                writeln!(w, "hint replay_seed={seed} steps={}", args.steps)?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Simulation Campaign")?;
            pretty_kv(w, "Seeds", format!("{}..{}", args.seeds.start, args.seeds.end))?;
            pretty_kv(w, "Steps", args.steps.to_string())?;
            pretty_kv(w, "Stale rate", format!("{}%", args.stale))?;
            pretty_kv(
                w,
                "Results",
                format!(
                    "{} passed / {} failed ({} seeds raced a delete)",
                    out.seeds_passed, out.seeds_failed, out.races_observed
                ),
            )?;
            match out.first_failure {
                None => pretty_kv(w, "Status", "all seeds passed")?,
                Some(seed) => {
                    pretty_kv(
                        w,
                        "Status",
                        format!("{} failures (first at seed {seed})", out.seeds_failed),
                    )?;
                    writeln!(w)?;
                    pretty_section(w, "Failure Samples")?;
                    for failure in out.failures.iter().take(5) {
                        writeln!(w, "seed {:<8} violations={}", failure.seed, failure.violations.len())?;
                        for violation in &failure.violations {
                            writeln!(w, "  - {violation}")?;
                        }
                    }
                    writeln!(w)?;
                    pretty_kv(
                        w,
                        "Replay",
                        format!("tally sim --replay {seed} --steps {}", args.steps),
                    )?;
                }
            }
            Ok(())
        },
    )?;

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }
    Ok(())
}

fn run_sim_replay(seed: u64, args: &SimArgs, output: OutputMode) -> Result<()> {
    let config = CampaignConfig {
        seed_range: seed..seed.saturating_add(1),
        ..args.campaign_config()
    };
    if config.seed_range.is_empty() {
        bail!("seed {seed} cannot be replayed");
    }
    let result = replay_seed(seed, &config)?;

    let out = ReplayOutput {
        seed,
        steps: result.trace.len(),
        rows: result.rows.len(),
        races: result.races,
        oracle_passed: result.passed(),
        violations: result.violations.iter().map(ToString::to_string).collect(),
        trace: &result.trace,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "replay seed={} steps={} rows={} races={} oracle_passed={}",
                out.seed, out.steps, out.rows, out.races, out.oracle_passed
            )?;
            for step in out.trace {
                writeln!(
                    w,
                    "step={} origin={} event={} stale={}{}",
                    step.step,
                    origin_name(step.origin),
                    step.event.event_type(),
                    step.stale.len(),
                    step.error
                        .as_deref()
                        .map(|e| format!(" error=\"{e}\""))
                        .unwrap_or_default()
                )?;
            }
            for violation in &out.violations {
                writeln!(w, "violation={violation}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(w, "Steps", out.steps.to_string())?;
            pretty_kv(w, "Rows", out.rows.to_string())?;
            pretty_kv(w, "Races", out.races.to_string())?;
            pretty_kv(w, "Oracle", out.oracle_passed.to_string())?;
            writeln!(w)?;
            pretty_section(w, "Trace")?;
            for step in out.trace {
                writeln!(
                    w,
                    "{:>5}  {:<7} {}",
                    step.step,
                    origin_name(step.origin),
                    step.event
                )?;
                for stale in &step.stale {
                    writeln!(w, "       stale {stale}")?;
                }
            }
            if !out.oracle_passed {
                writeln!(w)?;
                pretty_section(w, "Invariant Violations")?;
                for violation in &out.violations {
                    writeln!(w, "- {violation}")?;
                }
            }
            Ok(())
        },
    )?;

    if !result.passed() {
        process::exit(1);
    }
    Ok(())
}

/// Dispatch `tally sim`.
pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    match args.replay {
        Some(seed) => run_sim_replay(seed, args, output),
        None => run_sim_campaign(args, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_range_parses() {
        assert_eq!(parse_seed_range("0..100"), Ok(0..100));
        assert_eq!(parse_seed_range(" 5 .. 9 "), Ok(5..9));
    }

    #[test]
    fn bad_seed_ranges_are_rejected() {
        assert!(parse_seed_range("100").is_err());
        assert!(parse_seed_range("9..5").is_err());
        assert!(parse_seed_range("a..5").is_err());
    }

    #[test]
    fn campaign_config_follows_flags() {
        let args = SimArgs {
            seeds: 3..8,
            replay: None,
            initial_rows: 4,
            steps: 10,
            stale: 0,
            max_delay: 2,
            delete_race: 50,
            no_reorder: true,
        };
        let config = args.campaign_config();
        assert_eq!(config.seed_range, 3..8);
        assert_eq!(config.steps, 10);
        assert!(!config.reorder_on_update);
        assert!(config.validate().is_ok());
    }
}
