#![forbid(unsafe_code)]

use anyhow::Result;
use tally_sim::campaign::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    let report = run_campaign(&CampaignConfig::default())?;

    println!(
        "simulation campaign complete: seeds={} passed={} races={} first_failure={:?}",
        report.seeds_run, report.seeds_passed, report.races_observed, report.first_failure
    );

    Ok(())
}
