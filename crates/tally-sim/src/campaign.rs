//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds across configurable parameters, collecting pass/fail
//! results and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::generator::GeneratorConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Models in the table before the first event.
    pub initial_rows: usize,
    /// Generated events per seed, before pending confirmations are drained.
    pub steps: u64,
    /// Share of references to ids that never existed (percent, 0–100).
    pub stale_percent: u8,
    /// Maximum server confirmation delay in steps.
    pub max_confirm_delay: u64,
    /// Share of deletes aimed at unconfirmed placeholders (percent, 0–100).
    pub delete_race_percent: u8,
    pub reorder_on_update: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            initial_rows: 6,
            steps: 64,
            stale_percent: 10,
            max_confirm_delay: 4,
            delete_race_percent: 30,
            reorder_on_update: true,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            initial_rows: self.initial_rows,
            steps: self.steps,
            generator: GeneratorConfig {
                stale_percent: self.stale_percent,
                max_confirm_delay: self.max_confirm_delay,
                delete_race_percent: self.delete_race_percent,
            },
            reorder_on_update: self.reorder_on_update,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        if self.stale_percent > 100 || self.delete_race_percent > 100 {
            bail!("percentages must be within 0..=100");
        }
        if self.max_confirm_delay == 0 {
            bail!("max_confirm_delay must be > 0");
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed all invariants.
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    /// All seed failures with violation details.
    pub failures: Vec<SeedFailure>,
    /// Seeds where a confirmation arrived for an already deleted row.
    pub races_observed: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure: Option<u64> = None;
    let mut failures = Vec::new();
    let mut races_observed = 0_usize;

    for seed in config.seed_range.clone() {
        seeds_run += 1;
        let result = run_single_seed(seed, config)?;
        if result.races > 0 {
            races_observed += 1;
        }
        if result.passed() {
            seeds_passed += 1;
        } else {
            warn!(seed, violations = result.violations.len(), "seed failed");
            if first_failure.is_none() {
                first_failure = Some(seed);
            }
            failures.push(SeedFailure {
                seed,
                violations: result.violations.iter().map(ToString::to_string).collect(),
            });
        }
    }

    info!(
        seeds_run,
        seeds_passed, races_observed, "simulation campaign finished"
    );
    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        races_observed,
    })
}

/// Run a single seed and return its full result.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). Invariant violations are part of the result.
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    simulator.run()
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    run_single_seed(seed, config)
}
