//! tally-sim library.
//!
//! Drives the row reducer with seeded random event streams (user edits,
//! stale references, delayed server confirmations racing local deletes)
//! and checks the collection invariants after every step.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod campaign;
pub mod generator;
pub mod oracle;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tally_core::event::TableEvent;
use tally_core::reducer::{Reducer, ReducerConfig, StaleReason, StaleReference};
use tally_core::rows::RowCollection;
use tally_core::EventType;

use generator::{EventGenerator, GeneratorConfig, Origin};
use oracle::InvariantViolation;

/// Parameters of one simulated editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Models in the table before the first event.
    pub initial_rows: usize,
    /// Events generated before the final drain of pending confirmations.
    pub steps: u64,
    pub generator: GeneratorConfig,
    pub reorder_on_update: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            initial_rows: 6,
            steps: 64,
            generator: GeneratorConfig::default(),
            reorder_on_update: true,
        }
    }
}

/// One applied event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub step: u64,
    pub origin: Origin,
    pub event: TableEvent,
    pub stale: Vec<StaleReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub initial: RowCollection,
    pub rows: RowCollection,
    pub trace: Vec<TraceStep>,
    pub violations: Vec<InvariantViolation>,
    /// Confirmations that arrived after their placeholder was deleted.
    pub races: usize,
}

impl SimulationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct Simulator {
    config: SimulationConfig,
    reducer: Reducer,
    generator: EventGenerator,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if the configuration cannot produce a session.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.steps == 0 {
            bail!("steps must be > 0");
        }
        let reducer = Reducer::new(ReducerConfig {
            reorder_on_update: config.reorder_on_update,
        });
        let generator = EventGenerator::new(config.seed, config.generator.clone());
        Ok(Self {
            config,
            reducer,
            generator,
        })
    }

    /// Run every step, then deliver the confirmations still pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial table cannot be built.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let initial = self
            .generator
            .initial_rows(self.config.initial_rows)
            .context("failed to build initial rows")?;

        let mut rows = initial.clone();
        let mut trace = Vec::new();
        let mut violations = oracle::check_totals(&rows);
        let mut races = 0;

        for step in 0..self.config.steps {
            let (origin, event) = self.generator.next_event(step, &rows);
            races += self.apply(step, origin, event, &mut rows, &mut trace, &mut violations);
        }
        let mut step = self.config.steps;
        while let Some(event) = self.generator.drain_next() {
            races += self.apply(step, Origin::Server, event, &mut rows, &mut trace, &mut violations);
            step += 1;
        }
        violations.extend(oracle::check_totals(&rows));

        debug!(
            seed = self.config.seed,
            steps = trace.len(),
            rows = rows.len(),
            races,
            "simulation finished"
        );
        Ok(SimulationResult {
            initial,
            rows,
            trace,
            violations,
            races,
        })
    }

    fn apply(
        &self,
        step: u64,
        origin: Origin,
        event: TableEvent,
        rows: &mut RowCollection,
        trace: &mut Vec<TraceStep>,
        violations: &mut Vec<InvariantViolation>,
    ) -> usize {
        let result = self.reducer.reduce(rows, &event);
        violations.extend(oracle::check_step(step, &self.reducer, rows, &event, &result));

        let (stale, error) = match result {
            Ok(reduction) => {
                *rows = reduction.rows;
                (reduction.stale, None)
            }
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        let races = stale
            .iter()
            .filter(|s| {
                s.event_type == EventType::PlaceholdersActivated && s.reason == StaleReason::Missing
            })
            .count();
        trace.push(TraceStep {
            step,
            origin,
            event,
            stale,
            error,
        });
        races
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::rows::is_placeholder_row;

    #[test]
    fn zero_steps_rejected() {
        let config = SimulationConfig {
            steps: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn run_drains_every_confirmation() {
        let mut sim = Simulator::new(SimulationConfig::default()).expect("sim");
        let result = sim.run().expect("run");
        assert!(result.trace.len() >= 64);
        assert!(
            result.trace[64..]
                .iter()
                .all(|s| s.origin == Origin::Server)
        );
        assert!(!result.rows.iter().any(is_placeholder_row));
    }

    #[test]
    fn default_session_passes_oracle() {
        let mut sim = Simulator::new(SimulationConfig::default()).expect("sim");
        let result = sim.run().expect("run");
        assert!(result.passed(), "violations: {:?}", result.violations);
    }
}
