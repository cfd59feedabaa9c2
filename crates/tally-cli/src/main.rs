#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tally: row state model for budgeting grids",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format (overrides FORMAT and the user config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// The explicit output flag, if any.
    const fn format_flag(&self) -> Option<OutputMode> {
        match self.format {
            Some(mode) => Some(mode),
            None if self.json => Some(OutputMode::Json),
            None => None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Replay an event log over a starting grid",
        long_about = "Apply a JSON Lines event log to a starting grid through the reducer\n\
                      and print the resulting rows, every stale reference and any\n\
                      order violation.",
        after_help = "EXAMPLES:\n    # Replay against an empty grid\n    tally replay --events events.jsonl\n\n\
                      # Start from a bulk table response\n    tally replay --rows table.json --events events.jsonl\n\n\
                      # Machine-readable output\n    tally replay --rows rows.json --events events.jsonl --format json\n\n\
                      EVENT TYPES:\n    dataChange rowAdd rowInsert rowDelete rowAddToGroup rowRemoveFromGroup\n    \
                      rowRemoveFromMarkup groupAdd groupUpdate groupDelete markupAdd markupUpdate\n    \
                      markupDelete placeholdersActivated modelsAdded modelsUpdated updateRows"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Compute derived budget totals",
        long_about = "Compute nominal, fringe, markup, estimated, actual and variance values\n\
                      for every row and the grand total.",
        after_help = "EXAMPLES:\n    # Totals with a fringe catalog\n    tally totals --rows rows.json --fringes fringes.json\n\n\
                      # Four decimal places, as JSON\n    tally totals --rows rows.json --precision 4 --format json"
    )]
    Totals(cmd::totals::TotalsArgs),

    #[command(
        about = "Check a row file against the collection invariants",
        after_help = "EXAMPLES:\n    # Exit non-zero when the order is broken\n    tally check --rows rows.json"
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        about = "Run deterministic reducer simulations",
        long_about = "Drive the reducer with seeded random event streams, including stale\n\
                      references and server confirmations racing local deletes, and check\n\
                      the collection invariants after every step.",
        after_help = "EXAMPLES:\n    # Run seeds 0 to 99\n    tally sim --seeds 0..100\n\n\
                      # Replay one seed with its trace\n    tally sim --replay 42"
    )]
    Sim(cmd::sim::SimArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tally=debug,info"
        } else {
            "tally=info,warn"
        })
    });

    let format = env::var("TALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let flag = cli.format_flag();
    let config = match tally_core::config::resolve_config(&project_root, flag.is_some_and(OutputMode::is_json)) {
        Ok(config) => config,
        Err(err) => {
            let mode = flag.unwrap_or(OutputMode::Text);
            output::render_error(mode, &CliError::from(&err))?;
            std::process::exit(1);
        }
    };
    let output = output::resolve_output_mode(flag, &config.resolved_output);
    debug!(?output, root = %project_root.display(), "resolved output mode");

    let command_result = match &cli.command {
        Commands::Replay(args) => cmd::replay::run_replay(args, output, &config.project),
        Commands::Totals(args) => cmd::totals::run_totals(args, output, &config.project),
        Commands::Check(args) => cmd::check::run_check(args, output),
        Commands::Sim(args) => cmd::sim::run_sim(args, output),
    };

    if let Err(err) = command_result {
        output::render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
