//! Command-line front end for the rtxcheck oracle.
//!
//! # Usage
//!
//! ```bash
//! # Run every built-in scenario
//! rtxcheck run
//!
//! # Run one scenario with a fixed seed and save the report
//! rtxcheck run --scenario preempt-mbx --seed 7 --output report.json
//!
//! # Pretty-print a saved report
//! rtxcheck show --report report.json
//!
//! # List known scenarios
//! rtxcheck list
//! ```
//!
//! Exits non-zero when any case fails, so runs can gate CI.

use clap::{Parser, Subcommand};
use rtxcheck_harness::scenario::{Scenario, ScenarioReport, DEFAULT_SEED};

#[derive(Parser)]
#[command(name = "rtxcheck")]
#[command(about = "Deterministic conformance oracle for preemptive kernels")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the simulated kernel.
    Run {
        /// Run only the named scenario.
        #[arg(short, long)]
        scenario: Option<String>,

        /// Seed for the simulated timer jitter.
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Save the JSON reports to this path.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Pretty-print a saved report file.
    Show {
        /// Path to a report file written by `run --output`.
        #[arg(short, long)]
        report: String,
    },

    /// List known scenarios.
    List,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            output,
        } => cmd_run(scenario, seed, output),
        Commands::Show { report } => cmd_show(report),
        Commands::List => cmd_list(),
    }
}

fn cmd_run(scenario: Option<String>, seed: u64, output: Option<String>) {
    let scenarios = match scenario {
        Some(name) => match Scenario::by_name(&name) {
            Some(s) => vec![s],
            None => {
                eprintln!("Unknown scenario {name:?}; try `rtxcheck list`.");
                std::process::exit(2);
            }
        },
        None => Scenario::all(),
    };

    let mut reports = Vec::new();
    let mut all_passed = true;
    for scenario in scenarios {
        match scenario.run(seed) {
            Ok(report) => {
                println!("{report}");
                all_passed &= report.passed;
                reports.push(report);
            }
            Err(err) => {
                eprintln!("Scenario {} could not run: {err}", scenario.name());
                std::process::exit(2);
            }
        }
    }

    if let Some(path) = output {
        if let Err(err) = save_reports(&path, &reports) {
            eprintln!("Failed to save reports to {path}: {err}");
            std::process::exit(2);
        }
        eprintln!("Saved {} report(s) to {path}", reports.len());
    }

    if !all_passed {
        std::process::exit(1);
    }
}

fn cmd_show(path: String) {
    let reports = match load_reports(&path) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to load {path}: {err}");
            std::process::exit(2);
        }
    };
    for report in &reports {
        println!("{report}");
    }
}

fn cmd_list() {
    for scenario in Scenario::all() {
        println!("{:<16} prefix {}", scenario.name(), scenario.prefix());
    }
}

fn save_reports(path: &str, reports: &[ScenarioReport]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(reports).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

fn load_reports(path: &str) -> std::io::Result<Vec<ScenarioReport>> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(std::io::Error::other)
}
