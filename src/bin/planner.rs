//! Slot Planner CLI
//!
//! Reads a color usage profile (JSON, as produced by the G-code parser) and
//! prints slot plans, swap instructions and advisory analyses.
//!
//! Usage:
//!   slot-planner optimize print.json --capacity 4
//!   slot-planner report print.json --output plan.json
//!   slot-planner --help

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use filament_slots::config::OutputFormat;
use filament_slots::{
    AssignmentStrategy, ColorUsageProfile, CompatibilityGraph, PlannerConfig, ProfileFingerprint,
    SlotOptimizer,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slot-planner")]
#[command(about = "Plan filament slot sharing and manual swaps for multi-color prints")]
struct Cli {
    /// Config file (defaults to slot-planner.toml and the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of physical slots
    #[arg(short = 'k', long, global = true)]
    capacity: Option<usize>,

    /// Override the assignment strategy
    #[arg(short, long, global = true, value_enum)]
    strategy: Option<StrategyArg>,

    /// Print single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Interval,
    Affinity,
}

impl From<StrategyArg> for AssignmentStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Interval => AssignmentStrategy::IntervalPartition,
            StrategyArg::Affinity => AssignmentStrategy::AffinityClustering,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Assign colors to slots and schedule manual swaps
    Optimize {
        /// Color usage profile (JSON)
        profile: PathBuf,
    },

    /// Report layers that need more colors than there are slots
    Validate {
        profile: PathBuf,
        /// Exit with status 2 when violations are found
        #[arg(long)]
        strict: bool,
    },

    /// Find near-duplicate colors whose substitution removes swaps
    Substitutes { profile: PathBuf },

    /// Timing windows for every scheduled swap
    Timing { profile: PathBuf },

    /// Operator instructions, one line per swap
    Instructions { profile: PathBuf },

    /// Full plan report
    Report {
        profile: PathBuf,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// SHA256 fingerprint of a profile
    Fingerprint { profile: PathBuf },

    /// Export the slot compatibility graph as Graphviz DOT
    Graph {
        profile: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the effective configuration to a file
    InitConfig {
        #[arg(default_value = "slot-planner.toml")]
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    let format = if cli.compact {
        OutputFormat::Compact
    } else {
        config.output.format
    };
    let optimizer = SlotOptimizer::new(config);

    match cli.command {
        Commands::Optimize { profile } => {
            let profile = read_profile(&profile)?;
            print_json(&optimizer.optimize(&profile)?, format)?;
        }

        Commands::Validate { profile, strict } => {
            let profile = read_profile(&profile)?;
            let result = optimizer.validate_constraints(&profile)?;
            eprintln!("{}", result.summary.message);
            print_json(&result, format)?;
            if strict && !result.is_valid {
                return Ok(2);
            }
        }

        Commands::Substitutes { profile } => {
            let profile = read_profile(&profile)?;
            print_json(&optimizer.find_substitutions(&profile)?, format)?;
        }

        Commands::Timing { profile } => {
            let profile = read_profile(&profile)?;
            let result = optimizer.optimize(&profile)?;
            print_json(&optimizer.analyze_timing(&profile, &result.manual_swaps), format)?;
        }

        Commands::Instructions { profile } => {
            let profile = read_profile(&profile)?;
            let report = optimizer.report(&profile)?;
            if report.instructions.is_empty() {
                println!("No manual swaps needed.");
            }
            for line in &report.instructions {
                println!("{}", line);
            }
        }

        Commands::Report { profile, output } => {
            let profile = read_profile(&profile)?;
            let report = optimizer.report(&profile)?.with_timestamp(chrono::Utc::now());
            let json = to_json(&report, format)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    info!(
                        path = %path.display(),
                        fingerprint = report.fingerprint.short(),
                        "report written"
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Fingerprint { profile } => {
            let profile = read_profile(&profile)?;
            println!("{}", ProfileFingerprint::of(&profile)?);
        }

        Commands::Graph { profile, output } => {
            let profile = read_profile(&profile)?;
            let graph = CompatibilityGraph::from_colors(&profile.colors);
            let dot = graph.to_dot(&profile.colors);
            match output {
                Some(path) => {
                    fs::write(&path, dot).with_context(|| format!("writing {}", path.display()))?;
                    eprintln!(
                        "Exported {} colors, {} compatible pairs to {}",
                        graph.color_count(),
                        graph.edge_count(),
                        path.display()
                    );
                }
                None => print!("{}", dot),
            }
        }

        Commands::InitConfig { path } => {
            let target = path.to_string_lossy();
            optimizer
                .config()
                .save(&target)
                .with_context(|| format!("writing {}", target))?;
            eprintln!("Wrote {}", target);
        }
    }

    Ok(0)
}

fn load_config(cli: &Cli) -> Result<PlannerConfig> {
    let path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let mut config = PlannerConfig::load_from(path.as_deref()).context("loading configuration")?;
    if let Some(capacity) = cli.capacity {
        config.slots.capacity = capacity;
    }
    if let Some(strategy) = cli.strategy {
        config.slots.strategy = strategy.into();
    }
    config.validate()?;
    Ok(config)
}

fn read_profile(path: &Path) -> Result<ColorUsageProfile> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let profile = ColorUsageProfile::from_json(&json)
        .with_context(|| format!("parsing {}", path.display()))?;
    info!(
        path = %path.display(),
        colors = profile.colors.len(),
        layers = profile.total_layers,
        "profile loaded"
    );
    Ok(profile)
}

fn to_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    })
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    println!("{}", to_json(value, format)?);
    Ok(())
}
