use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

/// Generate, optimize, and submit CI task graphs.
#[derive(Parser)]
#[command(name = "kindling")]
#[command(about = "CI task-graph generation", long_about = None)]
#[command(version)]
struct Cli {
    /// Root directory containing config.yml and kinds/ (default: ./taskcluster)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Parameter source: a file or directory, task-id=<id>, project=<p>,
    /// or index=<path>. Repeatable; each set generates independently.
    #[arg(short = 'p', long = "parameters", global = true)]
    parameters: Vec<String>,

    /// Restrict generation to these kinds (plus their kind-dependencies)
    #[arg(long = "target-kind", global = true)]
    target_kinds: Vec<String>,

    /// Only show tasks whose label matches this regex
    #[arg(long = "tasks", global = true)]
    tasks_regex: Option<String>,

    /// Emit the full JSON task records instead of labels
    #[arg(short = 'J', long, global = true)]
    json: bool,

    /// Strip this dotted path from JSON output (repeatable)
    #[arg(long = "exclude-key", global = true)]
    exclude_keys: Vec<String>,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output-file", global = true)]
    output_file: Option<PathBuf>,

    /// Compare against the generation at a base revision
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "HEAD^")]
    diff: Option<String>,

    /// Skip slow steps where possible
    #[arg(long, global = true)]
    fast: bool,

    /// Skip post-phase verifications
    #[arg(long = "no-verify", global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Phase 1: the full task set and graph
    Full,
    /// Phase 2: the target task set
    Target,
    /// Phase 3: the target graph closed over dependencies
    TargetGraph,
    /// Phase 4: the optimized task graph
    Optimized,
    /// Phase 5: the morphed task graph
    Morphed,
    /// Run all phases, write artifacts, and submit the graph
    Decision,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = commands::Options {
        root: cli.root.clone().unwrap_or_else(|| PathBuf::from("taskcluster")),
        parameters: cli.parameters.clone(),
        target_kinds: cli.target_kinds.clone(),
        tasks_regex: cli.tasks_regex.clone(),
        json: cli.json,
        exclude_keys: cli.exclude_keys.clone(),
        output_file: cli.output_file.clone(),
        diff: cli.diff.clone(),
        verify: !(cli.no_verify || cli.fast),
        phase: match cli.command {
            Commands::Full => commands::Phase::Full,
            Commands::Target => commands::Phase::Target,
            Commands::TargetGraph => commands::Phase::TargetGraph,
            Commands::Optimized => commands::Phase::Optimized,
            Commands::Morphed => commands::Phase::Morphed,
            Commands::Decision => commands::Phase::Decision,
        },
    };

    match commands::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}
