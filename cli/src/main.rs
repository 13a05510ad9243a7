//! CLI for streamscope
//!
//! Thin driver over the library crates:
//! - devices: List devices of a platform backend
//! - record: Capture a simulated workload into an SBT file
//! - view: Inspect an SBT file
//! - analyze: Timeline utilization and kernel statistics
//! - replay: Re-execute a recorded trace and check ordering

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "streamscope")]
#[command(about = "streamscope - GPU stream tracing, analysis and replay", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the devices a platform backend can see
    Devices(commands::devices::DevicesArgs),

    /// Capture a simulated multi-stream workload into an SBT file
    Record(commands::record::RecordArgs),

    /// Print the header and statistics of an SBT file
    View(commands::view::ViewArgs),

    /// Reconstruct the timeline and report utilization
    Analyze(commands::analyze::AnalyzeArgs),

    /// Replay a recorded trace
    Replay(commands::replay::ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Record(args) => commands::record::run(args).await,
        Commands::View(args) => commands::view::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Replay(args) => commands::replay::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
