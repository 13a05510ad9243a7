//! Replay command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use streamscope_analysis::{ReplayConfig, ReplayEngine, ReplayMode};
use streamscope_shared::utils::parse_duration;

use crate::output;

/// Violations listed before the rest are summarized
const MAX_LISTED_VIOLATIONS: usize = 20;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// SBT trace file
    pub file: PathBuf,

    /// Replay mode: full, partial, dry-run or stream
    #[arg(short, long, default_value = "full")]
    pub mode: String,

    /// Stream to replay in stream mode (repeatable)
    #[arg(short, long = "stream")]
    pub streams: Vec<u32>,

    /// Skip ordering and dependency validation
    #[arg(long)]
    pub no_validate: bool,

    /// Give up after this long (e.g., "500ms", "30s")
    #[arg(short, long)]
    pub timeout: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let mode: ReplayMode = args.mode.parse()?;

    let mut config = ReplayConfig::new(mode).with_streams(args.streams.iter().copied());
    if args.no_validate {
        config = config.without_validation();
    }
    if let Some(timeout) = &args.timeout {
        config = config.with_timeout(parse_duration(timeout).context("Failed to parse timeout")?);
    }

    let mut engine = ReplayEngine::new();
    engine
        .load_trace(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;

    let result = engine.replay(&config).context("Replay could not start")?;

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to encode result")?;
        println!("{}", json);
    } else {
        for violation in result.violations.iter().take(MAX_LISTED_VIOLATIONS) {
            output::warning(&violation.to_string());
        }
        if result.violations.len() > MAX_LISTED_VIOLATIONS {
            output::info(&format!(
                "... and {} more violation(s)",
                result.violations.len() - MAX_LISTED_VIOLATIONS
            ));
        }

        if result.success {
            output::success(&result.summary());
        } else {
            output::error(&result.summary());
        }
    }

    if !result.success {
        anyhow::bail!("Replay of {} failed", args.file.display());
    }
    Ok(())
}
