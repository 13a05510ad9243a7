//! Output formatting utilities for CLI commands

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use streamscope_shared::sbt::SbtReader;
use streamscope_shared::{TraceEvent, TraceMetadata};

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Section heading
pub fn heading(title: &str) {
    println!("\n{}", format!("=== {} ===", title).bold());
}

/// A trace file read into memory
pub struct LoadedTrace {
    /// Unknown for files that were never finalized
    pub version: Option<u16>,
    pub metadata: TraceMetadata,
    pub events: Vec<TraceEvent>,
    pub complete: bool,
}

/// Read a whole trace; with `recover`, salvage unfinalized or damaged files
pub fn load_trace(path: &Path, recover: bool) -> Result<LoadedTrace> {
    let mut reader = SbtReader::open(path)
        .with_context(|| format!("Failed to open trace {}", path.display()))?;

    if recover {
        let version = reader.version().ok();
        let trace = reader
            .recover_events()
            .with_context(|| format!("Failed to recover {}", path.display()))?;
        if !trace.complete {
            warning(&format!(
                "{} is incomplete; recovered {} event(s)",
                path.display(),
                trace.events.len()
            ));
        }
        return Ok(LoadedTrace {
            version,
            metadata: trace.metadata,
            events: trace.events,
            complete: trace.complete,
        });
    }

    let version = reader
        .version()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    let metadata = reader
        .read_metadata()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    let events = reader
        .read_all()
        .with_context(|| format!("Failed to read events of {}", path.display()))?;
    Ok(LoadedTrace {
        version: Some(version),
        metadata,
        events,
        complete: true,
    })
}
