//! Analyze command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use streamscope_analysis::{build_timeline, StreamSummary, TraceSummary};
use streamscope_shared::utils::{format_bytes, format_duration};

use crate::output;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// SBT trace file
    pub file: PathBuf,

    /// Salvage the readable prefix of an unfinalized or damaged file
    #[arg(long)]
    pub recover: bool,

    /// Number of kernels to report
    #[arg(short, long, default_value = "10")]
    pub top: usize,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Timeline figures without the per-span list
#[derive(Serialize)]
struct AnalysisReport<'a> {
    total_duration: u64,
    busy_time: u64,
    gpu_utilization: f64,
    max_concurrent_ops: usize,
    streams: &'a [StreamSummary],
    summary: &'a TraceSummary,
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let trace = output::load_trace(&args.file, args.recover)?;
    let timeline = build_timeline(&trace.events);
    let summary = TraceSummary::with_top_kernels(&trace.events, args.top);

    if args.json {
        let report = AnalysisReport {
            total_duration: timeline.total_duration,
            busy_time: timeline.busy_time,
            gpu_utilization: timeline.gpu_utilization,
            max_concurrent_ops: timeline.max_concurrent_ops,
            streams: &timeline.streams,
            summary: &summary,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", json);
        return Ok(());
    }

    if timeline.is_empty() {
        output::warning("Trace contains no events");
        return Ok(());
    }

    output::heading("Timeline");
    println!("  Spans:           {}", timeline.spans.len());
    println!("  Duration:        {}", format_duration(timeline.total_duration));
    println!("  Busy:            {}", format_duration(timeline.busy_time));
    println!("  GPU utilization: {:.1}%", timeline.gpu_utilization * 100.0);
    println!("  Peak concurrency: {}", timeline.max_concurrent_ops);
    if summary.memory_bytes > 0 {
        println!("  Memory moved:    {}", format_bytes(summary.memory_bytes));
    }

    output::heading("Streams");
    println!(
        "  {:<8} {:>8} {:>14} {:>8}",
        "STREAM", "SPANS", "BUSY", "UTIL"
    );
    for stream in &timeline.streams {
        let util = if timeline.total_duration == 0 {
            0.0
        } else {
            stream.busy_time as f64 / timeline.total_duration as f64 * 100.0
        };
        println!(
            "  {:<8} {:>8} {:>14} {:>7.1}%",
            stream.stream_id,
            stream.span_count,
            format_duration(stream.busy_time),
            util
        );
    }

    if !summary.top_kernels.is_empty() {
        output::heading("Top kernels");
        println!(
            "  {:>8} {:>12} {:>12} {:>12}  NAME",
            "CALLS", "TOTAL", "AVG", "MAX"
        );
        for kernel in &summary.top_kernels {
            println!(
                "  {:>8} {:>12} {:>12} {:>12}  {}",
                kernel.count,
                format_duration(kernel.total_duration),
                format_duration(kernel.avg_duration()),
                format_duration(kernel.max_duration),
                kernel.name
            );
        }
    }

    Ok(())
}
