//! View command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use streamscope_analysis::TraceSummary;
use streamscope_shared::utils::time::format_wall_clock;
use streamscope_shared::utils::{format_bytes, format_duration};
use streamscope_shared::TraceEvent;

use crate::output;

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// SBT trace file
    pub file: PathBuf,

    /// Salvage the readable prefix of an unfinalized or damaged file
    #[arg(long)]
    pub recover: bool,

    /// Also print the first N events
    #[arg(short = 'n', long, default_value = "0")]
    pub events: usize,

    /// Print the statistics as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ViewArgs) -> Result<()> {
    let trace = output::load_trace(&args.file, args.recover)?;
    let summary = TraceSummary::from_events(&trace.events);

    if args.json {
        let json = summary.to_json_pretty().context("Failed to encode summary")?;
        println!("{}", json);
        return Ok(());
    }

    let metadata = &trace.metadata;
    output::heading("Trace");
    println!("  File:        {}", args.file.display());
    match trace.version {
        Some(version) => println!("  Format:      SBT v{}", version),
        None => println!("  Format:      SBT (unfinalized)"),
    }
    println!("  Application: {}", metadata.application_name);
    if !metadata.command_line.is_empty() {
        println!("  Command:     {}", metadata.command_line);
    }
    println!("  Started:     {}", format_wall_clock(metadata.start_wall_clock));
    if metadata.end_wall_clock != 0 {
        println!("  Ended:       {}", format_wall_clock(metadata.end_wall_clock));
    }
    println!("  Events:      {}", summary.event_count);
    println!("  Span:        {}", format_duration(summary.time_span));
    if summary.memory_bytes > 0 {
        println!("  Moved:       {}", format_bytes(summary.memory_bytes));
    }
    if !trace.complete {
        output::info("Statistics cover the recovered events only");
    }

    if !metadata.devices.is_empty() {
        output::heading("Devices");
        for device in &metadata.devices {
            println!(
                "  [{}] {} ({}, compute {}, {})",
                device.device_id,
                device.name,
                device.vendor,
                device.compute_capability(),
                format_bytes(device.total_memory)
            );
        }
    }

    output::heading("By event type");
    println!("  {:<16} {:>10} {:>14}", "TYPE", "COUNT", "TOTAL");
    for stats in &summary.by_type {
        println!(
            "  {:<16} {:>10} {:>14}",
            stats.event_type.as_str(),
            stats.count,
            format_duration(stats.total_duration)
        );
    }

    output::heading("By stream");
    println!("  {:<8} {:>10} {:>14}", "STREAM", "COUNT", "TOTAL");
    for stats in &summary.by_stream {
        println!(
            "  {:<8} {:>10} {:>14}",
            stats.stream_id,
            stats.event_count,
            format_duration(stats.total_duration)
        );
    }

    if summary.same_stream_overlaps > 0 {
        output::warning(&format!(
            "{} same-stream overlap(s) between synchronous events",
            summary.same_stream_overlaps
        ));
    }

    if args.events > 0 {
        output::heading("Events");
        for event in trace.events.iter().take(args.events) {
            print_event(event);
        }
    }

    Ok(())
}

fn print_event(event: &TraceEvent) {
    let mut line = format!(
        "  {:>14} +{:<10} dev {} stream {:<3} {:<14} {}",
        event.timestamp,
        event.duration,
        event.device_id,
        event.stream_id,
        event.event_type.as_str(),
        event.name
    );
    if let Some(flow) = &event.flow {
        let role = if flow.is_start { "start" } else { "follow" };
        line.push_str(&format!("  flow {} ({})", flow.id, role));
    }
    if let Some(bytes) = event.memory_bytes() {
        line.push_str(&format!("  {}", format_bytes(bytes)));
    }
    println!("{}", line);
}
