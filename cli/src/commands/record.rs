//! Record command implementation

use std::io::{Seek, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use streamscope_capture::{ProfilerConfig, ProfilerSession, SimulationBackend};
use streamscope_shared::sbt::SbtWriter;
use streamscope_shared::utils::format_bytes;
use tracing::debug;

use crate::output;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Output SBT file
    #[arg(short, long, default_value = "trace.sbt")]
    pub output: PathBuf,

    /// Number of streams, each driven by its own worker thread
    #[arg(short, long, default_value = "4")]
    pub streams: u32,

    /// Upload/kernel/download rounds per stream
    #[arg(long, default_value = "1000")]
    pub ops: usize,

    /// Simulated device count
    #[arg(long, default_value = "1")]
    pub devices: u16,

    /// Profiler config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Capture buffer capacity in events (overrides config and environment)
    #[arg(short, long)]
    pub buffer_size: Option<usize>,

    /// Attach host call stacks to events
    #[arg(long)]
    pub callstacks: bool,

    /// Events drained per batch
    #[arg(long, default_value = "4096")]
    pub batch_size: usize,

    /// Drain interval (e.g., "10ms", "1s")
    #[arg(long, default_value = "10ms")]
    pub poll_interval: String,

    /// Application name stored in the trace header
    #[arg(long, default_value = "simulated_workload")]
    pub app_name: String,
}

pub async fn run(args: RecordArgs) -> Result<()> {
    let poll_interval = streamscope_shared::utils::parse_duration(&args.poll_interval)
        .context("Failed to parse poll interval")?;

    let mut config = match &args.config {
        Some(path) => ProfilerConfig::load(path).context("Failed to load profiler config")?,
        None => ProfilerConfig::default(),
    }
    .with_env_overrides();
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }
    config.capture_callstacks |= args.callstacks;

    let backend = SimulationBackend::with_device_count(args.devices);
    let handle = backend.handle();
    let mut session = ProfilerSession::with_backend(Box::new(backend));
    session
        .initialize(config)
        .context("Failed to initialize profiler session")?;

    let mut writer = SbtWriter::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut metadata = session.metadata(args.app_name.as_str());
    metadata.command_line = std::env::args().collect::<Vec<_>>().join(" ");

    session.start_capture().context("Failed to start capture")?;
    writer
        .write_header(&metadata)
        .context("Failed to write trace header")?;

    let expected = u64::from(args.streams) * (3 * args.ops as u64 + 1);
    let progress = ProgressBar::new(expected);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} events")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let workers: Vec<_> = (0..args.streams)
        .map(|stream| {
            let handle = handle.clone();
            let ops = args.ops;
            tokio::task::spawn_blocking(move || handle.run_stream_workload(stream, ops))
        })
        .collect();

    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    let mut written = 0u64;
    while !workers.iter().all(|w| w.is_finished()) {
        ticker.tick().await;
        written += drain_into(&mut session, &mut writer, args.batch_size)?;
        // keep what was captured so far readable with `view --recover`
        writer.flush().context("Failed to flush trace file")?;
        progress.set_position(written);
    }

    let mut generated = 0;
    for worker in workers {
        generated += worker.await.context("Workload thread panicked")?;
    }

    session.stop_capture().context("Failed to stop capture")?;
    written += drain_into(&mut session, &mut writer, args.batch_size)?;
    progress.set_position(written);

    let dropped = session.events_dropped();
    session.finalize().context("Failed to finalize session")?;
    writer.finalize().context("Failed to finalize trace file")?;
    progress.finish_and_clear();

    let size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    debug!("{} events generated by workers", generated);
    output::success(&format!(
        "Wrote {} events to {} ({})",
        written,
        args.output.display(),
        format_bytes(size)
    ));
    if dropped > 0 {
        output::warning(&format!(
            "{} event(s) dropped; consider a larger --buffer-size",
            dropped
        ));
    }

    Ok(())
}

/// Move everything pending in the session into the trace file
fn drain_into<W: Write + Seek>(
    session: &mut ProfilerSession,
    writer: &mut SbtWriter<W>,
    batch_size: usize,
) -> Result<u64> {
    let batch_size = batch_size.max(1);
    let mut written = 0;
    loop {
        let events = session.get_events(Some(batch_size))?;
        if events.is_empty() {
            break;
        }
        writer
            .write_events(&events)
            .context("Failed to write events")?;
        written += events.len() as u64;
        if events.len() < batch_size {
            break;
        }
    }
    Ok(written)
}
