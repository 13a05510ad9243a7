//! Devices command implementation

use anyhow::{Context, Result};
use clap::Args;
use streamscope_capture::create_backend;
use streamscope_shared::utils::format_bytes;
use streamscope_shared::PlatformType;

use crate::output;

#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Platform backend: cuda, rocm, metal, maca or sim
    #[arg(short, long, default_value = "sim")]
    pub platform: String,
}

pub fn run(args: DevicesArgs) -> Result<()> {
    let platform: PlatformType = args.platform.parse()?;
    let backend = create_backend(platform).context("Failed to create backend")?;

    if !backend.is_available() {
        anyhow::bail!("{} driver stack is not available on this host", platform);
    }

    let devices = backend
        .enumerate_devices()
        .context("Failed to enumerate devices")?;
    if devices.is_empty() {
        output::warning(&format!("No {} devices found", platform));
        return Ok(());
    }

    output::success(&format!("{} {} device(s)", devices.len(), platform));
    println!(
        "\n  {:>3} {:<28} {:>7} {:>10} {:>5} {:>9}",
        "ID", "NAME", "COMPUTE", "MEMORY", "SMs", "CLOCK"
    );
    for device in &devices {
        println!(
            "  {:>3} {:<28} {:>7} {:>10} {:>5} {:>6}MHz",
            device.device_id,
            device.name,
            device.compute_capability(),
            format_bytes(device.total_memory),
            device.multiprocessor_count,
            device.clock_rate / 1000
        );
    }

    Ok(())
}
