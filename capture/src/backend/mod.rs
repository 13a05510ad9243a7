//! Platform backends
//!
//! A backend enumerates devices and delivers events into a capture buffer
//! through an [`EventSink`]. Vendor drivers (CUPTI, rocprofiler, Metal,
//! MCPTI) are not linked into this build; the simulation backend stands in
//! for them.

pub mod simulation;

use streamscope_shared::{DeviceInfo, PlatformType};
use tracing::debug;

use crate::buffer::EventSink;
use crate::config::ProfilerConfig;
use crate::error::{CaptureError, Result};

use self::simulation::SimulationBackend;

/// Capability set every platform backend provides
pub trait Backend: Send {
    fn platform(&self) -> PlatformType;

    /// Whether the driver stack is present on this host
    fn is_available(&self) -> bool;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Prepare for capture. Events go to `sink` from here on.
    fn initialize(&mut self, config: &ProfilerConfig, sink: EventSink) -> Result<()>;

    fn start_capture(&mut self) -> Result<()>;

    /// Stop delivering new events and flush internal queues into the sink
    fn stop_capture(&mut self) -> Result<()>;

    /// Flush internal queues into the sink; returns the number of events
    /// offered
    fn drain_events(&mut self) -> Result<usize>;

    /// Release driver resources
    fn finalize(&mut self) -> Result<()>;
}

/// Best available platform on this host
pub fn detect_platform() -> PlatformType {
    // No vendor backend is compiled in.
    PlatformType::Simulation
}

/// Construct the backend for `platform`; `Unknown` auto-detects
pub fn create_backend(platform: PlatformType) -> Result<Box<dyn Backend>> {
    let platform = match platform {
        PlatformType::Unknown => detect_platform(),
        other => other,
    };
    debug!("Creating {} backend", platform);

    match platform {
        PlatformType::Simulation => Ok(Box::new(SimulationBackend::new())),
        other => Err(CaptureError::BackendUnavailable(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_backends_unavailable() {
        for platform in [
            PlatformType::Cuda,
            PlatformType::Rocm,
            PlatformType::Metal,
            PlatformType::Maca,
        ] {
            assert!(matches!(
                create_backend(platform),
                Err(CaptureError::BackendUnavailable(p)) if p == platform
            ));
        }
    }

    #[test]
    fn test_unknown_detects_simulation() {
        let backend = create_backend(PlatformType::Unknown).unwrap();
        assert_eq!(backend.platform(), PlatformType::Simulation);
        assert!(backend.is_available());
    }
}
