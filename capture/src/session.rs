//! Profiler session lifecycle
//!
//! `Uninitialized -> Initialized -> Capturing <-> Stopped -> Finalized`.
//!
//! Captured/dropped counters accumulate across start/stop cycles for the
//! life of the session. Lifecycle calls take `&mut self`, so transitions are
//! serialized by the borrow checker; producers only ever touch the buffer
//! through their [`EventSink`](crate::buffer::EventSink).

use std::fmt;

use streamscope_shared::utils::time::system_time_nanos;
use streamscope_shared::{DeviceInfo, PlatformType, TraceEvent, TraceMetadata};
use tracing::{debug, info, warn};

use crate::backend::{create_backend, Backend};
use crate::buffer::CaptureBuffer;
use crate::config::ProfilerConfig;
use crate::error::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Capturing,
    Stopped,
    Finalized,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Capturing => "capturing",
            SessionState::Stopped => "stopped",
            SessionState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns a backend, its capture buffer and the device list
pub struct ProfilerSession {
    backend: Box<dyn Backend>,
    state: SessionState,
    config: Option<ProfilerConfig>,
    buffer: Option<CaptureBuffer>,
    devices: Vec<DeviceInfo>,
    capture_started_at: u64,
    capture_stopped_at: u64,
}

impl ProfilerSession {
    /// Session on the backend for `platform` (`Unknown` auto-detects)
    pub fn new(platform: PlatformType) -> Result<Self> {
        Ok(Self::with_backend(create_backend(platform)?))
    }

    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            config: None,
            buffer: None,
            devices: Vec::new(),
            capture_started_at: 0,
            capture_stopped_at: 0,
        }
    }

    fn invalid(&self, operation: &'static str) -> CaptureError {
        CaptureError::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Validate `config`, query devices and allocate the capture buffer.
    ///
    /// On failure the session stays `Uninitialized`.
    pub fn initialize(&mut self, config: ProfilerConfig) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(self.invalid("initialize"));
        }

        config.validate()?;

        let platform = self.backend.platform();
        if !self.backend.is_available() {
            return Err(CaptureError::BackendUnavailable(platform));
        }

        let devices = self.backend.enumerate_devices()?;
        if devices.is_empty() {
            return Err(CaptureError::NoDevice);
        }

        let buffer = CaptureBuffer::new(config.buffer_size)?;
        self.backend.initialize(&config, buffer.sink())?;

        info!(
            "Initialized {} session: {} device(s), buffer capacity {}",
            platform,
            devices.len(),
            config.buffer_size
        );
        for device in &devices {
            debug!(
                "  device {}: {} (compute {})",
                device.device_id,
                device.name,
                device.compute_capability()
            );
        }

        self.devices = devices;
        self.buffer = Some(buffer);
        self.config = Some(config);
        self.state = SessionState::Initialized;
        Ok(())
    }

    pub fn start_capture(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Initialized | SessionState::Stopped
        ) {
            return Err(self.invalid("start capture"));
        }

        self.backend.start_capture()?;
        if self.capture_started_at == 0 {
            self.capture_started_at = system_time_nanos();
        }
        self.state = SessionState::Capturing;
        info!("Capture started");
        Ok(())
    }

    /// Stop capturing and flush backend queues into the buffer
    pub fn stop_capture(&mut self) -> Result<()> {
        if self.state != SessionState::Capturing {
            return Err(self.invalid("stop capture"));
        }

        self.backend.stop_capture()?;
        self.backend.drain_events()?;
        self.capture_stopped_at = system_time_nanos();
        self.state = SessionState::Stopped;

        let dropped = self.events_dropped();
        if dropped > 0 {
            warn!(
                "Capture stopped with {} event(s) dropped (buffer full)",
                dropped
            );
        }
        info!(
            "Capture stopped: {} captured, {} dropped",
            self.events_captured(),
            dropped
        );
        Ok(())
    }

    /// Drain up to `limit` pending events (all when `None`).
    ///
    /// Valid in any state; returns an empty batch when nothing is pending.
    pub fn get_events(&mut self, limit: Option<usize>) -> Result<Vec<TraceEvent>> {
        if self.state == SessionState::Capturing {
            self.backend.drain_events()?;
        }

        let Some(buffer) = &self.buffer else {
            return Ok(Vec::new());
        };
        let events = match limit {
            Some(max) => buffer.drain(max),
            None => buffer.drain_all(),
        };
        if !events.is_empty() {
            debug!("Drained {} events", events.len());
        }
        Ok(events)
    }

    /// Release backend resources; stops first if still capturing.
    ///
    /// Events still in the buffer remain drainable.
    pub fn finalize(&mut self) -> Result<()> {
        match self.state {
            SessionState::Finalized => return Err(self.invalid("finalize")),
            SessionState::Capturing => self.stop_capture()?,
            _ => {}
        }

        self.backend.finalize()?;
        self.state = SessionState::Finalized;
        info!("Session finalized");
        Ok(())
    }

    /// Header for a trace of this session
    pub fn metadata(&self, application_name: impl Into<String>) -> TraceMetadata {
        let mut metadata = TraceMetadata::new(application_name);
        if self.capture_started_at != 0 {
            metadata.start_wall_clock = self.capture_started_at;
        }
        metadata.end_wall_clock = self.capture_stopped_at;
        metadata.devices = self.devices.clone();
        metadata
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn platform(&self) -> PlatformType {
        self.backend.platform()
    }

    pub fn config(&self) -> Option<&ProfilerConfig> {
        self.config.as_ref()
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    pub fn events_captured(&self) -> u64 {
        self.buffer.as_ref().map_or(0, CaptureBuffer::events_captured)
    }

    pub fn events_dropped(&self) -> u64 {
        self.buffer.as_ref().map_or(0, CaptureBuffer::events_dropped)
    }

    /// Events waiting in the buffer
    pub fn pending(&self) -> usize {
        self.buffer.as_ref().map_or(0, CaptureBuffer::len)
    }
}

impl fmt::Debug for ProfilerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerSession")
            .field("platform", &self.backend.platform())
            .field("state", &self.state)
            .field("devices", &self.devices.len())
            .field("captured", &self.events_captured())
            .field("dropped", &self.events_dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulation::{SimulationBackend, SimulationHandle};

    fn small_config() -> ProfilerConfig {
        ProfilerConfig {
            buffer_size: 16_384,
            ..ProfilerConfig::default()
        }
    }

    fn simulated(config: ProfilerConfig) -> (ProfilerSession, SimulationHandle) {
        let backend = SimulationBackend::new();
        let handle = backend.handle();
        let mut session = ProfilerSession::with_backend(Box::new(backend));
        session.initialize(config).unwrap();
        (session, handle)
    }

    #[test]
    fn test_lifecycle() {
        let (mut session, handle) = simulated(small_config());
        assert_eq!(session.state(), SessionState::Initialized);
        assert_eq!(session.devices().len(), 1);

        session.start_capture().unwrap();
        assert!(session.is_capturing());
        handle.generate_kernel_event("k0", 0);
        handle.generate_kernel_event("k1", 1);

        let events = session.get_events(None).unwrap();
        assert_eq!(events.len(), 2);

        session.stop_capture().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        session.finalize().unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn test_zero_buffer_leaves_session_uninitialized() {
        let mut session = ProfilerSession::with_backend(Box::new(SimulationBackend::new()));
        let err = session
            .initialize(ProfilerConfig {
                buffer_size: 0,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidBufferSize));
        assert!(err.is_configuration());
        assert_eq!(session.state(), SessionState::Uninitialized);

        // a later valid config still works
        session.initialize(small_config()).unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_no_device() {
        let mut session =
            ProfilerSession::with_backend(Box::new(SimulationBackend::with_device_count(0)));
        assert!(matches!(
            session.initialize(small_config()),
            Err(CaptureError::NoDevice)
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_invalid_transitions_leave_state_unchanged() {
        let mut session = ProfilerSession::with_backend(Box::new(SimulationBackend::new()));
        assert!(matches!(
            session.start_capture(),
            Err(CaptureError::InvalidState {
                state: SessionState::Uninitialized,
                ..
            })
        ));

        session.initialize(small_config()).unwrap();
        assert!(session.stop_capture().is_err());
        assert!(session.initialize(small_config()).is_err());
        assert_eq!(session.state(), SessionState::Initialized);

        session.finalize().unwrap();
        assert!(session.start_capture().is_err());
        assert!(session.stop_capture().is_err());
        assert!(session.finalize().is_err());
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn test_get_events_in_any_state() {
        let mut session = ProfilerSession::with_backend(Box::new(SimulationBackend::new()));
        assert!(session.get_events(None).unwrap().is_empty());

        session.initialize(small_config()).unwrap();
        assert!(session.get_events(Some(10)).unwrap().is_empty());
    }

    #[test]
    fn test_counters_accumulate_across_cycles() {
        let (mut session, handle) = simulated(ProfilerConfig {
            buffer_size: 4,
            ..Default::default()
        });

        session.start_capture().unwrap();
        for i in 0..3 {
            handle.generate_marker(&format!("a{i}"), 0);
        }
        session.stop_capture().unwrap();
        assert_eq!(session.events_captured(), 3);
        assert_eq!(session.events_dropped(), 0);

        // one slot left, three more events
        session.start_capture().unwrap();
        for i in 0..3 {
            handle.generate_marker(&format!("b{i}"), 0);
        }
        session.stop_capture().unwrap();
        assert_eq!(session.events_captured(), 4);
        assert_eq!(session.events_dropped(), 2);

        assert_eq!(session.get_events(None).unwrap().len(), 4);
        assert_eq!(session.events_captured(), 4);
    }

    #[test]
    fn test_finalize_while_capturing_flushes() {
        let (mut session, handle) = simulated(small_config());
        session.start_capture().unwrap();
        handle.generate_kernel_event("k", 0);
        session.finalize().unwrap();

        assert_eq!(session.state(), SessionState::Finalized);
        assert_eq!(session.get_events(None).unwrap().len(), 1);
    }

    #[test]
    fn test_limit_is_respected() {
        let (mut session, handle) = simulated(small_config());
        session.start_capture().unwrap();
        handle.run_stream_workload(0, 4);
        session.stop_capture().unwrap();

        assert_eq!(session.pending(), 13);
        assert_eq!(session.get_events(Some(5)).unwrap().len(), 5);
        assert_eq!(session.get_events(Some(5)).unwrap().len(), 5);
        assert_eq!(session.get_events(None).unwrap().len(), 3);
    }

    #[test]
    fn test_metadata_carries_devices() {
        let (mut session, _handle) = simulated(small_config());
        session.start_capture().unwrap();
        session.stop_capture().unwrap();

        let metadata = session.metadata("bench");
        assert_eq!(metadata.application_name, "bench");
        assert_eq!(metadata.devices, session.devices());
        assert!(metadata.end_wall_clock >= metadata.start_wall_clock);
    }
}
