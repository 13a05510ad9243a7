use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use streamscope_capture::{
    CaptureError, ProfilerConfig, ProfilerSession, SessionState, SimulationBackend,
    SimulationHandle,
};
use streamscope_shared::{EventType, PlatformType, TraceEvent};
use tempfile::NamedTempFile;

fn small_config() -> ProfilerConfig {
    ProfilerConfig {
        buffer_size: 16_384,
        ..ProfilerConfig::default()
    }
}

fn session_with(config: ProfilerConfig) -> Result<(ProfilerSession, SimulationHandle)> {
    let backend = SimulationBackend::new();
    let handle = backend.handle();
    let mut session = ProfilerSession::with_backend(Box::new(backend));
    session.initialize(config)?;
    Ok((session, handle))
}

#[test]
fn test_worker_threads_feed_one_session() -> Result<()> {
    let (mut session, handle) = session_with(small_config())?;
    session.start_capture()?;

    let mut drained = Vec::new();
    std::thread::scope(|scope| {
        for stream in 0..4 {
            let handle = handle.clone();
            scope.spawn(move || handle.run_stream_workload(stream, 50));
        }
    });
    drained.extend(session.get_events(Some(100))?);
    session.stop_capture()?;
    drained.extend(session.get_events(None)?);

    assert_eq!(drained.len(), 4 * (50 * 3 + 1));
    assert_eq!(session.events_captured(), drained.len() as u64);
    assert_eq!(session.events_dropped(), 0);

    let mut last_end: HashMap<u32, u64> = HashMap::new();
    for event in &drained {
        if let Some(prev) = last_end.insert(event.stream_id, event.end()) {
            assert!(event.timestamp >= prev, "overlap on stream {}", event.stream_id);
        }
    }
    Ok(())
}

#[test]
fn test_direct_sink_pushes_under_pressure() -> Result<()> {
    let (mut session, handle) = session_with(ProfilerConfig {
        buffer_size: 1_000,
        ..Default::default()
    })?;
    session.start_capture()?;

    let sink = handle.sink().expect("sink after initialize");
    std::thread::scope(|scope| {
        for stream in 0..8u32 {
            let sink = sink.clone();
            scope.spawn(move || {
                for seq in 0..500u64 {
                    sink.push(
                        TraceEvent::new(EventType::Marker, seq)
                            .with_stream(stream)
                            .with_name("tick"),
                    );
                }
            });
        }
    });
    session.stop_capture()?;

    assert_eq!(session.events_captured() + session.events_dropped(), 4_000);
    assert_eq!(session.events_captured(), 1_000);
    assert_eq!(session.get_events(None)?.len(), 1_000);
    Ok(())
}

#[test]
fn test_stop_while_producers_push() -> Result<()> {
    const STREAMS: u32 = 8;
    const PER_STREAM: u64 = 2_000;

    let (mut session, handle) = session_with(ProfilerConfig {
        buffer_size: 4_096,
        ..Default::default()
    })?;
    session.start_capture()?;

    let sink = handle.sink().expect("sink after initialize");
    std::thread::scope(|scope| -> Result<()> {
        for stream in 0..STREAMS {
            let sink = sink.clone();
            scope.spawn(move || {
                for seq in 0..PER_STREAM {
                    sink.push(
                        TraceEvent::new(EventType::Marker, seq)
                            .with_stream(stream)
                            .with_name("tick"),
                    );
                }
            });
        }
        while session.pending() == 0 {
            std::thread::yield_now();
        }
        session.stop_capture()?;
        assert_eq!(session.state(), SessionState::Stopped);
        Ok(())
    })?;

    let pushes = u64::from(STREAMS) * PER_STREAM;
    assert_eq!(session.events_captured() + session.events_dropped(), pushes);

    let events = session.get_events(None)?;
    assert_eq!(events.len() as u64, session.events_captured());

    let mut last_seen: HashMap<u32, u64> = HashMap::new();
    for event in &events {
        if let Some(prev) = last_seen.insert(event.stream_id, event.timestamp) {
            assert!(
                event.timestamp > prev,
                "stream {} went from {} to {}",
                event.stream_id,
                prev,
                event.timestamp
            );
        }
    }
    Ok(())
}

#[test]
fn test_config_file_drives_filters() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "capture_kernels = false")?;
    writeln!(file, "buffer_size = 512")?;

    let config = ProfilerConfig::load(file.path())?;
    let (mut session, handle) = session_with(config)?;
    assert_eq!(session.config().map(|c| c.buffer_size), Some(512));

    session.start_capture()?;
    handle.run_stream_workload(0, 5);
    session.finalize()?;

    let events = session.get_events(None)?;
    assert_eq!(events.len(), 11);
    assert!(events.iter().all(|e| !e.event_type.is_kernel()));
    Ok(())
}

#[test]
fn test_vendor_platform_session() {
    let err = ProfilerSession::new(PlatformType::Cuda).unwrap_err();
    assert!(matches!(err, CaptureError::BackendUnavailable(PlatformType::Cuda)));
    assert!(err.to_string().contains("cuda"));
}

#[test]
fn test_default_platform_session() -> Result<()> {
    let mut session = ProfilerSession::new(PlatformType::Unknown)?;
    assert_eq!(session.platform(), PlatformType::Simulation);
    session.initialize(small_config())?;
    session.finalize()?;
    assert_eq!(session.state(), SessionState::Finalized);
    Ok(())
}
