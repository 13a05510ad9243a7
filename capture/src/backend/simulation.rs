//! Simulation backend
//!
//! Produces synthetic but well-formed GPU activity so the whole pipeline can
//! run on hosts without a vendor driver. Timestamps come from the process
//! monotonic clock, and each stream keeps a cursor so spans on one stream
//! never overlap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use streamscope_shared::utils::time::timestamp_nanos;
use streamscope_shared::{
    CallStack, DeviceId, DeviceInfo, EventType, FlowInfo, FlowType, KernelParams, MemoryParams,
    Payload, PlatformType, StackFrame, StreamId, Timestamp, TraceEvent,
};
use tracing::{debug, info};

use super::Backend;
use crate::buffer::EventSink;
use crate::config::ProfilerConfig;
use crate::error::Result;

/// Staged events are handed to the sink once this many accumulate
const FLUSH_THRESHOLD: usize = 256;

const KERNEL_BASE_NS: u64 = 8_000;
const MIN_TRANSFER_NS: u64 = 1_500;
/// Roughly 12 GB/s
const TRANSFER_BYTES_PER_NS: u64 = 12;
const MEMSET_BYTES_PER_NS: u64 = 200;
const WORKLOAD_TRANSFER_BYTES: u64 = 1 << 20;

/// Direction of a simulated copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTransferKind {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl MemoryTransferKind {
    pub fn event_type(self) -> EventType {
        match self {
            MemoryTransferKind::HostToDevice => EventType::MemcpyH2D,
            MemoryTransferKind::DeviceToHost => EventType::MemcpyD2H,
            MemoryTransferKind::DeviceToDevice => EventType::MemcpyD2D,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    config: ProfilerConfig,
    sink: Option<EventSink>,
    capturing: bool,
    pending: Vec<TraceEvent>,
    cursors: HashMap<StreamId, Timestamp>,
    next_flow_id: u64,
    op_counter: u64,
    device_id: DeviceId,
}

impl SimState {
    /// Earliest start on `stream` that does not overlap its previous op
    fn next_start(&self, stream: StreamId) -> Timestamp {
        let cursor = self.cursors.get(&stream).copied().unwrap_or(0);
        timestamp_nanos().max(cursor)
    }

    fn record(&mut self, mut event: TraceEvent) -> bool {
        if !self.capturing {
            return false;
        }

        // Filtered ops still occupy the stream
        self.cursors.insert(event.stream_id, event.end());
        self.op_counter += 1;

        if !self.config.captures(event.event_type) {
            return false;
        }

        if self.config.capture_callstacks {
            event.call_stack = Some(synthetic_stack(event.event_type, self.op_counter));
        }

        self.pending.push(event);
        if self.pending.len() >= FLUSH_THRESHOLD {
            self.flush();
        }
        true
    }

    fn flush(&mut self) -> usize {
        let Some(sink) = &self.sink else {
            return 0;
        };
        let count = self.pending.len();
        for event in self.pending.drain(..) {
            sink.push(event);
        }
        count
    }

    fn emit(
        &mut self,
        event_type: EventType,
        name: &str,
        stream: StreamId,
        duration: u64,
        payload: Option<Payload>,
        flow: Option<FlowInfo>,
    ) -> bool {
        if !self.capturing {
            return false;
        }

        let mut event = TraceEvent::new(event_type, self.next_start(stream))
            .with_duration(duration)
            .with_stream(stream)
            .with_device(self.device_id)
            .with_name(name);
        event.payload = payload;
        event.flow = flow;
        self.record(event)
    }
}

fn synthetic_stack(event_type: EventType, seq: u64) -> CallStack {
    let api = if event_type.is_kernel() {
        "launch_kernel"
    } else if event_type.is_memcpy() || event_type.is_memset() {
        "memory_op"
    } else {
        "host_call"
    };
    CallStack {
        frames: vec![
            StackFrame {
                address: 0x5500_0000_1000 + (seq & 0xfff) * 0x10,
                symbol: Some(format!("simulation::{api}")),
            },
            StackFrame {
                address: 0x5500_0000_0100,
                symbol: Some("simulation::workload".to_string()),
            },
        ],
    }
}

fn transfer_ns(bytes: u64, bytes_per_ns: u64) -> u64 {
    (bytes / bytes_per_ns).max(MIN_TRANSFER_NS)
}

fn simulated_device(device_id: DeviceId) -> DeviceInfo {
    DeviceInfo {
        device_id,
        name: "Simulated GPU".to_string(),
        vendor: "streamscope".to_string(),
        compute_major: 8,
        compute_minor: 0,
        total_memory: 16 << 30,
        multiprocessor_count: 80,
        clock_rate: 1_410_000,
        warp_size: 32,
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable driver for simulated activity, usable from any thread.
///
/// Generators return whether the event was recorded: nothing is recorded
/// outside a capture, and filtered types are skipped.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulationHandle {
    pub fn generate_kernel_event(&self, name: &str, stream: StreamId) -> bool {
        self.kernel(name, stream, None)
    }

    pub fn generate_memcpy_event(
        &self,
        kind: MemoryTransferKind,
        bytes: u64,
        stream: StreamId,
    ) -> bool {
        self.memcpy(kind, bytes, stream, None)
    }

    pub fn generate_memset_event(&self, bytes: u64, stream: StreamId) -> bool {
        let payload = Payload::Memory(MemoryParams {
            src_address: 0,
            dst_address: 0x7f00_0000_0000,
            size_bytes: bytes,
        });
        lock(&self.state).emit(
            EventType::MemsetAsync,
            "memset",
            stream,
            transfer_ns(bytes, MEMSET_BYTES_PER_NS),
            Some(payload),
            None,
        )
    }

    /// Host waits for `stream` to drain
    pub fn generate_sync_event(&self, stream: StreamId) -> bool {
        lock(&self.state).emit(EventType::StreamSync, "stream_sync", stream, 0, None, None)
    }

    pub fn generate_marker(&self, name: &str, stream: StreamId) -> bool {
        lock(&self.state).emit(EventType::Marker, name, stream, 0, None, None)
    }

    fn kernel(&self, name: &str, stream: StreamId, flow: Option<FlowInfo>) -> bool {
        let mut state = lock(&self.state);
        let duration = KERNEL_BASE_NS + (state.op_counter % 16) * 1_000;
        let payload = Payload::Kernel(KernelParams {
            grid: (128, 1, 1),
            block: (256, 1, 1),
            shared_mem_bytes: 0,
            registers_per_thread: 32,
        });
        state.emit(
            EventType::KernelLaunch,
            name,
            stream,
            duration,
            Some(payload),
            flow,
        )
    }

    fn memcpy(
        &self,
        kind: MemoryTransferKind,
        bytes: u64,
        stream: StreamId,
        flow: Option<FlowInfo>,
    ) -> bool {
        let (src, dst) = match kind {
            MemoryTransferKind::HostToDevice => (0x7000_0000, 0x7f00_0000_0000),
            MemoryTransferKind::DeviceToHost => (0x7f00_0000_0000, 0x7000_0000),
            MemoryTransferKind::DeviceToDevice => (0x7f00_0000_0000, 0x7f10_0000_0000),
        };
        let payload = Payload::Memory(MemoryParams {
            src_address: src,
            dst_address: dst,
            size_bytes: bytes,
        });
        lock(&self.state).emit(
            kind.event_type(),
            kind.event_type().as_str(),
            stream,
            transfer_ns(bytes, TRANSFER_BYTES_PER_NS),
            Some(payload),
            flow,
        )
    }

    /// Upload, compute, download `ops` times on one stream, then sync.
    ///
    /// Each download is flow-linked to the kernel that produced its data.
    /// Returns the number of events recorded.
    pub fn run_stream_workload(&self, stream: StreamId, ops: usize) -> usize {
        let mut recorded = 0;
        for i in 0..ops {
            let flow_id = {
                let mut state = lock(&self.state);
                state.next_flow_id += 1;
                state.next_flow_id
            };

            recorded += usize::from(self.memcpy(
                MemoryTransferKind::HostToDevice,
                WORKLOAD_TRANSFER_BYTES,
                stream,
                None,
            ));
            recorded += usize::from(self.kernel(
                &format!("sim_kernel_{}", i % 4),
                stream,
                Some(FlowInfo::start(flow_id, FlowType::AsyncCpuGpu)),
            ));
            recorded += usize::from(self.memcpy(
                MemoryTransferKind::DeviceToHost,
                WORKLOAD_TRANSFER_BYTES,
                stream,
                Some(FlowInfo::follow(flow_id, FlowType::AsyncCpuGpu)),
            ));
        }
        recorded += usize::from(self.generate_sync_event(stream));
        recorded
    }

    /// [`Self::run_stream_workload`] on streams `0..streams`, sequentially
    pub fn run_workload(&self, streams: u32, ops_per_stream: usize) -> usize {
        (0..streams)
            .map(|stream| self.run_stream_workload(stream, ops_per_stream))
            .sum()
    }

    /// Direct producer handle onto the capture buffer, bypassing staging.
    /// `None` before the backend is initialized.
    pub fn sink(&self) -> Option<EventSink> {
        lock(&self.state).sink.clone()
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.state).capturing
    }
}

/// Backend producing synthetic activity on simulated devices
#[derive(Debug)]
pub struct SimulationBackend {
    state: Arc<Mutex<SimState>>,
    device_count: u16,
}

impl SimulationBackend {
    pub fn new() -> Self {
        Self::with_device_count(1)
    }

    pub fn with_device_count(device_count: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            device_count,
        }
    }

    /// Handle for generating activity; clone freely across threads
    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SimulationBackend {
    fn platform(&self) -> PlatformType {
        PlatformType::Simulation
    }

    fn is_available(&self) -> bool {
        true
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok((0..self.device_count).map(simulated_device).collect())
    }

    fn initialize(&mut self, config: &ProfilerConfig, sink: EventSink) -> Result<()> {
        let mut state = lock(&self.state);
        state.config = config.clone();
        state.sink = Some(sink);
        state.device_id = 0;
        info!(
            "Simulation backend initialized ({} device(s))",
            self.device_count
        );
        Ok(())
    }

    fn start_capture(&mut self) -> Result<()> {
        lock(&self.state).capturing = true;
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.capturing = false;
        let flushed = state.flush();
        debug!("Simulation backend stopped, flushed {} staged events", flushed);
        Ok(())
    }

    fn drain_events(&mut self) -> Result<usize> {
        Ok(lock(&self.state).flush())
    }

    fn finalize(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.capturing = false;
        state.flush();
        state.sink = None;
        state.cursors.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CaptureBuffer;

    fn small_config() -> ProfilerConfig {
        ProfilerConfig {
            buffer_size: 16_384,
            ..ProfilerConfig::default()
        }
    }

    fn started(config: ProfilerConfig) -> (SimulationBackend, SimulationHandle, CaptureBuffer) {
        let buffer = CaptureBuffer::new(config.buffer_size).unwrap();
        let mut backend = SimulationBackend::new();
        backend.initialize(&config, buffer.sink()).unwrap();
        backend.start_capture().unwrap();
        let handle = backend.handle();
        (backend, handle, buffer)
    }

    #[test]
    fn test_nothing_recorded_outside_capture() {
        let backend = SimulationBackend::new();
        let handle = backend.handle();
        assert!(!handle.generate_kernel_event("k", 0));
        assert!(handle.sink().is_none());
    }

    #[test]
    fn test_events_staged_until_drain() {
        let (mut backend, handle, buffer) = started(small_config());
        assert!(handle.generate_kernel_event("gemm", 0));
        assert!(handle.generate_marker("phase", 0));
        assert!(buffer.is_empty());

        assert_eq!(backend.drain_events().unwrap(), 2);
        let events = buffer.drain_all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::KernelLaunch);
        assert_eq!(events[0].name, "gemm");
        assert!(matches!(events[0].payload, Some(Payload::Kernel(_))));
        assert_eq!(events[1].event_type, EventType::Marker);
    }

    #[test]
    fn test_stop_flushes_and_ignores_later_activity() {
        let (mut backend, handle, buffer) = started(small_config());
        handle.generate_memcpy_event(MemoryTransferKind::DeviceToDevice, 4096, 2);
        backend.stop_capture().unwrap();
        assert_eq!(buffer.len(), 1);
        assert!(!handle.generate_kernel_event("late", 2));
        assert!(!handle.is_capturing());
    }

    #[test]
    fn test_filters_are_honored() {
        let config = ProfilerConfig {
            capture_memcpy: false,
            capture_sync: false,
            buffer_size: 1024,
            ..Default::default()
        };
        let (mut backend, handle, buffer) = started(config);
        let recorded = handle.run_stream_workload(0, 3);
        backend.drain_events().unwrap();

        assert_eq!(recorded, 3);
        let events = buffer.drain_all();
        assert!(events.iter().all(|e| e.event_type == EventType::KernelLaunch));
    }

    #[test]
    fn test_stream_spans_do_not_overlap() {
        let (mut backend, handle, buffer) = started(small_config());
        handle.run_workload(3, 20);
        backend.stop_capture().unwrap();

        let events = buffer.drain_all();
        assert_eq!(events.len(), 3 * (20 * 3 + 1));
        for stream in 0..3 {
            let on_stream: Vec<_> = events.iter().filter(|e| e.stream_id == stream).collect();
            for pair in on_stream.windows(2) {
                assert!(pair[0].end() <= pair[1].timestamp);
            }
        }
    }

    #[test]
    fn test_workload_links_downloads_to_kernels() {
        let (mut backend, handle, buffer) = started(small_config());
        handle.run_stream_workload(1, 2);
        backend.drain_events().unwrap();

        let events = buffer.drain_all();
        let kernel_flow = events[1].flow.unwrap();
        let download_flow = events[2].flow.unwrap();
        assert!(kernel_flow.is_start);
        assert!(!download_flow.is_start);
        assert_eq!(kernel_flow.id, download_flow.id);
        assert_eq!(events[2].event_type, EventType::MemcpyD2H);
        assert_eq!(events[2].memory_bytes(), Some(WORKLOAD_TRANSFER_BYTES));
    }

    #[test]
    fn test_callstacks_when_enabled() {
        let config = ProfilerConfig {
            capture_callstacks: true,
            ..Default::default()
        };
        let (mut backend, handle, buffer) = started(config);
        handle.generate_kernel_event("k", 0);
        backend.drain_events().unwrap();
        let stack = buffer.drain_all()[0].call_stack.clone().unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(
            stack.frames[0].symbol.as_deref(),
            Some("simulation::launch_kernel")
        );
    }

    #[test]
    fn test_large_batches_flush_without_drain() {
        let (_backend, handle, buffer) = started(small_config());
        for i in 0..FLUSH_THRESHOLD {
            handle.generate_marker(&format!("m{i}"), 0);
        }
        assert_eq!(buffer.len(), FLUSH_THRESHOLD);
    }

    #[test]
    fn test_enumerates_requested_devices() {
        let backend = SimulationBackend::with_device_count(2);
        let devices = backend.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].device_id, 1);
        assert_eq!(devices[0].compute_capability(), "8.0");
    }
}
