//! Event type definitions for GPU execution traces
//!
//! These types represent the raw events delivered by backend callbacks and
//! carried unchanged through the capture buffer, the SBT container, the
//! timeline builder and the replay engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp in monotonic nanoseconds, process-relative
pub type Timestamp = u64;

/// Logical execution queue on a device
pub type StreamId = u32;

/// Device ordinal as reported by the backend
pub type DeviceId = u16;

/// Kind of GPU operation an event describes.
///
/// The discriminants are written to disk as a single byte and must never be
/// renumbered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Unknown = 0,
    KernelLaunch = 1,
    KernelComplete = 2,
    MemcpyH2D = 3,
    MemcpyD2H = 4,
    MemcpyD2D = 5,
    MemsetAsync = 6,
    StreamSync = 7,
    DeviceSync = 8,
    EventRecord = 9,
    EventSync = 10,
    StreamCreate = 11,
    StreamDestroy = 12,
    MemAlloc = 13,
    MemFree = 14,
    Marker = 15,
    RangeStart = 16,
    RangeEnd = 17,
    CounterSample = 18,
    Custom = 19,
}

impl EventType {
    /// Every known event type, in discriminant order
    pub const ALL: [EventType; 20] = [
        EventType::Unknown,
        EventType::KernelLaunch,
        EventType::KernelComplete,
        EventType::MemcpyH2D,
        EventType::MemcpyD2H,
        EventType::MemcpyD2D,
        EventType::MemsetAsync,
        EventType::StreamSync,
        EventType::DeviceSync,
        EventType::EventRecord,
        EventType::EventSync,
        EventType::StreamCreate,
        EventType::StreamDestroy,
        EventType::MemAlloc,
        EventType::MemFree,
        EventType::Marker,
        EventType::RangeStart,
        EventType::RangeEnd,
        EventType::CounterSample,
        EventType::Custom,
    ];

    /// Stable display name
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Unknown => "Unknown",
            EventType::KernelLaunch => "KernelLaunch",
            EventType::KernelComplete => "KernelComplete",
            EventType::MemcpyH2D => "MemcpyH2D",
            EventType::MemcpyD2H => "MemcpyD2H",
            EventType::MemcpyD2D => "MemcpyD2D",
            EventType::MemsetAsync => "MemsetAsync",
            EventType::StreamSync => "StreamSync",
            EventType::DeviceSync => "DeviceSync",
            EventType::EventRecord => "EventRecord",
            EventType::EventSync => "EventSync",
            EventType::StreamCreate => "StreamCreate",
            EventType::StreamDestroy => "StreamDestroy",
            EventType::MemAlloc => "MemAlloc",
            EventType::MemFree => "MemFree",
            EventType::Marker => "Marker",
            EventType::RangeStart => "RangeStart",
            EventType::RangeEnd => "RangeEnd",
            EventType::CounterSample => "CounterSample",
            EventType::Custom => "Custom",
        }
    }

    /// Decode the on-disk discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn is_kernel(self) -> bool {
        matches!(self, EventType::KernelLaunch | EventType::KernelComplete)
    }

    pub fn is_memcpy(self) -> bool {
        matches!(
            self,
            EventType::MemcpyH2D | EventType::MemcpyD2H | EventType::MemcpyD2D
        )
    }

    pub fn is_memset(self) -> bool {
        matches!(self, EventType::MemsetAsync)
    }

    pub fn is_sync(self) -> bool {
        matches!(
            self,
            EventType::StreamSync | EventType::DeviceSync | EventType::EventSync
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Invalid event type: {}", s))
    }
}

/// Flow categories used to correlate asynchronous operation chains
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlowType {
    #[default]
    None = 0,
    FwdBwd = 1,
    AsyncCpuGpu = 2,
    Custom = 3,
}

impl FlowType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FlowType::None),
            1 => Some(FlowType::FwdBwd),
            2 => Some(FlowType::AsyncCpuGpu),
            3 => Some(FlowType::Custom),
            _ => None,
        }
    }
}

/// Parent/child correlation for async op chains.
///
/// The event carrying `is_start == true` is the producer; every other event
/// with the same `id` depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowInfo {
    pub id: u64,
    pub kind: FlowType,
    pub is_start: bool,
}

impl FlowInfo {
    pub fn start(id: u64, kind: FlowType) -> Self {
        Self {
            id,
            kind,
            is_start: true,
        }
    }

    pub fn follow(id: u64, kind: FlowType) -> Self {
        Self {
            id,
            kind,
            is_start: false,
        }
    }
}

/// A single host-side frame captured at API call time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Instruction pointer
    pub address: u64,

    /// Function name (if resolved)
    pub symbol: Option<String>,
}

impl StackFrame {
    pub fn new(address: u64) -> Self {
        Self {
            address,
            symbol: None,
        }
    }
}

/// Host call stack, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallStack {
    pub frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn from_ips(ips: &[u64]) -> Self {
        Self {
            frames: ips.iter().map(|&ip| StackFrame::new(ip)).collect(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Kernel launch geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelParams {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
    pub shared_mem_bytes: u32,
    pub registers_per_thread: u32,
}

/// Memory operation parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryParams {
    pub src_address: u64,
    pub dst_address: u64,
    pub size_bytes: u64,
}

/// Optional type-specific payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Kernel(KernelParams),
    Memory(MemoryParams),
    Counter { value: f64 },
}

/// One captured GPU execution event. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_type: EventType,

    /// Start time
    pub timestamp: Timestamp,

    /// Duration in nanoseconds, 0 for instantaneous events
    pub duration: u64,

    pub stream_id: StreamId,
    pub device_id: DeviceId,

    /// Human-readable label, e.g. kernel symbol
    pub name: String,

    /// Marks an event allowed to overlap others on its stream
    #[serde(default)]
    pub is_async: bool,

    #[serde(default)]
    pub flow: Option<FlowInfo>,

    #[serde(default)]
    pub call_stack: Option<CallStack>,

    #[serde(default)]
    pub payload: Option<Payload>,
}

impl TraceEvent {
    /// Create an instantaneous event on stream 0 of device 0
    pub fn new(event_type: EventType, timestamp: Timestamp) -> Self {
        Self {
            event_type,
            timestamp,
            duration: 0,
            stream_id: 0,
            device_id: 0,
            name: String::new(),
            is_async: false,
            flow: None,
            call_stack: None,
            payload: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_stream(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_device(mut self, device_id: DeviceId) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_flow(mut self, flow: FlowInfo) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn with_call_stack(mut self, call_stack: CallStack) -> Self {
        self.call_stack = Some(call_stack);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Exclusive end of the event's active interval
    pub fn end(&self) -> Timestamp {
        self.timestamp.saturating_add(self.duration)
    }

    pub fn is_instantaneous(&self) -> bool {
        self.duration == 0
    }

    /// Byte count for memory operations, if recorded
    pub fn memory_bytes(&self) -> Option<u64> {
        match self.payload {
            Some(Payload::Memory(params)) => Some(params.size_bytes),
            _ => None,
        }
    }
}
