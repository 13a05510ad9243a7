//! Trace-level containers
//!
//! `TraceMetadata` is written once per trace, ahead of the events.
//! `TraceRecord` pairs it with an owned event sequence.

use serde::{Deserialize, Serialize};

use super::device::DeviceInfo;
use super::events::{DeviceId, EventType, StreamId, TraceEvent};

/// Schema version of the metadata block written by this build
pub const METADATA_SCHEMA_VERSION: u32 = 2;

/// Header-level record of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub application_name: String,
    pub command_line: String,

    /// Wall clock at capture start, nanoseconds since UNIX epoch
    pub start_wall_clock: u64,

    /// Wall clock at capture end, 0 if unknown
    pub end_wall_clock: u64,

    pub devices: Vec<DeviceInfo>,
    pub schema_version: u32,
}

impl Default for TraceMetadata {
    fn default() -> Self {
        Self {
            application_name: String::new(),
            command_line: String::new(),
            start_wall_clock: 0,
            end_wall_clock: 0,
            devices: Vec::new(),
            schema_version: METADATA_SCHEMA_VERSION,
        }
    }
}

impl TraceMetadata {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            start_wall_clock: crate::utils::time::system_time_nanos(),
            ..Self::default()
        }
    }
}

/// Metadata plus an owned, ordered event sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecord {
    metadata: TraceMetadata,
    events: Vec<TraceEvent>,
}

impl TraceRecord {
    pub fn new(metadata: TraceMetadata) -> Self {
        Self {
            metadata,
            events: Vec::new(),
        }
    }

    pub fn from_parts(metadata: TraceMetadata, events: Vec<TraceEvent>) -> Self {
        Self { metadata, events }
    }

    pub fn metadata(&self) -> &TraceMetadata {
        &self.metadata
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_parts(self) -> (TraceMetadata, Vec<TraceEvent>) {
        (self.metadata, self.events)
    }

    pub fn add_event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&TraceEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn filter_by_stream(&self, stream_id: StreamId) -> Vec<&TraceEvent> {
        self.events
            .iter()
            .filter(|e| e.stream_id == stream_id)
            .collect()
    }

    pub fn filter_by_device(&self, device_id: DeviceId) -> Vec<&TraceEvent> {
        self.events
            .iter()
            .filter(|e| e.device_id == device_id)
            .collect()
    }

    /// Stable sort, so equal timestamps keep arrival order
    pub fn sort_by_timestamp(&mut self) {
        self.events.sort_by_key(|e| e.timestamp);
    }
}
