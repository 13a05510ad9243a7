//! Whole-trace statistics

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use streamscope_shared::{EventType, StreamId, Timestamp, TraceEvent};

/// Kernels reported by [`TraceSummary::from_events`]
pub const DEFAULT_TOP_KERNELS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub event_type: EventType,
    pub count: u64,
    pub total_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub stream_id: StreamId,
    pub event_count: u64,
    pub total_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelStats {
    pub name: String,
    pub count: u64,
    pub total_duration: u64,
    pub min_duration: u64,
    pub max_duration: u64,
}

impl KernelStats {
    pub fn avg_duration(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_duration / self.count
        }
    }
}

/// Summary of an event sequence.
///
/// Serializable for JSON reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    pub event_count: u64,
    pub first_timestamp: Timestamp,
    pub last_end: Timestamp,
    /// `max(end) - min(start)`
    pub time_span: u64,
    /// Ordered by event type
    pub by_type: Vec<TypeStats>,
    /// Ordered by stream id
    pub by_stream: Vec<StreamStats>,
    /// Heaviest kernels first
    pub top_kernels: Vec<KernelStats>,
    pub device_count: usize,
    /// Bytes moved by copy and memset operations with a memory payload
    pub memory_bytes: u64,
    /// Same-stream overlaps between events not flagged async
    pub same_stream_overlaps: u64,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        Self::with_top_kernels(events, DEFAULT_TOP_KERNELS)
    }

    pub fn with_top_kernels(events: &[TraceEvent], top: usize) -> Self {
        if events.is_empty() {
            return Self::default();
        }

        let mut by_type: BTreeMap<EventType, TypeStats> = BTreeMap::new();
        let mut by_stream: BTreeMap<StreamId, StreamStats> = BTreeMap::new();
        let mut kernels: HashMap<&str, KernelStats> = HashMap::new();
        let mut devices = BTreeSet::new();
        let mut memory_bytes = 0u64;

        for event in events {
            let ty = by_type.entry(event.event_type).or_insert(TypeStats {
                event_type: event.event_type,
                count: 0,
                total_duration: 0,
            });
            ty.count += 1;
            ty.total_duration = ty.total_duration.saturating_add(event.duration);

            let stream = by_stream.entry(event.stream_id).or_insert(StreamStats {
                stream_id: event.stream_id,
                event_count: 0,
                total_duration: 0,
            });
            stream.event_count += 1;
            stream.total_duration = stream.total_duration.saturating_add(event.duration);

            devices.insert(event.device_id);

            if event.event_type.is_kernel() {
                let kernel = kernels.entry(event.name.as_str()).or_insert(KernelStats {
                    name: event.name.clone(),
                    count: 0,
                    total_duration: 0,
                    min_duration: u64::MAX,
                    max_duration: 0,
                });
                kernel.count += 1;
                kernel.total_duration = kernel.total_duration.saturating_add(event.duration);
                kernel.min_duration = kernel.min_duration.min(event.duration);
                kernel.max_duration = kernel.max_duration.max(event.duration);
            }

            if event.event_type.is_memcpy() || event.event_type.is_memset() {
                memory_bytes = memory_bytes.saturating_add(event.memory_bytes().unwrap_or(0));
            }
        }

        let mut top_kernels: Vec<KernelStats> = kernels.into_values().collect();
        top_kernels.sort_by(|a, b| {
            b.total_duration
                .cmp(&a.total_duration)
                .then_with(|| a.name.cmp(&b.name))
        });
        top_kernels.truncate(top);

        let first_timestamp = events.iter().map(|e| e.timestamp).min().unwrap_or(0);
        let last_end = events.iter().map(TraceEvent::end).max().unwrap_or(0);

        Self {
            event_count: events.len() as u64,
            first_timestamp,
            last_end,
            time_span: last_end - first_timestamp,
            by_type: by_type.into_values().collect(),
            by_stream: by_stream.into_values().collect(),
            top_kernels,
            device_count: devices.len(),
            memory_bytes,
            same_stream_overlaps: count_same_stream_overlaps(events),
        }
    }

    pub fn count_of(&self, event_type: EventType) -> u64 {
        self.by_type
            .iter()
            .find(|t| t.event_type == event_type)
            .map_or(0, |t| t.count)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Events on one stream that start before an earlier non-async event on the
/// same stream has ended
fn count_same_stream_overlaps(events: &[TraceEvent]) -> u64 {
    let mut per_stream: HashMap<StreamId, Vec<&TraceEvent>> = HashMap::new();
    for event in events.iter().filter(|e| !e.is_async && e.duration > 0) {
        per_stream.entry(event.stream_id).or_default().push(event);
    }

    let mut overlaps = 0;
    for mut stream in per_stream.into_values() {
        stream.sort_by_key(|e| e.timestamp);
        let mut busy_until = 0;
        for event in stream {
            if event.timestamp < busy_until {
                overlaps += 1;
            }
            busy_until = busy_until.max(event.end());
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamscope_shared::{MemoryParams, Payload};

    fn kernel(name: &str, ts: u64, dur: u64, stream: u32) -> TraceEvent {
        TraceEvent::new(EventType::KernelLaunch, ts)
            .with_duration(dur)
            .with_stream(stream)
            .with_name(name)
    }

    #[test]
    fn test_empty() {
        let summary = TraceSummary::from_events(&[]);
        assert_eq!(summary.event_count, 0);
        assert_eq!(summary.time_span, 0);
        assert!(summary.top_kernels.is_empty());
    }

    #[test]
    fn test_counts_and_span() {
        let events = vec![
            kernel("gemm", 100, 50, 0),
            kernel("gemm", 200, 30, 1),
            kernel("relu", 300, 5, 0),
            TraceEvent::new(EventType::MemcpyH2D, 0)
                .with_duration(40)
                .with_payload(Payload::Memory(MemoryParams {
                    size_bytes: 4096,
                    ..Default::default()
                })),
            TraceEvent::new(EventType::Marker, 400).with_device(1),
        ];
        let summary = TraceSummary::from_events(&events);

        assert_eq!(summary.event_count, 5);
        assert_eq!(summary.first_timestamp, 0);
        assert_eq!(summary.last_end, 400);
        assert_eq!(summary.time_span, 400);
        assert_eq!(summary.count_of(EventType::KernelLaunch), 3);
        assert_eq!(summary.count_of(EventType::StreamSync), 0);
        assert_eq!(summary.by_stream.len(), 2);
        assert_eq!(summary.by_stream[0].event_count, 4);
        assert_eq!(summary.device_count, 2);
        assert_eq!(summary.memory_bytes, 4096);

        let gemm = &summary.top_kernels[0];
        assert_eq!(gemm.name, "gemm");
        assert_eq!(gemm.count, 2);
        assert_eq!(gemm.total_duration, 80);
        assert_eq!((gemm.min_duration, gemm.max_duration), (30, 50));
        assert_eq!(gemm.avg_duration(), 40);
    }

    #[test]
    fn test_top_kernel_limit() {
        let events: Vec<_> = (0..20)
            .map(|i| kernel(&format!("k{i:02}"), i * 10, i + 1, 0))
            .collect();
        let summary = TraceSummary::with_top_kernels(&events, 3);
        let names: Vec<&str> = summary.top_kernels.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["k19", "k18", "k17"]);
    }

    #[test]
    fn test_overlaps_ignore_async_and_other_streams() {
        let events = vec![
            kernel("a", 0, 10, 0),
            kernel("b", 5, 10, 0),
            kernel("c", 6, 10, 0).asynchronous(),
            kernel("d", 5, 10, 1),
            kernel("e", 14, 1, 0),
        ];
        let summary = TraceSummary::from_events(&events);
        // b overlaps a, e overlaps b
        assert_eq!(summary.same_stream_overlaps, 2);
    }

    #[test]
    fn test_totals_saturate() {
        let long = u64::MAX / 2 + 1;
        let copy = |ts| {
            TraceEvent::new(EventType::MemcpyD2H, ts).with_payload(Payload::Memory(MemoryParams {
                size_bytes: long,
                ..Default::default()
            }))
        };
        let events = vec![
            kernel("gemm", 0, long, 0),
            kernel("gemm", 1, long, 0),
            copy(2),
            copy(3),
        ];
        let summary = TraceSummary::from_events(&events);

        assert_eq!(summary.top_kernels[0].total_duration, u64::MAX);
        assert_eq!(summary.top_kernels[0].count, 2);
        assert_eq!(summary.by_type[0].total_duration, u64::MAX);
        assert_eq!(summary.by_stream[0].total_duration, u64::MAX);
        assert_eq!(summary.memory_bytes, u64::MAX);
        assert_eq!(summary.last_end, 1 + long);
    }

    #[test]
    fn test_json_report() {
        let summary = TraceSummary::from_events(&[kernel("gemm", 0, 10, 0)]);
        let json = summary.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event_count"], 1);
        assert_eq!(value["top_kernels"][0]["name"], "gemm");
        assert_eq!(value["by_type"][0]["event_type"], "KernelLaunch");
    }
}
