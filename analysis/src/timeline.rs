//! Timeline reconstruction
//!
//! Turns an arrival-ordered event sequence into per-stream spans and sweeps
//! them to find peak concurrency and the time covered by at least one
//! active operation. Every build recomputes from scratch.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use streamscope_shared::{DeviceId, EventType, StreamId, Timestamp, TraceEvent};

/// One operation's `[start, end)` interval on a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineSpan {
    pub stream_id: StreamId,
    pub device_id: DeviceId,
    pub event_type: EventType,
    pub name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Position of the originating event in the input sequence
    pub event_index: usize,
}

impl TimelineSpan {
    pub fn duration(&self) -> u64 {
        self.end - self.start
    }

    /// Zero-width spans never count as active
    pub fn is_instantaneous(&self) -> bool {
        self.start == self.end
    }
}

/// Per-stream rollup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub stream_id: StreamId,
    pub span_count: usize,
    /// Union of this stream's active intervals
    pub busy_time: u64,
    pub first_start: Timestamp,
    pub last_end: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    /// Sorted by start time, ties in arrival order
    pub spans: Vec<TimelineSpan>,
    /// `max(end) - min(start)` over all spans, 0 when empty
    pub total_duration: u64,
    /// Time with at least one active span
    pub busy_time: u64,
    /// `busy_time / total_duration`, in `[0, 1]`
    pub gpu_utilization: f64,
    pub max_concurrent_ops: usize,
    /// Ordered by stream id
    pub streams: Vec<StreamSummary>,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.spans.iter().map(|s| s.start).min()
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.spans.iter().map(|s| s.end).max()
    }

    pub fn spans_for_stream(&self, stream_id: StreamId) -> impl Iterator<Item = &TimelineSpan> {
        self.spans.iter().filter(move |s| s.stream_id == stream_id)
    }
}

/// Collects events, then builds a [`Timeline`] on demand
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    events: Vec<TraceEvent>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn add_events(&mut self, events: impl IntoIterator<Item = TraceEvent>) {
        self.events.extend(events);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn build(&self) -> Timeline {
        build_timeline(&self.events)
    }
}

/// Union length and peak overlap of a set of half-open intervals.
/// Zero-width intervals are ignored.
fn sweep(intervals: impl Iterator<Item = (Timestamp, Timestamp)>) -> (u64, usize) {
    let mut edges: Vec<(Timestamp, i8)> = Vec::new();
    for (start, end) in intervals.filter(|(s, e)| e > s) {
        edges.push((start, 1));
        edges.push((end, -1));
    }
    // ends sort before starts at the same instant
    edges.sort_unstable();

    let mut active = 0usize;
    let mut peak = 0usize;
    let mut union = 0u64;
    let mut open_since = 0;
    for (at, delta) in edges {
        if delta > 0 {
            if active == 0 {
                open_since = at;
            }
            active += 1;
            peak = peak.max(active);
        } else {
            active -= 1;
            if active == 0 {
                union += at - open_since;
            }
        }
    }
    (union, peak)
}

fn span_of(event: &TraceEvent, event_index: usize) -> TimelineSpan {
    TimelineSpan {
        stream_id: event.stream_id,
        device_id: event.device_id,
        event_type: event.event_type,
        name: event.name.clone(),
        start: event.timestamp,
        end: event.end(),
        event_index,
    }
}

/// Build a timeline from `events` in arrival order.
///
/// A zero-duration `KernelLaunch` stays open until the next
/// `KernelComplete` with the same stream and name, which closes it. A
/// complete that follows a launch with its own duration is absorbed into
/// that launch. Unmatched completes become spans of their own.
pub fn build_timeline(events: &[TraceEvent]) -> Timeline {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&i| events[i].timestamp);

    let mut spans: Vec<TimelineSpan> = Vec::with_capacity(events.len());
    // (stream, name) -> spans waiting for their KernelComplete
    let mut open: HashMap<(StreamId, &str), VecDeque<usize>> = HashMap::new();
    let mut timed: HashMap<(StreamId, &str), VecDeque<usize>> = HashMap::new();

    for &index in &order {
        let event = &events[index];
        let key = (event.stream_id, event.name.as_str());

        match event.event_type {
            EventType::KernelLaunch => {
                let target = if event.is_instantaneous() {
                    &mut open
                } else {
                    &mut timed
                };
                target.entry(key).or_default().push_back(spans.len());
                spans.push(span_of(event, index));
            }
            EventType::KernelComplete => {
                if let Some(span) = open.get_mut(&key).and_then(VecDeque::pop_front) {
                    let span = &mut spans[span];
                    span.end = span.end.max(event.end());
                } else if timed.get_mut(&key).and_then(VecDeque::pop_front).is_none() {
                    spans.push(span_of(event, index));
                }
            }
            _ => spans.push(span_of(event, index)),
        }
    }

    let (busy_time, max_concurrent_ops) = sweep(spans.iter().map(|s| (s.start, s.end)));

    let total_duration = match (
        spans.iter().map(|s| s.start).min(),
        spans.iter().map(|s| s.end).max(),
    ) {
        (Some(start), Some(end)) => end - start,
        _ => 0,
    };

    let gpu_utilization = if total_duration == 0 {
        0.0
    } else {
        (busy_time as f64 / total_duration as f64).clamp(0.0, 1.0)
    };

    let mut per_stream: BTreeMap<StreamId, Vec<&TimelineSpan>> = BTreeMap::new();
    for span in &spans {
        per_stream.entry(span.stream_id).or_default().push(span);
    }
    let streams = per_stream
        .into_iter()
        .map(|(stream_id, spans)| StreamSummary {
            stream_id,
            span_count: spans.len(),
            busy_time: sweep(spans.iter().map(|s| (s.start, s.end))).0,
            first_start: spans.iter().map(|s| s.start).min().unwrap_or(0),
            last_end: spans.iter().map(|s| s.end).max().unwrap_or(0),
        })
        .collect();

    Timeline {
        spans,
        total_duration,
        busy_time,
        gpu_utilization,
        max_concurrent_ops,
        streams,
    }
}
