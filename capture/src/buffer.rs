//! Bounded capture buffer fed by backend callbacks
//!
//! Producers hold an [`EventSink`] and push from any thread without
//! blocking; a full buffer drops the event and bumps a counter. The single
//! consumer side sits behind a mutex so drains are serialized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use streamscope_shared::TraceEvent;

use crate::error::{CaptureError, Result};

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable producer handle onto a [`CaptureBuffer`]
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<TraceEvent>,
    counters: Arc<Counters>,
}

impl EventSink {
    /// Offer an event. Never blocks; returns false if it was dropped.
    pub fn push(&self, event: TraceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.captured.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Fixed-capacity MPSC staging area for captured events.
///
/// Per-producer order is preserved. Capacity never changes after
/// construction.
#[derive(Debug)]
pub struct CaptureBuffer {
    sink: EventSink,
    rx: Mutex<Receiver<TraceEvent>>,
    capacity: usize,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CaptureError::InvalidBufferSize);
        }

        let (tx, rx) = bounded(capacity);
        Ok(Self {
            sink: EventSink {
                tx,
                counters: Arc::new(Counters::default()),
            },
            rx: Mutex::new(rx),
            capacity,
        })
    }

    /// New producer handle
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn push(&self, event: TraceEvent) -> bool {
        self.sink.push(event)
    }

    // Only drains take this lock, and a receiver stays consistent even if a
    // drain caller panicked.
    fn receiver(&self) -> MutexGuard<'_, Receiver<TraceEvent>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove and return up to `max_count` of the oldest events
    pub fn drain(&self, max_count: usize) -> Vec<TraceEvent> {
        let rx = self.receiver();
        let available = rx.len().min(max_count);
        let mut out = Vec::with_capacity(available);
        out.extend(rx.try_iter().take(available));
        out
    }

    /// Remove everything pending at the time of the call.
    ///
    /// Events pushed concurrently may or may not be included.
    pub fn drain_all(&self) -> Vec<TraceEvent> {
        self.drain(usize::MAX)
    }

    /// Events currently pending
    pub fn len(&self) -> usize {
        self.sink.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending events as a fraction of capacity (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Events accepted since construction
    pub fn events_captured(&self) -> u64 {
        self.sink.counters.captured.load(Ordering::Relaxed)
    }

    /// Events rejected because the buffer was full
    pub fn events_dropped(&self) -> u64 {
        self.sink.counters.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use streamscope_shared::EventType;

    fn event(stream: u32, seq: u64) -> TraceEvent {
        TraceEvent::new(EventType::KernelLaunch, seq).with_stream(stream)
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            CaptureBuffer::new(0),
            Err(CaptureError::InvalidBufferSize)
        ));
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let buffer = CaptureBuffer::new(3).unwrap();
        for i in 0..5 {
            buffer.push(event(0, i));
        }
        assert_eq!(buffer.events_captured(), 3);
        assert_eq!(buffer.events_dropped(), 2);
        assert_eq!(buffer.len(), 3);
        assert!((buffer.utilization() - 1.0).abs() < f64::EPSILON);

        // the oldest events survive, the overflow is discarded
        let drained = buffer.drain_all();
        let seqs: Vec<u64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(buffer.is_empty());

        // counters are monotonic and survive draining
        assert_eq!(buffer.events_captured(), 3);
        assert_eq!(buffer.events_dropped(), 2);
    }

    #[test]
    fn test_drain_respects_max() {
        let buffer = CaptureBuffer::new(10).unwrap();
        for i in 0..6 {
            buffer.push(event(0, i));
        }
        assert_eq!(buffer.drain(4).len(), 4);
        assert_eq!(buffer.drain(4).len(), 2);
        assert!(buffer.drain(4).is_empty());
        assert!(buffer.drain(0).is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        const PRODUCERS: u32 = 8;
        const PER_PRODUCER: u64 = 2_000;
        let buffer = CaptureBuffer::new(4_096).unwrap();

        std::thread::scope(|scope| {
            for stream in 0..PRODUCERS {
                let sink = buffer.sink();
                scope.spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        sink.push(event(stream, seq));
                    }
                });
            }
        });

        let total = PRODUCERS as u64 * PER_PRODUCER;
        assert_eq!(buffer.events_captured() + buffer.events_dropped(), total);
        assert!(buffer.events_captured() <= buffer.capacity() as u64);

        let mut last: HashMap<u32, u64> = HashMap::new();
        for e in buffer.drain_all() {
            if let Some(prev) = last.insert(e.stream_id, e.timestamp) {
                assert!(e.timestamp > prev, "stream {} reordered", e.stream_id);
            }
        }
    }

    #[test]
    fn test_drain_while_producing() {
        let buffer = CaptureBuffer::new(256).unwrap();
        let sink = buffer.sink();
        let mut drained = Vec::new();

        std::thread::scope(|scope| {
            let producer = scope.spawn(move || {
                for seq in 0..10_000 {
                    sink.push(event(0, seq));
                }
            });
            while !producer.is_finished() {
                drained.extend(buffer.drain(64));
            }
        });
        drained.extend(buffer.drain_all());

        assert_eq!(drained.len() as u64, buffer.events_captured());
        assert_eq!(buffer.events_captured() + buffer.events_dropped(), 10_000);
        assert!(drained.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    proptest! {
        #[test]
        fn prop_capacity_invariant(capacity in 1usize..64, pushes in 0usize..200) {
            let buffer = CaptureBuffer::new(capacity).unwrap();
            for i in 0..pushes {
                buffer.push(event(0, i as u64));
                prop_assert!(buffer.events_captured() <= capacity as u64);
            }
            prop_assert_eq!(
                buffer.events_captured() + buffer.events_dropped(),
                pushes as u64
            );
        }

        #[test]
        fn prop_single_stream_order(
            streams in proptest::collection::vec(0u32..4, 0..300),
            batch in 1usize..50,
        ) {
            let buffer = CaptureBuffer::new(128).unwrap();
            let mut drained = Vec::new();
            for (seq, stream) in streams.iter().enumerate() {
                buffer.push(event(*stream, seq as u64));
                if seq % 7 == 0 {
                    drained.extend(buffer.drain(batch));
                }
            }
            drained.extend(buffer.drain_all());

            let mut last: HashMap<u32, u64> = HashMap::new();
            for e in &drained {
                if let Some(prev) = last.insert(e.stream_id, e.timestamp) {
                    prop_assert!(e.timestamp > prev);
                }
            }
        }
    }
}
