use std::collections::HashMap;

use streamscope_shared::{StreamId, Timestamp, TraceEvent};

/// Something operations can be re-issued against.
///
/// `op` is the operation's position in the recorded order. Real driver
/// targets live outside this crate.
pub trait ReplayTarget {
    /// Issue one operation. An `Err` counts the operation as failed.
    fn submit(&mut self, op: usize, event: &TraceEvent) -> Result<(), String>;

    /// Wait for everything submitted so far; returns ops in completion order
    fn synchronize(&mut self) -> Vec<usize>;
}

/// In-process target. Operations complete in submission order while a
/// virtual clock per stream advances by each recorded duration.
#[derive(Debug, Default)]
pub struct SimulatedTarget {
    in_flight: Vec<usize>,
    clocks: HashMap<StreamId, Timestamp>,
    submitted: u64,
}

impl SimulatedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time of the busiest stream
    pub fn elapsed(&self) -> Timestamp {
        self.clocks.values().copied().max().unwrap_or(0)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

impl ReplayTarget for SimulatedTarget {
    fn submit(&mut self, op: usize, event: &TraceEvent) -> Result<(), String> {
        let clock = self.clocks.entry(event.stream_id).or_insert(0);
        *clock = clock.saturating_add(event.duration);
        self.in_flight.push(op);
        self.submitted += 1;
        Ok(())
    }

    fn synchronize(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.in_flight)
    }
}
