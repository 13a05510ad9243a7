use std::fmt;
use std::time::Duration;

use serde::Serialize;
use streamscope_shared::StreamId;

use super::config::ReplayMode;

/// Problem found while replaying. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayViolation {
    /// A predecessor had not completed when the operation was due
    Dependency {
        event_index: usize,
        stream_id: StreamId,
        reason: String,
    },
    /// Completion or emission order on a stream diverged from the recording
    Ordering {
        stream_id: StreamId,
        event_index: usize,
        reason: String,
    },
    /// The target rejected the operation
    Execution {
        event_index: usize,
        stream_id: StreamId,
        message: String,
    },
}

impl ReplayViolation {
    pub fn event_index(&self) -> usize {
        match self {
            ReplayViolation::Dependency { event_index, .. }
            | ReplayViolation::Ordering { event_index, .. }
            | ReplayViolation::Execution { event_index, .. } => *event_index,
        }
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, ReplayViolation::Dependency { .. })
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, ReplayViolation::Ordering { .. })
    }
}

impl fmt::Display for ReplayViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayViolation::Dependency {
                event_index,
                stream_id,
                reason,
            } => write!(
                f,
                "dependency violation at op {event_index} (stream {stream_id}): {reason}"
            ),
            ReplayViolation::Ordering {
                stream_id,
                event_index,
                reason,
            } => write!(
                f,
                "ordering violation on stream {stream_id} at op {event_index}: {reason}"
            ),
            ReplayViolation::Execution {
                event_index,
                stream_id,
                message,
            } => write!(
                f,
                "op {event_index} (stream {stream_id}) failed: {message}"
            ),
        }
    }
}

/// Outcome of one replay run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayResult {
    pub mode: ReplayMode,
    /// No hard failure under the mode's tolerance policy
    pub success: bool,
    /// Operations selected for this run
    pub operations_total: usize,
    /// Operations issued to the target (always 0 for dry runs)
    pub operations_executed: usize,
    pub operations_skipped: usize,
    pub operations_failed: usize,
    /// Execution order and dependency satisfaction matched the recording
    pub deterministic: bool,
    pub replay_duration: Duration,
    pub timed_out: bool,
    pub violations: Vec<ReplayViolation>,
    /// XXH3 of the recorded order of the operations that ran
    pub original_signature: u64,
    /// XXH3 of the order they completed in
    pub replayed_signature: u64,
}

impl ReplayResult {
    pub fn dependency_violations(&self) -> impl Iterator<Item = &ReplayViolation> {
        self.violations.iter().filter(|v| v.is_dependency())
    }

    pub fn ordering_violations(&self) -> impl Iterator<Item = &ReplayViolation> {
        self.violations.iter().filter(|v| v.is_ordering())
    }

    /// One-line human readable outcome
    pub fn summary(&self) -> String {
        let status = if self.success { "succeeded" } else { "FAILED" };
        let mut line = format!(
            "{} replay {}: {}/{} executed, {} skipped, {} failed, {}deterministic, {} violation(s) in {:.2?}",
            self.mode,
            status,
            self.operations_executed,
            self.operations_total,
            self.operations_skipped,
            self.operations_failed,
            if self.deterministic { "" } else { "non-" },
            self.violations.len(),
            self.replay_duration,
        );
        if self.timed_out {
            line.push_str(" (timed out)");
        }
        line
    }
}
