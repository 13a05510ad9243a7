use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;

use streamscope_shared::sbt::SbtReader;
use streamscope_shared::{StreamId, TraceEvent};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::Xxh3;

use super::config::{ReplayConfig, ReplayMode};
use super::result::{ReplayResult, ReplayViolation};
use super::target::{ReplayTarget, SimulatedTarget};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpState {
    Pending,
    Done,
    Skipped,
    Failed,
    /// Outside a stream selection; present, so it counts as satisfied
    Unselected,
}

impl OpState {
    fn describe(self) -> &'static str {
        match self {
            OpState::Pending => "not yet run",
            OpState::Done => "completed",
            OpState::Skipped => "skipped",
            OpState::Failed => "failed",
            OpState::Unselected => "not selected",
        }
    }
}

/// Re-executes a recorded operation graph and scores the outcome.
///
/// Recorded order is the stable timestamp order of the loaded events. Each
/// operation depends on its same-stream predecessor and, if it follows a
/// flow, on the event that started that flow. A skipped predecessor does not
/// block its stream; a flow start must actually have run.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    events: Vec<TraceEvent>,
    /// Arrival position of each recorded op
    arrival: Vec<usize>,
    /// Previous op on the same stream
    stream_prev: Vec<Option<usize>>,
    /// First op starting each flow id
    flow_starts: HashMap<u64, usize>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<TraceEvent>) -> Self {
        let mut engine = Self::new();
        engine.load_events(events);
        engine
    }

    /// Replace the loaded trace
    pub fn load_events(&mut self, events: Vec<TraceEvent>) {
        let mut indexed: Vec<(usize, TraceEvent)> = events.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, event)| event.timestamp);

        self.arrival = indexed.iter().map(|(arrival, _)| *arrival).collect();
        self.events = indexed.into_iter().map(|(_, event)| event).collect();

        let mut last_on_stream: HashMap<StreamId, usize> = HashMap::new();
        self.stream_prev = self
            .events
            .iter()
            .enumerate()
            .map(|(op, event)| last_on_stream.insert(event.stream_id, op))
            .collect();

        self.flow_starts.clear();
        for (op, event) in self.events.iter().enumerate() {
            if let Some(flow) = event.flow.filter(|f| f.is_start) {
                self.flow_starts.entry(flow.id).or_insert(op);
            }
        }

        debug!(
            "Loaded {} operations on {} streams, {} flows",
            self.events.len(),
            last_on_stream.len(),
            self.flow_starts.len()
        );
    }

    /// Load every event of an SBT file
    pub fn load_trace(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut reader = SbtReader::open(path)?;
        let events = reader.read_all()?;
        let count = events.len();
        self.load_events(events);
        info!("Loaded {} events from {}", count, path.display());
        Ok(count)
    }

    /// Loaded events in recorded order
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Replay against a fresh [`SimulatedTarget`]
    pub fn replay(&self, config: &ReplayConfig) -> Result<ReplayResult> {
        let mut target = SimulatedTarget::new();
        self.replay_with(config, &mut target)
    }

    fn unmet_dependency(&self, op: usize, states: &[OpState]) -> Option<String> {
        if let Some(prev) = self.stream_prev[op] {
            if states[prev] == OpState::Failed {
                return Some(format!("same-stream predecessor op {prev} failed"));
            }
        }

        let flow = self.events[op].flow.filter(|f| !f.is_start)?;
        match self.flow_starts.get(&flow.id) {
            None => Some(format!("flow {} has no recorded start", flow.id)),
            Some(&start) if start > op => Some(format!(
                "flow {} starts at op {start}, after its dependent",
                flow.id
            )),
            Some(&start) => match states[start] {
                OpState::Done | OpState::Unselected => None,
                state => Some(format!(
                    "flow {} start op {start} {}",
                    flow.id,
                    state.describe()
                )),
            },
        }
    }

    /// Per-stream emission order must agree with timestamp order
    fn emission_violations(&self, ops: &[usize], violations: &mut Vec<ReplayViolation>) {
        let mut last_arrival: HashMap<StreamId, usize> = HashMap::new();
        for &op in ops {
            let stream_id = self.events[op].stream_id;
            let arrival = self.arrival[op];
            if let Some(prev) = last_arrival.insert(stream_id, arrival) {
                if arrival < prev {
                    violations.push(ReplayViolation::Ordering {
                        stream_id,
                        event_index: op,
                        reason: format!(
                            "emitted at position {arrival} but timestamped after position {prev}"
                        ),
                    });
                }
            }
        }
    }

    /// Per-stream completion order must equal recorded order
    fn completion_violations(
        &self,
        recorded: &[usize],
        completed: &[usize],
        violations: &mut Vec<ReplayViolation>,
    ) {
        let by_stream = |ops: &[usize]| {
            let mut map: BTreeMap<StreamId, Vec<usize>> = BTreeMap::new();
            for &op in ops {
                if let Some(event) = self.events.get(op) {
                    map.entry(event.stream_id).or_default().push(op);
                }
            }
            map
        };
        let expected = by_stream(recorded);
        let actual = by_stream(completed);

        for (stream_id, want) in &expected {
            let got = actual.get(stream_id).map(Vec::as_slice).unwrap_or(&[]);
            if want.as_slice() == got {
                continue;
            }
            let position = want
                .iter()
                .zip(got)
                .position(|(w, g)| w != g)
                .unwrap_or_else(|| want.len().min(got.len()));
            let event_index = want.get(position).or(got.get(position)).copied().unwrap_or(0);
            violations.push(ReplayViolation::Ordering {
                stream_id: *stream_id,
                event_index,
                reason: format!(
                    "completion order diverges at position {position} ({} recorded, {} completed)",
                    want.len(),
                    got.len()
                ),
            });
        }
    }

    fn signature<'a>(&self, ops: impl IntoIterator<Item = &'a usize>) -> u64 {
        let mut hasher = Xxh3::new();
        for &op in ops {
            if let Some(event) = self.events.get(op) {
                hasher.update(&event.stream_id.to_le_bytes());
                hasher.update(&[event.event_type as u8]);
                hasher.update(event.name.as_bytes());
                hasher.update(&[0xff]);
            }
        }
        hasher.digest()
    }

    /// Replay against `target`.
    ///
    /// Only an invalid configuration is an `Err`; every replay problem is
    /// reported inside the result.
    pub fn replay_with(
        &self,
        config: &ReplayConfig,
        target: &mut dyn ReplayTarget,
    ) -> Result<ReplayResult> {
        config.validate()?;
        let started = Instant::now();
        let dry_run = config.mode == ReplayMode::DryRun;

        let mut states: Vec<OpState> = self
            .events
            .iter()
            .map(|e| {
                if config.selects(e.stream_id) {
                    OpState::Pending
                } else {
                    OpState::Unselected
                }
            })
            .collect();
        let ops: Vec<usize> = (0..self.events.len())
            .filter(|&op| states[op] == OpState::Pending)
            .collect();

        info!(
            "Replaying {} of {} operations ({} mode)",
            ops.len(),
            self.events.len(),
            config.mode
        );

        let mut violations = Vec::new();
        let mut ran = Vec::with_capacity(ops.len());
        let mut executed = 0;
        let mut failed = 0;
        let mut hard_failure = false;
        let mut timed_out = false;
        let mut dependency_drift = false;

        for &op in &ops {
            if config.timeout.is_some_and(|limit| started.elapsed() >= limit) {
                warn!("Replay timed out after {} operations", ran.len());
                timed_out = true;
                break;
            }

            let event = &self.events[op];
            if let Some(reason) = self.unmet_dependency(op, &states) {
                if config.validate_dependencies {
                    violations.push(ReplayViolation::Dependency {
                        event_index: op,
                        stream_id: event.stream_id,
                        reason,
                    });
                    if config.mode.is_strict() {
                        hard_failure = true;
                        break;
                    }
                    states[op] = OpState::Skipped;
                    continue;
                }
                dependency_drift = true;
            }

            if dry_run {
                states[op] = OpState::Done;
                ran.push(op);
                continue;
            }

            match target.submit(op, event) {
                Ok(()) => {
                    states[op] = OpState::Done;
                    executed += 1;
                    ran.push(op);
                }
                Err(message) => {
                    states[op] = OpState::Failed;
                    failed += 1;
                    violations.push(ReplayViolation::Execution {
                        event_index: op,
                        stream_id: event.stream_id,
                        message,
                    });
                    if config.mode.is_strict() {
                        hard_failure = true;
                        break;
                    }
                }
            }
        }

        let completed = if dry_run {
            ran.clone()
        } else {
            target.synchronize()
        };

        if config.validate_order {
            self.emission_violations(&ops, &mut violations);
            if !dry_run {
                self.completion_violations(&ran, &completed, &mut violations);
            }
        }

        let ordering_failed = violations.iter().any(ReplayViolation::is_ordering);
        let dependency_failed = violations.iter().any(ReplayViolation::is_dependency);
        let success = !hard_failure
            && !timed_out
            && !ordering_failed
            && !(dry_run && dependency_failed);
        let deterministic = completed == ran && !dependency_drift;

        let skipped = ops
            .iter()
            .filter(|&&op| matches!(states[op], OpState::Pending | OpState::Skipped))
            .count();

        let result = ReplayResult {
            mode: config.mode,
            success,
            operations_total: ops.len(),
            operations_executed: executed,
            operations_skipped: skipped,
            operations_failed: failed,
            deterministic,
            replay_duration: started.elapsed(),
            timed_out,
            original_signature: self.signature(&ran),
            replayed_signature: self.signature(&completed),
            violations,
        };

        if !result.violations.is_empty() {
            warn!("Replay reported {} violation(s)", result.violations.len());
            for violation in &result.violations {
                debug!("  {}", violation);
            }
        }
        info!("{}", result.summary());
        Ok(result)
    }
}
