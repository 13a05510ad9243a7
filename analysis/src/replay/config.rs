use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamscope_shared::StreamId;

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Every operation in recorded order; an unmet dependency stops the run
    #[default]
    Full,
    /// Operations with unmet dependencies are skipped
    Partial,
    /// Validation only, nothing is issued to the target
    DryRun,
    /// Only the selected streams
    StreamSpecific,
}

impl ReplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplayMode::Full => "full",
            ReplayMode::Partial => "partial",
            ReplayMode::DryRun => "dry-run",
            ReplayMode::StreamSpecific => "stream",
        }
    }

    /// Whether an unmet dependency aborts the replay
    pub fn is_strict(self) -> bool {
        matches!(self, ReplayMode::Full | ReplayMode::StreamSpecific)
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplayMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(ReplayMode::Full),
            "partial" => Ok(ReplayMode::Partial),
            "dry-run" | "dryrun" | "dry_run" => Ok(ReplayMode::DryRun),
            "stream" | "stream-specific" | "stream_specific" => Ok(ReplayMode::StreamSpecific),
            _ => Err(AnalysisError::InvalidReplayConfig(format!(
                "unknown replay mode: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub mode: ReplayMode,

    /// Check per-stream completion order against the recording
    pub validate_order: bool,

    /// Check flow and same-stream predecessors before each operation
    pub validate_dependencies: bool,

    /// Selection for [`ReplayMode::StreamSpecific`]
    pub streams: BTreeSet<StreamId>,

    /// Advisory budget, checked between operations
    pub timeout: Option<Duration>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            mode: ReplayMode::Full,
            validate_order: true,
            validate_dependencies: true,
            streams: BTreeSet::new(),
            timeout: None,
        }
    }
}

impl ReplayConfig {
    pub fn new(mode: ReplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_streams(mut self, streams: impl IntoIterator<Item = StreamId>) -> Self {
        self.streams = streams.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate_order = false;
        self.validate_dependencies = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == ReplayMode::StreamSpecific && self.streams.is_empty() {
            return Err(AnalysisError::InvalidReplayConfig(
                "stream-specific replay needs at least one stream".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an event on `stream` takes part in this replay
    pub fn selects(&self, stream: StreamId) -> bool {
        self.mode != ReplayMode::StreamSpecific || self.streams.contains(&stream)
    }
}
