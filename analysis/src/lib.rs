//! Analysis over captured GPU event streams
//!
//! Everything here works on event slices handed in by the caller and never
//! mutates them.

pub mod error;
pub mod replay;
pub mod stats;
pub mod timeline;

pub use error::{AnalysisError, Result};
pub use replay::{
    ReplayConfig, ReplayEngine, ReplayMode, ReplayResult, ReplayTarget, ReplayViolation,
    SimulatedTarget,
};
pub use stats::TraceSummary;
pub use timeline::{build_timeline, StreamSummary, Timeline, TimelineBuilder, TimelineSpan};
