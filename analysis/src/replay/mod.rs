//! Deterministic re-execution of a recorded operation graph

mod config;
mod engine;
mod result;
mod target;

pub use config::{ReplayConfig, ReplayMode};
pub use engine::ReplayEngine;
pub use result::{ReplayResult, ReplayViolation};
pub use target::{ReplayTarget, SimulatedTarget};
