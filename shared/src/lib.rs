//! Shared types and utilities for streamscope
//!
//! This crate contains the event model every other component operates on and
//! the SBT binary trace container used to persist it.

pub mod sbt;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{device::*, events::*, record::*};
