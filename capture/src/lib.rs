//! GPU event capture
//!
//! Backends deliver events from driver callback threads into a bounded
//! [`CaptureBuffer`]; a [`ProfilerSession`] owns the buffer and the backend
//! and drives the capture lifecycle.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod session;

pub use backend::{create_backend, detect_platform, Backend};
pub use backend::simulation::{MemoryTransferKind, SimulationBackend, SimulationHandle};
pub use buffer::{CaptureBuffer, EventSink};
pub use config::ProfilerConfig;
pub use error::{CaptureError, Result};
pub use session::{ProfilerSession, SessionState};
