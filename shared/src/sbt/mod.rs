//! SBT binary trace container
//!
//! ```text
//! [magic "SBT\0"] [format version: u16] [header length: u32]
//! [header: TraceMetadata, bincode fixint little-endian]
//! [event count: u64]
//! [event record]*
//! [footer: magic "SBTE", event count: u64, xxh3-64 of record bytes: u64]
//! ```
//!
//! All integers are little-endian. The event count is written as 0 when the
//! header goes out and patched by [`SbtWriter::finalize`], which also appends
//! the footer. A file without a footer is incomplete: the strict reader
//! rejects it and only [`SbtReader::recover_events`] will look at its
//! records.

mod error;
pub mod format;
mod io;
mod reader;
mod writer;

pub use error::{FormatError, Result};
pub use format::{FORMAT_VERSION, MIN_SUPPORTED_VERSION, SBT_MAGIC};
pub use reader::{RecoveredTrace, SbtReader};
pub use writer::SbtWriter;
