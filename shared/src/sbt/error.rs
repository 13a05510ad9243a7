use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormatError>;

/// Failure reading or writing an SBT container.
///
/// Any read-side error makes the whole file unusable.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid trace magic")]
    InvalidMagic,

    #[error("unsupported trace format version {found} (this build reads {min}..={max})")]
    UnsupportedVersion { found: u16, min: u16, max: u16 },

    #[error("truncated trace at offset {offset}: {context}")]
    Truncated { offset: u64, context: &'static str },

    #[error("corrupt trace header: {0}")]
    CorruptHeader(String),

    #[error("corrupt event record {index} at offset {offset}: {reason}")]
    CorruptRecord {
        index: u64,
        offset: u64,
        reason: String,
    },

    #[error("checksum mismatch (footer {expected:#018x}, records {found:#018x})")]
    ChecksumMismatch { expected: u64, found: u64 },

    #[error("writer misuse: {0}")]
    WriterState(&'static str),

    #[error("{field} too long ({len} > {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl FormatError {
    /// True for errors caused by the file ending early
    pub fn is_truncation(&self) -> bool {
        matches!(self, FormatError::Truncated { .. })
    }
}
