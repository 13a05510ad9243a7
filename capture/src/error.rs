use streamscope_shared::PlatformType;
use thiserror::Error;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors raised by the capture path.
///
/// A full buffer is not an error: overflow only shows up in the dropped
/// counter.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("buffer_size must be greater than 0")]
    InvalidBufferSize,

    #[error("no GPU device found")]
    NoDevice,

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("{0} backend is not available in this build")]
    BackendUnavailable(PlatformType),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CaptureError {
    /// True for errors that leave a session uninitialized
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CaptureError::InvalidBufferSize
                | CaptureError::NoDevice
                | CaptureError::BackendUnavailable(_)
                | CaptureError::Config(_)
        )
    }
}
