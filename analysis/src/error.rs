use streamscope_shared::sbt::FormatError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to load trace: {0}")]
    Format(#[from] FormatError),

    #[error("invalid replay configuration: {0}")]
    InvalidReplayConfig(String),
}
