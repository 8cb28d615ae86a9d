//! Error handling module for SpeedX

use thiserror::Error;

/// Main error type for pipeline runs
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Segment arrays are malformed or a segment is degenerate
    #[error("Invalid segment {index}: {reason}")]
    InvalidSegment { index: usize, reason: String },

    /// Source or destination could not be opened
    #[error("Cannot open {path}: {message}")]
    NotOpenable { path: String, message: String },

    /// Pipeline configuration rejected
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Source has no video track
    #[error("No video track found in source")]
    NoVideoTrack,

    /// A demuxer, codec, stretcher or muxer call failed
    #[error("{operation} failed: {message}")]
    Collaborator { operation: String, message: String },

    /// Repeated polls made no forward progress
    #[error("{stage} stage stalled after {polls} polls without progress")]
    PipelineStalled { stage: &'static str, polls: u32 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error category used for diagnostics and host status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NoVideoTrack,
    CollaboratorFailure,
    PipelineStalled,
}

impl ErrorKind {
    /// Negative status reported across the host boundary
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::Configuration => -1,
            ErrorKind::NoVideoTrack => -2,
            ErrorKind::CollaboratorFailure => -3,
            ErrorKind::PipelineStalled => -4,
        }
    }
}

impl PipelineError {
    /// Shorthand for a failed collaborator call
    pub fn collaborator(operation: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Collaborator {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidSegment { .. }
            | PipelineError::NotOpenable { .. }
            | PipelineError::InvalidConfig { .. } => ErrorKind::Configuration,
            PipelineError::NoVideoTrack => ErrorKind::NoVideoTrack,
            PipelineError::Collaborator { .. } | PipelineError::Io(_) => {
                ErrorKind::CollaboratorFailure
            }
            PipelineError::PipelineStalled { .. } => ErrorKind::PipelineStalled,
        }
    }

    /// Status code for the host boundary
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
