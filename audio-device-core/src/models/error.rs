use thiserror::Error;

use super::format::{Direction, NativeFormat, SampleType};
use super::state::SessionState;
use crate::processing::source_mixer::SourceId;

/// Failures reported by a native backend.
///
/// Backends map their library-specific errors onto these variants so the
/// session can decide whether a retry with another format makes sense.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("sample format {0} rejected by backend")]
    FormatRejected(NativeFormat),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("backend i/o error: {0}")]
    Io(String),
}

/// Errors returned to the control thread by sessions, mixers and factories.
///
/// Nothing on the real-time path produces these; overflow and underflow are
/// counted instead (see `XrunKind`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(SampleType),

    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("source limit of {0} reached")]
    TooManySources(usize),

    #[error("unknown source {0}")]
    UnknownSource(SourceId),

    #[error("backend {name} unavailable for {direction}")]
    BackendUnavailable {
        name: String,
        direction: Direction,
    },
}
