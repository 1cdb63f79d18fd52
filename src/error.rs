use crate::core::Direction;
use retinosync_analysis::AnalysisError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Stable classification of [`AcquisitionError`] for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    HardwareTimestampUnavailable,
    LibraryNotPreloaded,
    PlaybackAlreadyRunning,
    DirectionNotPreloaded,
    CaptureDeviceError,
    DiskWriteError,
    ParameterMissing,
    ParameterInvalid,
    NonMonotonicTimestamp,
    InvalidTransition,
    ThreadUnresponsive,
    ThreadFailure,
    Aborted,
    NotRecording,
    Storage,
    Analysis,
}

#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("camera has no hardware clock and strict timestamp mode is configured")]
    HardwareTimestampUnavailable,

    #[error("stimulus frames not preloaded for {}", join_directions(.missing))]
    LibraryNotPreloaded { missing: Vec<Direction> },

    #[error("playback already running for {active}")]
    PlaybackAlreadyRunning { active: Direction },

    #[error("no preloaded stimulus frames for {0}")]
    DirectionNotPreloaded(Direction),

    #[error("capture device error: {message}")]
    CaptureDeviceError { message: String, recording: bool },

    #[error("failed to write {}: {message}", path.display())]
    DiskWriteError { path: PathBuf, message: String },

    #[error("parameter {group}.{key} is not set")]
    ParameterMissing { group: String, key: String },

    #[error("parameter {group}.{key} is invalid: {reason}")]
    ParameterInvalid {
        group: String,
        key: String,
        reason: String,
    },

    #[error("{stream} timestamp {timestamp_us} precedes {previous_us}")]
    NonMonotonicTimestamp {
        stream: &'static str,
        previous_us: i64,
        timestamp_us: i64,
    },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{thread} thread did not stop within {timeout_ms} ms")]
    ThreadUnresponsive { thread: &'static str, timeout_ms: u64 },

    #[error("{thread} thread failed: {message}")]
    ThreadFailure { thread: &'static str, message: String },

    #[error("acquisition aborted: {0}")]
    Aborted(String),

    #[error("{0} is not part of the recording session")]
    NotRecording(Direction),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

fn join_directions(directions: &[Direction]) -> String {
    directions
        .iter()
        .map(|d| d.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AcquisitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HardwareTimestampUnavailable => ErrorKind::HardwareTimestampUnavailable,
            Self::LibraryNotPreloaded { .. } => ErrorKind::LibraryNotPreloaded,
            Self::PlaybackAlreadyRunning { .. } => ErrorKind::PlaybackAlreadyRunning,
            Self::DirectionNotPreloaded(_) => ErrorKind::DirectionNotPreloaded,
            Self::CaptureDeviceError { .. } => ErrorKind::CaptureDeviceError,
            Self::DiskWriteError { .. } => ErrorKind::DiskWriteError,
            Self::ParameterMissing { .. } => ErrorKind::ParameterMissing,
            Self::ParameterInvalid { .. } => ErrorKind::ParameterInvalid,
            Self::NonMonotonicTimestamp { .. } => ErrorKind::NonMonotonicTimestamp,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::ThreadUnresponsive { .. } => ErrorKind::ThreadUnresponsive,
            Self::ThreadFailure { .. } => ErrorKind::ThreadFailure,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::NotRecording(_) => ErrorKind::NotRecording,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Analysis(_) => ErrorKind::Analysis,
        }
    }

    /// Errors that end a running session rather than being logged and
    /// retried
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CaptureDeviceError { recording, .. } => *recording,
            Self::PlaybackAlreadyRunning { .. } => false,
            _ => true,
        }
    }

    pub fn missing(group: &str, key: &str) -> Self {
        Self::ParameterMissing {
            group: group.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid(group: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::ParameterInvalid {
            group: group.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Outcome of a control operation as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
}

impl OperationStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error_kind: None,
            message: message.into(),
        }
    }

    pub fn from_result<T>(result: &Result<T>, success_message: &str) -> Self {
        match result {
            Ok(_) => Self::ok(success_message),
            Err(e) => Self::from(e),
        }
    }
}

impl From<&AcquisitionError> for OperationStatus {
    fn from(error: &AcquisitionError) -> Self {
        Self {
            success: false,
            error_kind: Some(error.kind()),
            message: error.to_string(),
        }
    }
}

/// Kind taken from the first [`AcquisitionError`] in the chain, message
/// from the whole chain
impl From<&anyhow::Error> for OperationStatus {
    fn from(error: &anyhow::Error) -> Self {
        Self {
            success: false,
            error_kind: error
                .chain()
                .find_map(|cause| cause.downcast_ref::<AcquisitionError>())
                .map(AcquisitionError::kind),
            message: format!("{:#}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_status_carries_kind_and_message() {
        let error = AcquisitionError::missing("camera", "fps");
        let status = OperationStatus::from(&error);
        assert!(!status.success);
        assert_eq!(status.error_kind, Some(ErrorKind::ParameterMissing));
        assert_eq!(status.message, "parameter camera.fps is not set");
    }

    #[test]
    fn test_status_from_wrapped_error() {
        let wrapped = Err::<(), _>(AcquisitionError::DirectionNotPreloaded(Direction::TB))
            .context("Acquisition failed")
            .unwrap_err();
        let status = OperationStatus::from(&wrapped);
        assert!(!status.success);
        assert_eq!(status.error_kind, Some(ErrorKind::DirectionNotPreloaded));
        assert!(status.message.starts_with("Acquisition failed: "), "{}", status.message);

        let plain = OperationStatus::from(&anyhow::anyhow!("no such file"));
        assert_eq!(plain.error_kind, None);
        assert_eq!(plain.message, "no such file");
    }

    #[test]
    fn test_status_serializes_kind_name() {
        let status = OperationStatus::from(&AcquisitionError::DirectionNotPreloaded(Direction::BT));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["error_kind"], "DirectionNotPreloaded");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn test_library_error_lists_directions() {
        let error = AcquisitionError::LibraryNotPreloaded {
            missing: vec![Direction::RL, Direction::TB],
        };
        assert_eq!(
            error.to_string(),
            "stimulus frames not preloaded for RL, TB"
        );
    }

    #[test]
    fn test_preview_capture_error_is_not_fatal() {
        let preview = AcquisitionError::CaptureDeviceError {
            message: "timeout".into(),
            recording: false,
        };
        let recording = AcquisitionError::CaptureDeviceError {
            message: "timeout".into(),
            recording: true,
        };
        assert!(!preview.is_fatal());
        assert!(recording.is_fatal());
        assert!(OperationStatus::from_result(&Ok::<(), AcquisitionError>(()), "done").success);
    }
}
