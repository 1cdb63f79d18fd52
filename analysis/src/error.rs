use crate::direction::Direction;

/// Failures of the retinotopy analysis chain.
///
/// Any of these fails the whole run for a session; stages never hand back
/// partial maps.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("stimulus log is empty, nothing to match camera frames against")]
    EmptyStimulusLog,

    #[error("{series} timestamps decrease at index {index}")]
    NonMonotonicTimestamps { series: &'static str, index: usize },

    #[error("{what}: expected length {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("need at least {required} frames, got {actual}")]
    InsufficientFrames { required: usize, actual: usize },

    #[error("stimulus bin {bin} is outside the spectrum of {frames} frames")]
    FrequencyOutOfRange { bin: usize, frames: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("no data for sweep direction {0}")]
    MissingDirection(Direction),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

pub(crate) fn check_same_shape(
    what: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<()> {
    if expected != actual {
        return Err(AnalysisError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
