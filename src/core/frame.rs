use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use retinosync_analysis::Direction;

/// Origin of a camera frame's timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Latched by the camera's own clock at exposure
    Hardware,
    /// Read from the host clock after the frame arrived
    Software,
}

impl TimestampSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }
}

/// One captured camera frame
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Frame counter reported by the device
    pub frame_id: u64,

    /// Microseconds on the session clock
    pub timestamp_us: i64,

    pub timestamp_source: TimestampSource,

    /// Shared so preview and recorder never copy pixels
    pub pixels: Arc<Array2<u16>>,

    /// Position within the current capture run
    pub capture_index: u64,
}

impl FrameSample {
    pub fn shape(&self) -> (usize, usize) {
        self.pixels.dim()
    }
}

/// Logged immediately before a stimulus frame is handed to the display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusDisplayEvent {
    pub timestamp_us: i64,
    pub frame_index: i32,
    pub angle_degrees: f32,
    pub direction: Direction,
}
