use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Camera discovery information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    pub driver_id: String,
    /// Whether frames carry a timestamp latched by the device
    pub has_hardware_clock: bool,
    /// Native frame size as (height, width)
    pub frame_shape: (usize, usize),
}

/// Camera configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub fps: f64,
}

/// One frame as delivered by a camera driver
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Device frame counter
    pub frame_number: u64,
    /// Device clock at exposure, in session microseconds. `None` when the
    /// device has no hardware clock.
    pub hardware_timestamp_us: Option<i64>,
    pub pixels: Array2<u16>,
}
