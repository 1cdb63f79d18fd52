use super::types::{CameraConfig, CameraInfo, RawFrame};
use crate::stimulus::StimulusFrame;
use anyhow::Result;
use async_trait::async_trait;

/// Trait implemented by hardware drivers for camera discovery and creation
#[async_trait]
pub trait HardwareDriver: Send + Sync {
    /// Unique driver identifier (e.g., "simulated-camera")
    fn driver_id(&self) -> &str;

    /// Discover available cameras (async for network discovery)
    async fn discover_devices(&self) -> Result<Vec<CameraInfo>>;

    /// Open a camera for capture
    fn open_camera(&self, device_id: &str, config: CameraConfig) -> Result<Box<dyn CameraDevice>>;
}

/// A camera opened for continuous capture.
///
/// Used from a dedicated OS thread: `capture` blocks until the next frame
/// is exposed.
pub trait CameraDevice: Send {
    fn info(&self) -> CameraInfo;

    fn has_hardware_clock(&self) -> bool {
        self.info().has_hardware_clock
    }

    /// (height, width) of every frame
    fn frame_shape(&self) -> (usize, usize) {
        self.info().frame_shape
    }

    /// Block until the next frame is available
    fn capture(&mut self) -> Result<RawFrame>;
}

/// Stimulus display surface
pub trait DisplaySink: Send + Sync {
    fn present(&self, frame: &StimulusFrame) -> Result<()>;

    /// Fill the screen with one grey level between sweeps
    fn show_background(&self, luminance: f32) -> Result<()>;
}
