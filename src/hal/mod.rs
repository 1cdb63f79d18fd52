pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use registry::HardwareRegistry;
pub use traits::{CameraDevice, DisplaySink, HardwareDriver};
pub use types::{CameraConfig, CameraInfo, RawFrame};
