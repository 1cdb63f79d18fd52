pub mod camera;
pub mod display;

pub use camera::{
    FaultInjector, ResponseModel, SimulatedCamera, SimulatedCameraConfig, SimulatedCameraDriver,
};
pub use display::RecordingDisplay;
