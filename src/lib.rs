pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod observability;
pub mod params;
pub mod recorder;
pub mod stimulus;
pub mod storage;

pub use retinosync_analysis as analysis;

pub use error::{AcquisitionError, ErrorKind, OperationStatus, Result};
