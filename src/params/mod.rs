pub mod store;
pub mod typed;

pub use store::{
    InMemoryParameterStore, ParameterCallback, ParameterChange, ParameterStore, SubscriptionId,
};
pub use typed::{
    AcquisitionParams, AnalysisParams, CameraParams, MonitorGeometry, SessionParameters,
    StimulusParams, TimestampMode,
};
