pub mod analysis;
pub mod capture;
pub mod events;
pub mod orchestrator;
pub mod playback;
pub mod preview;
pub mod state;
pub mod worker;

pub use analysis::{AnalysisSummary, SessionAnalyzer};
pub use capture::{CaptureConfig, CaptureThread};
pub use events::{EventBus, PhaseTransitionEvent};
pub use orchestrator::{
    AbortHandle, AcquisitionOrchestrator, OrchestratorConfig, SessionOutcome, SessionRequest, SessionStatus,
};
pub use playback::{PlaybackSummary, PlaybackThread};
pub use preview::PreviewChannel;
pub use state::{phase_plan, AcquisitionPhase};
pub use worker::Worker;
