//! Per-direction recording buffers and their path to disk.

pub mod dataset;
pub mod ingest;
pub mod session;

use crate::core::StimulusDisplayEvent;
use crate::error::Result;
use std::sync::Mutex;

pub use dataset::{CameraBuffer, DirectionDataset, StimulusBuffer};
pub use ingest::RecorderIngest;
pub use session::{RecordingWindow, SessionMetadata, SessionRecorder};

/// Receiver of display events, called on the playback thread before the
/// frame is presented. Returns whether the event was kept.
pub trait StimulusEventSink: Send + Sync {
    fn record_stimulus_event(&self, event: &StimulusDisplayEvent) -> Result<bool>;
}

/// Sink that keeps every event, for preview playback and tests
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<StimulusDisplayEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StimulusDisplayEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StimulusEventSink for MemoryEventLog {
    fn record_stimulus_event(&self, event: &StimulusDisplayEvent) -> Result<bool> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(*event);
        Ok(true)
    }
}
