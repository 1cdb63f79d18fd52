use crate::hal::DisplaySink;
use crate::stimulus::StimulusFrame;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Display that remembers what it was asked to show
#[derive(Default)]
pub struct RecordingDisplay {
    presented: AtomicU64,
    last_frame: Mutex<Option<StimulusFrame>>,
    backgrounds: Mutex<Vec<f32>>,
    failing: AtomicBool,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    pub fn last_frame(&self) -> Option<StimulusFrame> {
        self.last_frame
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Every background luminance shown, in order
    pub fn backgrounds(&self) -> Vec<f32> {
        self.backgrounds
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Make every following call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("display disconnected"));
        }
        Ok(())
    }
}

impl DisplaySink for RecordingDisplay {
    fn present(&self, frame: &StimulusFrame) -> Result<()> {
        self.check()?;
        *self.last_frame.lock().unwrap_or_else(|p| p.into_inner()) = Some(frame.clone());
        self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn show_background(&self, luminance: f32) -> Result<()> {
        self.check()?;
        self.backgrounds
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(luminance);
        Ok(())
    }
}
