use super::dataset::{CameraBuffer, DirectionDataset, StimulusBuffer};
use super::StimulusEventSink;
use crate::core::{Direction, FrameSample, SessionClock, StimulusDisplayEvent};
use crate::error::{AcquisitionError, Result};
use crate::params::MonitorGeometry;
use crate::storage::{
    camera_file_path, stimulus_file_path, write_camera_file, write_stimulus_file, FileAttributes,
    StagedFileSet,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Session-wide values written as attributes of every file
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub session_id: String,
    pub camera_fps: f64,
    pub monitor: MonitorGeometry,
    pub cycles: u32,
}

/// Session-clock span whose camera frames belong to one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingWindow {
    pub start_us: i64,
    /// `None` while the direction is still recording
    pub end_us: Option<i64>,
}

impl RecordingWindow {
    pub fn contains(&self, timestamp_us: i64) -> bool {
        timestamp_us >= self.start_us && self.end_us.map_or(true, |end| timestamp_us < end)
    }
}

#[derive(Default)]
struct DirectionSlot {
    camera: Mutex<CameraBuffer>,
    stimulus: Mutex<StimulusBuffer>,
    window: Mutex<Option<RecordingWindow>>,
    enabled: AtomicBool,
    recording: AtomicBool,
}

impl DirectionSlot {
    fn snapshot(&self, direction: Direction) -> DirectionDataset {
        let camera = self.camera.lock().unwrap_or_else(|p| p.into_inner());
        let stimulus = self.stimulus.lock().unwrap_or_else(|p| p.into_inner());
        DirectionDataset::from_buffers(direction, &camera, &stimulus)
    }

    fn window(&self) -> Option<RecordingWindow> {
        *self.window.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn clear(&self) {
        self.camera.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.stimulus.lock().unwrap_or_else(|p| p.into_inner()).clear();
        *self.window.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.recording.store(false, Ordering::Release);
    }
}

fn slot_index(direction: Direction) -> usize {
    match direction {
        Direction::LR => 0,
        Direction::RL => 1,
        Direction::TB => 2,
        Direction::BT => 3,
    }
}

/// In-memory per-direction buffers of one acquisition session.
///
/// Camera and stimulus halves of each direction have their own mutex, so
/// the capture side and the playback side never contend with each other.
/// Camera frames reach the recorder through a queue, so they are routed by
/// their own timestamp into the direction whose recording window covers
/// it, never by what is recording when they arrive. Nothing touches the
/// disk until [`SessionRecorder::flush`].
pub struct SessionRecorder {
    slots: [DirectionSlot; 4],
    clock: SessionClock,
    /// Camera frames that fell outside every recording window
    unassigned: AtomicU64,
    metadata: Mutex<Option<SessionMetadata>>,
    directions: Mutex<Vec<Direction>>,
}

impl SessionRecorder {
    /// `clock` must be the clock camera timestamps are taken on
    pub fn new(clock: SessionClock) -> Self {
        Self {
            slots: Default::default(),
            clock,
            unassigned: AtomicU64::new(0),
            metadata: Mutex::new(None),
            directions: Mutex::new(Vec::new()),
        }
    }

    fn slot(&self, direction: Direction) -> &DirectionSlot {
        &self.slots[slot_index(direction)]
    }

    /// Reset all buffers and enable `directions` for recording
    pub fn initialize(&self, directions: &[Direction], metadata: SessionMetadata) {
        self.unassigned.store(0, Ordering::Release);
        for direction in Direction::ALL {
            let slot = self.slot(direction);
            slot.clear();
            slot.enabled
                .store(directions.contains(&direction), Ordering::Release);
        }
        log::info!(
            "recorder initialized for session {} ({} directions)",
            metadata.session_id,
            directions.len()
        );
        *self.metadata.lock().unwrap_or_else(|p| p.into_inner()) = Some(metadata);
        *self.directions.lock().unwrap_or_else(|p| p.into_inner()) = directions.to_vec();
    }

    pub fn has_session(&self) -> bool {
        self.metadata
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn directions(&self) -> Vec<Direction> {
        self.directions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Open the recording window of `direction` now
    pub fn start_recording(&self, direction: Direction) -> Result<()> {
        self.start_recording_at(direction, self.clock.now_us())
    }

    /// Open the recording window of `direction` at `at_us`. Reopening keeps
    /// the original start, so a direction always has one contiguous window.
    pub fn start_recording_at(&self, direction: Direction, at_us: i64) -> Result<()> {
        let slot = self.slot(direction);
        if !slot.enabled.load(Ordering::Acquire) {
            return Err(AcquisitionError::NotRecording(direction));
        }
        let mut window = slot.window.lock().unwrap_or_else(|p| p.into_inner());
        let start_us = window.map_or(at_us, |w| w.start_us);
        *window = Some(RecordingWindow {
            start_us,
            end_us: None,
        });
        drop(window);
        slot.recording.store(true, Ordering::Release);
        log::debug!("recording {} from {} us", direction, start_us);
        Ok(())
    }

    /// Close the recording window of `direction` now
    pub fn stop_recording(&self, direction: Direction) -> Result<()> {
        self.stop_recording_at(direction, self.clock.now_us())
    }

    /// Close the window at `at_us`. Frames still queued that were
    /// captured before `at_us` keep going to `direction`.
    pub fn stop_recording_at(&self, direction: Direction, at_us: i64) -> Result<()> {
        let slot = self.slot(direction);
        if !slot.enabled.load(Ordering::Acquire) {
            return Err(AcquisitionError::NotRecording(direction));
        }
        slot.recording.store(false, Ordering::Release);
        let mut window = slot.window.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(open) = window.as_mut() {
            open.end_us = Some(at_us.max(open.start_us));
        }
        log::debug!("stopped recording {} at {} us", direction, at_us);
        Ok(())
    }

    pub fn recording_window(&self, direction: Direction) -> Option<RecordingWindow> {
        self.slot(direction).window()
    }

    /// Camera frames of this session that no recording window covered
    pub fn unassigned_frames(&self) -> u64 {
        self.unassigned.load(Ordering::Acquire)
    }

    pub fn is_recording(&self, direction: Direction) -> bool {
        self.slot(direction).recording.load(Ordering::Acquire)
    }

    /// Store a frame in the direction whose window covers its timestamp.
    /// Returns `false` when no window does; such frames are counted in
    /// [`SessionRecorder::unassigned_frames`].
    pub fn record_camera_frame(&self, sample: FrameSample) -> Result<bool> {
        let timestamp_us = sample.timestamp_us;
        let slot = self.slots.iter().find(|slot| {
            slot.enabled.load(Ordering::Acquire)
                && slot.window().map_or(false, |w| w.contains(timestamp_us))
        });
        match slot {
            Some(slot) => {
                slot.camera
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .append(sample)?;
                Ok(true)
            }
            None => {
                let unassigned = self.unassigned.fetch_add(1, Ordering::AcqRel) + 1;
                log::debug!(
                    "camera frame at {} us is outside every recording window ({} so far)",
                    timestamp_us,
                    unassigned
                );
                Ok(false)
            }
        }
    }

    /// Store a display event if its direction is being recorded
    pub fn record_stimulus_event(&self, event: &StimulusDisplayEvent) -> Result<bool> {
        let slot = self.slot(event.direction);
        if !slot.recording.load(Ordering::Acquire) {
            return Ok(false);
        }
        slot.stimulus
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .append(event)?;
        Ok(true)
    }

    /// Copy of what has been recorded for `direction` so far
    pub fn dataset(&self, direction: Direction) -> Option<DirectionDataset> {
        let slot = self.slot(direction);
        slot.enabled
            .load(Ordering::Acquire)
            .then(|| slot.snapshot(direction))
    }

    /// Drop every buffer and the session itself
    pub fn discard(&self) {
        self.unassigned.store(0, Ordering::Release);
        for slot in &self.slots {
            slot.clear();
            slot.enabled.store(false, Ordering::Release);
        }
        *self.metadata.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.directions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        log::info!("recorder buffers discarded");
    }

    /// Write a camera and a stimulus file per direction into `dir`.
    ///
    /// All files appear or none do. On failure the partial files are
    /// removed and the buffers are kept for another attempt; on success
    /// the session is cleared.
    pub fn flush(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let metadata = self
            .metadata
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| AcquisitionError::Storage("no recording session to flush".into()))?;
        let directions = self.directions();
        if let Some(active) = directions.iter().find(|d| self.is_recording(**d)) {
            return Err(AcquisitionError::Storage(format!(
                "cannot flush while {} is still recording",
                active
            )));
        }

        log::info!(
            "flushing session {} ({} directions) to {}; {} camera frames fell outside the recording windows",
            metadata.session_id,
            directions.len(),
            dir.display(),
            self.unassigned_frames()
        );
        std::fs::create_dir_all(dir).map_err(|e| AcquisitionError::DiskWriteError {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut files = StagedFileSet::new();
        for &direction in &directions {
            let dataset = self.slot(direction).snapshot(direction);
            let attributes = FileAttributes {
                session_id: metadata.session_id.clone(),
                direction,
                camera_fps: metadata.camera_fps,
                monitor: metadata.monitor,
                cycles: metadata.cycles,
                timestamp_source: dataset.timestamp_source,
            };

            let camera_path = camera_file_path(dir, direction);
            files
                .stage(&camera_path, |path| write_camera_file(path, &dataset, &attributes))
                .map_err(|e| e.into_write_error(&camera_path))?;
            let stimulus_path = stimulus_file_path(dir, direction);
            files
                .stage(&stimulus_path, |path| write_stimulus_file(path, &dataset, &attributes))
                .map_err(|e| e.into_write_error(&stimulus_path))?;
        }
        let written = files.commit().map_err(|e| e.into_write_error(dir))?;

        log::info!("flush complete: {} files written", written.len());
        self.discard();
        Ok(written)
    }
}

impl StimulusEventSink for SessionRecorder {
    fn record_stimulus_event(&self, event: &StimulusDisplayEvent) -> Result<bool> {
        SessionRecorder::record_stimulus_event(self, event)
    }
}
