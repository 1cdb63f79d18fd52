use crate::core::{Direction, FrameSample, StimulusDisplayEvent, TimestampSource};
use crate::error::{AcquisitionError, Result};
use ndarray::{Array2, Array3};
use std::sync::Arc;

/// Camera half of one direction's recording
#[derive(Debug, Clone, Default)]
pub struct CameraBuffer {
    frames: Vec<Arc<Array2<u16>>>,
    timestamps: Vec<i64>,
    source: Option<TimestampSource>,
}

impl CameraBuffer {
    pub fn append(&mut self, sample: FrameSample) -> Result<()> {
        if let Some(&previous_us) = self.timestamps.last() {
            if sample.timestamp_us < previous_us {
                return Err(AcquisitionError::NonMonotonicTimestamp {
                    stream: "camera",
                    previous_us,
                    timestamp_us: sample.timestamp_us,
                });
            }
        }
        if let Some(first) = self.frames.first() {
            if first.dim() != sample.shape() {
                return Err(AcquisitionError::CaptureDeviceError {
                    message: format!(
                        "frame shape changed from {:?} to {:?}",
                        first.dim(),
                        sample.shape()
                    ),
                    recording: true,
                });
            }
        }
        self.source.get_or_insert(sample.timestamp_source);
        self.timestamps.push(sample.timestamp_us);
        self.frames.push(sample.pixels);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Stimulus half of one direction's recording
#[derive(Debug, Clone, Default)]
pub struct StimulusBuffer {
    frame_indices: Vec<i32>,
    timestamps: Vec<i64>,
    angles: Vec<f32>,
}

impl StimulusBuffer {
    pub fn append(&mut self, event: &StimulusDisplayEvent) -> Result<()> {
        if let Some(&previous_us) = self.timestamps.last() {
            if event.timestamp_us < previous_us {
                return Err(AcquisitionError::NonMonotonicTimestamp {
                    stream: "stimulus",
                    previous_us,
                    timestamp_us: event.timestamp_us,
                });
            }
        }
        self.frame_indices.push(event.frame_index);
        self.timestamps.push(event.timestamp_us);
        self.angles.push(event.angle_degrees);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Everything recorded for one direction. Camera and stimulus lengths are
/// independent.
#[derive(Debug, Clone)]
pub struct DirectionDataset {
    pub direction: Direction,
    pub camera_frames: Vec<Arc<Array2<u16>>>,
    pub camera_timestamps: Vec<i64>,
    pub timestamp_source: Option<TimestampSource>,
    pub stimulus_frame_indices: Vec<i32>,
    pub stimulus_timestamps: Vec<i64>,
    pub stimulus_angles: Vec<f32>,
}

impl DirectionDataset {
    pub fn from_buffers(direction: Direction, camera: &CameraBuffer, stimulus: &StimulusBuffer) -> Self {
        Self {
            direction,
            camera_frames: camera.frames.clone(),
            camera_timestamps: camera.timestamps.clone(),
            timestamp_source: camera.source,
            stimulus_frame_indices: stimulus.frame_indices.clone(),
            stimulus_timestamps: stimulus.timestamps.clone(),
            stimulus_angles: stimulus.angles.clone(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.camera_frames.len()
    }

    pub fn event_count(&self) -> usize {
        self.stimulus_timestamps.len()
    }

    /// (height, width) of the camera frames, zero when nothing was captured
    pub fn frame_shape(&self) -> (usize, usize) {
        self.camera_frames.first().map(|f| f.dim()).unwrap_or((0, 0))
    }

    /// Camera frames stacked as `[N, H, W]`
    pub fn frame_stack(&self) -> Array3<u16> {
        let (height, width) = self.frame_shape();
        let mut stack = Array3::zeros((self.frame_count(), height, width));
        for (mut slot, frame) in stack.outer_iter_mut().zip(&self.camera_frames) {
            slot.assign(&**frame);
        }
        stack
    }
}
