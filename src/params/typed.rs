use crate::core::Direction;
use crate::error::{AcquisitionError, Result};
use crate::params::ParameterStore;
use retinosync_analysis::PipelineConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const ACQUISITION: &str = "acquisition";
pub const CAMERA: &str = "camera";
pub const MONITOR: &str = "monitor";
pub const STIMULUS: &str = "stimulus";
pub const ANALYSIS: &str = "analysis";

/// Read one value; absence and type mismatch are both errors
pub fn require<T: DeserializeOwned>(store: &dyn ParameterStore, group: &str, key: &str) -> Result<T> {
    let value = store
        .get(group, key)
        .ok_or_else(|| AcquisitionError::missing(group, key))?;
    serde_json::from_value(value).map_err(|e| AcquisitionError::invalid(group, key, e.to_string()))
}

fn positive(group: &str, key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AcquisitionError::invalid(group, key, format!("must be positive, got {}", value)))
    }
}

fn non_negative(group: &str, key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AcquisitionError::invalid(group, key, format!("must be non-negative, got {}", value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Refuse cameras without a hardware clock
    Strict,
    /// Fall back to the session clock and tag frames as software-timed
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    pub directions: Vec<Direction>,
    pub cycles: u32,
    pub baseline_sec: f64,
    pub between_sec: f64,
    /// Uniform background shown outside sweeps, 0.0 to 1.0
    pub background_luminance: f32,
}

impl AcquisitionParams {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        let directions: Vec<Direction> = require(store, ACQUISITION, "directions")?;
        if directions.is_empty() {
            return Err(AcquisitionError::invalid(ACQUISITION, "directions", "must name at least one direction"));
        }
        let mut seen = Vec::with_capacity(directions.len());
        for direction in &directions {
            if seen.contains(direction) {
                return Err(AcquisitionError::invalid(
                    ACQUISITION,
                    "directions",
                    format!("{} listed twice", direction),
                ));
            }
            seen.push(*direction);
        }

        let cycles: u32 = require(store, ACQUISITION, "cycles")?;
        if cycles == 0 {
            return Err(AcquisitionError::invalid(ACQUISITION, "cycles", "must be at least 1"));
        }

        let background_luminance: f32 = require(store, ACQUISITION, "background_luminance")?;
        if !(0.0..=1.0).contains(&background_luminance) {
            return Err(AcquisitionError::invalid(
                ACQUISITION,
                "background_luminance",
                format!("must be within 0..=1, got {}", background_luminance),
            ));
        }

        Ok(Self {
            directions,
            cycles,
            baseline_sec: non_negative(ACQUISITION, "baseline_sec", require(store, ACQUISITION, "baseline_sec")?)?,
            between_sec: non_negative(ACQUISITION, "between_sec", require(store, ACQUISITION, "between_sec")?)?,
            background_luminance,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub fps: f64,
    pub timestamp_mode: TimestampMode,
}

impl CameraParams {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        Ok(Self {
            fps: positive(CAMERA, "fps", require(store, CAMERA, "fps")?)?,
            timestamp_mode: require(store, CAMERA, "timestamp_mode")?,
        })
    }
}

/// Display geometry, stored verbatim as attributes of every data file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorGeometry {
    pub fps: f64,
    pub width_px: u32,
    pub height_px: u32,
    pub width_cm: f64,
    pub height_cm: f64,
    pub distance_cm: f64,
    pub lateral_angle_deg: f64,
    pub tilt_angle_deg: f64,
}

impl MonitorGeometry {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        let width_px: u32 = require(store, MONITOR, "width_px")?;
        let height_px: u32 = require(store, MONITOR, "height_px")?;
        if width_px == 0 || height_px == 0 {
            return Err(AcquisitionError::invalid(MONITOR, "width_px", "resolution must be non-zero"));
        }
        Ok(Self {
            fps: positive(MONITOR, "fps", require(store, MONITOR, "fps")?)?,
            width_px,
            height_px,
            width_cm: positive(MONITOR, "width_cm", require(store, MONITOR, "width_cm")?)?,
            height_cm: positive(MONITOR, "height_cm", require(store, MONITOR, "height_cm")?)?,
            distance_cm: positive(MONITOR, "distance_cm", require(store, MONITOR, "distance_cm")?)?,
            lateral_angle_deg: require(store, MONITOR, "lateral_angle_deg")?,
            tilt_angle_deg: require(store, MONITOR, "tilt_angle_deg")?,
        })
    }

    /// Full horizontal visual angle subtended by the screen
    pub fn horizontal_span_deg(&self) -> f64 {
        2.0 * (self.width_cm / 2.0).atan2(self.distance_cm).to_degrees()
    }

    /// Full vertical visual angle subtended by the screen
    pub fn vertical_span_deg(&self) -> f64 {
        2.0 * (self.height_cm / 2.0).atan2(self.distance_cm).to_degrees()
    }
}

/// Shape of the generated sweep sequences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusParams {
    pub sweep_sec: f64,
    pub bar_width_deg: f64,
    /// Frames are rendered at the monitor resolution divided by this
    pub render_scale: u32,
}

impl StimulusParams {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        Ok(Self {
            sweep_sec: positive(STIMULUS, "sweep_sec", require(store, STIMULUS, "sweep_sec")?)?,
            bar_width_deg: positive(STIMULUS, "bar_width_deg", require(store, STIMULUS, "bar_width_deg")?)?,
            render_scale: match require::<u32>(store, STIMULUS, "render_scale")? {
                0 => return Err(AcquisitionError::invalid(STIMULUS, "render_scale", "must be at least 1")),
                scale => scale,
            },
        })
    }

    /// Frames per sweep at the monitor refresh rate
    pub fn frames_per_sweep(&self, monitor: &MonitorGeometry) -> usize {
        (self.sweep_sec * monitor.fps).round().max(1.0) as usize
    }

    /// Rendered frame size as (width, height)
    pub fn render_size(&self, monitor: &MonitorGeometry) -> (usize, usize) {
        let scale = self.render_scale.max(1);
        (
            (monitor.width_px / scale).max(1) as usize,
            (monitor.height_px / scale).max(1) as usize,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub coherence_threshold: f64,
    pub vfs_threshold_sd: f64,
    pub smoothing_sigma: f64,
    pub vfs_smoothing_sigma: f64,
    pub sobel_kernel_size: usize,
    pub boundary_threshold: f64,
}

impl AnalysisParams {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        let sobel_kernel_size: usize = require(store, ANALYSIS, "sobel_kernel_size")?;
        if sobel_kernel_size < 3 || sobel_kernel_size % 2 == 0 || sobel_kernel_size > 31 {
            return Err(AcquisitionError::invalid(
                ANALYSIS,
                "sobel_kernel_size",
                format!("must be odd and within 3..=31, got {}", sobel_kernel_size),
            ));
        }
        Ok(Self {
            coherence_threshold: non_negative(
                ANALYSIS,
                "coherence_threshold",
                require(store, ANALYSIS, "coherence_threshold")?,
            )?,
            vfs_threshold_sd: non_negative(ANALYSIS, "vfs_threshold_sd", require(store, ANALYSIS, "vfs_threshold_sd")?)?,
            smoothing_sigma: non_negative(ANALYSIS, "smoothing_sigma", require(store, ANALYSIS, "smoothing_sigma")?)?,
            vfs_smoothing_sigma: non_negative(
                ANALYSIS,
                "vfs_smoothing_sigma",
                require(store, ANALYSIS, "vfs_smoothing_sigma")?,
            )?,
            sobel_kernel_size,
            boundary_threshold: positive(
                ANALYSIS,
                "boundary_threshold",
                require(store, ANALYSIS, "boundary_threshold")?,
            )?,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            coherence_threshold: self.coherence_threshold,
            vfs_threshold_sd: self.vfs_threshold_sd,
            smoothing_sigma: self.smoothing_sigma,
            vfs_smoothing_sigma: self.vfs_smoothing_sigma,
            sobel_kernel_size: self.sobel_kernel_size,
            boundary_threshold: self.boundary_threshold,
        }
    }
}

/// Everything an acquisition session reads from the store, taken once at
/// session start
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub acquisition: AcquisitionParams,
    pub camera: CameraParams,
    pub monitor: MonitorGeometry,
}

impl SessionParameters {
    pub fn from_store(store: &dyn ParameterStore) -> Result<Self> {
        Ok(Self {
            acquisition: AcquisitionParams::from_store(store)?,
            camera: CameraParams::from_store(store)?,
            monitor: MonitorGeometry::from_store(store)?,
        })
    }
}
