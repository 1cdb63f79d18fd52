use crate::core::clock::{sleep_until, tick_deadline};
use crate::core::SessionClock;
use crate::hal::{CameraConfig, CameraDevice, CameraInfo, HardwareDriver, RawFrame};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ndarray::Array2;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Intensity added to pixel (y, x) of the frame exposed at a session time
pub type ResponseModel = Arc<dyn Fn(i64, usize, usize) -> f64 + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCameraConfig {
    pub id: String,
    pub fps: f64,
    pub width: usize,
    pub height: usize,
    pub hardware_clock: bool,
    pub baseline: u16,
    /// Peak amplitude of the pseudo-random noise
    pub noise: u16,
}

impl SimulatedCameraConfig {
    pub fn new(id: impl Into<String>, fps: f64) -> Self {
        Self {
            id: id.into(),
            fps,
            width: 64,
            height: 48,
            hardware_clock: true,
            baseline: 2000,
            noise: 8,
        }
    }
}

/// Makes upcoming captures fail, from any thread
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    pending: Arc<AtomicU64>,
}

impl FaultInjector {
    pub fn fail_next(&self, frames: u64) {
        self.pending.fetch_add(frames, Ordering::SeqCst);
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Free-running camera paced by wall-clock deadlines.
///
/// Frame `k` is exposed at `start + k / fps`; a late caller gets the
/// overdue frame immediately, so the count over any window stays at
/// `fps * window`.
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    clock: SessionClock,
    start: Option<Instant>,
    frame_number: u64,
    faults: FaultInjector,
    response: Option<ResponseModel>,
    rng: u64,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig, clock: SessionClock) -> Self {
        Self {
            config,
            clock,
            start: None,
            frame_number: 0,
            faults: FaultInjector::default(),
            response: None,
            rng: 0x9e37_79b9_7f4a_7c15,
        }
    }

    pub fn with_response(mut self, model: ResponseModel) -> Self {
        self.response = Some(model);
        self
    }

    pub fn fault_injector(&self) -> FaultInjector {
        self.faults.clone()
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.fps)
    }

    // xorshift64
    fn next_noise(&mut self) -> f64 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        let unit = (self.rng >> 11) as f64 / (1u64 << 53) as f64;
        (unit * 2.0 - 1.0) * self.config.noise as f64
    }

    fn render(&mut self, timestamp_us: i64) -> Array2<u16> {
        let (height, width) = (self.config.height, self.config.width);
        let baseline = self.config.baseline as f64;
        let mut pixels = Array2::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let response = match &self.response {
                    Some(model) => model(timestamp_us, y, x),
                    None => 0.0,
                };
                let value = baseline + response + self.next_noise();
                pixels[[y, x]] = value.round().clamp(0.0, u16::MAX as f64) as u16;
            }
        }
        pixels
    }
}

impl CameraDevice for SimulatedCamera {
    fn info(&self) -> CameraInfo {
        CameraInfo {
            id: self.config.id.clone(),
            name: format!("Simulated camera {}", self.config.id),
            driver_id: SimulatedCameraDriver::DRIVER_ID.to_string(),
            has_hardware_clock: self.config.hardware_clock,
            frame_shape: (self.config.height, self.config.width),
        }
    }

    fn capture(&mut self) -> Result<RawFrame> {
        let start = *self.start.get_or_insert_with(Instant::now);
        let deadline = tick_deadline(start, self.period(), self.frame_number);
        sleep_until(deadline);

        let frame_number = self.frame_number;
        self.frame_number += 1;

        if self.faults.take() {
            return Err(anyhow!("simulated I/O error on frame {}", frame_number));
        }

        let exposure_us = self.clock.to_us(deadline);
        Ok(RawFrame {
            frame_number,
            hardware_timestamp_us: self.config.hardware_clock.then_some(exposure_us),
            pixels: self.render(exposure_us),
        })
    }
}

/// Driver exposing a fixed set of simulated cameras
pub struct SimulatedCameraDriver {
    clock: SessionClock,
    cameras: Vec<SimulatedCameraConfig>,
}

impl SimulatedCameraDriver {
    pub const DRIVER_ID: &'static str = "simulated-camera";

    /// One camera with a hardware clock and one without
    pub fn new() -> Self {
        let mut software = SimulatedCameraConfig::new("sim-cam-1", 30.0);
        software.hardware_clock = false;
        Self::with_cameras(
            SessionClock::new(),
            vec![SimulatedCameraConfig::new("sim-cam-0", 30.0), software],
        )
    }

    pub fn with_cameras(clock: SessionClock, cameras: Vec<SimulatedCameraConfig>) -> Self {
        Self { clock, cameras }
    }
}

impl Default for SimulatedCameraDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareDriver for SimulatedCameraDriver {
    fn driver_id(&self) -> &str {
        Self::DRIVER_ID
    }

    async fn discover_devices(&self) -> Result<Vec<CameraInfo>> {
        Ok(self
            .cameras
            .iter()
            .map(|config| SimulatedCamera::new(config.clone(), self.clock).info())
            .collect())
    }

    fn open_camera(&self, device_id: &str, config: CameraConfig) -> Result<Box<dyn CameraDevice>> {
        if !(config.fps.is_finite() && config.fps > 0.0) {
            return Err(anyhow!("Invalid frame rate: {}", config.fps));
        }
        let mut camera = self
            .cameras
            .iter()
            .find(|c| c.id == device_id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown simulated camera: {}", device_id))?;
        camera.fps = config.fps;
        Ok(Box::new(SimulatedCamera::new(camera, self.clock)))
    }
}
