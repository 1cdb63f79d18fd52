use super::preview::PreviewChannel;
use super::worker::Worker;
use crate::core::{FrameSample, SessionClock, TimestampSource};
use crate::error::{AcquisitionError, Result};
use crate::hal::CameraDevice;
use crate::observability::StreamMetrics;
use crate::params::TimestampMode;
use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub timestamp_mode: TimestampMode,
    /// Longest wait for room in the recorder queue
    pub queue_timeout: Duration,
    /// Pause after a capture error while only previewing
    pub error_backoff: Duration,
    pub join_timeout: Duration,
    pub preview_capacity: usize,
}

impl CaptureConfig {
    pub fn new(timestamp_mode: TimestampMode) -> Self {
        Self {
            timestamp_mode,
            queue_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(100),
            join_timeout: Duration::from_secs(2),
            preview_capacity: 4,
        }
    }
}

/// Everything the capture loop needs besides the camera
struct CaptureContext {
    mode: TimestampMode,
    clock: SessionClock,
    frames: Option<Sender<FrameSample>>,
    preview: PreviewChannel<FrameSample>,
    faults: Option<Sender<AcquisitionError>>,
    recording: Arc<AtomicBool>,
    metrics: Arc<StreamMetrics>,
    queue_timeout: Duration,
    error_backoff: Duration,
}

/// Continuous camera loop on its own OS thread.
///
/// The loop never looks at the experiment phase: once started it captures
/// until stopped. The camera moves into the thread on `start` and comes
/// back on `stop`.
pub struct CaptureThread {
    camera: Option<Box<dyn CameraDevice>>,
    config: CaptureConfig,
    clock: SessionClock,
    preview: PreviewChannel<FrameSample>,
    faults: Option<Sender<AcquisitionError>>,
    recording: Arc<AtomicBool>,
    metrics: Arc<StreamMetrics>,
    worker: Option<Worker<Box<dyn CameraDevice>>>,
}

impl CaptureThread {
    pub fn new(camera: Box<dyn CameraDevice>, config: CaptureConfig, clock: SessionClock) -> Self {
        Self {
            camera: Some(camera),
            preview: PreviewChannel::new(config.preview_capacity),
            config,
            clock,
            faults: None,
            recording: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(StreamMetrics::new("capture")),
            worker: None,
        }
    }

    /// Takes effect at the next `start`
    pub fn set_timestamp_mode(&mut self, mode: TimestampMode) {
        self.config.timestamp_mode = mode;
    }

    /// Where fatal errors of the loop are reported
    pub fn set_fault_sender(&mut self, faults: Sender<AcquisitionError>) {
        self.faults = Some(faults);
    }

    pub fn preview(&self) -> PreviewChannel<FrameSample> {
        self.preview.clone()
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Device errors are fatal while recording, recoverable otherwise
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map_or(false, |w| !w.is_finished())
    }

    /// Disconnects when the loop exits
    pub fn finished(&self) -> Option<crossbeam_channel::Receiver<()>> {
        self.worker.as_ref().map(|w| w.finished())
    }

    /// Start the loop. `frames` is the recorder queue, if any.
    pub fn start(&mut self, frames: Option<Sender<FrameSample>>) -> Result<()> {
        if self.worker.is_some() {
            return Err(AcquisitionError::CaptureDeviceError {
                message: "capture is already running".into(),
                recording: false,
            });
        }
        let camera = self.camera.take().ok_or_else(|| AcquisitionError::CaptureDeviceError {
            message: "camera was not returned by the previous capture run".into(),
            recording: false,
        })?;

        if !camera.has_hardware_clock() {
            match self.config.timestamp_mode {
                TimestampMode::Strict => {
                    log::error!(
                        "camera {} has no hardware clock; refusing to start in strict mode",
                        camera.info().id
                    );
                    self.camera = Some(camera);
                    return Err(AcquisitionError::HardwareTimestampUnavailable);
                }
                TimestampMode::Relaxed => log::warn!(
                    "camera {} has no hardware clock; frames will carry software timestamps",
                    camera.info().id
                ),
            }
        }

        let context = CaptureContext {
            mode: self.config.timestamp_mode,
            clock: self.clock,
            frames,
            preview: self.preview.clone(),
            faults: self.faults.clone(),
            recording: Arc::clone(&self.recording),
            metrics: Arc::clone(&self.metrics),
            queue_timeout: self.config.queue_timeout,
            error_backoff: self.config.error_backoff,
        };
        log::info!("starting capture on {}", camera.info().id);
        self.worker = Some(Worker::spawn("capture", move |stop| {
            capture_loop(camera, &context, &stop)
        })?);
        Ok(())
    }

    /// Stop the loop and take the camera back.
    ///
    /// An unresponsive thread keeps the camera and is reported as
    /// [`AcquisitionError::ThreadUnresponsive`].
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let camera = worker.stop(self.config.join_timeout)?;
        self.camera = Some(camera);
        log::info!(
            "capture stopped after {} frames ({} errors)",
            self.metrics.frames(),
            self.metrics.errors()
        );
        Ok(())
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("capture thread not stopped cleanly: {}", e);
        }
    }
}

fn capture_loop(
    mut camera: Box<dyn CameraDevice>,
    ctx: &CaptureContext,
    stop: &AtomicBool,
) -> Box<dyn CameraDevice> {
    let mut capture_index = 0u64;
    while !stop.load(Ordering::Acquire) {
        let started = ctx.metrics.start_iteration();
        let sample = camera.capture().and_then(|raw| {
            let (timestamp_us, timestamp_source) = match (raw.hardware_timestamp_us, ctx.mode) {
                (Some(ts), _) => (ts, TimestampSource::Hardware),
                (None, TimestampMode::Relaxed) => (ctx.clock.now_us(), TimestampSource::Software),
                (None, TimestampMode::Strict) => {
                    anyhow::bail!("frame {} arrived without a hardware timestamp", raw.frame_number)
                }
            };
            Ok(FrameSample {
                frame_id: raw.frame_number,
                timestamp_us,
                timestamp_source,
                pixels: Arc::new(raw.pixels),
                capture_index,
            })
        });

        match sample {
            Ok(sample) => {
                capture_index += 1;
                if let Some(frames) = &ctx.frames {
                    match frames.send_timeout(sample.clone(), ctx.queue_timeout) {
                        Ok(()) => {}
                        Err(SendTimeoutError::Timeout(_)) => {
                            ctx.metrics.record_dropped(1);
                            if escalate(ctx, "recorder queue stayed full".into()) {
                                break;
                            }
                        }
                        // recorder side is gone; keep previewing
                        Err(SendTimeoutError::Disconnected(_)) => {}
                    }
                }
                let evicted = ctx.preview.offer(sample);
                if evicted > 0 {
                    ctx.metrics.record_dropped(evicted);
                }
                ctx.metrics.record_frame();
                ctx.metrics.finish_iteration(started);
            }
            Err(e) => {
                ctx.metrics.record_error();
                if escalate(ctx, format!("{:#}", e)) {
                    break;
                }
                std::thread::sleep(ctx.error_backoff);
            }
        }
    }
    camera
}

/// Report a capture failure. Returns true when the loop must end.
fn escalate(ctx: &CaptureContext, message: String) -> bool {
    if ctx.recording.load(Ordering::Acquire) {
        log::error!("capture failed while recording: {}", message);
        if let Some(faults) = &ctx.faults {
            let _ = faults.try_send(AcquisitionError::CaptureDeviceError {
                message,
                recording: true,
            });
        }
        true
    } else {
        log::warn!("capture error while previewing, skipping frame: {}", message);
        false
    }
}
