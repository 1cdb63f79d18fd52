use super::worker::Worker;
use crate::core::clock::{sleep_until, tick_deadline};
use crate::core::{Direction, SessionClock, StimulusDisplayEvent};
use crate::error::{AcquisitionError, Result};
use crate::hal::DisplaySink;
use crate::observability::StreamMetrics;
use crate::recorder::StimulusEventSink;
use crate::stimulus::{StimulusFrameLibrary, StimulusSequence};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What one playback run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub direction: Direction,
    pub frames_presented: usize,
    /// False when stopped before the last frame
    pub completed: bool,
}

struct ActivePlayback {
    direction: Direction,
    worker: Worker<PlaybackSummary>,
}

/// Paced stimulus output on its own OS thread.
///
/// At most one direction plays at a time. The thread only sees the frame
/// library, the display and the event sink; it has no handle on the
/// camera.
pub struct PlaybackThread {
    library: Arc<dyn StimulusFrameLibrary>,
    display: Arc<dyn DisplaySink>,
    sink: Arc<dyn StimulusEventSink>,
    clock: SessionClock,
    metrics: Arc<StreamMetrics>,
    faults: Option<Sender<AcquisitionError>>,
    join_timeout: Duration,
    active: Mutex<Option<ActivePlayback>>,
}

impl PlaybackThread {
    pub fn new(
        library: Arc<dyn StimulusFrameLibrary>,
        display: Arc<dyn DisplaySink>,
        sink: Arc<dyn StimulusEventSink>,
        clock: SessionClock,
    ) -> Self {
        Self {
            library,
            display,
            sink,
            clock,
            metrics: Arc::new(StreamMetrics::new("playback")),
            faults: None,
            join_timeout: Duration::from_secs(2),
            active: Mutex::new(None),
        }
    }

    pub fn with_fault_sender(mut self, faults: Sender<AcquisitionError>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Begin playing the preloaded sequence of `direction` at `target_fps`
    pub fn start(&self, direction: Direction, target_fps: f64) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(current) = active.as_ref() {
            if !current.worker.is_finished() {
                return Err(AcquisitionError::PlaybackAlreadyRunning {
                    active: current.direction,
                });
            }
        }
        // reap a run that ended on its own
        if let Some(previous) = active.take() {
            if let Err(e) = previous.worker.join(self.join_timeout) {
                log::warn!("previous {} playback ended badly: {}", previous.direction, e);
            }
        }

        let sequence = self
            .library
            .get_sequence(direction)
            .filter(|s| !s.is_empty())
            .ok_or(AcquisitionError::DirectionNotPreloaded(direction))?;
        if !(target_fps.is_finite() && target_fps > 0.0) {
            return Err(AcquisitionError::invalid(
                crate::params::typed::MONITOR,
                "fps",
                format!("playback rate must be positive, got {}", target_fps),
            ));
        }

        let run = PlaybackRun {
            direction,
            sequence,
            period: Duration::from_secs_f64(1.0 / target_fps),
            display: Arc::clone(&self.display),
            sink: Arc::clone(&self.sink),
            clock: self.clock,
            metrics: Arc::clone(&self.metrics),
            faults: self.faults.clone(),
        };
        log::debug!(
            "playing {} frames of {} at {} fps",
            run.sequence.len(),
            direction,
            target_fps
        );
        let worker = Worker::spawn("playback", move |stop| run.play(&stop))?;
        *active = Some(ActivePlayback { direction, worker });
        Ok(())
    }

    /// Stop the current run and join it. `None` when nothing was playing.
    pub fn stop(&self) -> Result<Option<PlaybackSummary>> {
        let current = self.active.lock().unwrap_or_else(|p| p.into_inner()).take();
        match current {
            Some(current) => current.worker.stop(self.join_timeout).map(Some),
            None => Ok(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map_or(false, |a| !a.worker.is_finished())
    }

    pub fn active_direction(&self) -> Option<Direction> {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|a| a.direction)
    }

    /// Disconnects when the current run ends
    pub fn finished(&self) -> Option<Receiver<()>> {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|a| a.worker.finished())
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("playback thread not stopped cleanly: {}", e);
        }
    }
}

struct PlaybackRun {
    direction: Direction,
    sequence: StimulusSequence,
    period: Duration,
    display: Arc<dyn DisplaySink>,
    sink: Arc<dyn StimulusEventSink>,
    clock: SessionClock,
    metrics: Arc<StreamMetrics>,
    faults: Option<Sender<AcquisitionError>>,
}

impl PlaybackRun {
    fn play(self, stop: &AtomicBool) -> PlaybackSummary {
        let start = Instant::now();
        let mut presented = 0;
        for (index, (frame, angle)) in self.sequence.iter().enumerate() {
            if stop.load(Ordering::Acquire) {
                break;
            }
            let started = self.metrics.start_iteration();
            let event = StimulusDisplayEvent {
                timestamp_us: self.clock.now_us(),
                frame_index: index as i32,
                angle_degrees: *angle,
                direction: self.direction,
            };
            if let Err(e) = self.sink.record_stimulus_event(&event) {
                self.fail(e);
                break;
            }
            if let Err(e) = self.display.present(frame) {
                self.fail(AcquisitionError::ThreadFailure {
                    thread: "playback",
                    message: format!("display rejected frame {}: {:#}", index, e),
                });
                break;
            }
            presented += 1;
            self.metrics.record_frame();
            self.metrics.finish_iteration(started);
            sleep_until(tick_deadline(start, self.period, index as u64 + 1));
        }
        PlaybackSummary {
            direction: self.direction,
            frames_presented: presented,
            completed: presented == self.sequence.len(),
        }
    }

    fn fail(&self, error: AcquisitionError) {
        self.metrics.record_error();
        log::error!("{} playback failed: {}", self.direction, error);
        if let Some(faults) = &self.faults {
            let _ = faults.try_send(error);
        }
    }
}
