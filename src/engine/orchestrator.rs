use super::capture::{CaptureConfig, CaptureThread};
use super::events::{EventBus, PhaseTransitionEvent};
use super::playback::PlaybackThread;
use super::preview::PreviewChannel;
use super::state::AcquisitionPhase;
use super::worker::Worker;
use crate::core::{Direction, FrameSample, SessionClock};
use crate::error::{AcquisitionError, Result};
use crate::hal::{CameraDevice, DisplaySink};
use crate::observability::{AcquisitionMonitor, StreamMetrics};
use crate::params::{
    typed, ParameterChange, ParameterStore, SessionParameters, SubscriptionId, TimestampMode,
};
use crate::recorder::{RecorderIngest, SessionMetadata, SessionRecorder};
use crate::stimulus::StimulusFrameLibrary;
use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Time a sweep may run past its nominal length before it is cut
    pub stimulus_grace: Duration,
    /// Capacity of the capture-to-recorder queue
    pub ingest_capacity: usize,
    /// Bound on every thread join
    pub join_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stimulus_grace: Duration::from_millis(500),
            ingest_capacity: 256,
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// What to do with the frames of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub session_id: String,
    /// Where to flush the recording; `None` runs the protocol unrecorded
    pub output_dir: Option<PathBuf>,
}

impl SessionRequest {
    pub fn preview(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            output_dir: None,
        }
    }

    pub fn record(session_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            output_dir: Some(output_dir.into()),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.output_dir.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Completed,
    Aborted { reason: String },
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    /// Files written by the flush, empty for unrecorded or aborted sessions
    pub files: Vec<PathBuf>,
    pub frames_captured: u64,
    pub report: String,
}

/// Current phase plus the bus that announces its changes
struct PhaseTracker {
    phase: Mutex<AcquisitionPhase>,
    events: EventBus,
    clock: SessionClock,
}

impl PhaseTracker {
    fn current(&self) -> AcquisitionPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn transition(&self, to: AcquisitionPhase) -> Result<()> {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        let from = *phase;
        if !from.can_transition_to(&to) {
            return Err(AcquisitionError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        *phase = to;
        drop(phase);

        log::info!("phase {} -> {}", from, to);
        self.events.publish(PhaseTransitionEvent {
            from,
            to,
            at_us: self.clock.now_us(),
        });
        Ok(())
    }
}

/// Cloneable way to abort a session from another thread
#[derive(Clone)]
pub struct AbortHandle {
    tx: Sender<String>,
}

impl AbortHandle {
    /// Returns false when an abort request is already pending
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.tx.try_send(reason.into()).is_ok()
    }
}

struct RunningSession {
    worker: Worker<(CaptureThread, Result<SessionOutcome>)>,
    expected: Duration,
}

fn playback_thread(
    library: &Arc<dyn StimulusFrameLibrary>,
    display: &Arc<dyn DisplaySink>,
    recorder: &Arc<SessionRecorder>,
    clock: SessionClock,
    faults: &Sender<AcquisitionError>,
    config: &OrchestratorConfig,
) -> PlaybackThread {
    PlaybackThread::new(Arc::clone(library), Arc::clone(display), recorder.clone(), clock)
        .with_fault_sender(faults.clone())
        .with_join_timeout(config.join_timeout)
}

/// Drives capture and playback through the acquisition phases.
///
/// `start` validates everything synchronously and then hands the session
/// to a dedicated thread; `wait` collects its outcome. Capture runs from
/// before the initial baseline until after the final one; playback runs
/// only inside stimulus phases. The two are never synchronised with each
/// other, only timestamped against the same clock.
pub struct AcquisitionOrchestrator {
    capture: Option<CaptureThread>,
    preview: PreviewChannel<FrameSample>,
    capture_metrics: Arc<StreamMetrics>,
    ingest_metrics: Arc<StreamMetrics>,
    playback: Arc<PlaybackThread>,
    recorder: Arc<SessionRecorder>,
    library: Arc<dyn StimulusFrameLibrary>,
    display: Arc<dyn DisplaySink>,
    params: Arc<dyn ParameterStore>,
    tracker: Arc<PhaseTracker>,
    config: OrchestratorConfig,
    abort_tx: Sender<String>,
    abort_rx: Receiver<String>,
    fault_tx: Sender<AcquisitionError>,
    fault_rx: Receiver<AcquisitionError>,
    subscription: SubscriptionId,
    session: Option<RunningSession>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        camera: Box<dyn CameraDevice>,
        library: Arc<dyn StimulusFrameLibrary>,
        display: Arc<dyn DisplaySink>,
        params: Arc<dyn ParameterStore>,
        clock: SessionClock,
    ) -> Self {
        let (abort_tx, abort_rx) = bounded(1);
        let (fault_tx, fault_rx) = bounded(16);
        let recorder = Arc::new(SessionRecorder::new(clock));

        let mut capture = CaptureThread::new(camera, CaptureConfig::new(TimestampMode::Strict), clock);
        capture.set_fault_sender(fault_tx.clone());
        let config = OrchestratorConfig::default();
        let playback = playback_thread(&library, &display, &recorder, clock, &fault_tx, &config);

        let subscription = params.subscribe(
            typed::ACQUISITION,
            Box::new(|change: &ParameterChange| {
                log::info!(
                    "{}.{} changed; applies from the next session",
                    change.group,
                    change.key
                )
            }),
        );

        Self {
            preview: capture.preview(),
            capture_metrics: capture.metrics(),
            capture: Some(capture),
            ingest_metrics: Arc::new(StreamMetrics::new("recorder")),
            playback: Arc::new(playback),
            recorder,
            library,
            display,
            params,
            tracker: Arc::new(PhaseTracker {
                phase: Mutex::new(AcquisitionPhase::Idle),
                events: EventBus::new(),
                clock,
            }),
            config,
            abort_tx,
            abort_rx,
            fault_tx,
            fault_rx,
            subscription,
            session: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.playback = Arc::new(playback_thread(
            &self.library,
            &self.display,
            &self.recorder,
            self.tracker.clock,
            &self.fault_tx,
            &config,
        ));
        self.config = config;
        self
    }

    pub fn phase(&self) -> AcquisitionPhase {
        self.tracker.current()
    }

    pub fn events(&self) -> EventBus {
        self.tracker.events.clone()
    }

    pub fn recorder(&self) -> Arc<SessionRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Live camera frames, newest first to survive
    pub fn preview(&self) -> PreviewChannel<FrameSample> {
        self.preview.clone()
    }

    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| !s.worker.is_finished())
    }

    /// Validate the parameters and frame library, start capture and hand
    /// the protocol to the orchestrator thread. Nothing changes phase when
    /// this fails.
    pub fn start(&mut self, request: SessionRequest) -> Result<()> {
        if self.is_running() {
            return Err(AcquisitionError::InvalidTransition {
                from: self.phase().to_string(),
                to: AcquisitionPhase::InitialBaseline.to_string(),
            });
        }
        if let Some(stale) = self.session.take() {
            log::warn!("discarding outcome of a session that was never waited on");
            let _ = self.reap(stale);
        }

        let params = SessionParameters::from_store(self.params.as_ref())?;
        let directions = params.acquisition.directions.clone();
        let missing: Vec<Direction> = directions
            .iter()
            .copied()
            .filter(|d| !self.library.is_loaded(*d))
            .collect();
        if !missing.is_empty() {
            let error = AcquisitionError::LibraryNotPreloaded { missing };
            log::warn!("cannot start acquisition: {}", error);
            return Err(error);
        }
        let mut sweeps = Vec::with_capacity(directions.len());
        for &direction in &directions {
            let frames = self
                .library
                .get_sequence(direction)
                .map_or(0, |sequence| sequence.len());
            if frames == 0 {
                return Err(AcquisitionError::LibraryNotPreloaded {
                    missing: vec![direction],
                });
            }
            sweeps.push((direction, Duration::from_secs_f64(frames as f64 / params.monitor.fps)));
        }

        let mut capture = self.capture.take().ok_or_else(|| AcquisitionError::CaptureDeviceError {
            message: "camera is held by a capture thread that never stopped".into(),
            recording: false,
        })?;
        while self.abort_rx.try_recv().is_ok() {}
        while self.fault_rx.try_recv().is_ok() {}

        let ingest = if request.is_recording() {
            self.recorder.initialize(
                &directions,
                SessionMetadata {
                    session_id: request.session_id.clone(),
                    camera_fps: params.camera.fps,
                    monitor: params.monitor,
                    cycles: params.acquisition.cycles,
                },
            );
            match RecorderIngest::spawn(
                Arc::clone(&self.recorder),
                self.config.ingest_capacity,
                self.fault_tx.clone(),
                Arc::clone(&self.ingest_metrics),
            ) {
                Ok(ingest) => Some(ingest),
                Err(e) => {
                    self.recorder.discard();
                    self.capture = Some(capture);
                    return Err(e);
                }
            }
        } else {
            None
        };

        capture.set_timestamp_mode(params.camera.timestamp_mode);
        capture.set_recording(ingest.is_some());
        if let Err(e) = capture.start(ingest.as_ref().map(|i| i.sender())) {
            capture.set_recording(false);
            self.capture = Some(capture);
            if let Some(ingest) = ingest {
                if let Err(stop_error) = ingest.stop(self.config.join_timeout) {
                    log::error!("recorder ingest did not stop: {}", stop_error);
                }
                self.recorder.discard();
            }
            return Err(e);
        }

        log::info!(
            "starting session {} ({} directions x {} cycles, {})",
            request.session_id,
            directions.len(),
            params.acquisition.cycles,
            if request.is_recording() { "recording" } else { "not recording" }
        );
        let runner = SessionRunner {
            frames_before: self.capture_metrics.frames(),
            capture,
            ingest,
            playback: Arc::clone(&self.playback),
            recorder: Arc::clone(&self.recorder),
            display: Arc::clone(&self.display),
            tracker: Arc::clone(&self.tracker),
            params,
            sweeps,
            request,
            abort: self.abort_rx.clone(),
            faults: self.fault_rx.clone(),
            config: self.config,
            monitor: self.monitor(),
        };
        let expected = runner.expected_duration();
        let worker = Worker::spawn("orchestrator", move |_| runner.run())?;
        self.session = Some(RunningSession { worker, expected });
        Ok(())
    }

    /// Request an abort. Returns false when no session is running.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        if !self.is_running() {
            return false;
        }
        // a full channel already holds an abort request
        let _ = self.abort_tx.try_send(reason.into());
        true
    }

    /// Abort requests are drained when a session starts, so a handle only
    /// affects the session that is running when it fires
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Block until the running session ends
    pub fn wait(&mut self) -> Result<SessionOutcome> {
        let session = self.session.take().ok_or_else(|| AcquisitionError::InvalidTransition {
            from: self.phase().to_string(),
            to: AcquisitionPhase::Complete.to_string(),
        })?;
        self.reap(session)
    }

    /// `start` followed by `wait`
    pub fn run(&mut self, request: SessionRequest) -> Result<SessionOutcome> {
        self.start(request)?;
        self.wait()
    }

    fn reap(&mut self, session: RunningSession) -> Result<SessionOutcome> {
        // generous bound: a healthy session never gets near it
        let timeout = session.expected * 2 + self.config.join_timeout * 4;
        let (capture, outcome) = session.worker.join(timeout)?;
        self.capture = Some(capture);
        outcome
    }

    fn monitor(&self) -> AcquisitionMonitor {
        let mut monitor = AcquisitionMonitor::new();
        monitor.register(Arc::clone(&self.capture_metrics));
        monitor.register(self.playback.metrics());
        monitor.register(Arc::clone(&self.ingest_metrics));
        monitor
    }

    /// Counters of the capture, playback and recorder streams
    pub fn report(&self) -> String {
        self.monitor().generate_report()
    }
}

impl Drop for AcquisitionOrchestrator {
    fn drop(&mut self) {
        if self.abort("orchestrator released") {
            if let Err(e) = self.wait() {
                log::error!("session ended with error during shutdown: {}", e);
            }
        }
        self.params.unsubscribe(self.subscription);
    }
}

/// State owned by the orchestrator thread for one session
struct SessionRunner {
    capture: CaptureThread,
    ingest: Option<RecorderIngest>,
    playback: Arc<PlaybackThread>,
    recorder: Arc<SessionRecorder>,
    display: Arc<dyn DisplaySink>,
    tracker: Arc<PhaseTracker>,
    params: SessionParameters,
    sweeps: Vec<(Direction, Duration)>,
    request: SessionRequest,
    abort: Receiver<String>,
    faults: Receiver<AcquisitionError>,
    config: OrchestratorConfig,
    monitor: AcquisitionMonitor,
    frames_before: u64,
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

impl SessionRunner {
    fn expected_duration(&self) -> Duration {
        let acquisition = &self.params.acquisition;
        let cycles = acquisition.cycles;
        let stimulus: Duration = self
            .sweeps
            .iter()
            .map(|(_, sweep)| (*sweep + self.config.stimulus_grace + seconds(acquisition.between_sec)) * cycles)
            .sum();
        seconds(acquisition.baseline_sec) * 2 + stimulus
    }

    fn run(mut self) -> (CaptureThread, Result<SessionOutcome>) {
        let result = match self.execute() {
            Ok(()) => self.finish(),
            Err(AcquisitionError::Aborted(reason)) => {
                self.shut_down(&reason);
                Ok(self.outcome(SessionStatus::Aborted { reason }, Vec::new()))
            }
            Err(e) => {
                self.shut_down(&e.to_string());
                Err(e)
            }
        };
        (self.capture, result)
    }

    fn execute(&mut self) -> Result<()> {
        let acquisition = self.params.acquisition.clone();
        let recording = self.request.is_recording();

        self.enter(AcquisitionPhase::InitialBaseline)?;
        self.hold(seconds(acquisition.baseline_sec), None)?;

        for (direction, sweep) in self.sweeps.clone() {
            for cycle in 0..acquisition.cycles {
                self.enter(AcquisitionPhase::Stimulus { direction, cycle })?;
                if recording && cycle == 0 {
                    self.recorder.start_recording(direction)?;
                }
                self.playback.start(direction, self.params.monitor.fps)?;
                let done = self.playback.finished();
                let finished = self.hold(sweep + self.config.stimulus_grace, done.as_ref())?;
                if let Some(summary) = self.playback.stop()? {
                    if !finished || !summary.completed {
                        log::warn!(
                            "{} cycle {} cut after {} frames",
                            direction,
                            cycle,
                            summary.frames_presented
                        );
                    }
                }
                self.check_interrupts()?;
                if recording && cycle + 1 == acquisition.cycles {
                    self.recorder.stop_recording(direction)?;
                }

                self.enter(AcquisitionPhase::BetweenTrials { direction, cycle })?;
                self.hold(seconds(acquisition.between_sec), None)?;
            }
        }

        self.enter(AcquisitionPhase::FinalBaseline)?;
        self.hold(seconds(acquisition.baseline_sec), None)?;

        self.capture.stop()?;
        self.capture.set_recording(false);
        if let Some(ingest) = self.ingest.take() {
            ingest.stop(self.config.join_timeout)?;
        }
        self.check_interrupts()?;
        self.tracker.transition(AcquisitionPhase::Complete)
    }

    fn enter(&self, phase: AcquisitionPhase) -> Result<()> {
        self.tracker.transition(phase)?;
        if phase.shows_background() {
            self.show_background()?;
        }
        Ok(())
    }

    /// Wait for `duration`, or until `done` disconnects. Returns whether
    /// `done` fired. Aborts and faults end the wait with an error.
    fn hold(&self, duration: Duration, done: Option<&Receiver<()>>) -> Result<bool> {
        let idle = never();
        let done = done.unwrap_or(&idle);
        select! {
            recv(self.abort) -> reason => Err(AcquisitionError::Aborted(
                reason.unwrap_or_else(|_| "abort channel closed".into()),
            )),
            recv(self.faults) -> fault => Err(fault.unwrap_or_else(|_| {
                AcquisitionError::Aborted("fault channel closed".into())
            })),
            recv(done) -> _ => Ok(true),
            default(duration) => Ok(false),
        }
    }

    fn check_interrupts(&self) -> Result<()> {
        if let Ok(reason) = self.abort.try_recv() {
            return Err(AcquisitionError::Aborted(reason));
        }
        if let Ok(fault) = self.faults.try_recv() {
            return Err(fault);
        }
        Ok(())
    }

    fn show_background(&self) -> Result<()> {
        self.display
            .show_background(self.params.acquisition.background_luminance)
            .map_err(|e| AcquisitionError::ThreadFailure {
                thread: "orchestrator",
                message: format!("display rejected background: {:#}", e),
            })
    }

    /// Abort path: capture first, then playback, then drop the buffers
    fn shut_down(&mut self, reason: &str) {
        log::warn!("aborting session {}: {}", self.request.session_id, reason);
        if self.tracker.current().can_transition_to(&AcquisitionPhase::Aborted) {
            let _ = self.tracker.transition(AcquisitionPhase::Aborted);
        }

        if let Err(e) = self.capture.stop() {
            log::error!("capture did not stop during abort: {}", e);
        }
        self.capture.set_recording(false);
        if let Err(e) = self.playback.stop() {
            log::error!("playback did not stop during abort: {}", e);
        }
        if let Some(ingest) = self.ingest.take() {
            if let Err(e) = ingest.stop(self.config.join_timeout) {
                log::error!("recorder ingest did not stop during abort: {}", e);
            }
        }
        if self.request.is_recording() {
            self.recorder.discard();
        }
        if let Err(e) = self
            .display
            .show_background(self.params.acquisition.background_luminance)
        {
            log::warn!("could not blank display after abort: {:#}", e);
        }

        if self.tracker.current() == AcquisitionPhase::Aborted {
            let _ = self.tracker.transition(AcquisitionPhase::Idle);
        }
    }

    fn finish(&mut self) -> Result<SessionOutcome> {
        let files = match &self.request.output_dir {
            Some(dir) => match self.recorder.flush(dir) {
                Ok(files) => files,
                Err(e) => {
                    log::error!("flush failed, recorded buffers kept for retry: {}", e);
                    let _ = self.tracker.transition(AcquisitionPhase::Idle);
                    return Err(e);
                }
            },
            None => Vec::new(),
        };
        self.tracker.transition(AcquisitionPhase::Idle)?;
        log::info!("session {} complete", self.request.session_id);
        Ok(self.outcome(SessionStatus::Completed, files))
    }

    fn outcome(&self, status: SessionStatus, files: Vec<PathBuf>) -> SessionOutcome {
        SessionOutcome {
            session_id: self.request.session_id.clone(),
            status,
            files,
            frames_captured: self.capture.metrics().frames() - self.frames_before,
            report: self.monitor.generate_report(),
        }
    }
}
