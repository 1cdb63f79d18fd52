use super::SessionRecorder;
use crate::core::FrameSample;
use crate::engine::worker::Worker;
use crate::error::{AcquisitionError, Result};
use crate::observability::StreamMetrics;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Thread draining the capture queue into the recorder.
///
/// Storing a frame may wait on the direction's buffer lock; running it
/// here keeps the capture loop free of that wait.
pub struct RecorderIngest {
    frames: Sender<FrameSample>,
    worker: Worker<u64>,
}

impl RecorderIngest {
    pub fn spawn(
        recorder: Arc<SessionRecorder>,
        capacity: usize,
        faults: Sender<AcquisitionError>,
        metrics: Arc<StreamMetrics>,
    ) -> Result<Self> {
        let (frames, queue) = bounded(capacity.max(1));
        let worker = Worker::spawn("recorder-ingest", move |stop| {
            ingest_loop(&recorder, &queue, &faults, &metrics, &stop)
        })?;
        Ok(Self { frames, worker })
    }

    /// Producer side handed to the capture thread
    pub fn sender(&self) -> Sender<FrameSample> {
        self.frames.clone()
    }

    /// Drain what is queued, then stop. Returns the number of frames stored.
    pub fn stop(self, timeout: Duration) -> Result<u64> {
        drop(self.frames);
        self.worker.stop(timeout)
    }
}

fn ingest_loop(
    recorder: &SessionRecorder,
    queue: &Receiver<FrameSample>,
    faults: &Sender<AcquisitionError>,
    metrics: &StreamMetrics,
    stop: &std::sync::atomic::AtomicBool,
) -> u64 {
    let mut stored = 0u64;
    loop {
        let sample = match queue.recv_timeout(POLL_INTERVAL) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) if stop.load(Ordering::Acquire) => {
                if queue.is_empty() {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match recorder.record_camera_frame(sample) {
            Ok(true) => {
                stored += 1;
                metrics.record_frame();
            }
            Ok(false) => {}
            Err(e) => {
                metrics.record_error();
                log::error!("recorder rejected camera frame: {}", e);
                let _ = faults.try_send(e);
                break;
            }
        }
    }
    let unassigned = recorder.unassigned_frames();
    if unassigned > 0 {
        log::info!(
            "recorder ingest stored {} frames, {} fell outside the recording windows",
            stored,
            unassigned
        );
    } else {
        log::debug!("recorder ingest stored {} frames", stored);
    }
    stored
}
