use crate::error::{AcquisitionError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a named OS thread with a cooperative stop flag.
///
/// The thread holds the sending half of `done` for its whole life; the
/// channel disconnects when the body returns or panics, so any number of
/// observers can wait on it.
pub struct Worker<T> {
    name: &'static str,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = bounded::<()>(0);
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done: Sender<()> = done_tx;
                body(flag)
            })
            .map_err(|e| AcquisitionError::ThreadFailure {
                thread: name,
                message: e.to_string(),
            })?;
        Ok(Self {
            name,
            stop,
            done,
            handle,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Disconnects once the thread has finished
    pub fn finished(&self) -> Receiver<()> {
        self.done.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Signal stop and join, giving up after `timeout`.
    ///
    /// A thread that outlives the timeout is leaked and reported as
    /// [`AcquisitionError::ThreadUnresponsive`].
    pub fn stop(self, timeout: Duration) -> Result<T> {
        self.signal_stop();
        self.join(timeout)
    }

    /// Join without signalling, for threads that end on their own
    pub fn join(self, timeout: Duration) -> Result<T> {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "{} thread did not stop within {} ms",
                    self.name,
                    timeout.as_millis()
                );
                Err(AcquisitionError::ThreadUnresponsive {
                    thread: self.name,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            // nothing is ever sent; disconnection means the body returned
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.handle.join().map_err(|panic| AcquisitionError::ThreadFailure {
                    thread: self.name,
                    message: panic_message(panic.as_ref()),
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_stop_flag_ends_loop() {
        let worker = Worker::spawn("spin", |stop| {
            let mut iterations = 0u64;
            while !stop.load(Ordering::Acquire) {
                iterations += 1;
                thread::sleep(Duration::from_millis(1));
            }
            iterations
        })
        .unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(worker.stop(Duration::from_secs(1)).unwrap() > 0);
    }

    #[test]
    fn test_unresponsive_thread_is_reported() {
        let worker = Worker::spawn("stuck", |_| thread::sleep(Duration::from_millis(300))).unwrap();
        let started = Instant::now();
        let err = worker.stop(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::ThreadUnresponsive { thread: "stuck", .. }
        ));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_finished_observers_see_exit() {
        let worker = Worker::spawn("short", |_| 7).unwrap();
        let observer = worker.finished();
        assert!(observer.recv_timeout(Duration::from_secs(1)).is_err());
        assert_eq!(worker.join(Duration::from_secs(1)).unwrap(), 7);
    }

    #[test]
    fn test_panic_is_reported() {
        let worker: Worker<()> = Worker::spawn("boom", |_| panic!("sensor fault")).unwrap();
        let err = worker.join(Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("sensor fault"));
    }
}
