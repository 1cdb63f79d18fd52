use super::state::AcquisitionPhase;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Emitted on every phase change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransitionEvent {
    pub from: AcquisitionPhase,
    pub to: AcquisitionPhase,
    /// Session clock time of the transition
    pub at_us: i64,
}

pub type PhaseCallback = Arc<dyn Fn(&PhaseTransitionEvent) + Send + Sync>;

const CHANNEL_CAPACITY: usize = 64;

struct Inner {
    tx: broadcast::Sender<PhaseTransitionEvent>,
    callbacks: Mutex<Vec<(u64, PhaseCallback)>>,
    next_id: AtomicU64,
}

/// Fan-out of phase transitions to UI-side listeners.
///
/// Callbacks run synchronously on the orchestrator thread and should
/// return quickly; async consumers use [`EventBus::subscribe_channel`].
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tx,
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> u64
    where
        F: Fn(&PhaseTransitionEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(|p| p.into_inner());
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Lagging receivers lose the oldest events
    pub fn subscribe_channel(&self) -> broadcast::Receiver<PhaseTransitionEvent> {
        self.inner.tx.subscribe()
    }

    pub fn publish(&self, event: PhaseTransitionEvent) {
        // no receivers is fine
        let _ = self.inner.tx.send(event);
        let callbacks: Vec<PhaseCallback> = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
