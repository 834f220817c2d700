use super::event::EngineEvent;
use crate::config::RecognitionOptions;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Epoch-stamped sender a backend uses to deliver its events
///
/// When the adapter recreates the engine it bumps the shared epoch, which
/// detaches every sink handed to the previous instance: stale events are
/// dropped instead of leaking into the new session generation.
#[derive(Clone)]
pub struct EngineEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
    epoch: u64,
    current_epoch: Arc<AtomicU64>,
}

impl EngineEventSink {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<EngineEvent>,
        epoch: u64,
        current_epoch: Arc<AtomicU64>,
    ) -> Self {
        Self { tx, epoch, current_epoch }
    }

    /// Deliver an event upward, unless this sink belongs to a replaced
    /// engine instance
    pub fn emit(&self, event: EngineEvent) {
        if self.current_epoch.load(Ordering::SeqCst) != self.epoch {
            debug!(epoch = self.epoch, "Dropping event from detached engine instance");
            return;
        }
        // Receiver gone means the session loop already shut down
        let _ = self.tx.send(event);
    }

    /// Whether this sink is still bound to the live engine instance
    pub fn is_attached(&self) -> bool {
        self.current_epoch.load(Ordering::SeqCst) == self.epoch
    }
}

/// A platform-supplied continuous recognizer
///
/// Implementations push events through the `EngineEventSink` given to them
/// at creation and only need to honor start/stop. They are allowed to be
/// unreliable: the adapter owns re-instantiation when they break.
#[async_trait::async_trait]
pub trait RecognitionBackend: Send {
    /// Begin continuous recognition
    async fn start(&mut self) -> Result<()>;

    /// Stop recognition; the backend should emit `EngineEvent::Ended`
    async fn stop(&mut self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Factory for recognition backends
///
/// Mirrors how audio capture is provided: the host either has the
/// capability or it does not, and absence is a normal condition the
/// session must degrade around rather than crash on.
pub trait RecognitionProvider: Send + Sync {
    /// Whether this host can recognize speech at all
    fn available(&self) -> bool;

    /// Construct a fresh backend bound to `sink`
    fn create(
        &self,
        options: &RecognitionOptions,
        sink: EngineEventSink,
    ) -> Result<Box<dyn RecognitionBackend>>;
}
