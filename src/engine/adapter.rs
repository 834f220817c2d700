use super::backend::{EngineEventSink, RecognitionBackend, RecognitionProvider};
use super::event::EngineEvent;
use crate::config::RecognitionOptions;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stable start/stop wrapper over an unreliable platform recognizer
///
/// Platform recognizers frequently enter unrecoverable internal states
/// after errors, so the adapter prefers a full instance swap
/// (`recreate`) over resuming a wedged instance. Event bindings of the
/// old instance are detached by bumping the shared epoch before the new
/// instance is constructed.
pub struct EngineAdapter {
    provider: Arc<dyn RecognitionProvider>,
    options: RecognitionOptions,
    backend: Option<Box<dyn RecognitionBackend>>,
    epoch: Arc<AtomicU64>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineAdapter {
    /// Create an adapter and the receiver its engine events arrive on
    pub fn new(
        provider: Arc<dyn RecognitionProvider>,
        options: RecognitionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        if !provider.available() {
            // Capability absence is a normal, expected condition
            warn!("No speech recognition capability on this host");
        }

        let adapter = Self {
            provider,
            options,
            backend: None,
            epoch: Arc::new(AtomicU64::new(0)),
            event_tx,
        };
        (adapter, event_rx)
    }

    /// Update engine options; applied on the next (re)creation
    pub fn configure(&mut self, options: RecognitionOptions) {
        debug!(
            language = %options.language,
            continuous = options.continuous,
            interim_results = options.interim_results,
            "Engine options updated"
        );
        self.options = options;
    }

    /// Whether a recognition capability exists at all
    pub fn available(&self) -> bool {
        self.provider.available()
    }

    /// Detach the current instance and construct a fresh one with
    /// identical configuration
    pub async fn recreate(&mut self) -> Result<()> {
        debug!("Recreating recognition engine instance");

        // Bump the epoch first so events from the old instance are dropped
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(mut old) = self.backend.take() {
            if let Err(e) = old.stop().await {
                debug!("Ignoring stop error while discarding old engine: {e:#}");
            }
        }

        if !self.provider.available() {
            anyhow::bail!("speech recognition capability not available");
        }

        let sink = EngineEventSink::new(self.event_tx.clone(), epoch, Arc::clone(&self.epoch));
        let backend = self
            .provider
            .create(&self.options, sink)
            .context("Failed to create recognition engine")?;

        info!(backend = backend.name(), "Recognition engine instance created");
        self.backend = Some(backend);
        Ok(())
    }

    /// Start the current instance, creating one if needed
    pub async fn start(&mut self) -> Result<()> {
        if self.backend.is_none() {
            self.recreate().await?;
        }
        let backend = self.backend.as_mut().context("no engine instance")?;
        backend.start().await.context("Failed to start recognition engine")
    }

    /// Stop the current instance; a throwing stop is answered with a
    /// fresh instance rather than propagated
    pub async fn stop(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.stop().await {
                warn!("Engine stop failed, recreating instance: {e:#}");
                if let Err(e) = self.recreate().await {
                    warn!("Engine recreate after failed stop also failed: {e:#}");
                }
            }
        }
    }

    /// Drop the instance entirely, detaching its event bindings
    pub fn discard(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.backend = None;
    }
}
