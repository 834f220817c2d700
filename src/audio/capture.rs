use super::level::SoundLevelSample;
use crate::config::SoundConfig;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Microphone loudness capture backend
///
/// The backend exclusively owns the capture resources for one session;
/// `stop` must release them unconditionally.
#[async_trait::async_trait]
pub trait SoundLevelBackend: Send {
    /// Acquire the microphone and begin sampling
    ///
    /// Returns a channel receiver that will receive loudness samples
    async fn start(&mut self) -> Result<mpsc::Receiver<SoundLevelSample>>;

    /// Release the microphone and stop sampling
    async fn stop(&mut self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Factory for sound-level backends
pub trait SoundLevelProvider: Send + Sync {
    /// Whether this host can capture microphone audio at all
    fn available(&self) -> bool;

    fn create(&self, config: &SoundConfig) -> Result<Box<dyn SoundLevelBackend>>;
}

/// Provider for hosts without any audio-capture capability
///
/// The session degrades gracefully: sound-level corroboration is simply
/// absent and the engine's speech-boundary events carry the session alone.
pub struct NullSoundLevelProvider;

impl SoundLevelProvider for NullSoundLevelProvider {
    fn available(&self) -> bool {
        false
    }

    fn create(&self, _config: &SoundConfig) -> Result<Box<dyn SoundLevelBackend>> {
        anyhow::bail!("audio capture capability not available")
    }
}

/// Synthetic backend emitting a fixed loudness pattern, for tests and demos
pub struct SyntheticLevelBackend {
    /// Levels replayed in a cycle, one per sample interval
    pattern: Vec<f32>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl SyntheticLevelBackend {
    pub fn new(pattern: Vec<f32>, interval: Duration) -> Self {
        Self { pattern, interval, task: None }
    }
}

#[async_trait::async_trait]
impl SoundLevelBackend for SyntheticLevelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<SoundLevelSample>> {
        let (tx, rx) = mpsc::channel(32);
        let pattern = self.pattern.clone();
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            let mut i = 0usize;
            loop {
                tokio::time::sleep(interval).await;
                let level = if pattern.is_empty() { 0.0 } else { pattern[i % pattern.len()] };
                i += 1;
                if tx.send(SoundLevelSample::new(level)).await.is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Synthetic sound-level sampling stopped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Provider wrapping `SyntheticLevelBackend`
pub struct SyntheticLevelProvider {
    pattern: Vec<f32>,
}

impl SyntheticLevelProvider {
    pub fn new(pattern: Vec<f32>) -> Self {
        Self { pattern }
    }

    /// A quiet room: every sample well below the sound threshold
    pub fn quiet() -> Self {
        Self::new(vec![2.0])
    }
}

impl SoundLevelProvider for SyntheticLevelProvider {
    fn available(&self) -> bool {
        true
    }

    fn create(&self, config: &SoundConfig) -> Result<Box<dyn SoundLevelBackend>> {
        Ok(Box::new(SyntheticLevelBackend::new(
            self.pattern.clone(),
            config.sample_interval,
        )))
    }
}
