//! Scripted recognition backend for tests and demos
//!
//! Replays a fixed sequence of engine events with per-step delays,
//! standing in for a live platform recognizer.

use super::backend::{EngineEventSink, RecognitionBackend, RecognitionProvider};
use super::event::EngineEvent;
use crate::config::RecognitionOptions;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// One step of a replay script
#[derive(Debug, Clone)]
pub struct ScriptStep {
    /// Delay before this event fires, relative to the previous step
    pub delay: Duration,
    pub event: EngineEvent,
}

impl ScriptStep {
    pub fn new(delay: Duration, event: EngineEvent) -> Self {
        Self { delay, event }
    }
}

/// Provider whose backends replay a script on every start
///
/// Each `create` produces an independent backend over the same script,
/// so recreate-and-restart cycles behave like a recognizer that keeps
/// hearing the same audio.
pub struct ScriptedProvider {
    steps: Arc<Vec<ScriptStep>>,
    available: bool,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps: Arc::new(steps), available: true }
    }

    /// A provider that reports the capability as absent
    pub fn unavailable() -> Self {
        Self { steps: Arc::new(Vec::new()), available: false }
    }

    /// Script that emits each phrase as a final fragment, `gap` apart
    pub fn from_phrases(phrases: &[&str], gap: Duration) -> Self {
        let mut steps = Vec::new();
        for phrase in phrases {
            steps.push(ScriptStep::new(gap, EngineEvent::SpeechStart));
            steps.push(ScriptStep::new(
                Duration::from_millis(200),
                EngineEvent::Result(vec![super::event::Fragment::final_text(*phrase)]),
            ));
            steps.push(ScriptStep::new(Duration::from_millis(100), EngineEvent::SpeechEnd));
        }
        Self::new(steps)
    }
}

impl RecognitionProvider for ScriptedProvider {
    fn available(&self) -> bool {
        self.available
    }

    fn create(
        &self,
        _options: &RecognitionOptions,
        sink: EngineEventSink,
    ) -> Result<Box<dyn RecognitionBackend>> {
        if !self.available {
            anyhow::bail!("scripted recognition capability disabled");
        }
        Ok(Box::new(ScriptedBackend { steps: Arc::clone(&self.steps), sink, task: None }))
    }
}

struct ScriptedBackend {
    steps: Arc<Vec<ScriptStep>>,
    sink: EngineEventSink,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl RecognitionBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<()> {
        self.sink.emit(EngineEvent::Started);

        let steps = Arc::clone(&self.steps);
        let sink = self.sink.clone();
        self.task = Some(tokio::spawn(async move {
            for step in steps.iter() {
                tokio::time::sleep(step.delay).await;
                if !sink.is_attached() {
                    debug!("Scripted engine detached mid-replay");
                    return;
                }
                sink.emit(step.event.clone());
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.sink.emit(EngineEvent::Ended);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
