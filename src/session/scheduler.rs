use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Named timers of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Nothing heard at all for the configured timeout
    NoSpeech,
    /// Adaptive silence-after-speech window
    Silence,
    /// Quiet gap after a final fragment that completes a sentence
    SentenceCompletion,
    /// Hard ceiling on transcription-mode listening time
    AutoStop,
    /// Delayed engine restart during recovery
    Restart,
    /// Grace window between silence detection and the actual stop
    PendingStop,
    /// Deferred start waiting out the restart rate-limit window
    PendingStart,
}

/// A timer that fired; `generation` identifies the arming that scheduled it
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub id: TimerId,
    pub generation: u64,
}

/// Named, cancelable single-fire timers
///
/// Every timer is a sleep task delivering a `TimerFired` into the session
/// loop. Re-arming or canceling a name aborts the previous task, and the
/// generation stamp lets the loop drop a firing that raced its own
/// cancellation. Start/clear pairing is structural: dropping the wheel
/// aborts everything.
pub struct TimerWheel {
    tx: mpsc::UnboundedSender<TimerFired>,
    tasks: HashMap<TimerId, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl TimerWheel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, tasks: HashMap::new(), next_generation: 0 }, rx)
    }

    /// Arm (or re-arm) a named timer
    pub fn schedule(&mut self, id: TimerId, duration: Duration) {
        self.cancel(id);

        self.next_generation += 1;
        let generation = self.next_generation;
        trace!(?id, ?duration, generation, "Arming timer");

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(TimerFired { id, generation });
        });
        self.tasks.insert(id, (generation, handle));
    }

    /// Disarm a named timer if armed
    pub fn cancel(&mut self, id: TimerId) {
        if let Some((generation, handle)) = self.tasks.remove(&id) {
            trace!(?id, generation, "Canceling timer");
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Whether a firing corresponds to the latest arming of its name
    pub fn is_current(&mut self, fired: &TimerFired) -> bool {
        match self.tasks.get(&fired.id) {
            Some((generation, _)) if *generation == fired.generation => {
                // Single-fire: the arming is consumed
                self.tasks.remove(&fired.id);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TimerWheel {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
