use crate::audio::{SoundLevelBackend, SoundLevelMonitor, SoundLevelProvider, SoundLevelSample};
use crate::config::{RecognitionMode, RecognitionOptions, SessionConfig};
use crate::engine::{EngineAdapter, EngineEvent, ErrorCode, RecognitionProvider};
use crate::session::callbacks::SessionCallbacks;
use crate::session::machine::{self, CallbackEvent, Effect, Event};
use crate::session::scheduler::{TimerFired, TimerId, TimerWheel};
use crate::session::state::{SessionState, Status};
use crate::session::stats::SessionStats;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Caller commands delivered to the session loop
#[derive(Debug)]
enum Command {
    Start,
    Stop,
    SetOptions(RecognitionOptions),
    SetMode(RecognitionMode),
    SetShouldStopAfterSilence(bool),
    TriggerNoSpeech,
    Shutdown,
}

/// State mirrored out of the loop for synchronous reads
struct Shared {
    session_id: String,
    is_listening: AtomicBool,
    status: AtomicU8,
    mode: AtomicU8,
    started_at: chrono::DateTime<Utc>,
    callbacks: StdMutex<SessionCallbacks>,
    fragments_seen: AtomicU64,
    utterances_finalized: AtomicU64,
}

fn status_to_u8(status: Status) -> u8 {
    match status {
        Status::Inactive => 0,
        Status::Listening => 1,
        Status::Processing => 2,
        Status::Error => 3,
    }
}

fn status_from_u8(raw: u8) -> Status {
    match raw {
        1 => Status::Listening,
        2 => Status::Processing,
        3 => Status::Error,
        _ => Status::Inactive,
    }
}

fn mode_to_u8(mode: RecognitionMode) -> u8 {
    match mode {
        RecognitionMode::Realtime => 0,
        RecognitionMode::Transcription => 1,
    }
}

fn mode_from_u8(raw: u8) -> RecognitionMode {
    if raw == 0 {
        RecognitionMode::Realtime
    } else {
        RecognitionMode::Transcription
    }
}

/// Public facade over one continuous speech-recognition session
///
/// All real work happens on a dedicated loop task; facade methods either
/// read mirrored state synchronously or enqueue a command. `toggle`
/// therefore answers immediately even though engine bring-up and
/// microphone acquisition are asynchronous underneath.
pub struct SpeechSession {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    loop_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl SpeechSession {
    /// Create a session over the given capability providers
    ///
    /// Providers are injected so independent sessions (and tests) never
    /// share module-level state.
    pub fn new(
        config: SessionConfig,
        recognition: Arc<dyn RecognitionProvider>,
        sound: Arc<dyn SoundLevelProvider>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            session_id: config.session_id.clone(),
            is_listening: AtomicBool::new(false),
            status: AtomicU8::new(status_to_u8(Status::Inactive)),
            mode: AtomicU8::new(mode_to_u8(config.recognition.mode)),
            started_at: Utc::now(),
            callbacks: StdMutex::new(SessionCallbacks::new()),
            fragments_seen: AtomicU64::new(0),
            utterances_finalized: AtomicU64::new(0),
        });

        info!(session = %config.session_id, "Creating speech session");

        let loop_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            SessionLoop::new(config, recognition, sound, loop_shared)
                .run(cmd_rx)
                .await;
        });

        Self { shared, cmd_tx, loop_handle: StdMutex::new(Some(handle)) }
    }

    /// Merge new callback registrations into the existing set
    pub fn set_callbacks(&self, callbacks: SessionCallbacks) {
        if let Ok(mut current) = self.shared.callbacks.lock() {
            current.merge(callbacks);
        }
    }

    /// Replace engine options (language, interim results, timeout, mode)
    pub fn set_options(&self, options: RecognitionOptions) {
        self.shared.mode.store(mode_to_u8(options.mode), Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::SetOptions(options));
    }

    /// Begin listening
    pub fn start(&self) {
        self.shared.is_listening.store(true, Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::Start);
    }

    /// Stop listening
    ///
    /// The listening flag flips synchronously so any in-flight timer
    /// callback observes the stop before async teardown runs.
    pub fn stop(&self) {
        self.shared.is_listening.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::Stop);
    }

    /// Flip between listening and stopped; returns the new state
    pub fn toggle(&self) -> bool {
        if self.is_active() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }

    /// Switch operating mode; an active session restarts under it
    pub fn set_mode(&self, mode: RecognitionMode) {
        self.shared.mode.store(mode_to_u8(mode), Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::SetMode(mode));
    }

    pub fn mode(&self) -> RecognitionMode {
        mode_from_u8(self.shared.mode.load(Ordering::SeqCst))
    }

    pub fn set_should_stop_after_silence(&self, should_stop: bool) {
        let _ = self.cmd_tx.send(Command::SetShouldStopAfterSilence(should_stop));
    }

    /// Force the no-speech path, as if the engine had reported silence
    pub fn trigger_no_speech(&self) {
        let _ = self.cmd_tx.send(Command::TriggerNoSpeech);
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_listening.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Status {
        status_from_u8(self.shared.status.load(Ordering::SeqCst))
    }

    /// Current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.shared.started_at);
        SessionStats {
            session_id: self.shared.session_id.clone(),
            status: self.status(),
            is_listening: self.is_active(),
            started_at: self.shared.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            fragments_seen: self.shared.fragments_seen.load(Ordering::SeqCst),
            utterances_finalized: self.shared.utterances_finalized.load(Ordering::SeqCst),
        }
    }

    /// Tear the session down; further commands are ignored
    pub fn shutdown(&self) {
        self.shared.is_listening.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Ok(mut handle) = self.loop_handle.lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

/// The session loop: sole owner of machine state, timers, engine and
/// microphone
struct SessionLoop {
    state: SessionState,
    shared: Arc<Shared>,
    adapter: EngineAdapter,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    wheel: TimerWheel,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    sound_provider: Arc<dyn SoundLevelProvider>,
    sound_backend: Option<Box<dyn SoundLevelBackend>>,
    sound_rx: Option<mpsc::Receiver<SoundLevelSample>>,
    monitor: SoundLevelMonitor,
    clock_zero: Instant,
    audio_error_reported: bool,
}

impl SessionLoop {
    fn new(
        config: SessionConfig,
        recognition: Arc<dyn RecognitionProvider>,
        sound: Arc<dyn SoundLevelProvider>,
        shared: Arc<Shared>,
    ) -> Self {
        let (adapter, engine_rx) = EngineAdapter::new(recognition, config.recognition.clone());
        let (wheel, timer_rx) = TimerWheel::new();
        let monitor = SoundLevelMonitor::new(config.sound.clone());
        let state = SessionState::new(config);

        Self {
            state,
            shared,
            adapter,
            engine_rx,
            wheel,
            timer_rx,
            sound_provider: sound,
            sound_backend: None,
            sound_rx: None,
            monitor,
            clock_zero: Instant::now(),
            audio_error_reported: false,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        debug!(session = %self.shared.session_id, "Session loop started");

        loop {
            let event = tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::Start) => Event::Start,
                    Some(Command::Stop) => Event::Stop,
                    Some(Command::SetOptions(options)) => Event::SetOptions(options),
                    Some(Command::SetMode(mode)) => Event::SetMode(mode),
                    Some(Command::SetShouldStopAfterSilence(flag)) => {
                        Event::SetShouldStopAfterSilence(flag)
                    }
                    Some(Command::TriggerNoSpeech) => Event::TriggerNoSpeech,
                },
                Some(engine_event) = self.engine_rx.recv() => Event::Engine(engine_event),
                Some(fired) = self.timer_rx.recv() => {
                    if !self.wheel.is_current(&fired) {
                        debug!(id = ?fired.id, "Dropping stale timer firing");
                        continue;
                    }
                    // Second line of defense: a stop flips the shared flag
                    // before the Stop command is even processed
                    if Self::listen_gated(fired.id)
                        && !self.shared.is_listening.load(Ordering::SeqCst)
                    {
                        debug!(id = ?fired.id, "Dropping timer firing, session stopped");
                        continue;
                    }
                    Event::Timer(fired.id)
                },
                sample = Self::recv_sound(&mut self.sound_rx) => {
                    let level = self.monitor.push(sample.level);
                    Event::Sound(level)
                },
            };

            self.process(event).await;
        }

        self.teardown().await;
        debug!(session = %self.shared.session_id, "Session loop finished");
    }

    /// Timers that only make sense while the session wants to listen
    fn listen_gated(id: TimerId) -> bool {
        !matches!(id, TimerId::PendingStart)
    }

    async fn recv_sound(rx: &mut Option<mpsc::Receiver<SoundLevelSample>>) -> SoundLevelSample {
        match rx {
            Some(rx) => match rx.recv().await {
                Some(sample) => sample,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock_zero.elapsed().as_millis() as u64
    }

    /// Step the machine and interpret its effects; effects may fault and
    /// feed follow-up events back into the machine
    async fn process(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let now = self.now_ms();
            let effects = machine::step(&mut self.state, event, now);
            for effect in effects {
                if let Some(fault) = self.apply(effect).await {
                    queue.push_back(Event::EngineFault(fault));
                }
            }
            self.sync_shared();
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<ErrorCode> {
        match effect {
            Effect::RecreateEngine => {
                if let Err(e) = self.adapter.recreate().await {
                    warn!("Engine recreate failed: {e:#}");
                    return Some(self.classify_engine_error());
                }
            }
            Effect::StartEngine => {
                if let Err(e) = self.adapter.start().await {
                    warn!("Engine start failed: {e:#}");
                    return Some(self.classify_engine_error());
                }
            }
            Effect::StopEngine => self.adapter.stop().await,
            Effect::ConfigureEngine(options) => self.adapter.configure(options),
            Effect::StartAudio => self.start_audio().await,
            Effect::StopAudio => self.stop_audio().await,
            Effect::StartTimer(id, duration) => self.wheel.schedule(id, duration),
            Effect::CancelTimer(id) => self.wheel.cancel(id),
            Effect::CancelAllTimers => self.wheel.cancel_all(),
            Effect::Emit(callback_event) => self.dispatch(callback_event),
        }
        None
    }

    fn classify_engine_error(&self) -> ErrorCode {
        if self.adapter.available() {
            ErrorCode::Other("engine-start-failed".to_string())
        } else {
            ErrorCode::RecognitionUnavailable
        }
    }

    /// Acquire the microphone; capability absence degrades to a single
    /// reported error, not a dead session
    async fn start_audio(&mut self) {
        self.stop_audio().await;

        if !self.sound_provider.available() {
            if !self.audio_error_reported {
                warn!("No audio capture capability on this host");
                self.audio_error_reported = true;
                self.dispatch(CallbackEvent::Error(ErrorCode::AudioUnavailable));
            }
            return;
        }

        match self.sound_provider.create(&self.state.config.sound) {
            Ok(mut backend) => match backend.start().await {
                Ok(rx) => {
                    debug!(backend = backend.name(), "Sound-level monitoring started");
                    self.sound_backend = Some(backend);
                    self.sound_rx = Some(rx);
                }
                Err(e) => {
                    warn!("Failed to start sound-level capture: {e:#}");
                    if !self.audio_error_reported {
                        self.audio_error_reported = true;
                        self.dispatch(CallbackEvent::Error(ErrorCode::AudioCapture));
                    }
                }
            },
            Err(e) => {
                warn!("Failed to create sound-level backend: {e:#}");
                if !self.audio_error_reported {
                    self.audio_error_reported = true;
                    self.dispatch(CallbackEvent::Error(ErrorCode::AudioCapture));
                }
            }
        }
    }

    async fn stop_audio(&mut self) {
        self.sound_rx = None;
        if let Some(mut backend) = self.sound_backend.take() {
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop sound-level capture: {e:#}");
            }
        }
        self.monitor.reset();
    }

    fn dispatch(&self, event: CallbackEvent) {
        // Clone the registered slot out of the lock before invoking it,
        // so a callback can re-enter the facade freely
        let callbacks = match self.shared.callbacks.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };

        match event {
            CallbackEvent::Started => {
                if let Some(cb) = callbacks.on_start {
                    cb();
                }
            }
            CallbackEvent::Ended => {
                if let Some(cb) = callbacks.on_end {
                    cb();
                }
            }
            CallbackEvent::Error(code) => {
                if let Some(cb) = callbacks.on_error {
                    cb(&code);
                }
            }
            CallbackEvent::Result { text, is_final } => {
                if let Some(cb) = callbacks.on_result {
                    cb(&text, is_final);
                }
            }
            CallbackEvent::SoundLevel(level) => {
                if let Some(cb) = callbacks.on_sound_level {
                    cb(level);
                }
            }
            CallbackEvent::NoSpeech => {
                if let Some(cb) = callbacks.on_no_speech {
                    cb();
                }
            }
            CallbackEvent::Silence => {
                if let Some(cb) = callbacks.on_silence {
                    cb();
                }
            }
            CallbackEvent::Finalize(text) => {
                if let Some(cb) = callbacks.on_finalize_transcript {
                    cb(&text);
                }
            }
            CallbackEvent::SpeechStart => {
                if let Some(cb) = callbacks.on_speech_start {
                    cb();
                }
            }
        }
    }

    fn sync_shared(&self) {
        self.shared
            .is_listening
            .store(self.state.is_listening, Ordering::SeqCst);
        self.shared
            .status
            .store(status_to_u8(self.state.status), Ordering::SeqCst);
        self.shared
            .mode
            .store(mode_to_u8(self.state.mode), Ordering::SeqCst);
        self.shared
            .fragments_seen
            .store(self.state.fragments_seen, Ordering::SeqCst);
        self.shared
            .utterances_finalized
            .store(self.state.utterances_finalized, Ordering::SeqCst);
    }

    async fn teardown(&mut self) {
        self.wheel.cancel_all();
        self.adapter.stop().await;
        self.adapter.discard();
        self.stop_audio().await;
    }
}
