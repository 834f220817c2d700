use crate::config::{RecognitionMode, SessionConfig};
use crate::session::recovery::RecoveryLadder;
use crate::timing::AdaptiveSilenceModel;
use crate::transcript::TranscriptBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal lifecycle phase of the session
///
/// Replaces the scattered `is_initializing` / `is_restarting` /
/// `pending_restart` flag style with one enumerated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not listening; no engine instance wanted
    Idle,
    /// Start issued, waiting for the engine's started event
    Starting,
    /// Engine confirmed listening
    Listening,
    /// Recovery restart scheduled or in flight
    Restarting,
    /// Teardown in progress
    Stopping,
}

/// Externally visible session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Inactive,
    Listening,
    Processing,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Complete mutable state of one recognition session
///
/// Owned by the session loop and stepped exclusively through
/// `machine::step`, which keeps every transition in one place.
pub struct SessionState {
    pub config: SessionConfig,
    pub phase: Phase,
    pub status: Status,
    pub mode: RecognitionMode,
    pub is_listening: bool,
    pub should_stop_after_silence: bool,
    pub has_received_results: bool,
    pub is_speaking: bool,
    pub pending_restart: bool,

    /// Terminal end already surfaced for this run
    pub end_reported: bool,

    /// Millisecond timestamps on the session's monotonic clock
    pub last_speech_ms: u64,
    pub last_timer_reset_ms: u64,
    pub last_start_ms: Option<u64>,

    /// Most recent normalized loudness sample
    pub last_sound_level: f32,

    pub buffer: TranscriptBuffer,
    pub adaptive: AdaptiveSilenceModel,
    pub recovery: RecoveryLadder,

    /// Lifetime counters for stats
    pub fragments_seen: u64,
    pub utterances_finalized: u64,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        let mode = config.recognition.mode;
        let adaptive = AdaptiveSilenceModel::new(&config.timing);
        let recovery = RecoveryLadder::new(&config.timing);
        Self {
            config,
            phase: Phase::Idle,
            status: Status::Inactive,
            mode,
            is_listening: false,
            should_stop_after_silence: mode == RecognitionMode::Transcription,
            has_received_results: false,
            is_speaking: false,
            pending_restart: false,
            end_reported: false,
            last_speech_ms: 0,
            last_timer_reset_ms: 0,
            last_start_ms: None,
            last_sound_level: 0.0,
            buffer: TranscriptBuffer::new(),
            adaptive,
            recovery,
            fragments_seen: 0,
            utterances_finalized: 0,
        }
    }

    pub fn in_transcription_mode(&self) -> bool {
        self.mode == RecognitionMode::Transcription
    }

    /// Rate limit for no-speech/silence timer resets; a burst of engine
    /// events must not thrash timer creation
    pub fn may_reset_timers(&mut self, now_ms: u64) -> bool {
        let min = self.config.timing.min_time_between_timer_resets.as_millis() as u64;
        if now_ms.saturating_sub(self.last_timer_reset_ms) > min || self.last_timer_reset_ms == 0 {
            self.last_timer_reset_ms = now_ms;
            true
        } else {
            false
        }
    }
}
