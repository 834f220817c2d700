use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operating mode for a recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Each finalized fragment is dispatched immediately as its own utterance
    Realtime,
    /// Fragments accumulate into one utterance until silence finalizes it
    Transcription,
}

impl Default for RecognitionMode {
    fn default() -> Self {
        Self::Transcription
    }
}

/// Options forwarded to the underlying recognition engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionOptions {
    /// BCP-47 language tag (e.g. "en-US", "pt-BR")
    pub language: String,

    /// Keep recognizing across utterance boundaries
    pub continuous: bool,

    /// Deliver interim (non-final) fragments
    pub interim_results: bool,

    /// Number of alternative hypotheses requested per fragment
    pub max_alternatives: u32,

    /// How long without any speech before the no-speech path fires
    pub no_speech_timeout: Duration,

    /// Session operating mode
    pub mode: RecognitionMode,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
            no_speech_timeout: Duration::from_secs(10),
            mode: RecognitionMode::Transcription,
        }
    }
}

/// Timer durations and recovery limits for a session
///
/// Defaults reflect observed conversational pacing: silence thresholds adapt
/// between `min_silence_threshold` and `max_silence_threshold`, and all
/// restart machinery is bounded so a misbehaving engine cannot loop forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Starting value for the adaptive silence threshold
    pub initial_silence_threshold: Duration,

    /// Lower bound for the adaptive silence threshold
    pub min_silence_threshold: Duration,

    /// Upper bound for the adaptive silence threshold
    pub max_silence_threshold: Duration,

    /// Blend factor when folding a new threshold target into the current one
    pub silence_smoothing_factor: f64,

    /// Fixed debounce added on top of the adaptive threshold when arming
    /// the silence timer, to absorb sound-level jitter
    pub silence_debounce: Duration,

    /// Quiet window after a final fragment before the utterance is finalized
    pub sentence_completion_delay: Duration,

    /// Grace period between silence detection and the actual stop, during
    /// which fresh speech cancels the pending stop
    pub pending_stop_grace: Duration,

    /// Hard ceiling on listening time in transcription mode
    pub max_listening_time: Duration,

    /// Rate-limit window between engine start attempts
    pub min_time_between_restarts: Duration,

    /// Rate-limit window between no-speech/silence timer resets
    pub min_time_between_timer_resets: Duration,

    /// Base delay before the first recovery restart
    pub restart_delay: Duration,

    /// Multiplier applied to the restart delay per recovery attempt
    pub recovery_backoff_factor: f64,

    /// Recovery attempts allowed per error episode
    pub max_recovery_attempts: u32,

    /// Error-free window after which the recovery attempt counter resets
    pub recovery_cooldown: Duration,

    /// Delay between stop and restart when the mode changes mid-session
    pub mode_change_restart_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_silence_threshold: Duration::from_secs(8),
            min_silence_threshold: Duration::from_secs(3),
            max_silence_threshold: Duration::from_secs(12),
            silence_smoothing_factor: 0.2,
            silence_debounce: Duration::from_secs(3),
            sentence_completion_delay: Duration::from_millis(2500),
            pending_stop_grace: Duration::from_secs(2),
            max_listening_time: Duration::from_secs(60),
            min_time_between_restarts: Duration::from_secs(1),
            min_time_between_timer_resets: Duration::from_secs(1),
            restart_delay: Duration::from_millis(500),
            recovery_backoff_factor: 1.5,
            max_recovery_attempts: 5,
            recovery_cooldown: Duration::from_secs(60),
            mode_change_restart_delay: Duration::from_millis(300),
        }
    }
}

/// Microphone sound-level sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Loudness (0-100) above which the input counts as sound
    pub sound_threshold: f32,

    /// Multiplier on `sound_threshold` for the "still speaking" veto that
    /// can cancel a pending finalize
    pub still_speaking_factor: f32,

    /// Interval between loudness samples
    pub sample_interval: Duration,

    /// Ring-buffer capacity for the sound-level history
    pub history_size: usize,

    /// Consecutive below-threshold samples before the monitor reports
    /// sustained silence
    pub consecutive_low_threshold: u32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            sound_threshold: 15.0,
            still_speaking_factor: 1.2,
            sample_interval: Duration::from_millis(100),
            history_size: 50,
            consecutive_low_threshold: 5,
        }
    }
}

/// Complete configuration for one recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    pub recognition: RecognitionOptions,
    pub timing: TimingConfig,
    pub sound: SoundConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            recognition: RecognitionOptions::default(),
            timing: TimingConfig::default(),
            sound: SoundConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a file, falling back to defaults for any
    /// fields the file does not set
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_transcription() {
        assert_eq!(RecognitionOptions::default().mode, RecognitionMode::Transcription);
    }

    #[test]
    fn default_thresholds_are_ordered() {
        let timing = TimingConfig::default();
        assert!(timing.min_silence_threshold <= timing.initial_silence_threshold);
        assert!(timing.initial_silence_threshold <= timing.max_silence_threshold);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionConfig::default();
        let b = SessionConfig::default();
        assert_ne!(a.session_id, b.session_id);
    }
}
