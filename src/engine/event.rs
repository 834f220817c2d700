use serde::{Deserialize, Serialize};
use std::fmt;

/// A single piece of recognized text delivered by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Recognized text
    pub text: String,

    /// Whether the engine considers this fragment stable
    pub is_final: bool,

    /// Confidence score (0.0 to 1.0), if the engine provides one
    pub confidence: Option<f32>,
}

impl Fragment {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_final: true, confidence: None }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_final: false, confidence: None }
    }
}

/// Error codes surfaced by the engine or the session itself
///
/// `NoSpeech` is a normal silence condition and is never routed to the
/// generic error callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The engine heard nothing within its own timeout window
    NoSpeech,
    /// Microphone or audio-capture failure
    AudioCapture,
    /// The user or platform denied microphone access
    NotAllowed,
    /// Network-backed recognition failed to reach its service
    Network,
    /// The engine aborted the current recognition
    Aborted,
    /// No recognition capability exists on this host
    RecognitionUnavailable,
    /// No audio-capture capability exists on this host
    AudioUnavailable,
    /// Automatic recovery gave up after exhausting its attempts
    RecoveryExhausted,
    /// Anything the engine reports that has no dedicated code
    Other(String),
}

impl ErrorCode {
    /// Expected-silence condition, not a failure
    pub fn is_no_speech(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }

    /// Retrying cannot succeed for these; surface once and give up
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RecognitionUnavailable | Self::AudioUnavailable | Self::RecoveryExhausted
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Network => write!(f, "network"),
            Self::Aborted => write!(f, "aborted"),
            Self::RecognitionUnavailable => write!(f, "recognition-unavailable"),
            Self::AudioUnavailable => write!(f, "audio-unavailable"),
            Self::RecoveryExhausted => write!(f, "recovery-exhausted"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Uniform event surface emitted by every recognition backend
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine began listening
    Started,
    /// The engine stopped, expectedly or not
    Ended,
    /// The engine reported an error
    Error(ErrorCode),
    /// One or more recognized fragments arrived
    Result(Vec<Fragment>),
    /// The engine detected the start of vocalization
    SpeechStart,
    /// The engine detected the end of vocalization
    SpeechEnd,
    /// Sound was recognized but produced no hypothesis
    NoMatch,
}
