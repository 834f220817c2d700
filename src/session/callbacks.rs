use crate::engine::ErrorCode;
use std::fmt;
use std::sync::Arc;

type VoidCb = Arc<dyn Fn() + Send + Sync>;
type TextCb = Arc<dyn Fn(&str) + Send + Sync>;
type ResultCb = Arc<dyn Fn(&str, bool) + Send + Sync>;
type ErrorCb = Arc<dyn Fn(&ErrorCode) + Send + Sync>;
type LevelCb = Arc<dyn Fn(f32) + Send + Sync>;

/// Callback registrations for session events
///
/// All slots are optional and individually replaceable: `merge` overlays
/// only the slots the incoming set actually fills, so a caller can swap
/// one handler without disturbing the rest.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    /// Transcript text, final flag
    pub on_result: Option<ResultCb>,
    pub on_start: Option<VoidCb>,
    pub on_end: Option<VoidCb>,
    pub on_error: Option<ErrorCb>,
    /// Normalized 0-100 loudness
    pub on_sound_level: Option<LevelCb>,
    pub on_no_speech: Option<VoidCb>,
    pub on_silence: Option<VoidCb>,
    /// The finished utterance, emitted exactly once per finalize
    pub on_finalize_transcript: Option<TextCb>,
    pub on_speech_start: Option<VoidCb>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `other` onto `self`, slot by slot
    pub fn merge(&mut self, other: SessionCallbacks) {
        if other.on_result.is_some() {
            self.on_result = other.on_result;
        }
        if other.on_start.is_some() {
            self.on_start = other.on_start;
        }
        if other.on_end.is_some() {
            self.on_end = other.on_end;
        }
        if other.on_error.is_some() {
            self.on_error = other.on_error;
        }
        if other.on_sound_level.is_some() {
            self.on_sound_level = other.on_sound_level;
        }
        if other.on_no_speech.is_some() {
            self.on_no_speech = other.on_no_speech;
        }
        if other.on_silence.is_some() {
            self.on_silence = other.on_silence;
        }
        if other.on_finalize_transcript.is_some() {
            self.on_finalize_transcript = other.on_finalize_transcript;
        }
        if other.on_speech_start.is_some() {
            self.on_speech_start = other.on_speech_start;
        }
    }

    // Builder-style setters

    pub fn on_result(mut self, f: impl Fn(&str, bool) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(f));
        self
    }

    pub fn on_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ErrorCode) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_sound_level(mut self, f: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_sound_level = Some(Arc::new(f));
        self
    }

    pub fn on_no_speech(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_no_speech = Some(Arc::new(f));
        self
    }

    pub fn on_silence(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_silence = Some(Arc::new(f));
        self
    }

    pub fn on_finalize_transcript(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_finalize_transcript = Some(Arc::new(f));
        self
    }

    pub fn on_speech_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_speech_start = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_result", &self.on_result.is_some())
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_sound_level", &self.on_sound_level.is_some())
            .field("on_no_speech", &self.on_no_speech.is_some())
            .field("on_silence", &self.on_silence.is_some())
            .field("on_finalize_transcript", &self.on_finalize_transcript.is_some())
            .field("on_speech_start", &self.on_speech_start.is_some())
            .finish()
    }
}
