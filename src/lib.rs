//! Continuous speech-recognition session management
//!
//! Wraps a streaming speech-to-text capability in a mode-aware session:
//! adaptive silence detection decides when an utterance is done, bounded
//! recovery survives engine failures, and finalized transcripts reach the
//! caller through replaceable callbacks.

pub mod audio;
pub mod config;
pub mod engine;
pub mod session;
pub mod timing;
pub mod transcript;

pub use audio::{
    NullSoundLevelProvider, SoundLevelBackend, SoundLevelMonitor, SoundLevelProvider,
    SoundLevelSample, SyntheticLevelProvider,
};
pub use config::{RecognitionMode, RecognitionOptions, SessionConfig, SoundConfig, TimingConfig};
pub use engine::{
    EngineAdapter, EngineEvent, EngineEventSink, ErrorCode, Fragment, RecognitionBackend,
    RecognitionProvider, ScriptStep, ScriptedProvider,
};
pub use session::{SessionCallbacks, SessionStats, SpeechSession, Status};
pub use timing::AdaptiveSilenceModel;
pub use transcript::TranscriptBuffer;
