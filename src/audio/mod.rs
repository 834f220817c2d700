//! Microphone loudness monitoring
//!
//! Samples the capture device into normalized 0-100 loudness values and
//! keeps a short rolling history for adaptive silence judgments.

pub mod capture;
pub mod level;

pub use capture::{
    NullSoundLevelProvider, SoundLevelBackend, SoundLevelProvider, SyntheticLevelBackend,
    SyntheticLevelProvider,
};
pub use level::{SoundLevelMonitor, SoundLevelSample};
