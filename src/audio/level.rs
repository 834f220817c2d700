use crate::config::SoundConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A timestamped, normalized 0-100 loudness value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundLevelSample {
    /// Loudness, clamped to 0-100
    pub level: f32,

    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

impl SoundLevelSample {
    pub fn new(level: f32) -> Self {
        Self { level: level.clamp(0.0, 100.0), timestamp: Utc::now() }
    }
}

/// Rolling view over recent microphone loudness
///
/// The history is diagnostics and corroborating evidence only; the
/// engine's own speech-boundary events stay authoritative for finalize
/// decisions.
#[derive(Debug)]
pub struct SoundLevelMonitor {
    config: SoundConfig,
    history: VecDeque<f32>,
    last_level: f32,
    consecutive_low: u32,
}

impl SoundLevelMonitor {
    pub fn new(config: SoundConfig) -> Self {
        let capacity = config.history_size;
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
            last_level: 0.0,
            consecutive_low: 0,
        }
    }

    /// Record one sample, returning the clamped level
    pub fn push(&mut self, level: f32) -> f32 {
        let level = level.clamp(0.0, 100.0);
        self.last_level = level;

        self.history.push_back(level);
        while self.history.len() > self.config.history_size {
            self.history.pop_front();
        }

        if level < self.config.sound_threshold {
            self.consecutive_low = self.consecutive_low.saturating_add(1);
        } else {
            self.consecutive_low = 0;
        }

        level
    }

    /// Most recent loudness sample
    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    /// Mean of the retained history
    pub fn average_level(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }

    /// Whether the last sample counts as sound
    pub fn is_loud(&self) -> bool {
        self.last_level > self.config.sound_threshold
    }

    /// Enough consecutive quiet samples to call the input silent
    pub fn sustained_silence(&self) -> bool {
        self.consecutive_low >= self.config.consecutive_low_threshold
    }

    /// Drop all retained samples
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_level = 0.0;
        self.consecutive_low = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SoundLevelMonitor {
        SoundLevelMonitor::new(SoundConfig::default())
    }

    #[test]
    fn levels_are_clamped_to_percent_range() {
        let mut m = monitor();
        assert_eq!(m.push(250.0), 100.0);
        assert_eq!(m.push(-5.0), 0.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut m = monitor();
        for i in 0..200 {
            m.push(i as f32 % 100.0);
        }
        assert!(m.history.len() <= SoundConfig::default().history_size);
    }

    #[test]
    fn sustained_silence_needs_consecutive_low_samples() {
        let mut m = monitor();
        for _ in 0..4 {
            m.push(2.0);
        }
        assert!(!m.sustained_silence());
        m.push(2.0);
        assert!(m.sustained_silence());

        // One loud sample resets the run
        m.push(60.0);
        assert!(!m.sustained_silence());
        assert!(m.is_loud());
    }

    #[test]
    fn reset_clears_state() {
        let mut m = monitor();
        m.push(80.0);
        m.reset();
        assert_eq!(m.last_level(), 0.0);
        assert_eq!(m.average_level(), 0.0);
    }
}
