//! Adaptive silence threshold
//!
//! Tracks a weighted average of how long the user's sentences take and
//! derives a silence cutoff from it: slow, deliberate speakers get more
//! room before the session decides they are done.

use crate::config::TimingConfig;
use std::time::Duration;

/// Running model of the user's sentence pacing
#[derive(Debug, Clone)]
pub struct AdaptiveSilenceModel {
    average_sentence_ms: f64,
    sentence_count: u32,
    threshold_ms: f64,
    last_sentence_end_ms: Option<u64>,
    min_ms: f64,
    max_ms: f64,
    smoothing: f64,
    initial_ms: f64,
}

impl AdaptiveSilenceModel {
    pub fn new(timing: &TimingConfig) -> Self {
        let initial_ms = timing.initial_silence_threshold.as_millis() as f64;
        Self {
            average_sentence_ms: 0.0,
            sentence_count: 0,
            threshold_ms: initial_ms,
            last_sentence_end_ms: None,
            min_ms: timing.min_silence_threshold.as_millis() as f64,
            max_ms: timing.max_silence_threshold.as_millis() as f64,
            smoothing: timing.silence_smoothing_factor,
            initial_ms,
        }
    }

    /// Fold one observed sentence boundary into the model
    ///
    /// `now_ms` is the arrival time of a finalized fragment. The first
    /// boundary only anchors `last_sentence_end`; adaptation starts with
    /// the second.
    pub fn record_sentence_end(&mut self, now_ms: u64) {
        if let Some(last_end) = self.last_sentence_end_ms {
            let duration = now_ms.saturating_sub(last_end) as f64;

            if self.sentence_count == 0 {
                self.average_sentence_ms = duration;
            } else {
                self.average_sentence_ms = (self.average_sentence_ms
                    * self.sentence_count as f64
                    + duration)
                    / (self.sentence_count + 1) as f64;
            }
            self.sentence_count += 1;

            // Target half the average sentence duration, clamped, then
            // blend rather than replace so one outlier cannot whiplash
            // the threshold
            let target = (self.average_sentence_ms * 0.5).clamp(self.min_ms, self.max_ms);
            self.threshold_ms =
                self.threshold_ms * (1.0 - self.smoothing) + target * self.smoothing;
            self.threshold_ms = self.threshold_ms.clamp(self.min_ms, self.max_ms);
        }

        self.last_sentence_end_ms = Some(now_ms);
    }

    /// Current silence cutoff
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms as u64)
    }

    pub fn average_sentence_duration(&self) -> Duration {
        Duration::from_millis(self.average_sentence_ms as u64)
    }

    pub fn sentence_count(&self) -> u32 {
        self.sentence_count
    }

    /// Forget everything learned this session
    pub fn reset(&mut self) {
        self.average_sentence_ms = 0.0;
        self.sentence_count = 0;
        self.threshold_ms = self.initial_ms;
        self.last_sentence_end_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> AdaptiveSilenceModel {
        AdaptiveSilenceModel::new(&TimingConfig::default())
    }

    #[test]
    fn starts_at_initial_threshold() {
        assert_eq!(model().threshold(), Duration::from_secs(8));
    }

    #[test]
    fn first_boundary_only_anchors() {
        let mut m = model();
        m.record_sentence_end(1_000);
        assert_eq!(m.sentence_count(), 0);
        assert_eq!(m.threshold(), Duration::from_secs(8));
    }

    #[test]
    fn threshold_stays_within_bounds_for_any_durations() {
        let timing = TimingConfig::default();
        let min = timing.min_silence_threshold;
        let max = timing.max_silence_threshold;

        for durations in [
            vec![0u64, 0, 0, 0],
            vec![100_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000],
            vec![0, 100_000, 0, 100_000, 5_000],
        ] {
            let mut m = model();
            let mut now = 0u64;
            m.record_sentence_end(now);
            for d in durations {
                now += d;
                m.record_sentence_end(now);
                let t = m.threshold();
                assert!(t >= min && t <= max, "threshold {t:?} escaped [{min:?}, {max:?}]");
            }
        }
    }

    #[test]
    fn one_outlier_does_not_whiplash_the_threshold() {
        let mut m = model();
        m.record_sentence_end(0);
        m.record_sentence_end(100_000); // 100s outlier

        // Target clamps at 12s; blended at 0.2 from 8s gives 8.8s
        let t = m.threshold().as_millis();
        assert!(t < 9_000, "threshold jumped too far: {t}ms");
        assert!(t > 8_000, "threshold should have moved up: {t}ms");
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut m = model();
        m.record_sentence_end(0);
        m.record_sentence_end(4_000);
        m.reset();
        assert_eq!(m.threshold(), Duration::from_secs(8));
        assert_eq!(m.sentence_count(), 0);
    }
}
