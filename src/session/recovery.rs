use crate::config::TimingConfig;
use std::time::Duration;
use tracing::debug;

/// What the recovery ladder wants done about a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Recreate and restart the engine after this delay; `attempt` is
    /// 1-based within the current episode
    RestartAfter { delay: Duration, attempt: u32 },
    /// Attempts exhausted; give up and surface a terminal error
    GiveUp,
}

/// Bounded restart-with-backoff ladder for engine failures
///
/// One ladder covers both unexpected engine terminations and error
/// events. Attempts within an episode back off geometrically; an
/// error-free cooldown window closes the episode and resets the counter.
#[derive(Debug, Clone)]
pub struct RecoveryLadder {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
    cooldown: Duration,
    last_failure_ms: Option<u64>,
}

impl RecoveryLadder {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: timing.max_recovery_attempts,
            base_delay: timing.restart_delay,
            backoff_factor: timing.recovery_backoff_factor,
            cooldown: timing.recovery_cooldown,
            last_failure_ms: None,
        }
    }

    /// Register a failure at `now_ms` and decide what to do about it
    pub fn on_failure(&mut self, now_ms: u64) -> RecoveryDecision {
        if let Some(last) = self.last_failure_ms {
            if now_ms.saturating_sub(last) > self.cooldown.as_millis() as u64 {
                debug!("Recovery cooldown elapsed, resetting attempt counter");
                self.attempts = 0;
            }
        }
        self.last_failure_ms = Some(now_ms);

        if self.attempts >= self.max_attempts {
            return RecoveryDecision::GiveUp;
        }

        self.attempts += 1;
        let delay_ms = self.base_delay.as_millis() as f64
            * self.backoff_factor.powi(self.attempts as i32 - 1);
        RecoveryDecision::RestartAfter {
            delay: Duration::from_millis(delay_ms as u64),
            attempt: self.attempts,
        }
    }

    /// Attempts used in the current episode
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// First failure of a fresh episode; used to report errors upward
    /// exactly once per episode
    pub fn episode_started(&self) -> bool {
        self.attempts == 1
    }

    /// Close the episode (explicit restart or clean stop)
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_failure_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> RecoveryLadder {
        RecoveryLadder::new(&TimingConfig::default())
    }

    #[test]
    fn backoff_grows_geometrically() {
        let mut l = ladder();
        let mut delays = Vec::new();
        for i in 0..5 {
            match l.on_failure(i * 100) {
                RecoveryDecision::RestartAfter { delay, attempt } => {
                    assert_eq!(attempt, i as u32 + 1);
                    delays.push(delay.as_millis());
                }
                RecoveryDecision::GiveUp => panic!("gave up too early"),
            }
        }
        assert_eq!(delays, vec![500, 750, 1125, 1687, 2531]);
    }

    #[test]
    fn sixth_failure_gives_up() {
        let mut l = ladder();
        for i in 0..5 {
            assert!(matches!(l.on_failure(i * 100), RecoveryDecision::RestartAfter { .. }));
        }
        assert_eq!(l.on_failure(600), RecoveryDecision::GiveUp);
        // And stays exhausted within the episode
        assert_eq!(l.on_failure(700), RecoveryDecision::GiveUp);
    }

    #[test]
    fn cooldown_resets_the_episode() {
        let mut l = ladder();
        for i in 0..5 {
            l.on_failure(i * 100);
        }
        // 61 seconds later the counter starts over
        match l.on_failure(500 + 61_000) {
            RecoveryDecision::RestartAfter { delay, attempt } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(500));
            }
            RecoveryDecision::GiveUp => panic!("cooldown should have reset attempts"),
        }
    }

    #[test]
    fn episode_started_only_on_first_attempt() {
        let mut l = ladder();
        l.on_failure(0);
        assert!(l.episode_started());
        l.on_failure(100);
        assert!(!l.episode_started());
    }
}
