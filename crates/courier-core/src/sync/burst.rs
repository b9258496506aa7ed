//! Burst pacing across passes to one destination

use std::time::Duration;

use tokio::time::Instant;

/// Counts successful sends and owes a pause after every burst.
#[derive(Debug)]
pub struct BurstTracker {
    burst_size: u32,
    cooldown: Duration,
    count: u32,
    resume_at: Option<Instant>,
}

impl BurstTracker {
    #[must_use]
    pub const fn new(burst_size: u32, cooldown: Duration) -> Self {
        Self {
            burst_size,
            cooldown,
            count: 0,
            resume_at: None,
        }
    }

    /// Count a success. Returns `true` when it completed a burst.
    pub fn record_success(&mut self, now: Instant) -> bool {
        if self.burst_size == 0 {
            return false;
        }
        self.count += 1;
        if self.count < self.burst_size {
            return false;
        }
        self.count = 0;
        self.resume_at = Some(now + self.cooldown);
        true
    }

    /// Pause still owed before the next send, if any.
    #[must_use]
    pub fn pending_pause(&self, now: Instant) -> Option<Duration> {
        self.resume_at
            .map(|resume_at| resume_at.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Forget a pause that has been honoured.
    pub fn clear_pause(&mut self) {
        self.resume_at = None;
    }

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn owes_pause_after_each_burst() {
        let mut burst = BurstTracker::new(2, Duration::from_secs(25));
        let now = Instant::now();

        assert!(!burst.record_success(now));
        assert_eq!(burst.pending_pause(now), None);

        assert!(burst.record_success(now));
        assert_eq!(burst.count(), 0);
        assert_eq!(burst.pending_pause(now), Some(Duration::from_secs(25)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(
            burst.pending_pause(Instant::now()),
            Some(Duration::from_secs(15))
        );

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(burst.pending_pause(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_burst_size_never_pauses() {
        let mut burst = BurstTracker::new(0, Duration::from_secs(25));
        for _ in 0..100 {
            assert!(!burst.record_success(Instant::now()));
        }
        assert_eq!(burst.pending_pause(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_pause_drops_owed_pause() {
        let mut burst = BurstTracker::new(1, Duration::from_secs(5));
        burst.record_success(Instant::now());
        burst.clear_pause();
        assert_eq!(burst.pending_pause(Instant::now()), None);
    }
}
