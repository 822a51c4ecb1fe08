//! Retry scheduler: rate-limits periodic broadcasts and resends of un-acknowledged commands.
//! Firing is unconditional once due; the scheduler knows nothing about the action's success.

use std::time::Duration;

/// Outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    Fired,
    Skipped,
}

impl Firing {
    pub fn fired(self) -> bool {
        self == Firing::Fired
    }
}

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    interval_ms: u64,
    last_fired: Option<u64>,
}

impl RetryScheduler {
    /// A scheduler that has never fired is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self::from_millis(crate::clock::millis(interval))
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_due(&self, now: u64) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Record a firing at `now` if due. Callers that need `&mut self` in the action
    /// use this instead of `run`.
    pub fn poll(&mut self, now: u64) -> Firing {
        if !self.is_due(now) {
            return Firing::Skipped;
        }
        self.last_fired = Some(now);
        Firing::Fired
    }

    /// Execute `action` if due and record the firing time.
    pub fn run<F: FnOnce()>(&mut self, now: u64, action: F) -> Firing {
        let firing = self.poll(now);
        if firing.fired() {
            action();
        }
        firing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_invocation_fires() {
        let mut s = RetryScheduler::from_millis(50);
        let mut count = 0;
        assert_eq!(s.run(0, || count += 1), Firing::Fired);
        assert_eq!(count, 1);
    }

    #[test]
    fn skips_until_interval_elapsed() {
        let mut s = RetryScheduler::new(Duration::from_millis(50));
        let mut count = 0;
        s.run(1000, || count += 1);
        assert_eq!(s.run(1010, || count += 1), Firing::Skipped);
        assert_eq!(s.run(1049, || count += 1), Firing::Skipped);
        assert_eq!(s.run(1050, || count += 1), Firing::Fired);
        assert_eq!(count, 2);
    }

    #[test]
    fn interval_counts_from_last_firing_not_last_call() {
        let mut s = RetryScheduler::from_millis(100);
        assert!(s.poll(0).fired());
        assert!(!s.poll(60).fired());
        assert!(!s.poll(99).fired());
        assert!(s.poll(130).fired());
        assert!(!s.poll(200).fired());
        assert!(s.poll(230).fired());
    }

    #[test]
    fn at_most_once_per_interval_over_dense_calls() {
        let mut s = RetryScheduler::from_millis(50);
        let fired = (0..1000u64).filter(|&t| s.poll(t).fired()).count();
        assert_eq!(fired, 20);
    }

    #[test]
    fn oversized_interval_saturates() {
        let mut s = RetryScheduler::new(Duration::MAX);
        assert_eq!(s.interval_ms(), u64::MAX);
        assert!(s.poll(0).fired());
        assert!(!s.poll(u64::MAX).fired());
    }
}
