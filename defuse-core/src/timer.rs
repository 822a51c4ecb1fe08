//! Countdown timing: real time is accumulated into strike-indexed speed stages and
//! re-weighted on every read.
//!
//! With `S` stages and `T[i]` real milliseconds spent at stage `i`, the weighted elapsed
//! time is `sum(T[i] * S / (S - i))`, clamped to the duration. Stage 0 runs at 1x and the
//! top stage at `S`x.

pub const SPEED_STAGES: usize = 4;

const ONE_SECOND: u64 = 1000;
const ONE_MINUTE: u64 = 60 * ONE_SECOND;
/// Largest minute count that fits the two-digit display field.
const MAX_DISPLAY_MINUTES: u64 = 99;

/// Speed stage for a strike count.
pub fn speed_stage(strikes: u8) -> usize {
    (strikes as usize).min(SPEED_STAGES - 1)
}

/// Weighted elapsed milliseconds for the given per-stage totals, clamped to `duration_ms`.
pub fn weighted_elapsed(stage_ms: &[u64; SPEED_STAGES], duration_ms: u64) -> u64 {
    let stages = SPEED_STAGES as u64;
    let elapsed = stage_ms
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &t)| {
            acc.saturating_add(t.saturating_mul(stages) / (stages - i as u64))
        });
    elapsed.min(duration_ms)
}

#[derive(Debug, Clone)]
pub struct StageTimer {
    duration_ms: u64,
    stage_ms: [u64; SPEED_STAGES],
    last_update: Option<u64>,
}

impl StageTimer {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            stage_ms: [0; SPEED_STAGES],
            last_update: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Capture the reference point; time only accumulates after this.
    pub fn start(&mut self, now: u64) {
        self.last_update = Some(now);
    }

    /// Add real time since the last update to `stage`'s bucket.
    pub fn advance(&mut self, now: u64, stage: usize) {
        let Some(last) = self.last_update else {
            return;
        };
        let stage = stage.min(SPEED_STAGES - 1);
        self.stage_ms[stage] = self.stage_ms[stage].saturating_add(now.saturating_sub(last));
        self.last_update = Some(now.max(last));
    }

    pub fn elapsed_ms(&self) -> u64 {
        weighted_elapsed(&self.stage_ms, self.duration_ms)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms - self.elapsed_ms()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed_ms() >= self.duration_ms
    }

    pub fn stage_ms(&self) -> &[u64; SPEED_STAGES] {
        &self.stage_ms
    }

    /// Zero every bucket and drop the reference point. The duration is kept.
    pub fn clear(&mut self) {
        self.stage_ms = [0; SPEED_STAGES];
        self.last_update = None;
    }

    /// Real milliseconds until the displayed second changes at the current stage.
    pub fn time_to_next_second(&self, stage: usize) -> u64 {
        let stages = SPEED_STAGES as u64;
        let stage = stage.min(SPEED_STAGES - 1) as u64;
        let remaining = ONE_SECOND - (self.elapsed_ms() % ONE_SECOND);
        remaining * (stages - stage) / stages
    }
}

/// `MM:SS`, or `SS.CC` (centiseconds) under a minute when `show_millis` is set.
pub fn format_remaining(remaining_ms: u64, show_millis: bool) -> String {
    let minutes = remaining_ms / ONE_MINUTE;
    if minutes > MAX_DISPLAY_MINUTES {
        return format!("{:02}:{:02}", MAX_DISPLAY_MINUTES, 59);
    }
    let seconds = (remaining_ms % ONE_MINUTE) / ONE_SECOND;
    let centis = (remaining_ms % ONE_SECOND) / 10;
    if minutes == 0 && show_millis {
        format!("{:02}.{:02}", seconds, centis)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
