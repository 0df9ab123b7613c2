//! Playback schedule bookkeeping

use std::time::Duration;

use tokio::time::Instant;

/// Delay from an entry's start until the handoff to the next entry
///
/// `duration - lead`, clamped to zero.
pub fn swap_delay(duration: Duration, lead: Duration) -> Duration {
    duration.saturating_sub(lead)
}

/// Tracks when the active entry started and when the next one is due
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    last_start: Option<Instant>,
    next_start: Option<Instant>,
    started: u64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed start and return the swap delay to wait
    pub fn record_start(&mut self, at: Instant, duration: Duration, lead: Duration) -> Duration {
        let delay = swap_delay(duration, lead);
        self.last_start = Some(at);
        self.next_start = Some(at + delay);
        self.started += 1;
        delay
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.last_start
    }

    /// When the next entry is scheduled to begin
    pub fn next_start(&self) -> Option<Instant> {
        self.next_start
    }

    /// Entries started since the last reset
    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
