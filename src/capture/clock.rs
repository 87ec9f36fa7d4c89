use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClockStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl Default for ClockStatus {
    fn default() -> Self {
        ClockStatus::Idle
    }
}

/// Elapsed recording time, derived from instants rather than tick counts so a
/// late or skipped tick never loses time.
#[derive(Debug, Clone, Default)]
pub struct RecordingClock {
    pub status: ClockStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Time accumulated from earlier running windows; combines with
    /// `running_anchor` to compute the true recorded duration.
    accumulated_ms: u64,
    running_anchor: Option<Instant>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a brand-new recording; the previous total is discarded.
    pub fn begin(&mut self, started_at: DateTime<Utc>, now: Instant) {
        *self = Self {
            status: ClockStatus::Running,
            started_at: Some(started_at),
            accumulated_ms: 0,
            running_anchor: Some(now),
        };
    }

    pub fn pause(&mut self, now: Instant) -> bool {
        if self.status != ClockStatus::Running {
            return false;
        }
        self.fold_running_window(now);
        self.status = ClockStatus::Paused;
        true
    }

    pub fn resume(&mut self, now: Instant) -> bool {
        if self.status != ClockStatus::Paused {
            return false;
        }
        self.status = ClockStatus::Running;
        self.running_anchor = Some(now);
        true
    }

    pub fn stop(&mut self, now: Instant) {
        if self.status == ClockStatus::Running {
            self.fold_running_window(now);
        }
        if self.status != ClockStatus::Idle {
            self.status = ClockStatus::Stopped;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        match (self.status, self.running_anchor) {
            (ClockStatus::Running, Some(anchor)) => self
                .accumulated_ms
                .saturating_add(now.saturating_duration_since(anchor).as_millis() as u64),
            _ => self.accumulated_ms,
        }
    }

    /// Whole seconds, truncated once over the total rather than per window.
    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.elapsed_ms(now) / 1_000
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == ClockStatus::Paused
    }

    fn fold_running_window(&mut self, now: Instant) {
        if let Some(anchor) = self.running_anchor.take() {
            self.accumulated_ms = self
                .accumulated_ms
                .saturating_add(now.saturating_duration_since(anchor).as_millis() as u64);
        }
    }
}
