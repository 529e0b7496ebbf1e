//! Poll timing and health metrics
//!
//! Tracks tick durations, skip/drop counters, and poll rate for the
//! engine worker. Latency statistics are computed over a rolling window
//! of recent ticks so a long session does not flatten the numbers.

use crate::types::MetricsSnapshot;
use std::collections::VecDeque;
use std::time::Instant;

/// Number of recent ticks kept for windowed statistics
pub const RECENT_WINDOW_SIZE: usize = 100;

/// Statistics for polling operations
///
/// Tracks tick timing, skipped ticks, dropped batches, and per-sample
/// failures for the poll worker.
#[derive(Debug, Clone)]
pub struct PollMetrics {
    /// Total number of completed ticks
    pub total_polls: u64,
    /// Ticks skipped because the previous tick overran its slot
    pub skipped_polls: u64,
    /// Tick batches dropped due to dispatch backpressure
    pub dropped_batches: u64,
    /// Total per-sample resolution failures
    pub failed_samples: u64,
    /// Duration of the most recent tick in microseconds
    pub last_poll_us: u64,
    /// Rolling window of recent tick durations
    recent_poll_times: VecDeque<u64>,
    /// Completion instants of recent ticks for rate calculation
    recent_ticks: VecDeque<Instant>,
}

impl Default for PollMetrics {
    fn default() -> Self {
        Self {
            total_polls: 0,
            skipped_polls: 0,
            dropped_batches: 0,
            failed_samples: 0,
            last_poll_us: 0,
            recent_poll_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
            recent_ticks: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl PollMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick and its duration
    pub fn record_tick(&mut self, duration_us: u64) {
        self.total_polls += 1;
        self.last_poll_us = duration_us;

        self.recent_poll_times.push_back(duration_us);
        if self.recent_poll_times.len() > RECENT_WINDOW_SIZE {
            self.recent_poll_times.pop_front();
        }

        self.recent_ticks.push_back(Instant::now());
        if self.recent_ticks.len() > RECENT_WINDOW_SIZE {
            self.recent_ticks.pop_front();
        }
    }

    /// Record a tick skipped because the worker overran its slot
    pub fn record_skip(&mut self, count: u64) {
        self.skipped_polls += count;
    }

    /// Record a batch dropped because the dispatch channel was full
    pub fn record_drop(&mut self) {
        self.dropped_batches += 1;
    }

    /// Record per-sample resolution failures from one tick
    pub fn record_failed_samples(&mut self, count: u64) {
        self.failed_samples += count;
    }

    /// Average tick duration over the window in microseconds
    pub fn avg_poll_us(&self) -> f64 {
        if self.recent_poll_times.is_empty() {
            return 0.0;
        }
        self.recent_poll_times.iter().sum::<u64>() as f64 / self.recent_poll_times.len() as f64
    }

    /// Minimum tick duration in the window in microseconds
    pub fn min_poll_us(&self) -> u64 {
        self.recent_poll_times.iter().min().copied().unwrap_or(0)
    }

    /// Maximum tick duration in the window in microseconds
    pub fn max_poll_us(&self) -> u64 {
        self.recent_poll_times.iter().max().copied().unwrap_or(0)
    }

    /// Tick duration jitter (max - min) over the window in microseconds
    pub fn jitter_us(&self) -> u64 {
        self.max_poll_us().saturating_sub(self.min_poll_us())
    }

    /// Completed ticks per second over the window
    pub fn polls_per_second(&self) -> f64 {
        if self.recent_ticks.len() < 2 {
            return 0.0;
        }
        let span = self.recent_ticks[self.recent_ticks.len() - 1]
            .duration_since(self.recent_ticks[0])
            .as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.recent_ticks.len() - 1) as f64 / span
    }

    /// Capture a wall-clock stamped snapshot of the current state
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            captured_at: chrono::Local::now(),
            polls_per_second: self.polls_per_second(),
            skipped_polls: self.skipped_polls,
            dropped_batches: self.dropped_batches,
            last_poll_us: self.last_poll_us,
            avg_poll_us: self.avg_poll_us(),
            min_poll_us: self.min_poll_us(),
            max_poll_us: self.max_poll_us(),
            jitter_us: self.jitter_us(),
            total_polls: self.total_polls,
            failed_samples: self.failed_samples,
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
