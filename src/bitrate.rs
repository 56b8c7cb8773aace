//! Sliding-window achieved-bitrate tracking.
//!
//! Grounded on `libavtransport/scheduler.c`'s `AVTSlidingWinCtx`: a ring of
//! `(bytes, timestamp)` samples, evicted once they fall outside the
//! configured window, used to report throughput rather than to control it.

use std::collections::VecDeque;
use std::time::Duration;

/// Tracks bytes sent over a trailing time window to report achieved
/// bitrate, independent of the scheduler's own bandwidth budget.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    samples: VecDeque<(Duration, u64)>,
    total_bytes: u64,
}

impl SlidingWindow {
    /// Creates an empty tracker that retains samples for `window`.
    pub fn new(window: Duration) -> Self {
        SlidingWindow {
            window,
            samples: VecDeque::new(),
            total_bytes: 0,
        }
    }

    /// Records `bytes` sent at `now` (a monotonic timestamp relative to an
    /// arbitrary epoch) and evicts samples that have fallen out of the
    /// window.
    pub fn push(&mut self, now: Duration, bytes: u64) {
        self.samples.push_back((now, bytes));
        self.total_bytes += bytes;
        while let Some(&(t, b)) = self.samples.front() {
            if now.saturating_sub(t) > self.window {
                self.total_bytes -= b;
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Achieved bitrate in bits per second over the current window, or
    /// `None` if no samples have been recorded yet.
    pub fn bitrate_bps(&self) -> Option<f64> {
        let (oldest, _) = self.samples.front()?;
        let (newest, _) = self.samples.back()?;
        let span = newest.saturating_sub(*oldest).as_secs_f64().max(1e-6);
        Some(self.total_bytes as f64 * 8.0 / span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_none_before_any_sample() {
        let w = SlidingWindow::new(Duration::from_secs(1));
        assert_eq!(w.bitrate_bps(), None);
    }

    #[test]
    fn evicts_samples_outside_window() {
        let mut w = SlidingWindow::new(Duration::from_millis(100));
        w.push(Duration::from_millis(0), 1000);
        w.push(Duration::from_millis(50), 1000);
        w.push(Duration::from_millis(500), 1000);
        // The first two samples should have been evicted by the third push.
        assert_eq!(w.total_bytes, 1000);
    }

    #[test]
    fn computes_bits_per_second() {
        let mut w = SlidingWindow::new(Duration::from_secs(10));
        w.push(Duration::from_millis(0), 1250);
        w.push(Duration::from_millis(1000), 1250);
        // 2500 bytes over 1s span == 20000 bits/s.
        assert!((w.bitrate_bps().unwrap() - 20000.0).abs() < 1.0);
    }
}
