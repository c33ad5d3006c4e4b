//! Sleep-based frame rate cap.
//!
//! [`FramePacer::pace`] is called once per frame, before the frame ring
//! waits on its fence. It sleeps for whatever remains of the frame interval
//! since the previous call.

use std::time::{Duration, Instant};

use tracing::debug;

/// Throttles frame submission toward a target rate.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FramePacer {
    /// `None` disables pacing.
    pub fn new(target_fps: Option<u32>) -> Self {
        Self {
            interval: interval_for(target_fps),
            last: None,
        }
    }

    pub fn set_target_fps(&mut self, target_fps: Option<u32>) {
        self.interval = interval_for(target_fps);
        debug!("Frame pacing interval set to {:?}", self.interval);
    }

    #[inline]
    pub fn frame_interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Sleep out the rest of the current frame interval. Returns the time
    /// slept.
    pub fn pace(&mut self) -> Duration {
        let Some(interval) = self.interval else {
            self.last = Some(Instant::now());
            return Duration::ZERO;
        };

        let slept = match self.last {
            Some(last) => {
                let wait = remaining(interval, last.elapsed());
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                wait
            }
            None => Duration::ZERO,
        };
        self.last = Some(Instant::now());
        slept
    }
}

fn interval_for(target_fps: Option<u32>) -> Option<Duration> {
    target_fps
        .filter(|&fps| fps > 0)
        .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
}

/// Time left in `interval` after `elapsed`.
pub fn remaining(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
