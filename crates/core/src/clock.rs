//! Frame clock for the render loop.

use std::time::{Duration, Instant};

/// Snapshot produced by [`FrameClock::tick`].
#[derive(Debug, Clone, Copy)]
pub struct FrameTime {
    /// Seconds since the clock started. This is the value handed to the
    /// renderer as the shader time.
    pub elapsed: f32,
    /// Clamped seconds since the previous tick.
    pub delta: f32,
    /// Number of ticks before this one.
    pub frame_index: u64,
}

/// Monotonic clock producing per-frame timing.
///
/// Delta time is clamped so that a debugger pause or a long minimize does
/// not produce a huge step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    min_delta: Duration,
    max_delta: Duration,
    smoothed_fps: f32,
}

impl FrameClock {
    /// Smoothing factor for the exponential FPS average.
    const FPS_SMOOTHING: f32 = 0.1;

    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(min_delta: Duration, max_delta: Duration) -> Self {
        debug_assert!(min_delta <= max_delta);
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
            min_delta,
            max_delta,
            smoothed_fps: 0.0,
        }
    }

    /// Seconds since the clock was created or last reset.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Advance the clock by one frame.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let delta = now
            .saturating_duration_since(self.last)
            .clamp(self.min_delta, self.max_delta);
        self.last = now;

        let delta = delta.as_secs_f32();
        let instant_fps = 1.0 / delta;
        self.smoothed_fps = if self.frame_index == 0 {
            instant_fps
        } else {
            self.smoothed_fps + (instant_fps - self.smoothed_fps) * Self::FPS_SMOOTHING
        };

        let time = FrameTime {
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
            delta,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }

    /// Exponentially smoothed frames per second.
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    /// Restart elapsed time and the delta baseline.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last = now;
        self.frame_index = 0;
        self.smoothed_fps = 0.0;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
