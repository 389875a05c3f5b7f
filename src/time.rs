//! Frame clock.
//!
//! One [`FrameClock::update`] per rendered frame yields the elapsed session
//! time (fed to the foliage program and panel float) and the frame delta
//! (fed to every ramp and lerp). The delta is capped so a stalled frame,
//! such as a window drag or a debugger pause, cannot jump the animation.
//!
//! ```ignore
//! let mut clock = FrameClock::new(0.1);
//! // once per redraw:
//! let (elapsed, dt) = clock.update();
//! scene.tick(dt, elapsed);
//! ```

use std::time::{Duration, Instant};

/// Session timing for the render loop.
#[derive(Debug)]
pub struct FrameClock {
    /// Session origin. Elapsed time and classifier timestamps count from here.
    start: Instant,
    /// Instant of the previous [`FrameClock::update`].
    last_frame: Instant,
    /// Seconds from `start` to the last update. Never capped.
    elapsed_secs: f32,
    /// Delta of the last update after capping, seconds.
    delta_secs: f32,
    /// Largest delta handed out, seconds.
    max_delta: f32,
}

impl FrameClock {
    /// Clock starting now, capping deltas at `max_delta` seconds.
    pub fn new(max_delta: f32) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            max_delta: max_delta.max(0.0),
        }
    }

    /// Advance to the current instant. Returns `(elapsed, delta)`.
    pub fn update(&mut self) -> (f32, f32) {
        let now = Instant::now();
        self.delta_secs = now
            .duration_since(self.last_frame)
            .as_secs_f32()
            .clamp(0.0, self.max_delta);
        self.last_frame = now;
        self.elapsed_secs = now.duration_since(self.start).as_secs_f32();
        (self.elapsed_secs, self.delta_secs)
    }

    /// Seconds since start, as of the last update.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Capped delta of the last update.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }

    /// Wall time since start, for timestamping classifier calls.
    #[inline]
    pub fn session_time(&self) -> Duration {
        self.start.elapsed()
    }

    /// Restart the clock from now.
    pub fn reset(&mut self) {
        *self = Self::new(self.max_delta);
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_new() {
        let clock = FrameClock::default();
        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(clock.delta(), 0.0);
        assert!((clock.max_delta() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_clock_update() {
        let mut clock = FrameClock::new(1.0);
        thread::sleep(Duration::from_millis(10));
        let (elapsed, delta) = clock.update();

        assert!(elapsed > 0.0);
        assert!(delta > 0.0);
        assert_eq!(clock.elapsed(), elapsed);
    }

    #[test]
    fn test_stalled_frame_is_capped() {
        let mut clock = FrameClock::new(0.05);
        thread::sleep(Duration::from_millis(120));
        let (elapsed, delta) = clock.update();

        assert!((delta - 0.05).abs() < 1e-6);
        // Elapsed is wall time and is not capped.
        assert!(elapsed >= 0.12);
    }

    #[test]
    fn test_reset_restarts_session() {
        let mut clock = FrameClock::new(0.2);
        thread::sleep(Duration::from_millis(200));
        clock.update();
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
        assert!(clock.session_time() < Duration::from_millis(200));
        assert!((clock.max_delta() - 0.2).abs() < 1e-6);
    }
}
