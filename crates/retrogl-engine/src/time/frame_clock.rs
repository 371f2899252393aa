use std::time::{Duration, Instant};

/// Timing for one rendered frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped to `[MIN_DELTA, MAX_DELTA]`.
    pub delta: f32,
    /// Seconds since the clock was created. Animations key off this.
    pub elapsed: f32,
    pub frame_index: u64,
}

const MIN_DELTA: Duration = Duration::from_micros(100);
/// Long stalls (debugger, minimized window) count as a quarter second.
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Per-window frame clock.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let delta = now
            .saturating_duration_since(self.last)
            .clamp(MIN_DELTA, MAX_DELTA);
        self.last = now;

        let time = FrameTime {
            delta: delta.as_secs_f32(),
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped_and_elapsed_is_not() {
        let mut clock = FrameClock::new();
        let start = clock.start;

        let first = clock.tick_at(start + Duration::from_secs(2));
        assert_eq!(first.frame_index, 0);
        assert!((first.delta - 0.25).abs() < 1e-6);
        assert!((first.elapsed - 2.0).abs() < 1e-6);

        let second = clock.tick_at(start + Duration::from_secs(2));
        assert_eq!(second.frame_index, 1);
        assert!((second.delta - 0.0001).abs() < 1e-6);
    }
}
