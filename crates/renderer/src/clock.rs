use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Capacity of the smoothing window.
pub const WINDOW: usize = 10;
/// Delta assumed before the first real sample exists.
pub const SEED_DT: f64 = 1.0 / 60.0;

/// Result of one [`FrameClock::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Raw delta of this tick in seconds.
    pub dt: f64,
    /// Simulation time after this tick in seconds.
    pub t: f64,
}

/// Wall-clock timing for the render loop.
///
/// Simulation time accumulates raw deltas. The sliding window of recent
/// deltas only feeds the displayed frame rate.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    recent: VecDeque<f64>,
    time: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        let mut recent = VecDeque::with_capacity(WINDOW);
        recent.push_front(SEED_DT);
        Self {
            last: start,
            recent,
            time: 0.0,
        }
    }

    pub fn tick(&mut self) -> Tick {
        self.tick_at(Instant::now())
    }

    /// Advances the clock to `now`. A `now` earlier than the previous tick
    /// counts as a zero delta.
    pub fn tick_at(&mut self, now: Instant) -> Tick {
        let dt = now
            .checked_duration_since(self.last)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        self.last = now;
        if self.recent.len() == WINDOW {
            self.recent.pop_back();
        }
        self.recent.push_front(dt);
        self.time += dt;
        Tick { dt, t: self.time }
    }

    /// Newest delta, or the seed before the first tick.
    pub fn dt(&self) -> f64 {
        self.recent.front().copied().unwrap_or(SEED_DT)
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Recent deltas, newest first.
    pub fn recent_deltas(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.recent.iter().copied()
    }

    /// Frames per second averaged over the window.
    pub fn smoothed_fps(&self) -> f64 {
        let mean = self.recent.iter().sum::<f64>() / self.recent.len().max(1) as f64;
        if mean > 0.0 {
            1.0 / mean
        } else {
            0.0
        }
    }

    /// Rounded frame rate for display.
    pub fn displayed_fps(&self) -> u32 {
        self.smoothed_fps().round() as u32
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
    fn seeded_before_first_tick() {
        let clock = FrameClock::starting_at(Instant::now());
        assert_eq!(clock.dt(), SEED_DT);
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.displayed_fps(), 60);
    }

    #[test]
    fn window_keeps_ten_newest_deltas() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        let mut expected_t = 0.0;
        for frame in 1..=11u64 {
            let tick = clock.tick_at(start + Duration::from_millis(16 * frame));
            expected_t += tick.dt;
        }

        let deltas: Vec<_> = clock.recent_deltas().collect();
        assert_eq!(deltas.len(), WINDOW);
        assert!(deltas.iter().all(|dt| (*dt - 0.016).abs() < 1e-9));
        assert_eq!(clock.time(), expected_t);
        assert!((clock.time() - 0.176).abs() < 1e-9);
        assert!((62..=63).contains(&clock.displayed_fps()));
    }

    #[test]
    fn simulation_uses_raw_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(10));
        let tick = clock.tick_at(start + Duration::from_millis(110));
        assert!((tick.dt - 0.1).abs() < 1e-9);
        assert!((tick.t - 0.11).abs() < 1e-9);
        assert_eq!(clock.dt(), tick.dt);
    }

    #[test]
    fn backwards_time_is_zero_delta() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut clock = FrameClock::starting_at(start);
        let tick = clock.tick_at(start - Duration::from_millis(5));
        assert_eq!(tick.dt, 0.0);
    }
}
