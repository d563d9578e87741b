use std::collections::VecDeque;
use std::time::Instant;

/// Source of elapsed wall-clock time for the scheduler.
pub trait Clock {
    /// Seconds elapsed since the previous call (or since `reset`).
    fn delta(&mut self) -> f64;

    /// Restart measurement from now. Called once before the main loop.
    fn reset(&mut self) {}
}

/// Monotonic real-time clock.
#[derive(Debug)]
pub struct SystemClock {
    last: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn delta(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        dt
    }

    fn reset(&mut self) {
        self.last = Instant::now();
    }
}

/// Replays a scripted sequence of deltas, then reports zero.
#[derive(Debug, Default)]
pub struct ManualClock {
    deltas: VecDeque<f64>,
}

impl ManualClock {
    pub fn new(deltas: impl IntoIterator<Item = f64>) -> Self {
        Self {
            deltas: deltas.into_iter().collect(),
        }
    }

    pub fn push(&mut self, dt: f64) {
        self.deltas.push_back(dt);
    }

    pub fn remaining(&self) -> usize {
        self.deltas.len()
    }
}

impl Clock for ManualClock {
    fn delta(&mut self) -> f64 {
        self.deltas.pop_front().unwrap_or(0.0)
    }
}

/// Reports the same delta every call. Runs simulations faster than real time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    dt: f64,
}

impl FixedClock {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }
}

impl Clock for FixedClock {
    fn delta(&mut self) -> f64 {
        self.dt
    }
}
