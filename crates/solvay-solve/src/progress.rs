//! Integration progress observers.
//!
//! Progress reporting is a side effect only: observers are invoked per
//! attempted step and per save point but can never influence control
//! flow. The default tracing-backed observer keeps the core silent
//! unless a subscriber is installed.

use tracing::debug;

/// Callback interface invoked by the time loop.
pub trait Progress {
    /// Called after every attempted step with the current time, the end
    /// of the integration window, and whether the step was accepted.
    fn on_step(&mut self, _t: f64, _t_end: f64, _accepted: bool) {}

    /// Called when the state is recorded at a save time.
    fn on_save(&mut self, _index: usize, _t: f64) {}
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl Progress for NullProgress {}

/// Observer that logs integration progress through `tracing` in ~10%
/// increments.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    t0: f64,
    next_pct: u32,
}

impl TracingProgress {
    /// Create an observer for an integration starting at `t0`.
    pub fn new(t0: f64) -> Self {
        Self { t0, next_pct: 10 }
    }
}

impl Progress for TracingProgress {
    fn on_step(&mut self, t: f64, t_end: f64, accepted: bool) {
        if !accepted || t_end <= self.t0 {
            return;
        }
        let pct = (100.0 * (t - self.t0) / (t_end - self.t0)) as u32;
        if pct >= self.next_pct {
            debug!(t, pct, "integration progress");
            while self.next_pct <= pct {
                self.next_pct += 10;
            }
        }
    }

    fn on_save(&mut self, index: usize, t: f64) {
        debug!(index, t, "state saved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        steps: usize,
        saves: usize,
    }

    impl Progress for Counting {
        fn on_step(&mut self, _t: f64, _t_end: f64, _accepted: bool) {
            self.steps += 1;
        }
        fn on_save(&mut self, _index: usize, _t: f64) {
            self.saves += 1;
        }
    }

    #[test]
    fn custom_observer_counts_callbacks() {
        let mut obs = Counting { steps: 0, saves: 0 };
        obs.on_step(0.1, 1.0, true);
        obs.on_step(0.2, 1.0, false);
        obs.on_save(0, 0.2);
        assert_eq!(obs.steps, 2);
        assert_eq!(obs.saves, 1);
    }
}
