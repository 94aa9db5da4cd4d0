//! Tick pacing for the pixelcam render loop.
//!
//! The renderer is driven by whatever signal the host environment provides
//! (a window redraw, a timer, a test harness). [`FrameGate`] decouples that
//! delivery cadence from the operating rate: a pass only executes when at
//! least one frame interval has elapsed since the previous executed pass.
//! [`TickDriver`] abstracts the signal itself so the same loop runs against
//! a sleeping timer in headless mode or a scripted clock in tests.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("target rate must be a positive, finite frames-per-second value, got {0}")]
    Invalid(f32),
}

/// Validated frames-per-second operating rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRate(f32);

impl TargetRate {
    pub fn new(fps: f32) -> Result<Self, RateError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(RateError::Invalid(fps));
        }
        Ok(Self(fps))
    }

    pub fn fps(&self) -> f32 {
        self.0
    }

    /// Minimum wall-clock spacing between executed passes.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.0)
    }
}

/// Gate that admits at most one pass per frame interval.
///
/// The first tick always passes; afterwards a tick passes only when the
/// interval has fully elapsed, and the gate re-arms from the admitted tick's
/// timestamp (not from the theoretical deadline), matching a throttled
/// render loop rather than a fixed-phase clock.
#[derive(Debug)]
pub struct FrameGate {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameGate {
    pub fn new(rate: TargetRate) -> Self {
        Self {
            interval: rate.frame_interval(),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when a pass should execute at `now`, arming the gate.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Source of render ticks.
///
/// Returns `None` when the driver is exhausted (scripted drivers only); live
/// drivers yield ticks forever.
pub trait TickDriver {
    fn next_tick(&mut self) -> Option<Instant>;
}

/// Driver that sleeps between ticks to approximate the target rate.
///
/// Used by the headless capture paths where no display loop exists. The
/// gate still makes the final call, so oversleeping only delays a pass and
/// never doubles one up.
#[derive(Debug)]
pub struct IntervalDriver {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl IntervalDriver {
    pub fn new(rate: TargetRate) -> Self {
        Self {
            interval: rate.frame_interval(),
            next_deadline: None,
        }
    }
}

impl TickDriver for IntervalDriver {
    fn next_tick(&mut self) -> Option<Instant> {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            thread::sleep(deadline - now);
        }
        let tick = Instant::now();
        self.next_deadline = Some(deadline.max(now) + self.interval);
        Some(tick)
    }
}

/// Scripted driver for deterministic tests: yields the supplied instants in
/// order, then ends.
#[derive(Debug)]
pub struct ManualDriver {
    ticks: VecDeque<Instant>,
}

impl ManualDriver {
    pub fn from_instants(ticks: impl IntoIterator<Item = Instant>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }
}

impl TickDriver for ManualDriver {
    fn next_tick(&mut self) -> Option<Instant> {
        self.ticks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_rates() {
        assert!(TargetRate::new(0.0).is_err());
        assert!(TargetRate::new(-5.0).is_err());
        assert!(TargetRate::new(f32::NAN).is_err());
        assert!(TargetRate::new(f32::INFINITY).is_err());
        assert!(TargetRate::new(10.0).is_ok());
    }

    #[test]
    fn interval_matches_rate() {
        let rate = TargetRate::new(10.0).unwrap();
        assert_eq!(rate.frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn first_tick_always_passes() {
        let mut gate = FrameGate::new(TargetRate::new(10.0).unwrap());
        assert!(gate.try_pass(Instant::now()));
    }

    #[test]
    fn sub_interval_ticks_are_skipped() {
        let mut gate = FrameGate::new(TargetRate::new(10.0).unwrap());
        let start = Instant::now();
        assert!(gate.try_pass(start));
        assert!(!gate.try_pass(start + Duration::from_millis(50)));
        assert!(!gate.try_pass(start + Duration::from_millis(99)));
        assert!(gate.try_pass(start + Duration::from_millis(100)));
    }

    #[test]
    fn gate_rearms_from_admitted_tick() {
        let mut gate = FrameGate::new(TargetRate::new(10.0).unwrap());
        let start = Instant::now();
        assert!(gate.try_pass(start));
        // A late tick passes, and the next interval is measured from it.
        assert!(gate.try_pass(start + Duration::from_millis(250)));
        assert!(!gate.try_pass(start + Duration::from_millis(300)));
        assert!(gate.try_pass(start + Duration::from_millis(350)));
    }

    #[test]
    fn manual_driver_yields_scripted_ticks() {
        let start = Instant::now();
        let ticks = vec![start, start + Duration::from_millis(10)];
        let mut driver = ManualDriver::from_instants(ticks.clone());
        assert_eq!(driver.next_tick(), Some(ticks[0]));
        assert_eq!(driver.next_tick(), Some(ticks[1]));
        assert_eq!(driver.next_tick(), None);
    }

    #[test]
    fn interval_driver_spaces_ticks() {
        let mut driver = IntervalDriver::new(TargetRate::new(500.0).unwrap());
        let first = driver.next_tick().expect("first tick");
        let second = driver.next_tick().expect("second tick");
        // The nominal spacing is 2ms; allow for the instant being sampled
        // slightly after the first deadline.
        assert!(second > first);
        assert!(second.duration_since(first) >= Duration::from_millis(1));
    }
}
