//! Fixed-FPS frame scheduler with an injectable clock (§4.7).

use std::time::{Duration, Instant};

/// Abstracts "what time is it" and "sleep for this long" so tests can drive
/// deterministic frame timing instead of depending on the wall clock.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

/// The real wall clock, backed by `std::time`.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

/// Steps a callback at a nominal frame duration of `1/target_fps`, sleeping off
/// whatever time remains after the callback runs.
pub struct Scheduler<C: Clock> {
    target_fps: u32,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(target_fps: u32, clock: C) -> Self {
        Scheduler { target_fps, clock }
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    /// Run one frame: invoke `f` with the nominal frame duration, then sleep off any
    /// time remaining in the frame budget. Returns the actual wall time spent before
    /// sleeping, for callers that want to track real frame time.
    pub fn step<F: FnOnce(Duration)>(&self, f: F) -> Duration {
        let frame_dt = self.frame_duration();
        let start = self.clock.now();
        f(frame_dt);
        let elapsed = self.clock.now().duration_since(start);
        if elapsed < frame_dt {
            self.clock.sleep(frame_dt - elapsed);
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// A clock whose `now()` advances a fixed amount on each call and records every
    /// requested sleep instead of actually sleeping.
    struct FakeClock {
        current: RefCell<Instant>,
        advance_per_now: Duration,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        fn new(advance_per_now: Duration) -> Self {
            FakeClock {
                current: RefCell::new(Instant::now()),
                advance_per_now,
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            let mut cur = self.current.borrow_mut();
            *cur += self.advance_per_now;
            *cur
        }

        fn sleep(&self, d: Duration) {
            self.sleeps.borrow_mut().push(d);
        }
    }

    #[test]
    fn step_invokes_callback_with_nominal_frame_duration() {
        let clock = FakeClock::new(Duration::from_millis(1));
        let scheduler = Scheduler::new(50, clock);
        let mut seen = None;
        scheduler.step(|dt| seen = Some(dt));
        assert_eq!(seen, Some(Duration::from_secs_f64(1.0 / 50.0)));
    }

    #[test]
    fn step_sleeps_remainder_of_frame_budget() {
        let clock = FakeClock::new(Duration::from_millis(1));
        let scheduler = Scheduler::new(100, clock); // 10ms nominal frame
        scheduler.step(|_| {});
        let sleeps = scheduler.clock.sleeps.borrow();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] < Duration::from_millis(10));
    }

    #[test]
    fn step_does_not_sleep_when_callback_overruns_budget() {
        let clock = FakeClock::new(Duration::from_millis(50));
        let scheduler = Scheduler::new(60, clock); // ~16.6ms nominal frame
        scheduler.step(|_| {});
        assert!(scheduler.clock.sleeps.borrow().is_empty());
    }
}
