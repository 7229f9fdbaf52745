//! Glues the scheduler to the event bus by publishing a `"tick"` event each frame
//! (§4.7).

use std::time::Duration;

use crate::bus::EventBus;
use crate::scheduler::{Clock, Scheduler};

/// Drives `Scheduler::step`, publishing the frame delta on the `"tick"` topic.
pub struct Runner<C: Clock> {
    scheduler: Scheduler<C>,
    bus: std::sync::Arc<EventBus>,
}

impl<C: Clock> Runner<C> {
    pub fn new(scheduler: Scheduler<C>, bus: std::sync::Arc<EventBus>) -> Self {
        Runner { scheduler, bus }
    }

    /// Run exactly one frame: publish `"tick"` with the nominal frame delta.
    pub fn step(&self) {
        let bus = &self.bus;
        self.scheduler.step(|dt: Duration| {
            bus.publish("tick", &dt);
        });
    }

    pub fn target_fps(&self) -> u32 {
        self.scheduler.target_fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SystemClock;
    use std::sync::{Arc, Mutex};

    #[test]
    fn step_publishes_tick_with_frame_delta() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        bus.subscribe("tick", move |payload| {
            if let Some(dt) = payload.downcast_ref::<Duration>() {
                *seen_cb.lock().unwrap() = Some(*dt);
            }
        });

        let runner = Runner::new(Scheduler::new(1000, SystemClock), Arc::clone(&bus));
        runner.step();

        assert_eq!(*seen.lock().unwrap(), Some(Duration::from_secs_f64(1.0 / 1000.0)));
    }
}
