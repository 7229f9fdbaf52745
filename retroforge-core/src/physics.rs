//! Interface-only seam to the 2D physics rigid-body solver named in §1/§3 as
//! deliberately out of scope: "used as an opaque library offering Step and body
//! handles." `retroforge-core` ships the trait and the opaque handle the façade
//! threads through its tick; no solver is vendored here, and the façade runs with
//! `physics: None` until a host wires one in.

/// An opaque reference to a rigid body owned by whatever implements [`PhysicsWorld`].
/// The façade never interprets this value — it is only ever handed back to the same
/// world that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u64);

/// What the façade needs from a physics backend: advance the simulation one tick.
/// Body creation/queries are the backend's own API surface, reached through
/// whatever concrete type implements this trait — the façade only ever calls `step`.
pub trait PhysicsWorld {
    /// Advance the simulation by `dt` seconds, matching the façade's fixed tick.
    fn step(&mut self, dt: f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingWorld {
        steps: u32,
    }

    impl PhysicsWorld for CountingWorld {
        fn step(&mut self, _dt: f64) {
            self.steps += 1;
        }
    }

    #[test]
    fn a_world_implementation_can_be_stepped_through_the_trait() {
        let mut world = CountingWorld { steps: 0 };
        let obj: &mut dyn PhysicsWorld = &mut world;
        obj.step(1.0 / 60.0);
        obj.step(1.0 / 60.0);
        assert_eq!(world.steps, 2);
    }

    #[test]
    fn body_handle_is_a_plain_opaque_value() {
        assert_ne!(BodyHandle(1), BodyHandle(2));
    }
}
