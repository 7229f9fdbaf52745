//! Interface-only seam to the peer-synchronization transport named in §1/§3 as
//! deliberately out of scope: "the manager exposes frame-tick and delta hooks; the
//! transport is out of band." `retroforge-core` ships the hook trait only; the
//! façade runs with `peer_sync: None` until a host wires a transport in.

/// What the façade drives each tick: advance the manager's own frame counter, then
/// collect whatever state delta it has accumulated to hand off to the transport.
/// How deltas reach peers (sockets, relay, lockstep) is entirely the implementor's
/// concern.
pub trait PeerSync {
    /// Advance the manager's internal frame counter by one tick.
    fn on_frame_tick(&mut self);

    /// Take this tick's outgoing delta, if any has accumulated since the last call.
    fn delta(&mut self) -> Option<Vec<u8>>;

    /// Tear down the transport; called once from `Engine::shutdown`.
    fn close(&mut self) {}
}
