//! Digital button input state (§4.4).
//!
//! Six logical buttons, double-buffered so `pressed` can distinguish an
//! edge-triggered "just went down this frame" from `btn`'s level-triggered "currently
//! held". `step()` rotates current into previous and must run exactly once per tick,
//! after script `update` has read the frame's input and before the next `set` calls
//! for the following frame.

pub const BUTTON_COUNT: usize = 6;

/// Double-buffered digital input state for the six logical buttons.
#[derive(Debug, Clone)]
pub struct InputState {
    current: [bool; BUTTON_COUNT],
    previous: [bool; BUTTON_COUNT],
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self {
            current: [false; BUTTON_COUNT],
            previous: [false; BUTTON_COUNT],
        }
    }

    /// Record the live state of button `i` for the in-progress frame. Out-of-range
    /// indices are ignored.
    pub fn set(&mut self, i: usize, down: bool) {
        if i < BUTTON_COUNT {
            self.current[i] = down;
        }
    }

    /// Whether button `i` is currently held. Out-of-range indices read as not-held.
    pub fn btn(&self, i: usize) -> bool {
        i < BUTTON_COUNT && self.current[i]
    }

    /// Whether button `i` transitioned from up to down on this frame.
    pub fn pressed(&self, i: usize) -> bool {
        i < BUTTON_COUNT && self.current[i] && !self.previous[i]
    }

    /// Whether button `i` transitioned from down to up on this frame.
    pub fn released(&self, i: usize) -> bool {
        i < BUTTON_COUNT && !self.current[i] && self.previous[i]
    }

    /// Roll `current` into `previous` to prepare for the next frame's edge detection.
    pub fn step(&mut self) {
        self.previous = self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_buttons_down() {
        let input = InputState::new();
        for i in 0..BUTTON_COUNT {
            assert!(!input.btn(i));
            assert!(!input.pressed(i));
            assert!(!input.released(i));
        }
    }

    #[test]
    fn pressed_is_edge_triggered_once() {
        let mut input = InputState::new();
        input.set(0, true);
        assert!(input.btn(0));
        assert!(input.pressed(0));
        input.step();
        assert!(input.btn(0));
        assert!(!input.pressed(0));
    }

    #[test]
    fn released_fires_on_the_frame_after_release() {
        let mut input = InputState::new();
        input.set(3, true);
        input.step();
        input.set(3, false);
        assert!(input.released(3));
        assert!(!input.btn(3));
        input.step();
        assert!(!input.released(3));
    }

    #[test]
    fn out_of_range_index_is_inert() {
        let mut input = InputState::new();
        input.set(999, true);
        assert!(!input.btn(999));
        assert!(!input.pressed(999));
    }
}
