//! The game state machine subclass (§4.11): a `StateMachine` with two reserved,
//! pre-registered built-in states — an engine splash screen and a scrolling credits
//! roll — plus the `start`/`exit` entry points that route through them.
//!
//! §9 "Cyclic back references": the subclass owns the built-in states; they hold a
//! non-owning back-reference (a `Weak<StateMachine>`) rather than an `Rc`/`Arc` cycle,
//! since their lifetime never exceeds the subclass that registered them.

use std::sync::{Arc, Mutex, Weak};

use crate::input::{InputState, BUTTON_COUNT};
use crate::quit::QuitFlag;
use crate::raster::{Anchor, Framebuffer};
use crate::state_machine::{State, StateMachine, StateMachineError};

pub const ENGINE_SPLASH_STATE: &str = "__engine_splash";
pub const CREDITS_STATE: &str = "__credits";

const SPLASH_DURATION_SECS: f64 = 2.0;
const CREDITS_SCROLL_PX_PER_SEC: f64 = 30.0;

fn is_reserved(name: &str) -> bool {
    name == ENGINE_SPLASH_STATE || name == CREDITS_STATE
}

/// One entry added via `game.addCredit(category, name, role)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditEntry {
    pub category: String,
    pub name: String,
    pub role: String,
}

/// A `StateMachine` wrapper that reserves `__engine_splash` and `__credits`, and
/// exposes `start`/`exit` in place of letting callers drive those two states by name.
pub struct GameStateMachine {
    inner: Arc<StateMachine>,
    debug: bool,
    pending_initial: Arc<Mutex<Option<String>>>,
    credits: Arc<Mutex<Vec<CreditEntry>>>,
}

impl GameStateMachine {
    pub fn new(debug: bool, quit: QuitFlag, engine_name: &str, engine_version: &str) -> Self {
        let inner = Arc::new(StateMachine::new());
        let pending_initial: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let credits: Arc<Mutex<Vec<CreditEntry>>> = Arc::new(Mutex::new(Vec::new()));

        inner
            .register_state(
                ENGINE_SPLASH_STATE,
                Box::new(EngineSplashState {
                    sm: Arc::downgrade(&inner),
                    pending_initial: Arc::clone(&pending_initial),
                    engine_name: engine_name.to_string(),
                    engine_version: engine_version.to_string(),
                    elapsed: 0.0,
                }),
            )
            .expect("splash state registers exactly once at construction");

        inner
            .register_state(
                CREDITS_STATE,
                Box::new(CreditsState {
                    sm: Arc::downgrade(&inner),
                    quit,
                    credits: Arc::clone(&credits),
                    scroll_y: 0.0,
                    has_drawn: false,
                    armed: false,
                }),
            )
            .expect("credits state registers exactly once at construction");

        GameStateMachine {
            inner,
            debug,
            pending_initial,
            credits,
        }
    }

    /// Begin play. In release mode this shows the engine splash first and remembers
    /// `initial` for when the splash finishes; in debug mode it jumps straight to
    /// `initial` (or does nothing if `initial` is empty).
    pub fn start(&self, initial: &str) {
        if !self.debug {
            *self.pending_initial.lock().unwrap() = Some(initial.to_string());
            let _ = self.inner.change_state(ENGINE_SPLASH_STATE);
        } else if !initial.is_empty() {
            let _ = self.inner.change_state(initial);
        }
    }

    /// Roll the credits.
    pub fn exit(&self) {
        let _ = self.inner.change_state(CREDITS_STATE);
    }

    pub fn add_credit(&self, category: &str, name: &str, role: &str) {
        self.credits.lock().unwrap().push(CreditEntry {
            category: category.to_string(),
            name: name.to_string(),
            role: role.to_string(),
        });
    }

    pub fn register_state(&self, name: &str, state: Box<dyn State>) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.register_state(name, state)
    }

    pub fn unregister_state(&self, name: &str) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.unregister_state(name)
    }

    pub fn change_state(&self, name: &str) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.change_state(name)
    }

    pub fn push_state(&self, name: &str) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.push_state(name)
    }

    pub fn pop_state(&self) -> Result<(), StateMachineError> {
        self.inner.pop_state()
    }

    pub fn pop_all_states(&self) {
        self.inner.pop_all_states();
    }

    /// Deferred counterpart of [`Self::change_state`]: safe to call from inside a
    /// state's own lifecycle callback (the usual way scripts request a transition),
    /// since it only ever queues or applies through [`StateMachine::request_change_state`]
    /// rather than re-entering the state's own lock (§4.10, §8 invariant 7).
    pub fn request_change_state(&self, name: &str) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.request_change_state(name);
        Ok(())
    }

    /// Deferred counterpart of [`Self::push_state`].
    pub fn request_push_state(&self, name: &str) -> Result<(), StateMachineError> {
        if is_reserved(name) {
            return Err(StateMachineError::Reserved(name.to_string()));
        }
        self.inner.request_push_state(name);
        Ok(())
    }

    /// Deferred counterpart of [`Self::pop_state`].
    pub fn request_pop_state(&self) {
        self.inner.request_pop_state();
    }

    /// Deferred counterpart of [`Self::pop_all_states`].
    pub fn request_pop_all_states(&self) {
        self.inner.request_pop_all_states();
    }

    pub fn handle_input(&self, input: &InputState) {
        self.inner.handle_input(input);
    }

    pub fn update(&self, dt: f64) {
        self.inner.update(dt);
    }

    pub fn draw(&self, fb: &mut Framebuffer) {
        self.inner.draw(fb);
    }

    pub fn draw_previous_state(&self, fb: &mut Framebuffer) {
        self.inner.draw_previous_state(fb);
    }

    pub fn stack_depth(&self) -> usize {
        self.inner.stack_depth()
    }

    pub fn set_context(&self, key: &str, value: crate::state_machine::ContextValue) {
        self.inner.set_context(key, value);
    }

    pub fn get_context(&self, key: &str) -> Option<crate::state_machine::ContextValue> {
        self.inner.get_context(key)
    }

    pub fn has_context(&self, key: &str) -> bool {
        self.inner.has_context(key)
    }

    pub fn clear_context(&self, key: &str) {
        self.inner.clear_context(key);
    }

    pub fn clear_all_context(&self) {
        self.inner.clear_all_context();
    }

    pub fn request_exit(&self) {
        self.inner.request_exit();
    }

    pub fn exit_requested(&self) -> bool {
        self.inner.exit_requested()
    }
}

struct EngineSplashState {
    sm: Weak<StateMachine>,
    pending_initial: Arc<Mutex<Option<String>>>,
    engine_name: String,
    engine_version: String,
    elapsed: f64,
}

impl EngineSplashState {
    fn transition_to_initial(&self) {
        let target = self
            .pending_initial
            .lock()
            .unwrap()
            .take()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "menu".to_string());
        if let Some(sm) = self.sm.upgrade() {
            sm.request_change_state(&target);
        }
    }
}

impl State for EngineSplashState {
    fn enter(&mut self) {
        self.elapsed = 0.0;
    }

    fn handle_input(&mut self, input: &InputState) {
        if (0..BUTTON_COUNT).any(|i| input.pressed(i)) {
            self.transition_to_initial();
        }
    }

    fn update(&mut self, dt: f64) {
        self.elapsed += dt;
        if self.elapsed >= SPLASH_DURATION_SECS {
            self.transition_to_initial();
        }
    }

    fn draw(&mut self, fb: &mut Framebuffer) {
        fb.clear([0, 0, 0, 255]);
        fb.print_anchored(&self.engine_name, Anchor::MiddleCenter, [1, 1, 1, 255]);
        fb.print_anchored(&self.engine_version, Anchor::BottomCenter, [1, 1, 1, 255]);
        fb.print_anchored("PRESS ANY KEY", Anchor::TopCenter, [1, 1, 1, 255]);
    }
}

struct CreditsState {
    sm: Weak<StateMachine>,
    quit: QuitFlag,
    credits: Arc<Mutex<Vec<CreditEntry>>>,
    scroll_y: f64,
    has_drawn: bool,
    armed: bool,
}

impl CreditsState {
    fn composed_lines(&self) -> Vec<String> {
        let mut lines = vec!["RETROFORGE".to_string(), String::new()];
        let entries = self.credits.lock().unwrap();
        let mut last_category: Option<String> = None;
        for entry in entries.iter() {
            if last_category.as_deref() != Some(entry.category.as_str()) {
                if last_category.is_some() {
                    lines.push(String::new());
                }
                lines.push(entry.category.to_uppercase());
                last_category = Some(entry.category.clone());
            }
            lines.push(format!("{} - {}", entry.name, entry.role));
        }
        lines
    }
}

impl State for CreditsState {
    fn enter(&mut self) {
        self.scroll_y = 0.0;
        self.has_drawn = false;
        self.armed = false;
    }

    /// §9 open question: the source's "ignore the first two frames" policy depends
    /// on frame delivery rate. The robust variant implemented here instead waits
    /// until at least one full frame has been drawn with this state active *and*
    /// every button is observed released, before arming input handling.
    fn handle_input(&mut self, input: &InputState) {
        if !self.armed {
            if self.has_drawn && !(0..BUTTON_COUNT).any(|i| input.btn(i)) {
                self.armed = true;
            }
            return;
        }
        if (0..BUTTON_COUNT).any(|i| input.pressed(i)) {
            if let Some(sm) = self.sm.upgrade() {
                sm.request_exit();
            }
            self.quit.request();
        }
    }

    fn update(&mut self, dt: f64) {
        self.scroll_y += CREDITS_SCROLL_PX_PER_SEC * dt;
    }

    fn draw(&mut self, fb: &mut Framebuffer) {
        fb.clear([0, 0, 0, 255]);
        let lines = self.composed_lines();
        let text = lines.join("\n");
        let y = (fb.height() as f64) - self.scroll_y;
        fb.print(&text, 8, y.round() as i32, [1, 1, 1, 255]);
        self.has_drawn = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gsm() -> GameStateMachine {
        GameStateMachine::new(false, QuitFlag::new(), "RetroForge", "v0.1")
    }

    #[test]
    fn direct_change_to_reserved_name_is_rejected() {
        let sm = gsm();
        assert_eq!(
            sm.change_state(ENGINE_SPLASH_STATE),
            Err(StateMachineError::Reserved(ENGINE_SPLASH_STATE.to_string()))
        );
        assert_eq!(
            sm.change_state(CREDITS_STATE),
            Err(StateMachineError::Reserved(CREDITS_STATE.to_string()))
        );
    }

    #[test]
    fn registering_a_reserved_name_is_rejected() {
        struct Noop;
        impl State for Noop {}
        let sm = gsm();
        assert_eq!(
            sm.register_state(CREDITS_STATE, Box::new(Noop)),
            Err(StateMachineError::Reserved(CREDITS_STATE.to_string()))
        );
    }

    #[test]
    fn start_in_release_mode_shows_splash_first() {
        let sm = gsm();
        sm.start("menu");
        assert_eq!(sm.stack_depth(), 1);
    }

    #[test]
    fn start_in_debug_mode_jumps_straight_to_initial() {
        struct Menu;
        impl State for Menu {}
        let sm = GameStateMachine::new(true, QuitFlag::new(), "RetroForge", "v0.1");
        sm.register_state("menu", Box::new(Menu)).unwrap();
        sm.start("menu");
        assert_eq!(sm.stack_depth(), 1);
    }

    #[test]
    fn splash_transitions_to_initial_after_duration() {
        let sm = gsm();
        sm.start("menu");
        sm.update(SPLASH_DURATION_SECS + 0.1);
        // The transition splash's `update` requested is deferred; it applies at the
        // top of the next `handle_input` call, mirroring the engine's per-tick order
        // (handle_input, then update, then draw).
        sm.handle_input(&InputState::new());
        // splash requested a change to "menu", which isn't registered, so the
        // transition silently fails and the stack empties via pop_all in change_state.
        assert_eq!(sm.stack_depth(), 0);
    }

    #[test]
    fn credits_input_is_armed_only_after_a_drawn_frame_with_buttons_released() {
        let sm = gsm();
        sm.exit();
        let mut input = InputState::new();
        input.set(0, true);
        sm.handle_input(&input); // not armed yet: no frame drawn
        assert!(!sm.exit_requested());

        let mut fb = Framebuffer::new(16, 16);
        sm.draw(&mut fb);

        sm.handle_input(&input); // still held down, not armed
        assert!(!sm.exit_requested());

        input.set(0, false);
        sm.handle_input(&input); // now released and a frame was drawn: armed
        input.set(0, true);
        sm.handle_input(&input); // a fresh press now triggers exit
        assert!(sm.exit_requested());
    }
}
