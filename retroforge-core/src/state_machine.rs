//! Generic stateful stack with deferred transitions and shared context (§4.10).
//!
//! All fields live behind one `RwLock`. Lifecycle callbacks never run with that lock
//! held: the machine takes the write lock just long enough to resolve which state
//! handle to call and to mark it initialized, then drops the lock and invokes the
//! callback through the state's own mutex.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::input::InputState;
use crate::raster::Framebuffer;

/// Opaque context values. A small closed set covers everything the script bridge
/// needs to round-trip through Lua tables.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    String(String),
    Number(f64),
    Bool(bool),
    Map(HashMap<String, ContextValue>),
}

/// One state's lifecycle hooks. Every method has a default no-op so implementors
/// only override what they need — mirroring the script bridge's optional
/// `{initialize, enter, handleInput, update, draw, exit, shutdown}` table.
///
/// Deliberately not `Send`: script-defined states close over an `mlua::Function`,
/// which isn't `Send`, and the whole machine only ever runs on the main thread (§5).
pub trait State {
    fn initialize(&mut self) {}
    fn enter(&mut self) {}
    fn handle_input(&mut self, _input: &InputState) {}
    fn update(&mut self, _dt: f64) {}
    fn draw(&mut self, _fb: &mut Framebuffer) {}
    fn exit(&mut self) {}
    fn shutdown(&mut self) {}
}

type StateHandle = Arc<Mutex<Box<dyn State>>>;

/// Failure from a state-machine operation.
#[derive(Debug, PartialEq, Eq)]
pub enum StateMachineError {
    EmptyName,
    AlreadyRegistered(String),
    NotRegistered(String),
    StillInStack(String),
    /// Attempted to register, or directly change to, a reserved state name
    /// (§4.11 `__engine_splash` / `__credits`).
    Reserved(String),
    /// Attempted to pop an already-empty stack; the stack is left unchanged.
    EmptyStack,
}

impl fmt::Display for StateMachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMachineError::EmptyName => write!(f, "state name must not be empty"),
            StateMachineError::AlreadyRegistered(n) => write!(f, "state '{n}' is already registered"),
            StateMachineError::NotRegistered(n) => write!(f, "state '{n}' is not registered"),
            StateMachineError::StillInStack(n) => write!(f, "state '{n}' is still in the stack"),
            StateMachineError::Reserved(n) => write!(f, "state '{n}' is reserved"),
            StateMachineError::EmptyStack => write!(f, "cannot pop an empty state stack"),
        }
    }
}

impl std::error::Error for StateMachineError {}

#[derive(Clone)]
enum PendingTransition {
    Change(String),
    Push(String),
    Pop,
    PopAll,
}

struct Inner {
    registry: HashMap<String, StateHandle>,
    initialized: HashSet<String>,
    stack: Vec<String>,
    context: HashMap<String, ContextValue>,
    exit_requested: bool,
    pending: Option<PendingTransition>,
    /// Set while a HandleInput/Update/Draw dispatch is in progress, so transition
    /// requests made from inside a callback are deferred instead of applied inline.
    in_callback: bool,
}

/// A stack-based state machine addressed by name.
pub struct StateMachine {
    inner: RwLock<Inner>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            inner: RwLock::new(Inner {
                registry: HashMap::new(),
                initialized: HashSet::new(),
                stack: Vec::new(),
                context: HashMap::new(),
                exit_requested: false,
                pending: None,
                in_callback: false,
            }),
        }
    }

    pub fn register_state(&self, name: &str, state: Box<dyn State>) -> Result<(), StateMachineError> {
        if name.is_empty() {
            return Err(StateMachineError::EmptyName);
        }
        let mut inner = self.inner.write().unwrap();
        if inner.registry.contains_key(name) {
            return Err(StateMachineError::AlreadyRegistered(name.to_string()));
        }
        inner
            .registry
            .insert(name.to_string(), Arc::new(Mutex::new(state)));
        Ok(())
    }

    pub fn unregister_state(&self, name: &str) -> Result<(), StateMachineError> {
        let mut inner = self.inner.write().unwrap();
        if inner.stack.iter().any(|s| s == name) {
            return Err(StateMachineError::StillInStack(name.to_string()));
        }
        if !inner.registry.contains_key(name) {
            return Err(StateMachineError::NotRegistered(name.to_string()));
        }
        let was_init = inner.initialized.remove(name);
        let handle = inner.registry.remove(name).unwrap();
        drop(inner);
        if was_init {
            handle.lock().unwrap().shutdown();
        }
        Ok(())
    }

    fn ensure_initialized(&self, name: &str) -> Result<StateHandle, StateMachineError> {
        let mut inner = self.inner.write().unwrap();
        let handle = inner
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| StateMachineError::NotRegistered(name.to_string()))?;
        let needs_init = !inner.initialized.contains(name);
        if needs_init {
            inner.initialized.insert(name.to_string());
        }
        drop(inner);
        if needs_init {
            handle.lock().unwrap().initialize();
        }
        Ok(handle)
    }

    fn handle_for(&self, name: &str) -> Option<StateHandle> {
        self.inner.read().unwrap().registry.get(name).cloned()
    }

    /// Empty the stack (Exit top-down), then initialize (if first use), push, and
    /// Enter the target.
    pub fn change_state(&self, name: &str) -> Result<(), StateMachineError> {
        self.pop_all_states();
        let handle = self.ensure_initialized(name)?;
        self.inner.write().unwrap().stack.push(name.to_string());
        handle.lock().unwrap().enter();
        Ok(())
    }

    /// Exit the current top (if any), initialize target if first use, push, Enter.
    pub fn push_state(&self, name: &str) -> Result<(), StateMachineError> {
        if let Some(top) = self.inner.read().unwrap().stack.last().cloned() {
            if let Some(handle) = self.handle_for(&top) {
                handle.lock().unwrap().exit();
            }
        }
        let handle = self.ensure_initialized(name)?;
        self.inner.write().unwrap().stack.push(name.to_string());
        handle.lock().unwrap().enter();
        Ok(())
    }

    /// Pop the top (Exit), then re-Enter the new top, if any. Popping an empty stack
    /// is an error and leaves the stack unchanged.
    pub fn pop_state(&self) -> Result<(), StateMachineError> {
        let popped = {
            let mut inner = self.inner.write().unwrap();
            match inner.stack.pop() {
                Some(name) => name,
                None => return Err(StateMachineError::EmptyStack),
            }
        };
        if let Some(handle) = self.handle_for(&popped) {
            handle.lock().unwrap().exit();
        }
        if let Some(new_top) = self.inner.read().unwrap().stack.last().cloned() {
            if let Some(handle) = self.handle_for(&new_top) {
                handle.lock().unwrap().enter();
            }
        }
        Ok(())
    }

    /// Exit every state top-down, leaving the stack empty.
    pub fn pop_all_states(&self) {
        loop {
            let popped = self.inner.write().unwrap().stack.pop();
            match popped {
                Some(name) => {
                    if let Some(handle) = self.handle_for(&name) {
                        handle.lock().unwrap().exit();
                    }
                }
                None => break,
            }
        }
    }

    fn request_transition(&self, t: PendingTransition) {
        let mut inner = self.inner.write().unwrap();
        if inner.in_callback {
            inner.pending = Some(t);
        } else {
            drop(inner);
            self.apply_transition(t);
        }
    }

    fn apply_transition(&self, t: PendingTransition) {
        match t {
            PendingTransition::Change(name) => {
                let _ = self.change_state(&name);
            }
            PendingTransition::Push(name) => {
                let _ = self.push_state(&name);
            }
            PendingTransition::Pop => {
                let _ = self.pop_state();
            }
            PendingTransition::PopAll => self.pop_all_states(),
        }
    }

    /// Request a transition; if called from inside HandleInput/Update/Draw it is
    /// queued and applied at the top of the next `handle_input` call (the first
    /// lifecycle dispatch of the following tick) instead of mutating the stack
    /// mid-dispatch.
    pub fn request_change_state(&self, name: &str) {
        self.request_transition(PendingTransition::Change(name.to_string()));
    }

    pub fn request_push_state(&self, name: &str) {
        self.request_transition(PendingTransition::Push(name.to_string()));
    }

    pub fn request_pop_state(&self) {
        self.request_transition(PendingTransition::Pop);
    }

    pub fn request_pop_all_states(&self) {
        self.request_transition(PendingTransition::PopAll);
    }

    fn top(&self) -> Option<String> {
        self.inner.read().unwrap().stack.last().cloned()
    }

    /// Apply any transition deferred by a prior callback, then dispatch `handle_input`
    /// to the (possibly new) top. Draining here rather than in `update` means a
    /// transition requested during *this* tick's `handle_input`/`update`/`draw`
    /// only takes effect at the top of the *next* tick's `handle_input` — so this
    /// tick's `update`/`draw` still run against the state that was current when the
    /// request was made (§4.10, §8 invariant 7).
    pub fn handle_input(&self, input: &InputState) {
        let pending = self.inner.write().unwrap().pending.take();
        if let Some(t) = pending {
            self.apply_transition(t);
        }

        self.inner.write().unwrap().in_callback = true;
        if let Some(name) = self.top() {
            if let Some(handle) = self.handle_for(&name) {
                handle.lock().unwrap().handle_input(input);
            }
        }
        self.inner.write().unwrap().in_callback = false;
    }

    pub fn update(&self, dt: f64) {
        self.inner.write().unwrap().in_callback = true;
        if let Some(name) = self.top() {
            if let Some(handle) = self.handle_for(&name) {
                handle.lock().unwrap().update(dt);
            }
        }
        self.inner.write().unwrap().in_callback = false;
    }

    pub fn draw(&self, fb: &mut Framebuffer) {
        self.inner.write().unwrap().in_callback = true;
        if let Some(name) = self.top() {
            if let Some(handle) = self.handle_for(&name) {
                handle.lock().unwrap().draw(fb);
            }
        }
        self.inner.write().unwrap().in_callback = false;
    }

    /// Draw the state just below the top, if any — used by overlay states that want
    /// to render on top of whatever was showing before they were pushed.
    pub fn draw_previous_state(&self, fb: &mut Framebuffer) {
        let below = {
            let inner = self.inner.read().unwrap();
            let len = inner.stack.len();
            if len < 2 {
                return;
            }
            inner.stack[len - 2].clone()
        };
        if let Some(handle) = self.handle_for(&below) {
            handle.lock().unwrap().draw(fb);
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.inner.read().unwrap().stack.len()
    }

    pub fn set_context(&self, key: &str, value: ContextValue) {
        self.inner
            .write()
            .unwrap()
            .context
            .insert(key.to_string(), value);
    }

    pub fn get_context(&self, key: &str) -> Option<ContextValue> {
        self.inner.read().unwrap().context.get(key).cloned()
    }

    pub fn has_context(&self, key: &str) -> bool {
        self.inner.read().unwrap().context.contains_key(key)
    }

    pub fn clear_context(&self, key: &str) {
        self.inner.write().unwrap().context.remove(key);
    }

    pub fn clear_all_context(&self) {
        self.inner.write().unwrap().context.clear();
    }

    pub fn request_exit(&self) {
        self.inner.write().unwrap().exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.inner.read().unwrap().exit_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl State for Recorder {
        fn initialize(&mut self) {
            self.log.lock().unwrap().push("init");
        }
        fn enter(&mut self) {
            self.log.lock().unwrap().push("enter");
        }
        fn exit(&mut self) {
            self.log.lock().unwrap().push("exit");
        }
        fn update(&mut self, _dt: f64) {
            self.log.lock().unwrap().push("update");
        }
    }

    #[test]
    fn empty_name_registration_fails() {
        let sm = StateMachine::new();
        assert_eq!(
            sm.register_state("", Box::new(Recorder { log: Arc::new(Mutex::new(vec![])) })),
            Err(StateMachineError::EmptyName)
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let sm = StateMachine::new();
        let log = Arc::new(Mutex::new(vec![]));
        sm.register_state("menu", Box::new(Recorder { log: Arc::clone(&log) }))
            .unwrap();
        assert!(matches!(
            sm.register_state("menu", Box::new(Recorder { log })),
            Err(StateMachineError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn change_state_initializes_once_and_enters() {
        let sm = StateMachine::new();
        let log = Arc::new(Mutex::new(vec![]));
        sm.register_state("menu", Box::new(Recorder { log: Arc::clone(&log) }))
            .unwrap();
        sm.change_state("menu").unwrap();
        sm.change_state("menu").unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["init", "enter", "exit", "enter"]);
    }

    #[test]
    fn push_then_pop_restores_previous_enter() {
        let sm = StateMachine::new();
        let a_log = Arc::new(Mutex::new(vec![]));
        let b_log = Arc::new(Mutex::new(vec![]));
        sm.register_state("a", Box::new(Recorder { log: Arc::clone(&a_log) }))
            .unwrap();
        sm.register_state("b", Box::new(Recorder { log: Arc::clone(&b_log) }))
            .unwrap();
        sm.change_state("a").unwrap();
        sm.push_state("b").unwrap();
        assert_eq!(*a_log.lock().unwrap(), vec!["init", "enter", "exit"]);
        sm.pop_state().unwrap();
        assert_eq!(*b_log.lock().unwrap(), vec!["init", "enter", "exit"]);
        assert_eq!(a_log.lock().unwrap().last(), Some(&"enter"));
    }

    #[test]
    fn popping_an_empty_stack_errors_without_mutating_state() {
        let sm = StateMachine::new();
        let log = Arc::new(Mutex::new(vec![]));
        sm.register_state("menu", Box::new(Recorder { log: Arc::clone(&log) }))
            .unwrap();
        sm.change_state("menu").unwrap();
        sm.pop_state().unwrap();
        assert_eq!(sm.stack_depth(), 0);

        assert_eq!(sm.pop_state(), Err(StateMachineError::EmptyStack));
        assert_eq!(sm.stack_depth(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["init", "enter", "exit"]);
    }

    #[test]
    fn unregister_fails_while_in_stack() {
        let sm = StateMachine::new();
        let log = Arc::new(Mutex::new(vec![]));
        sm.register_state("menu", Box::new(Recorder { log })).unwrap();
        sm.change_state("menu").unwrap();
        assert!(matches!(
            sm.unregister_state("menu"),
            Err(StateMachineError::StillInStack(_))
        ));
    }

    #[test]
    fn deferred_transition_from_handle_input_applies_before_next_handle_input() {
        // A state whose `handle_input` requests a transition to `target` every time
        // it's dispatched, and which counts its own `update` calls, so the test can
        // tell exactly which state ran `update` on which simulated frame.
        struct SelfChanger {
            sm: Weak<StateMachine>,
            target: &'static str,
            updates: Arc<AtomicUsize>,
        }
        impl State for SelfChanger {
            fn handle_input(&mut self, _input: &InputState) {
                if let Some(sm) = self.sm.upgrade() {
                    sm.request_change_state(self.target);
                }
            }
            fn update(&mut self, _dt: f64) {
                self.updates.fetch_add(1, Ordering::SeqCst);
            }
        }

        let sm = Arc::new(StateMachine::new());
        let a_updates = Arc::new(AtomicUsize::new(0));
        let b_updates = Arc::new(AtomicUsize::new(0));
        sm.register_state(
            "a",
            Box::new(SelfChanger {
                sm: Arc::downgrade(&sm),
                target: "b",
                updates: Arc::clone(&a_updates),
            }),
        )
        .unwrap();
        sm.register_state(
            "b",
            Box::new(SelfChanger {
                sm: Arc::downgrade(&sm),
                target: "a",
                updates: Arc::clone(&b_updates),
            }),
        )
        .unwrap();
        sm.change_state("a").unwrap();
        let input = InputState::new();

        // Frame N: "a".handle_input requests a->b, but per §8's E2E scenario this
        // frame's Update must still dispatch into "a".
        sm.handle_input(&input);
        sm.update(0.016);
        assert_eq!(sm.top(), Some("a".to_string()));
        assert_eq!(a_updates.load(Ordering::SeqCst), 1);
        assert_eq!(b_updates.load(Ordering::SeqCst), 0);

        // Frame N+1: the queued transition applies at the top of this handle_input
        // call, before the new top ("b") receives input, so this frame's Update
        // dispatches into "b".
        sm.handle_input(&input);
        sm.update(0.016);
        assert_eq!(sm.top(), Some("b".to_string()));
        assert_eq!(a_updates.load(Ordering::SeqCst), 1);
        assert_eq!(b_updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn context_roundtrips_values() {
        let sm = StateMachine::new();
        sm.set_context("score", ContextValue::Number(42.0));
        assert!(sm.has_context("score"));
        assert_eq!(sm.get_context("score"), Some(ContextValue::Number(42.0)));
        sm.clear_context("score");
        assert!(!sm.has_context("score"));
    }
}
