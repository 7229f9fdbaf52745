//! The `game` Lua global (§4.12 "Game state machine bindings"): state registration,
//! transitions, shared context, and credits, all thin wrappers over
//! [`crate::game_state::GameStateMachine`] and [`crate::state_machine::ContextValue`].

use std::collections::HashMap;
use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use crate::input::InputState;
use crate::raster::Framebuffer;
use crate::state_machine::{ContextValue, State};

use super::EngineShared;

/// A state whose lifecycle callbacks are Lua functions pulled out of a table passed
/// to `game.registerState`. Every callback is optional; a missing one is a no-op,
/// matching the `State` trait's own default methods. Errors raised by a callback are
/// caught here and routed to the shared debug log rather than propagated (§7).
struct LuaTableState {
    shared: Rc<EngineShared>,
    initialize: Option<Function>,
    enter: Option<Function>,
    handle_input: Option<Function>,
    update: Option<Function>,
    draw: Option<Function>,
    exit: Option<Function>,
    shutdown: Option<Function>,
}

impl LuaTableState {
    fn from_table(shared: &Rc<EngineShared>, table: &Table) -> Self {
        let field = |key: &str| table.get::<Option<Function>>(key).ok().flatten();
        LuaTableState {
            shared: Rc::clone(shared),
            initialize: field("initialize"),
            enter: field("enter"),
            handle_input: field("handleInput"),
            update: field("update"),
            draw: field("draw"),
            exit: field("exit"),
            shutdown: field("shutdown"),
        }
    }

    fn call(&self, context: &str, f: &Option<Function>, args: impl mlua::IntoLuaMulti) {
        if let Some(f) = f {
            if let Err(e) = f.call::<()>(args) {
                self.shared.log_callback_error(context, &e);
            }
        }
    }
}

impl State for LuaTableState {
    fn initialize(&mut self) {
        self.call("initialize", &self.initialize, ());
    }

    fn enter(&mut self) {
        self.call("enter", &self.enter, ());
    }

    fn handle_input(&mut self, _input: &InputState) {
        self.call("handleInput", &self.handle_input, ());
    }

    fn update(&mut self, dt: f64) {
        self.call("update", &self.update, dt);
    }

    fn draw(&mut self, _fb: &mut Framebuffer) {
        self.call("draw", &self.draw, ());
    }

    fn exit(&mut self) {
        self.call("exit", &self.exit, ());
    }

    fn shutdown(&mut self) {
        self.call("shutdown", &self.shutdown, ());
    }
}

/// Converts a Lua value into the small tagged variant the state machine's shared
/// context stores. Unsupported types (functions, userdata, nil) fall back to a
/// harmless `false` rather than failing the call — context slots are best-effort.
fn value_to_context(value: Value) -> ContextValue {
    match value {
        Value::String(s) => ContextValue::String(s.to_str().map(|s| s.to_string()).unwrap_or_default()),
        Value::Integer(i) => ContextValue::Number(i as f64),
        Value::Number(n) => ContextValue::Number(n),
        Value::Boolean(b) => ContextValue::Bool(b),
        Value::Table(t) => {
            let mut map = HashMap::new();
            for pair in t.pairs::<String, Value>().flatten() {
                let (k, v) = pair;
                map.insert(k, value_to_context(v));
            }
            ContextValue::Map(map)
        }
        _ => ContextValue::Bool(false),
    }
}

fn context_to_value(lua: &Lua, value: &ContextValue) -> mlua::Result<Value> {
    Ok(match value {
        ContextValue::String(s) => Value::String(lua.create_string(s)?),
        ContextValue::Number(n) => Value::Number(*n),
        ContextValue::Bool(b) => Value::Boolean(*b),
        ContextValue::Map(map) => {
            let t = lua.create_table()?;
            for (k, v) in map {
                t.set(k.as_str(), context_to_value(lua, v)?)?;
            }
            Value::Table(t)
        }
    })
}

/// Installs the `game` global: state registration/transitions, shared context, and
/// credits, all dispatched straight onto the façade's `GameStateMachine`.
pub fn install(lua: &Lua, shared: &Rc<EngineShared>) -> mlua::Result<()> {
    let game = lua.create_table()?;

    {
        let s = Rc::clone(shared);
        game.set(
            "registerState",
            lua.create_function(move |_, (name, table): (String, Table)| {
                let state = LuaTableState::from_table(&s, &table);
                s.state_machine
                    .register_state(&name, Box::new(state))
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "unregisterState",
            lua.create_function(move |_, name: String| {
                s.state_machine
                    .unregister_state(&name)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "start",
            lua.create_function(move |_, initial: String| {
                s.state_machine.start(&initial);
                Ok(())
            })?,
        )?;
    }

    // changeState/pushState/popState/popAllStates must go through the *deferred*
    // variants: a script normally calls these from inside a state's own
    // handleInput/update/draw callback, which is running with that state's
    // `Arc<Mutex<Box<dyn State>>>` locked (state_machine.rs's dispatch). The
    // immediate `GameStateMachine::change_state`/etc. call `pop_all_states`/`exit`,
    // which re-locks that same non-reentrant mutex and deadlocks the engine. The
    // `request_*` methods only ever queue (while inside a callback) or apply
    // through a fresh lock acquisition (when not), so they're always safe to call
    // from script (§4.10, §8 invariant 7).
    {
        let s = Rc::clone(shared);
        game.set(
            "changeState",
            lua.create_function(move |_, name: String| {
                s.state_machine
                    .request_change_state(&name)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "pushState",
            lua.create_function(move |_, name: String| {
                s.state_machine
                    .request_push_state(&name)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "popState",
            lua.create_function(move |_, ()| {
                s.state_machine.request_pop_state();
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "popAllStates",
            lua.create_function(move |_, ()| {
                s.state_machine.request_pop_all_states();
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "getStackDepth",
            lua.create_function(move |_, ()| Ok(s.state_machine.stack_depth() as i64))?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "drawPreviousState",
            lua.create_function(move |_, ()| {
                s.state_machine.draw_previous_state(&mut s.framebuffer.borrow_mut());
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "setContext",
            lua.create_function(move |_, (key, value): (String, Value)| {
                s.state_machine.set_context(&key, value_to_context(value));
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "getContext",
            lua.create_function(move |lua, key: String| match s.state_machine.get_context(&key) {
                Some(v) => context_to_value(lua, &v),
                None => Ok(Value::Nil),
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "hasContext",
            lua.create_function(move |_, key: String| Ok(s.state_machine.has_context(&key)))?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "clearContext",
            lua.create_function(move |_, key: String| {
                s.state_machine.clear_context(&key);
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "clearAllContext",
            lua.create_function(move |_, ()| {
                s.state_machine.clear_all_context();
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "addCredit",
            lua.create_function(move |_, (category, name, role): (String, String, String)| {
                s.state_machine.add_credit(&category, &name, &role);
                Ok(())
            })?,
        )?;
    }

    {
        let s = Rc::clone(shared);
        game.set(
            "exit",
            lua.create_function(move |_, ()| {
                s.state_machine.exit();
                Ok(())
            })?,
        )?;
    }

    lua.globals().set("game", game)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioMixer;
    use crate::game_state::GameStateMachine;
    use crate::palette;
    use crate::quit::QuitFlag;
    use std::sync::Arc;

    fn shared() -> Rc<EngineShared> {
        Rc::new(EngineShared::new(
            Rc::new(std::cell::RefCell::new(Framebuffer::new(16, 16))),
            Rc::new(std::cell::RefCell::new(palette::named("RetroForge 50"))),
            Rc::new(std::cell::RefCell::new(InputState::new())),
            Arc::new(AudioMixer::new()),
            Arc::new(GameStateMachine::new(true, QuitFlag::new(), "RetroForge", "v0.1")),
            true,
            QuitFlag::new(),
        ))
    }

    #[test]
    fn round_trips_scalars_through_context_conversion() {
        assert_eq!(value_to_context(Value::Boolean(true)), ContextValue::Bool(true));
        assert_eq!(value_to_context(Value::Integer(7)), ContextValue::Number(7.0));
        assert_eq!(value_to_context(Value::Number(1.5)), ContextValue::Number(1.5));
    }

    /// `game.changeState` called from inside a registered state's `handleInput`
    /// (the ordinary way a script requests a transition) must not deadlock: that
    /// callback is dispatched while `state_machine.rs` holds the state's own
    /// `Mutex` locked, so the binding has to go through the deferred
    /// `request_change_state` path rather than an immediate one that would
    /// re-lock it.
    #[test]
    fn change_state_from_inside_handle_input_does_not_deadlock() {
        let shared = shared();
        let lua = Lua::new();
        install(&lua, &shared).unwrap();

        let game: Table = lua.globals().get("game").unwrap();
        let register_state: Function = game.get("registerState").unwrap();
        let change_state: Function = game.get("changeState").unwrap();

        let a = lua.create_table().unwrap();
        a.set(
            "handleInput",
            lua.create_function(|lua, ()| {
                let game: Table = lua.globals().get("game")?;
                let change: Function = game.get("changeState")?;
                change.call::<()>("b")
            })
            .unwrap(),
        )
        .unwrap();
        register_state.call::<()>(("a", a)).unwrap();

        let b = lua.create_table().unwrap();
        register_state.call::<()>(("b", b)).unwrap();

        change_state.call::<()>("a").unwrap();

        // Mirrors engine.rs's per-tick dispatch order.
        shared.state_machine.handle_input(&InputState::new());
        shared.state_machine.update(0.016);
        assert_eq!(shared.state_machine.stack_depth(), 1);
        shared.state_machine.set_context("probe", ContextValue::Bool(true));
        assert!(shared.state_machine.has_context("probe"));

        // "a" queued a->b from handleInput; it applies at the top of the next
        // handle_input, not mid-callback.
        shared.state_machine.handle_input(&InputState::new());
        assert_eq!(shared.state_machine.stack_depth(), 1);
    }

    #[test]
    fn unsupported_value_falls_back_to_false() {
        assert_eq!(value_to_context(Value::Nil), ContextValue::Bool(false));
    }
}
