//! `rf.import(filename)` (§4.12 "Module import"): loads one of a cart's extra Lua
//! files as a registered state.
//!
//! Each imported module executes inside a fresh environment table whose undefined
//! reads fall through a chain — module locals, then a context table shared by every
//! import, then the host's own globals (`rf`, `game`, `string`, `math`, ...) — while
//! writes always land in the module's own environment (§9 "Module import isolation").
//! After the chunk runs once, its `_INIT`/`_ENTER`/`_HANDLE_INPUT`/`_UPDATE`/`_DRAW`/
//! `_EXIT`/`_DONE` globals become the lifecycle callbacks of a state registered under
//! a name derived from the filename.

use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use crate::input::InputState;
use crate::raster::Framebuffer;
use crate::state_machine::State;

use super::EngineShared;

const REQUIRED: &[&str] = &["_INIT", "_HANDLE_INPUT", "_UPDATE", "_DRAW", "_DONE"];

/// A state whose lifecycle callbacks are the `_INIT`/`_ENTER`/... globals left behind
/// in an imported module's environment after its chunk ran once. Errors raised by a
/// callback are caught here and routed to the shared debug log rather than
/// propagated (§7).
struct LuaModuleState {
    shared: Rc<EngineShared>,
    init: Function,
    enter: Option<Function>,
    handle_input: Function,
    update: Function,
    draw: Function,
    exit: Option<Function>,
    done: Function,
}

impl LuaModuleState {
    fn call_required(&self, context: &str, f: &Function, args: impl mlua::IntoLuaMulti) {
        if let Err(e) = f.call::<()>(args) {
            self.shared.log_callback_error(context, &e);
        }
    }

    fn call_optional(&self, context: &str, f: &Option<Function>, args: impl mlua::IntoLuaMulti) {
        if let Some(f) = f {
            self.call_required(context, f, args);
        }
    }
}

impl State for LuaModuleState {
    fn initialize(&mut self) {
        self.call_required("_INIT", &self.init, ());
    }

    fn enter(&mut self) {
        self.call_optional("_ENTER", &self.enter, ());
    }

    fn handle_input(&mut self, _input: &InputState) {
        self.call_required("_HANDLE_INPUT", &self.handle_input, ());
    }

    fn update(&mut self, dt: f64) {
        self.call_required("_UPDATE", &self.update, dt);
    }

    fn draw(&mut self, _fb: &mut Framebuffer) {
        self.call_required("_DRAW", &self.draw, ());
    }

    fn exit(&mut self) {
        self.call_optional("_EXIT", &self.exit, ());
    }

    fn shutdown(&mut self) {
        self.call_required("_DONE", &self.done, ());
    }
}

/// Derives a state name from a module filename: strips the directory, the
/// extension, and an optional trailing `_state`.
fn state_name_for(filename: &str) -> String {
    let stem = filename.rsplit('/').next().unwrap_or(filename);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);
    stem.strip_suffix("_state").unwrap_or(stem).to_string()
}

/// Finds a module's source among the cart's raw files, trying the name as given,
/// under `assets/`, and with `assets/` stripped, so callers can pass either form.
fn lookup_source(shared: &EngineShared, filename: &str) -> Option<Vec<u8>> {
    let files = shared.files.borrow();
    if let Some(bytes) = files.get(filename) {
        return Some(bytes.clone());
    }
    let prefixed = format!("assets/{filename}");
    if let Some(bytes) = files.get(&prefixed) {
        return Some(bytes.clone());
    }
    if let Some(stripped) = filename.strip_prefix("assets/") {
        if let Some(bytes) = files.get(stripped) {
            return Some(bytes.clone());
        }
    }
    None
}

/// Builds the fallback-chain environment a module's chunk runs under: its own table,
/// backed by `__index` that checks the shared `context` table and then the real
/// globals.
fn build_module_env(lua: &Lua, context: &Table) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    env.set("context", context.clone())?;

    let globals = lua.globals();
    let ctx = context.clone();
    let index = lua.create_function(move |_, (_env, key): (Table, Value)| {
        let v: Value = ctx.raw_get(key.clone())?;
        if !matches!(v, Value::Nil) {
            return Ok(v);
        }
        globals.get::<Value>(key)
    })?;

    let meta = lua.create_table()?;
    meta.set("__index", index)?;
    env.set_metatable(Some(meta));
    Ok(env)
}

fn import_module(lua: &Lua, shared: &Rc<EngineShared>, context: &Table, filename: &str) -> Result<(), String> {
    if shared.imported_modules.borrow().contains(filename) {
        return Ok(());
    }

    let source = lookup_source(shared, filename).ok_or_else(|| format!("module not found: {filename}"))?;
    let source = String::from_utf8_lossy(&source).into_owned();

    let env = build_module_env(lua, context).map_err(|e| e.to_string())?;
    lua.load(&source)
        .set_name(filename)
        .set_environment(env.clone())
        .exec()
        .map_err(|e| format!("{filename}: {e}"))?;

    let get = |key: &str| -> Option<Function> { env.get::<Option<Function>>(key).ok().flatten() };

    let missing: Vec<&str> = REQUIRED.iter().copied().filter(|key| get(key).is_none()).collect();
    if !missing.is_empty() {
        return Err(format!(
            "module '{filename}' is missing required function(s): {}",
            missing.join(", ")
        ));
    }

    let state = LuaModuleState {
        shared: Rc::clone(shared),
        init: get("_INIT").expect("checked above"),
        enter: get("_ENTER"),
        handle_input: get("_HANDLE_INPUT").expect("checked above"),
        update: get("_UPDATE").expect("checked above"),
        draw: get("_DRAW").expect("checked above"),
        exit: get("_EXIT"),
        done: get("_DONE").expect("checked above"),
    };

    let name = state_name_for(filename);
    shared
        .state_machine
        .register_state(&name, Box::new(state))
        .map_err(|e| e.to_string())?;
    shared.imported_modules.borrow_mut().insert(filename.to_string());
    Ok(())
}

/// Installs `rf.import` onto the already-created `rf` global table.
pub fn install(lua: &Lua, shared: &Rc<EngineShared>) -> mlua::Result<()> {
    let rf: Table = lua.globals().get("rf")?;
    let s = Rc::clone(shared);
    let context = lua.create_table()?;

    rf.set(
        "import",
        lua.create_function(move |lua, filename: String| {
            import_module(lua, &s, &context, &filename).map_err(mlua::Error::RuntimeError)
        })?,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_and_state_suffix() {
        assert_eq!(state_name_for("menu_state.lua"), "menu");
        assert_eq!(state_name_for("assets/boss.lua"), "boss");
        assert_eq!(state_name_for("gameplay.lua"), "gameplay");
    }
}
