//! The embedded scripting bridge (§4.12).
//!
//! Carts are scripted in Lua via `mlua`: its `Value` already is the "small tagged
//! variant (string, number, boolean, sequence, map, handle)" Design Note §9 calls
//! for, so binding code converts at each function boundary instead of inventing a
//! parallel enum. Two namespaces are installed as Lua globals: `rf` (drawing, input,
//! audio, math, memory, sprite editing) and `game` (the state-machine surface).

pub mod game_api;
pub mod memory;
pub mod module;
pub mod rf;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use mlua::Lua;

use crate::audio::AudioMixer;
use crate::cart::{MusicTable, SfxTable, SpriteDef, SpriteTable};
use crate::game_state::GameStateMachine;
use crate::input::InputState;
use crate::palette::Palette;
use crate::quit::QuitFlag;
use crate::raster::Framebuffer;
use memory::Memory;

/// `rf.cursor`/`rf.color`/bare `rf.print` shared drawing-cursor state.
#[derive(Clone, Copy, Debug)]
pub struct DrawCursor {
    pub x: i32,
    pub y: i32,
    pub origin_x: i32,
    pub color: u8,
}

impl Default for DrawCursor {
    fn default() -> Self {
        DrawCursor {
            x: 0,
            y: 0,
            origin_x: 0,
            color: 15,
        }
    }
}

/// Every resource the `rf`/`game` bindings close over. Resources genuinely shared
/// across threads (audio, the state machine) are handed in as `Arc`s built by the
/// façade; resources the script VM alone ever touches are plain `Rc<RefCell<_>>`,
/// since the VM itself is single-threaded and `!Send` (§5).
pub struct EngineShared {
    pub framebuffer: Rc<RefCell<Framebuffer>>,
    pub palette: Rc<RefCell<Palette>>,
    pub input: Rc<RefCell<InputState>>,
    pub audio: Arc<AudioMixer>,
    pub state_machine: Arc<GameStateMachine>,
    pub memory: Rc<RefCell<Memory>>,
    pub cursor: Rc<RefCell<DrawCursor>>,
    /// `rf.pal`'s 256-entry remap table; `None` means "no remap for this index".
    pub pal_map: Rc<RefCell<[Option<u8>; 256]>>,
    pub rng: Rc<Cell<u32>>,
    pub sprites: Rc<RefCell<BTreeMap<String, SpriteDef>>>,
    pub sfx: Rc<RefCell<SfxTable>>,
    pub music: Rc<RefCell<MusicTable>>,
    pub debug: bool,
    pub debug_log: Rc<RefCell<VecDeque<String>>>,
    pub quit: QuitFlag,
    pub start_time: Instant,
    pub frame_count: Rc<Cell<u64>>,
    /// Every file the loaded cart carries, keyed by its archive path, so
    /// `rf.import` can resolve a module filename without re-opening the archive
    /// (§4.12 "Module import").
    pub files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
    /// Filenames already imported this cart lifetime; re-importing is a no-op
    /// (§4.12 "Module import is idempotent").
    pub imported_modules: Rc<RefCell<HashSet<String>>>,
}

impl EngineShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        framebuffer: Rc<RefCell<Framebuffer>>,
        palette: Rc<RefCell<Palette>>,
        input: Rc<RefCell<InputState>>,
        audio: Arc<AudioMixer>,
        state_machine: Arc<GameStateMachine>,
        debug: bool,
        quit: QuitFlag,
    ) -> Self {
        EngineShared {
            framebuffer,
            palette,
            input,
            audio,
            state_machine,
            memory: Rc::new(RefCell::new(Memory::new())),
            cursor: Rc::new(RefCell::new(DrawCursor::default())),
            pal_map: Rc::new(RefCell::new([None; 256])),
            rng: Rc::new(Cell::new(0x1234_5678)),
            sprites: Rc::new(RefCell::new(BTreeMap::new())),
            sfx: Rc::new(RefCell::new(SfxTable::new())),
            music: Rc::new(RefCell::new(MusicTable::new())),
            debug,
            debug_log: Rc::new(RefCell::new(VecDeque::new())),
            quit,
            start_time: Instant::now(),
            frame_count: Rc::new(Cell::new(0)),
            files: Rc::new(RefCell::new(BTreeMap::new())),
            imported_modules: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// Replace the asset tables wholesale, as happens on cart load / dev-mode reload
    /// (§5 "Shared resources": re-assigned atomically as whole-map replacement).
    pub fn set_assets(&self, sfx: SfxTable, music: MusicTable, sprites: SpriteTable) {
        *self.sfx.borrow_mut() = sfx;
        *self.music.borrow_mut() = music;
        *self.sprites.borrow_mut() = sprites;
    }

    /// Replace the raw file table, as happens on cart load / dev-mode reload. Clears
    /// the imported-module set so a reloaded cart's modules load fresh.
    pub fn set_files(&self, files: BTreeMap<String, Vec<u8>>) {
        *self.files.borrow_mut() = files;
        self.imported_modules.borrow_mut().clear();
    }

    /// §7 "script user errors inside lifecycle callbacks": append to the bounded
    /// debug log in development mode, suppress in release mode — either way the
    /// frame loop keeps running.
    pub fn log_callback_error(&self, context: &str, err: &mlua::Error) {
        if self.debug {
            self.debug_log.borrow_mut().push_back(format!("{context}: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette;

    fn shared(debug: bool) -> Rc<EngineShared> {
        Rc::new(EngineShared::new(
            Rc::new(RefCell::new(Framebuffer::new(16, 16))),
            Rc::new(RefCell::new(palette::named("RetroForge 50"))),
            Rc::new(RefCell::new(InputState::new())),
            Arc::new(AudioMixer::new()),
            Arc::new(GameStateMachine::new(true, QuitFlag::new(), "RetroForge", "v0.1")),
            debug,
            QuitFlag::new(),
        ))
    }

    #[test]
    fn callback_error_is_logged_only_in_debug_mode() {
        let err = mlua::Error::RuntimeError("boom".to_string());

        let quiet = shared(false);
        quiet.log_callback_error("update", &err);
        assert!(quiet.debug_log.borrow().is_empty());

        let loud = shared(true);
        loud.log_callback_error("update", &err);
        assert_eq!(loud.debug_log.borrow().len(), 1);
        assert!(loud.debug_log.borrow()[0].contains("update"));
    }
}

/// Owns the Lua VM for one loaded cart and the bindings installed into it.
pub struct ScriptEngine {
    lua: Lua,
    shared: Rc<EngineShared>,
}

impl ScriptEngine {
    /// Construct a fresh VM with `rf` and `game` installed as globals.
    pub fn new(shared: Rc<EngineShared>) -> mlua::Result<Self> {
        let lua = Lua::new();
        rf::install(&lua, &shared)?;
        game_api::install(&lua, &shared)?;
        module::install(&lua, &shared)?;
        Ok(ScriptEngine { lua, shared })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn shared(&self) -> &Rc<EngineShared> {
        &self.shared
    }

    /// Compile and run `source` as the cart's entry chunk.
    pub fn run_entry(&self, source: &str, chunk_name: &str) -> mlua::Result<()> {
        self.lua.load(source).set_name(chunk_name).exec()
    }

    /// Call a bare global `_INIT()` if the entry chunk defines one, for carts that
    /// drive everything from bare callbacks rather than `game.registerState` (§4.13
    /// "load the entry script and call its init").
    pub fn call_bare_init(&self) -> mlua::Result<()> {
        if let Ok(f) = self.lua.globals().get::<mlua::Function>("_INIT") {
            f.call::<()>(())?;
        }
        Ok(())
    }

    /// Call a bare global `_UPDATE(dt)` if the cart defines one, for compatibility
    /// with carts that never push a state onto the state machine (§4.13).
    pub fn call_bare_update(&self, dt: f64) -> mlua::Result<()> {
        if let Ok(f) = self.lua.globals().get::<mlua::Function>("_UPDATE") {
            f.call::<()>(dt)?;
        }
        Ok(())
    }

    pub fn call_bare_draw(&self) -> mlua::Result<()> {
        if let Ok(f) = self.lua.globals().get::<mlua::Function>("_DRAW") {
            f.call::<()>(())?;
        }
        Ok(())
    }
}
