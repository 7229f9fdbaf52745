//! The engine façade (§4.13): assembles every component, owns the tick, and is the
//! one place a host (the desktop binary, or a headless test) needs to touch.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::SystemTime;

use crate::audio::AudioMixer;
use crate::bus::EventBus;
use crate::cart::archive::{read_cart, CartError};
use crate::cart::{Cart, CartManifest};
use crate::config::RuntimeConfig;
use crate::dev_watch::{DevWatcher, PollingWatcher};
use crate::error::EngineError;
use crate::game_state::GameStateMachine;
use crate::input::InputState;
use crate::palette;
use crate::peer_sync::PeerSync;
use crate::physics::PhysicsWorld;
use crate::quit::QuitFlag;
use crate::raster::Framebuffer;
use crate::runner::Runner;
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::script::{EngineShared, ScriptEngine};

const ENGINE_NAME: &str = "RetroForge";
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_DEBUG_LOG_LINES: usize = 200;

/// Assembles palette, framebuffer, event bus, scheduler/runner, script VM, and game
/// state machine, and drives them one tick at a time. Generic over the clock so tests
/// can inject a fake one; production code always uses [`SystemClock`].
pub struct Engine<C: Clock = SystemClock> {
    shared: Rc<EngineShared>,
    bus: Arc<EventBus>,
    runner: Runner<C>,
    script: Option<ScriptEngine>,
    manifest: Option<CartManifest>,
    dev_watcher: Option<PollingWatcher>,
    dev_root: Option<PathBuf>,
    quit: QuitFlag,
    /// §3 "optional physics world handle": no solver ships in this crate, so this
    /// starts `None` and stays that way unless a host calls [`Engine::set_physics`].
    physics: Option<Box<dyn PhysicsWorld>>,
    /// §3 "optional peer-sync handle": same story as `physics`, via
    /// [`Engine::set_peer_sync`].
    peer_sync: Option<Box<dyn PeerSync>>,
}

impl Engine<SystemClock> {
    /// Build an engine with the real wall clock. `headless` selects whether the
    /// mixer opens a real `cpal` device or stays silent (tests, CI).
    pub fn new(config: RuntimeConfig, debug: bool, headless: bool) -> mlua::Result<Self> {
        Self::with_clock(config, debug, headless, SystemClock)
    }
}

impl<C: Clock> Engine<C> {
    pub fn with_clock(config: RuntimeConfig, debug: bool, headless: bool, clock: C) -> mlua::Result<Self> {
        let framebuffer = Rc::new(RefCell::new(Framebuffer::new(config.width, config.height)));
        let palette = Rc::new(RefCell::new(palette::named(&config.palette)));
        let input = Rc::new(RefCell::new(InputState::new()));
        let bus = Arc::new(EventBus::new());
        let quit = QuitFlag::new();

        let mut audio = AudioMixer::new();
        if headless {
            audio.init_headless();
        } else if audio.init().is_err() {
            audio.init_headless();
        }
        let audio = Arc::new(audio);

        let state_machine = Arc::new(GameStateMachine::new(
            debug,
            quit.clone(),
            ENGINE_NAME,
            ENGINE_VERSION,
        ));

        let shared = Rc::new(EngineShared::new(
            framebuffer,
            palette,
            input,
            audio,
            state_machine,
            debug,
            quit.clone(),
        ));

        let script = ScriptEngine::new(Rc::clone(&shared))?;

        let scheduler = Scheduler::new(config.fps, clock);
        let runner = Runner::new(scheduler, Arc::clone(&bus));

        Ok(Engine {
            shared,
            bus,
            runner,
            script: Some(script),
            manifest: None,
            dev_watcher: None,
            dev_root: None,
            quit,
            physics: None,
            peer_sync: None,
        })
    }

    /// Attach a physics backend; replaces whatever was attached before.
    pub fn set_physics(&mut self, world: Box<dyn PhysicsWorld>) {
        self.physics = Some(world);
    }

    /// Attach a peer-sync transport; replaces whatever was attached before.
    pub fn set_peer_sync(&mut self, sync: Box<dyn PeerSync>) {
        self.peer_sync = Some(sync);
    }

    pub fn shared(&self) -> &Rc<EngineShared> {
        &self.shared
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn input(&self) -> &Rc<RefCell<InputState>> {
        &self.shared.input
    }

    pub fn framebuffer(&self) -> &Rc<RefCell<Framebuffer>> {
        &self.shared.framebuffer
    }

    pub fn audio(&self) -> &Arc<AudioMixer> {
        &self.shared.audio
    }

    pub fn quit(&self) -> &QuitFlag {
        &self.quit
    }

    pub fn manifest(&self) -> Option<&CartManifest> {
        self.manifest.as_ref()
    }

    pub fn target_fps(&self) -> u32 {
        self.runner.target_fps()
    }

    /// Read `path`'s bytes and load it as a cart archive.
    pub fn load_cart_file(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let bytes = std::fs::read(path)?;
        self.load_cart(&bytes)
    }

    /// Load an already-decoded cart archive. On failure, whatever cart was
    /// previously loaded stays in place (§4.13, §7).
    pub fn load_cart(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let cart = read_cart(bytes)?;
        self.load_from_cart(cart)
    }

    /// Point the engine at a development folder (`manifest.json` + `assets/`) and
    /// load it once, arming the debounced reload watcher for subsequent ticks.
    pub fn load_dev_folder(&mut self, root: impl Into<PathBuf>) -> Result<(), EngineError> {
        let root = root.into();
        let cart = read_dev_folder(&root)?;
        self.load_from_cart(cart)?;
        self.dev_watcher = Some(PollingWatcher::new(&root));
        self.dev_root = Some(root);
        Ok(())
    }

    /// Shared by both load paths: set palette, replace asset tables/files, tear down
    /// and rebuild the script VM, then run the entry script and its init (§4.13).
    fn load_from_cart(&mut self, cart: Cart) -> Result<(), EngineError> {
        if let Some(name) = &cart.manifest.palette {
            *self.shared.palette.borrow_mut() = palette::named(name);
        }
        self.shared.set_assets(cart.sfx, cart.music, cart.sprites);
        self.shared.set_files(cart.files);

        // Tearing down the previous VM drops every Lua-side registered state along
        // with it; a fresh one is rebuilt against the same shared resources.
        self.script = None;
        let script = ScriptEngine::new(Rc::clone(&self.shared)).map_err(EngineError::from)?;

        let source = lookup_entry(&self.shared, &cart.manifest.entry)
            .ok_or_else(|| EngineError::Script(format!("entry script not found: {}", cart.manifest.entry)))?;
        let source = String::from_utf8_lossy(&source).into_owned();

        script
            .run_entry(&source, &cart.manifest.entry)
            .map_err(EngineError::from)?;
        script.call_bare_init().map_err(EngineError::from)?;

        self.script = Some(script);
        self.manifest = Some(cart.manifest);
        Ok(())
    }

    /// Check the dev-mode watcher once; on a debounced change, reload the folder and
    /// append a short log line to the bounded debug log (§4.13).
    fn poll_dev_reload(&mut self) {
        let Some(root) = self.dev_root.clone() else { return };
        let fired = match &mut self.dev_watcher {
            Some(watcher) => watcher.poll(SystemTime::now()),
            None => false,
        };
        if !fired {
            return;
        }
        match read_dev_folder(&root).and_then(|cart| self.load_from_cart(cart)) {
            Ok(()) => self.log(format!("dev reload: {}", root.display())),
            Err(e) => self.log(format!("dev reload failed: {e}")),
        }
    }

    fn log(&self, line: String) {
        let mut log = self.shared.debug_log.borrow_mut();
        log.push_back(line);
        while log.len() > MAX_DEBUG_LOG_LINES {
            log.pop_front();
        }
    }

    /// Run exactly one frame: dev-mode reload check, physics step, peer-sync frame
    /// tick (both are no-ops unless a host attached a backend via `set_physics`/
    /// `set_peer_sync`, since neither backend ships in this crate per §1), then drive
    /// the state machine (or the bare script callbacks, for carts that never push a
    /// state) per §4.13.
    pub fn tick(&mut self) {
        self.poll_dev_reload();
        self.shared.frame_count.set(self.shared.frame_count.get() + 1);

        self.runner.step();
        let dt = 1.0 / self.runner.target_fps().max(1) as f64;

        if let Some(physics) = &mut self.physics {
            physics.step(dt);
        }
        if let Some(peer_sync) = &mut self.peer_sync {
            peer_sync.on_frame_tick();
        }

        if self.shared.state_machine.stack_depth() > 0 {
            let input = self.shared.input.borrow().clone();
            self.shared.state_machine.handle_input(&input);
            self.shared.state_machine.update(dt);
            self.shared.state_machine.draw(&mut self.shared.framebuffer.borrow_mut());
        } else if let Some(script) = &self.script {
            let _ = script.call_bare_update(dt);
            let _ = script.call_bare_draw();
        }
    }

    /// Step `n` frames headlessly; with an injected clock this is fully
    /// deterministic (§4.13 "Headless stepping").
    pub fn run_frames(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Disable dev mode, close peer-sync, drop the script VM, release resources
    /// (§4.13 "Shutdown").
    pub fn shutdown(&mut self) {
        self.dev_watcher = None;
        self.dev_root = None;
        if let Some(peer_sync) = &mut self.peer_sync {
            peer_sync.close();
        }
        self.peer_sync = None;
        self.physics = None;
        self.script = None;
    }
}

fn read_dev_folder(root: &Path) -> Result<Cart, EngineError> {
    let manifest_bytes =
        std::fs::read(root.join("manifest.json")).map_err(|e| EngineError::Io(e.to_string()))?;
    let manifest: CartManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| EngineError::Cart(CartError::InvalidManifest(e.to_string())))?;

    let sfx = read_json_table(root, "sfx.json").unwrap_or_default();
    let music = read_json_table(root, "music.json").unwrap_or_default();
    let sprites = read_json_table(root, "sprites.json").unwrap_or_default();

    let mut files = std::collections::BTreeMap::new();
    let assets_dir = root.join("assets");
    if let Ok(entries) = std::fs::read_dir(&assets_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if matches!(name, "sfx.json" | "music.json" | "sprites.json") {
                continue;
            }
            if let Ok(bytes) = std::fs::read(&path) {
                files.insert(format!("assets/{name}"), bytes);
            }
        }
    }

    Ok(Cart {
        manifest,
        sfx,
        music,
        sprites,
        files,
    })
}

fn read_json_table<T: serde::de::DeserializeOwned>(root: &Path, filename: &str) -> Option<T> {
    let bytes = std::fs::read(root.join("assets").join(filename)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Finds the entry script among a cart's raw files, trying the manifest path as
/// given, under `assets/`, and with `assets/` stripped.
fn lookup_entry(shared: &EngineShared, entry: &str) -> Option<Vec<u8>> {
    let files = shared.files.borrow();
    if let Some(bytes) = files.get(entry) {
        return Some(bytes.clone());
    }
    let prefixed = format!("assets/{entry}");
    if let Some(bytes) = files.get(&prefixed) {
        return Some(bytes.clone());
    }
    if let Some(stripped) = entry.strip_prefix("assets/") {
        if let Some(bytes) = files.get(stripped) {
            return Some(bytes.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::archive::write_cart;
    use crate::cart::{CartManifest, MusicTable, SfxTable, SpriteTable};
    use std::cell::RefCell as StdRefCell;
    use std::time::{Duration, Instant};

    struct FakeClock {
        current: StdRefCell<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            FakeClock {
                current: StdRefCell::new(Instant::now()),
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            let mut cur = self.current.borrow_mut();
            *cur += Duration::from_micros(1);
            *cur
        }

        fn sleep(&self, _d: Duration) {}
    }

    fn sample_bytes(entry_source: &str) -> Vec<u8> {
        let mut files = std::collections::BTreeMap::new();
        files.insert("main.lua".to_string(), entry_source.as_bytes().to_vec());
        let cart = Cart {
            manifest: CartManifest {
                title: "Test".into(),
                author: "tester".into(),
                description: "".into(),
                genre: "".into(),
                tags: vec![],
                entry: "main.lua".into(),
                palette: None,
                default_scale: None,
            },
            sfx: SfxTable::new(),
            music: MusicTable::new(),
            sprites: SpriteTable::new(),
            files,
        };
        write_cart(&cart).unwrap()
    }

    #[test]
    fn headless_engine_runs_frames_without_panicking() {
        let mut engine = Engine::with_clock(RuntimeConfig::default(), true, true, FakeClock::new()).unwrap();
        engine
            .load_cart(&sample_bytes("function _UPDATE(dt) end\nfunction _DRAW() end"))
            .unwrap();
        engine.run_frames(5);
        assert_eq!(engine.manifest().unwrap().title, "Test");
    }

    #[test]
    fn bare_init_runs_once_on_load() {
        let mut engine = Engine::with_clock(RuntimeConfig::default(), true, true, FakeClock::new()).unwrap();
        engine
            .load_cart(&sample_bytes("function _INIT() rf.poke(0, 42) end"))
            .unwrap();
        assert_eq!(engine.shared().memory.borrow().peek(0), 42);
    }

    #[test]
    fn attached_physics_and_peer_sync_are_driven_once_per_tick() {
        use crate::peer_sync::PeerSync;
        use crate::physics::PhysicsWorld;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingPhysics(Arc<AtomicU32>);
        impl PhysicsWorld for CountingPhysics {
            fn step(&mut self, _dt: f64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        struct CountingPeerSync(Arc<AtomicU32>);
        impl PeerSync for CountingPeerSync {
            fn on_frame_tick(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn delta(&mut self) -> Option<Vec<u8>> {
                None
            }
        }

        let physics_steps = Arc::new(AtomicU32::new(0));
        let peer_ticks = Arc::new(AtomicU32::new(0));

        let mut engine = Engine::with_clock(RuntimeConfig::default(), true, true, FakeClock::new()).unwrap();
        engine.set_physics(Box::new(CountingPhysics(Arc::clone(&physics_steps))));
        engine.set_peer_sync(Box::new(CountingPeerSync(Arc::clone(&peer_ticks))));
        engine
            .load_cart(&sample_bytes("function _UPDATE(dt) end\nfunction _DRAW() end"))
            .unwrap();
        engine.run_frames(3);

        assert_eq!(physics_steps.load(Ordering::SeqCst), 3);
        assert_eq!(peer_ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn load_failure_keeps_previous_cart() {
        let mut engine = Engine::with_clock(RuntimeConfig::default(), true, true, FakeClock::new()).unwrap();
        engine.load_cart(&sample_bytes("function _UPDATE(dt) end")).unwrap();
        assert!(engine.load_cart(b"not a zip file").is_err());
        assert_eq!(engine.manifest().unwrap().title, "Test");
    }
}
