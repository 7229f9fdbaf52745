//! Desktop presenter binary (§4.13 external surface, §6 CLI/env).
//!
//! Opens a window, blits the engine's framebuffer into it through `pixels`, forwards
//! keyboard state into `InputState`, and wires a screenshot hotkey. Everything about
//! *what* to draw lives in `retroforge-core`; this binary only ever touches the
//! window, the keyboard, and the filesystem for screenshots.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use retroforge_core::config::RuntimeConfig;
use retroforge_core::presenter::ScreenshotSink;
use retroforge_core::Engine;

const DEFAULT_SCALE: u32 = 3;

/// Maps a physical key to one of the six logical buttons (§4.4), arrows plus two
/// action buttons, matching the layout scripted carts in the pack expect.
fn button_for_key(key: KeyCode) -> Option<usize> {
    match key {
        KeyCode::ArrowUp => Some(0),
        KeyCode::ArrowDown => Some(1),
        KeyCode::ArrowLeft => Some(2),
        KeyCode::ArrowRight => Some(3),
        KeyCode::KeyZ => Some(4),
        KeyCode::KeyX => Some(5),
        _ => None,
    }
}

struct Args {
    cart_path: Option<PathBuf>,
    dev_folder: Option<PathBuf>,
    scale: Option<u32>,
    debug: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        cart_path: None,
        dev_folder: None,
        scale: None,
        debug: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dev" => args.dev_folder = iter.next().map(PathBuf::from),
            "--scale" => args.scale = iter.next().and_then(|s| s.parse().ok()),
            "--debug" => args.debug = true,
            other => args.cart_path = Some(PathBuf::from(other)),
        }
    }
    args
}

/// Holds the open window and its `pixels` surface. Both are `None` until `resumed`
/// fires, per winit 0.30's lazily-surfaced `ApplicationHandler` contract.
struct App {
    engine: Engine,
    scale: u32,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels>,
}

impl App {
    fn window_size(&self) -> (u32, u32) {
        let fb = self.engine.framebuffer().borrow();
        (fb.width() * self.scale, fb.height() * self.scale)
    }

    fn render(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else { return };
        let fb = self.engine.framebuffer().borrow();
        pixels.frame_mut().copy_from_slice(fb.pixels());
        if let Err(e) = pixels.render() {
            log::error!("pixels render failed: {e}");
        }
    }

    fn take_screenshot(&mut self) {
        let name = format!("screenshot-{}.png", Local::now().format("%Y%m%d-%H%M%S"));
        let fb = self.engine.framebuffer().borrow();
        let (w, h) = (fb.width(), fb.height());
        let rgba = fb.pixels().to_vec();
        drop(fb);
        self.save_screenshot(&name, &rgba, w, h);
    }
}

impl ScreenshotSink for App {
    fn save_screenshot(&mut self, name: &str, rgba: &[u8], width: u32, height: u32) {
        match image::RgbaImage::from_raw(width, height, rgba.to_vec()) {
            Some(img) => {
                if let Err(e) = img.save(name) {
                    log::warn!("screenshot write failed: {e}");
                }
            }
            None => log::warn!("screenshot buffer size mismatch for {width}x{height}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let (w, h) = self.window_size();
        let attrs = Window::default_attributes()
            .with_title("RetroForge")
            .with_inner_size(winit::dpi::LogicalSize::new(w as f64, h as f64));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));

        let fb = self.engine.framebuffer().borrow();
        let surface = SurfaceTexture::new(w, h, Arc::clone(&window));
        let pixels = Pixels::new(fb.width(), fb.height(), surface).expect("create pixels surface");
        drop(fb);

        self.window = Some(window);
        self.pixels = Some(pixels);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.engine.quit().request();
            }
            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    let _ = pixels.resize_surface(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else { return };
                if code == KeyCode::F12 && event.state == ElementState::Pressed && !event.repeat {
                    self.take_screenshot();
                    return;
                }
                if let Some(button) = button_for_key(code) {
                    let down = event.state == ElementState::Pressed;
                    self.engine.input().borrow_mut().set(button, down);
                }
            }
            WindowEvent::Focused(false) => {
                let mut input = self.engine.input().borrow_mut();
                for i in 0..retroforge_core::input::BUTTON_COUNT {
                    input.set(i, false);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render();
            }
            _ => {}
        }

        if self.engine.quit().requested() {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // `Engine::tick` paces itself against the scheduler's target FPS internally
        // (the runner sleeps out the residual frame time), so this loop just keeps
        // feeding it frames back to back rather than driving its own timer.
        self.engine.tick();
        self.engine.input().borrow_mut().step();

        if self.engine.quit().requested() {
            event_loop.exit();
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args();

    let config = RuntimeConfig::from_env();
    let mut engine = Engine::new(config, args.debug, false)?;

    match (&args.dev_folder, &args.cart_path) {
        (Some(folder), _) => engine.load_dev_folder(folder.clone()),
        (None, Some(path)) => engine.load_cart_file(path),
        (None, None) => {
            eprintln!("usage: retroforge-desktop <cart.rfcart> | --dev <folder> [--scale N] [--debug]");
            std::process::exit(2);
        }
    }?;

    let scale = args
        .scale
        .or_else(|| engine.manifest().and_then(|m| m.default_scale).map(|s| s.max(1) as u32))
        .unwrap_or(DEFAULT_SCALE);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        engine,
        scale,
        window: None,
        pixels: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}
