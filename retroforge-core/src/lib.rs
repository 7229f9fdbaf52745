//! Core runtime for the RetroForge fantasy console.
//!
//! A sandboxed virtual machine that loads a self-contained cart (script entry point,
//! sound-effect/music definitions, sprite pixel data, a manifest), drives it at a
//! fixed frame rate, and exposes a palette-indexed software framebuffer plus input,
//! audio, and a hierarchical game-state machine. Fully headless and testable; the
//! window, input device, and screenshot encoder are external collaborators
//! implementing the [`presenter`] traits.

pub mod audio;
pub mod bus;
pub mod cart;
pub mod config;
pub mod dev_watch;
pub mod engine;
pub mod error;
pub mod font;
pub mod game_state;
pub mod input;
pub mod palette;
pub mod peer_sync;
pub mod physics;
pub mod pool;
pub mod presenter;
pub mod quit;
pub mod raster;
pub mod runner;
pub mod scheduler;
pub mod script;
pub mod state_machine;

pub use engine::Engine;
pub use error::EngineError;
