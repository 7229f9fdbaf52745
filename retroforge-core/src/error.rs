//! Façade-level error type (§7 "Locality").
//!
//! Every subsystem below the façade treats invalid operations as no-ops and never
//! returns an error that needs propagating past its own boundary (§7). The façade is
//! the one place heterogeneous failures — a malformed cart, a script compile error, a
//! missing dev-mode folder — need to be reported to a human as a single "load failed"
//! outcome, so they're collected here instead of forcing every caller to match on
//! each subsystem's own error enum.

use std::fmt;

use crate::cart::archive::CartError;

/// A cart- or script-load failure surfaced by `Engine::load_cart`/`load_dev_folder`.
/// The previously loaded cart, if any, remains in place when this is returned.
#[derive(Debug)]
pub enum EngineError {
    Cart(CartError),
    Script(String),
    Io(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Cart(e) => write!(f, "cart load failed: {e}"),
            EngineError::Script(msg) => write!(f, "script load failed: {msg}"),
            EngineError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CartError> for EngineError {
    fn from(e: CartError) -> Self {
        EngineError::Cart(e)
    }
}

impl From<mlua::Error> for EngineError {
    fn from(e: mlua::Error) -> Self {
        EngineError::Script(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
