//! Runtime configuration seeded from environment variables (§6).
//!
//! A small plain struct built once at startup from `std::env`, with every field
//! independently overridable and falling back to a documented default when unset or
//! unparseable.

/// The four environment variables §6 documents, and their defaults.
pub const ENV_WIDTH: &str = "RETROFORGE_WIDTH";
pub const ENV_HEIGHT: &str = "RETROFORGE_HEIGHT";
pub const ENV_FPS: &str = "RETROFORGE_FPS";
pub const ENV_PALETTE: &str = "RETROFORGE_PALETTE";

pub const DEFAULT_WIDTH: u32 = 480;
pub const DEFAULT_HEIGHT: u32 = 270;
pub const DEFAULT_FPS: u32 = 60;
pub const DEFAULT_PALETTE: &str = "RetroForge 50";

/// Engine-wide tunables that may be overridden by environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub palette: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            palette: DEFAULT_PALETTE.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Build a config from the process environment, falling back to defaults for any
    /// variable that is unset or fails to parse.
    pub fn from_env() -> Self {
        Self::from_env_lookup(|name| std::env::var(name).ok())
    }

    /// Testable variant of `from_env` that takes an injectable lookup function
    /// instead of touching the real process environment.
    pub fn from_env_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = RuntimeConfig::default();
        if let Some(w) = lookup(ENV_WIDTH).and_then(|s| s.parse().ok()) {
            cfg.width = w;
        }
        if let Some(h) = lookup(ENV_HEIGHT).and_then(|s| s.parse().ok()) {
            cfg.height = h;
        }
        if let Some(f) = lookup(ENV_FPS).and_then(|s| s.parse().ok()) {
            cfg.fps = f;
        }
        if let Some(p) = lookup(ENV_PALETTE) {
            cfg.palette = p;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.width, 480);
        assert_eq!(cfg.height, 270);
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.palette, "RetroForge 50");
    }

    #[test]
    fn overrides_apply_per_variable() {
        let mut vars = HashMap::new();
        vars.insert(ENV_WIDTH.to_string(), "640".to_string());
        vars.insert(ENV_PALETTE.to_string(), "grayscale".to_string());
        let cfg = RuntimeConfig::from_env_lookup(|name| vars.get(name).cloned());
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.height, DEFAULT_HEIGHT);
        assert_eq!(cfg.palette, "grayscale");
    }

    #[test]
    fn unparseable_value_falls_back_to_default() {
        let mut vars = HashMap::new();
        vars.insert(ENV_FPS.to_string(), "not-a-number".to_string());
        let cfg = RuntimeConfig::from_env_lookup(|name| vars.get(name).cloned());
        assert_eq!(cfg.fps, DEFAULT_FPS);
    }
}
