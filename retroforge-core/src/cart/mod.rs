//! Cart data model: manifest and the three asset tables (§3, §4.8).

pub mod archive;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `manifest.json` at the root of a cart archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartManifest {
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(rename = "scale", default, skip_serializing_if = "Option::is_none")]
    pub default_scale: Option<i32>,
}

/// A sound-effect entry in `assets/sfx.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SfxTag {
    Sine,
    Noise,
    Thrust,
    Stopall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SfxDef {
    #[serde(rename = "type")]
    pub tag: SfxTag,
    #[serde(rename = "freq", default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    /// Duration in seconds; 0 means looped.
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_gain() -> f64 {
    1.0
}

/// A music track entry in `assets/music.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MusicDef {
    pub tokens: Vec<String>,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_bpm() -> f64 {
    120.0
}

/// A named mount point on a sprite, e.g. a muzzle or foot anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MountPoint {
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A sprite entry in `assets/sprites.json` (§3 "Sprite definition").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpriteDef {
    pub width: u32,
    pub height: u32,
    /// Row-major palette indices; `-1` is transparent.
    pub pixels: Vec<Vec<i32>>,
    #[serde(rename = "useCollision", default)]
    pub use_collision: bool,
    #[serde(rename = "mountPoints", default)]
    pub mount_points: Vec<MountPoint>,
    #[serde(rename = "isUI", default = "default_is_ui")]
    pub is_ui: bool,
    /// Lifetime in milliseconds; 0 means unlimited.
    #[serde(rename = "lifetime", default)]
    pub lifetime_ms: u64,
    /// Max simultaneous spawns; 0 means unlimited.
    #[serde(rename = "maxSpawn", default)]
    pub max_spawn: u32,
}

fn default_is_ui() -> bool {
    true
}

impl SpriteDef {
    /// Whether this sprite qualifies for pool management (§4.9): pooled sprites are
    /// never UI sprites and allow spawning more than ten concurrent instances.
    pub fn is_poolable(&self) -> bool {
        !self.is_ui && self.max_spawn > 10
    }
}

pub type SfxTable = BTreeMap<String, SfxDef>;
pub type MusicTable = BTreeMap<String, MusicDef>;
pub type SpriteTable = BTreeMap<String, SpriteDef>;

/// A fully decoded cart: manifest, the three asset tables, and every other file in
/// the archive keyed by its in-archive path (prefixed with `assets/`).
#[derive(Debug, Clone)]
pub struct Cart {
    pub manifest: CartManifest,
    pub sfx: SfxTable,
    pub music: MusicTable,
    pub sprites: SpriteTable,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Cart {
    /// A lexicographically sorted list of every non-asset-table file's in-archive
    /// key. Exposed so tests can assert on deterministic ordering.
    pub fn sorted_asset_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §6's documented JSON schemas use the authored-cart field names (`type`/`freq`,
    /// `scale`, and the sprite table's camelCase keys) rather than this crate's
    /// snake_case Rust field names; a hand-authored cart must deserialize using
    /// those names.
    #[test]
    fn manifest_reads_documented_scale_field_name() {
        let json = r#"{"title":"T","author":"A","description":"D","genre":"G","tags":[],"entry":"main.lua","scale":3}"#;
        let manifest: CartManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.default_scale, Some(3));
    }

    #[test]
    fn sfx_def_reads_documented_type_and_freq_field_names() {
        let json = r#"{"type":"sine","freq":220.0,"duration":0.2,"gain":0.5}"#;
        let sfx: SfxDef = serde_json::from_str(json).unwrap();
        assert_eq!(sfx.tag, SfxTag::Sine);
        assert_eq!(sfx.frequency, Some(220.0));
    }

    #[test]
    fn sprite_def_reads_documented_camel_case_field_names() {
        let json = r#"{
            "width": 2, "height": 1, "pixels": [[0, 1]],
            "useCollision": true, "mountPoints": [{"x":1,"y":0,"name":"muzzle"}],
            "isUI": false, "lifetime": 1000, "maxSpawn": 20
        }"#;
        let sprite: SpriteDef = serde_json::from_str(json).unwrap();
        assert!(sprite.use_collision);
        assert!(!sprite.is_ui);
        assert_eq!(sprite.lifetime_ms, 1000);
        assert_eq!(sprite.max_spawn, 20);
        assert_eq!(sprite.mount_points[0].name.as_deref(), Some("muzzle"));
        assert!(sprite.is_poolable());
    }
}
