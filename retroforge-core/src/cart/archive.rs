//! ZIP-shaped cart archive codec (§4.8).

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{Cart, CartManifest, MusicTable, SfxTable, SpriteTable};

const MANIFEST_PATH: &str = "manifest.json";
const SFX_PATH: &str = "assets/sfx.json";
const MUSIC_PATH: &str = "assets/music.json";
const SPRITES_PATH: &str = "assets/sprites.json";

/// Failure reading or writing a cart archive.
#[derive(Debug)]
pub enum CartError {
    Io(String),
    Zip(String),
    MissingManifest,
    InvalidManifest(String),
}

impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartError::Io(msg) => write!(f, "cart io error: {msg}"),
            CartError::Zip(msg) => write!(f, "cart archive error: {msg}"),
            CartError::MissingManifest => write!(f, "cart archive has no manifest.json"),
            CartError::InvalidManifest(msg) => write!(f, "invalid manifest.json: {msg}"),
        }
    }
}

impl std::error::Error for CartError {}

impl From<std::io::Error> for CartError {
    fn from(e: std::io::Error) -> Self {
        CartError::Io(e.to_string())
    }
}

impl From<zip::result::ZipError> for CartError {
    fn from(e: zip::result::ZipError) -> Self {
        CartError::Zip(e.to_string())
    }
}

/// Serialize `cart` into a ZIP-shaped byte buffer: `manifest.json`, the three asset
/// tables (always present, pretty-printed, even when empty), then every other file.
pub fn write_cart(cart: &Cart) -> Result<Vec<u8>, CartError> {
    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer = ZipWriter::new(cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file(MANIFEST_PATH, options)?;
        writer.write_all(&serde_json::to_vec_pretty(&cart.manifest).map_err(to_io)?)?;

        writer.start_file(SFX_PATH, options)?;
        writer.write_all(&serde_json::to_vec_pretty(&cart.sfx).map_err(to_io)?)?;

        writer.start_file(MUSIC_PATH, options)?;
        writer.write_all(&serde_json::to_vec_pretty(&cart.music).map_err(to_io)?)?;

        writer.start_file(SPRITES_PATH, options)?;
        writer.write_all(&serde_json::to_vec_pretty(&cart.sprites).map_err(to_io)?)?;

        for (name, bytes) in &cart.files {
            writer.start_file(name, options)?;
            writer.write_all(bytes)?;
        }

        writer.finish()?;
    }
    Ok(buf)
}

fn to_io(e: serde_json::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// Decode a cart archive. The manifest must parse or this fails; the three asset
/// tables silently fall back to an empty map on a JSON error or absence (§4.8).
/// Every other entry is collected verbatim into `files`.
pub fn read_cart(bytes: &[u8]) -> Result<Cart, CartError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let manifest_bytes = read_entry(&mut archive, MANIFEST_PATH).ok_or(CartError::MissingManifest)?;
    let manifest: CartManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| CartError::InvalidManifest(e.to_string()))?;

    let sfx: SfxTable = read_entry(&mut archive, SFX_PATH)
        .and_then(|b| serde_json::from_slice(&b).ok())
        .unwrap_or_default();
    let music: MusicTable = read_entry(&mut archive, MUSIC_PATH)
        .and_then(|b| serde_json::from_slice(&b).ok())
        .unwrap_or_default();
    let sprites: SpriteTable = read_entry(&mut archive, SPRITES_PATH)
        .and_then(|b| serde_json::from_slice(&b).ok())
        .unwrap_or_default();

    let reserved = [MANIFEST_PATH, SFX_PATH, MUSIC_PATH, SPRITES_PATH];
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if reserved.contains(&name.as_str()) {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        files.insert(name, bytes);
    }

    Ok(Cart {
        manifest,
        sfx,
        music,
        sprites,
        files,
    })
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, path: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(path).ok()?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartManifest, SfxDef, SfxTag};

    fn sample_cart() -> Cart {
        let mut sfx = SfxTable::new();
        sfx.insert(
            "land".to_string(),
            SfxDef {
                tag: SfxTag::Sine,
                frequency: Some(220.0),
                duration: 0.2,
                gain: 0.8,
            },
        );
        let mut files = BTreeMap::new();
        files.insert("assets/main.lua".to_string(), b"-- entry".to_vec());
        files.insert("assets/zeta.lua".to_string(), b"-- zeta".to_vec());

        Cart {
            manifest: CartManifest {
                title: "Test Cart".into(),
                author: "tester".into(),
                description: "a cart".into(),
                genre: "demo".into(),
                tags: vec!["demo".into()],
                entry: "assets/main.lua".into(),
                palette: Some("grayscale".into()),
                default_scale: Some(2),
            },
            sfx,
            music: MusicTable::new(),
            sprites: SpriteTable::new(),
            files,
        }
    }

    #[test]
    fn round_trips_manifest_and_assets() {
        let cart = sample_cart();
        let bytes = write_cart(&cart).unwrap();
        let decoded = read_cart(&bytes).unwrap();

        assert_eq!(decoded.manifest, cart.manifest);
        assert_eq!(decoded.sfx, cart.sfx);
        assert_eq!(decoded.files.get("assets/main.lua"), Some(&b"-- entry".to_vec()));
    }

    #[test]
    fn missing_asset_tables_read_as_empty_maps() {
        let cart = Cart {
            manifest: CartManifest {
                title: "Minimal".into(),
                author: "".into(),
                description: "".into(),
                genre: "".into(),
                tags: vec![],
                entry: "assets/main.lua".into(),
                palette: None,
                default_scale: None,
            },
            sfx: SfxTable::new(),
            music: MusicTable::new(),
            sprites: SpriteTable::new(),
            files: BTreeMap::new(),
        };
        let bytes = write_cart(&cart).unwrap();
        let decoded = read_cart(&bytes).unwrap();
        assert!(decoded.sfx.is_empty());
        assert!(decoded.music.is_empty());
        assert!(decoded.sprites.is_empty());
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file("assets/whatever.txt", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"hi").unwrap();
            writer.finish().unwrap();
        }
        assert!(matches!(read_cart(&buf), Err(CartError::MissingManifest)));
    }

    #[test]
    fn sorted_asset_names_is_lexicographic() {
        let cart = sample_cart();
        assert_eq!(
            cart.sorted_asset_names(),
            vec!["assets/main.lua", "assets/zeta.lua"]
        );
    }
}
