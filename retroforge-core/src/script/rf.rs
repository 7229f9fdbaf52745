//! The `rf` global table: drawing, input, audio, math, memory, and sprite-editing
//! bindings (§4.12). Every function here is intentionally forgiving — out-of-range
//! arguments clamp or no-op rather than raising a Lua error, matching §7's "a script
//! calling into the engine with bad arguments degrades gracefully, it does not crash
//! the process".

use std::rc::Rc;

use mlua::{Lua, Table, Value, Variadic};

use crate::cart::{MountPoint, SpriteDef};
use crate::raster::{Anchor, Polygon};

use super::EngineShared;

/// Resolve a palette index to RGBA, honoring `rf.pal`'s remap table.
fn resolve_color(shared: &EngineShared, idx: u8) -> [u8; 4] {
    let mapped = shared.pal_map.borrow()[idx as usize].unwrap_or(idx);
    shared.palette.borrow().color(mapped as i32)
}

/// Nearest-palette-index search for `rf.pget`, since the framebuffer itself only
/// stores RGBA: squared Euclidean distance over the 50-entry table, first match wins
/// on ties.
fn nearest_palette_index(shared: &EngineShared, rgba: [u8; 4]) -> u8 {
    let palette = shared.palette.borrow();
    let mut best = 0u8;
    let mut best_dist = u32::MAX;
    for i in 0..crate::palette::PALETTE_SIZE {
        let c = palette.color(i as i32);
        let dist = (0..3)
            .map(|k| {
                let d = c[k] as i32 - rgba[k] as i32;
                (d * d) as u32
            })
            .sum::<u32>();
        if dist < best_dist {
            best_dist = dist;
            best = i as u8;
        }
    }
    best
}

fn advance_rng(shared: &EngineShared) -> f64 {
    let next = shared
        .rng
        .get()
        .wrapping_mul(1_103_515_245)
        .wrapping_add(12345)
        & 0x7FFF_FFFF;
    shared.rng.set(next);
    next as f64 / 2147483648.0
}

fn shl32(a: i64, b: i64) -> i64 {
    if b < 0 {
        return shr32(a, -b);
    }
    if b >= 32 {
        return if a >= 0 { 0 } else { -1 };
    }
    (((a as i32) as u32).wrapping_shl(b as u32)) as i32 as i64
}

fn shr32(a: i64, b: i64) -> i64 {
    if b < 0 {
        return shl32(a, -b);
    }
    if b >= 32 {
        return if a >= 0 { 0 } else { -1 };
    }
    ((a as i32).wrapping_shr(b as u32)) as i64
}

/// In-place pixel primitives on a sprite's raw index grid, mirroring the
/// `Framebuffer` primitives but writing palette indices (`-1` transparent) instead
/// of RGBA, with no camera or clip rect (sprite-local coordinates only).
fn sprite_pset(def: &mut SpriteDef, x: i32, y: i32, idx: i32) {
    if x < 0 || y < 0 || x as u32 >= def.width || y as u32 >= def.height {
        return;
    }
    def.pixels[y as usize][x as usize] = idx;
}

fn sprite_line(def: &mut SpriteDef, x0: i32, y0: i32, x1: i32, y1: i32, idx: i32) {
    let (mut x0, mut y0) = (x0, y0);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        sprite_pset(def, x0, y0, idx);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn sprite_rect(def: &mut SpriteDef, x: i32, y: i32, w: i32, h: i32, idx: i32) {
    if w <= 0 || h <= 0 {
        return;
    }
    sprite_line(def, x, y, x + w - 1, y, idx);
    sprite_line(def, x, y + h - 1, x + w - 1, y + h - 1, idx);
    sprite_line(def, x, y, x, y + h - 1, idx);
    sprite_line(def, x + w - 1, y, x + w - 1, y + h - 1, idx);
}

fn sprite_rect_fill(def: &mut SpriteDef, x: i32, y: i32, w: i32, h: i32, idx: i32) {
    if w <= 0 || h <= 0 {
        return;
    }
    for yy in y..y + h {
        for xx in x..x + w {
            sprite_pset(def, xx, yy, idx);
        }
    }
}

fn sprite_circ(def: &mut SpriteDef, cx: i32, cy: i32, r: i32, idx: i32, filled: bool) {
    if r < 0 {
        return;
    }
    if filled {
        for dy in -r..=r {
            let span = ((r * r - dy * dy) as f64).sqrt() as i32;
            sprite_line(def, cx - span, cy + dy, cx + span, cy + dy, idx);
        }
        return;
    }
    let mut x = 0i32;
    let mut y = r;
    let mut d = 1 - r;
    while x <= y {
        for (px, py) in [
            (cx + x, cy + y),
            (cx - x, cy + y),
            (cx + x, cy - y),
            (cx - x, cy - y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx + y, cy - x),
            (cx - y, cy - x),
        ] {
            sprite_pset(def, px, py, idx);
        }
        x += 1;
        if d < 0 {
            d += 2 * x + 1;
        } else {
            y -= 1;
            d += 2 * (x - y) + 1;
        }
    }
}

fn lua_pixels_table(lua: &Lua, def: &SpriteDef) -> mlua::Result<Table> {
    let rows = lua.create_table()?;
    for (r, row) in def.pixels.iter().enumerate() {
        let lua_row = lua.create_table()?;
        for (c, &v) in row.iter().enumerate() {
            lua_row.set(c + 1, v)?;
        }
        rows.set(r + 1, lua_row)?;
    }
    Ok(rows)
}

fn sprite_table(lua: &Lua, def: &SpriteDef) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set("width", def.width)?;
    t.set("height", def.height)?;
    t.set("pixels", lua_pixels_table(lua, def)?)?;
    t.set("useCollision", def.use_collision)?;
    t.set("isUI", def.is_ui)?;
    t.set("lifetime", def.lifetime_ms)?;
    t.set("maxSpawn", def.max_spawn)?;
    let mounts = lua.create_table()?;
    for (i, mp) in def.mount_points.iter().enumerate() {
        let mt = lua.create_table()?;
        mt.set("x", mp.x)?;
        mt.set("y", mp.y)?;
        if let Some(name) = &mp.name {
            mt.set("name", name.clone())?;
        }
        mounts.set(i + 1, mt)?;
    }
    t.set("mountPoints", mounts)?;
    Ok(t)
}

/// Install the `rf` global table.
pub fn install(lua: &Lua, shared: &Rc<EngineShared>) -> mlua::Result<()> {
    let rf = lua.create_table()?;

    // --- drawing: clear/pset/pget -----------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "clear_i",
            lua.create_function(move |_, idx: u8| {
                let rgba = resolve_color(&s, idx);
                s.framebuffer.borrow_mut().clear(rgba);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "pset",
            lua.create_function(move |_, (x, y, idx): (i32, i32, u8)| {
                let rgba = resolve_color(&s, idx);
                s.framebuffer.borrow_mut().pset(x, y, rgba);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "pget",
            lua.create_function(move |_, (x, y): (i32, i32)| {
                let rgba = s.framebuffer.borrow().pget(x, y);
                Ok(nearest_palette_index(&s, rgba))
            })?,
        )?;
    }

    macro_rules! indexed_primitive {
        ($name:literal, $args:ty, $call:expr) => {{
            let s = Rc::clone(shared);
            rf.set(
                $name,
                lua.create_function(move |_, args: $args| {
                    #[allow(clippy::redundant_closure_call)]
                    $call(&s, args);
                    Ok(())
                })?,
            )?;
        }};
    }

    indexed_primitive!(
        "line",
        (i32, i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (x0, y0, x1, y1, idx): (i32, i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().line(x0, y0, x1, y1, rgba);
        }
    );
    indexed_primitive!(
        "rect",
        (i32, i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (x, y, w, h, idx): (i32, i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().rect(x, y, w, h, rgba);
        }
    );
    indexed_primitive!(
        "rectfill",
        (i32, i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (x, y, w, h, idx): (i32, i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().rect_fill(x, y, w, h, rgba);
        }
    );
    indexed_primitive!(
        "circ",
        (i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (cx, cy, r, idx): (i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().circ(cx, cy, r, rgba);
        }
    );
    indexed_primitive!(
        "circfill",
        (i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (cx, cy, r, idx): (i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().circ_fill(cx, cy, r, rgba);
        }
    );
    indexed_primitive!(
        "ellipse",
        (i32, i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (cx, cy, rx, ry, idx): (i32, i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().ellipse(cx, cy, rx, ry, rgba);
        }
    );
    indexed_primitive!(
        "ellipsefill",
        (i32, i32, i32, i32, u8),
        |s: &Rc<EngineShared>, (cx, cy, rx, ry, idx): (i32, i32, i32, i32, u8)| {
            let rgba = resolve_color(s, idx);
            s.framebuffer.borrow_mut().ellipse_fill(cx, cy, rx, ry, rgba);
        }
    );

    // --- RGB variants (bypass the palette entirely) -----------------------------
    macro_rules! rgb_primitive {
        ($name:literal, $args:ty, $call:expr) => {{
            let s = Rc::clone(shared);
            rf.set(
                $name,
                lua.create_function(move |_, args: $args| {
                    #[allow(clippy::redundant_closure_call)]
                    $call(&s, args);
                    Ok(())
                })?,
            )?;
        }};
    }

    rgb_primitive!(
        "pset_rgb",
        (i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (x, y, r, g, b): (i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().pset(x, y, [r, g, b, 255]);
        }
    );
    rgb_primitive!(
        "line_rgb",
        (i32, i32, i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (x0, y0, x1, y1, r, g, b): (i32, i32, i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().line(x0, y0, x1, y1, [r, g, b, 255]);
        }
    );
    rgb_primitive!(
        "rect_rgb",
        (i32, i32, i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (x, y, w, h, r, g, b): (i32, i32, i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().rect(x, y, w, h, [r, g, b, 255]);
        }
    );
    rgb_primitive!(
        "rectfill_rgb",
        (i32, i32, i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (x, y, w, h, r, g, b): (i32, i32, i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().rect_fill(x, y, w, h, [r, g, b, 255]);
        }
    );
    rgb_primitive!(
        "circ_rgb",
        (i32, i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (cx, cy, rad, r, g, b): (i32, i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().circ(cx, cy, rad, [r, g, b, 255]);
        }
    );
    rgb_primitive!(
        "circfill_rgb",
        (i32, i32, i32, u8, u8, u8),
        |s: &Rc<EngineShared>, (cx, cy, rad, r, g, b): (i32, i32, i32, u8, u8, u8)| {
            s.framebuffer.borrow_mut().circ_fill(cx, cy, rad, [r, g, b, 255]);
        }
    );

    // --- regular polygons --------------------------------------------------------
    macro_rules! polygon_fn {
        ($name:literal, $shape:expr) => {{
            let s = Rc::clone(shared);
            rf.set(
                $name,
                lua.create_function(
                    move |_, (cx, cy, r, filled, idx): (i32, i32, i32, bool, u8)| {
                        let rgba = resolve_color(&s, idx);
                        let mut fb = s.framebuffer.borrow_mut();
                        if filled {
                            fb.polygon_fill($shape, cx, cy, r, rgba);
                        } else {
                            fb.polygon($shape, cx, cy, r, rgba);
                        }
                        Ok(())
                    },
                )?,
            )?;
        }};
    }
    polygon_fn!("tri", Polygon::Triangle);
    polygon_fn!("diamond", Polygon::Diamond);
    polygon_fn!("square", Polygon::Square);
    polygon_fn!("pentagon", Polygon::Pentagon);
    polygon_fn!("hexagon", Polygon::Hexagon);
    polygon_fn!("star", Polygon::Star);

    // --- camera / clip ------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "camera",
            lua.create_function(move |_, (x, y): (i32, i32)| {
                s.framebuffer.borrow_mut().set_camera(x, y);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "clip",
            lua.create_function(move |_, (x, y, w, h): (i32, i32, i32, i32)| {
                s.framebuffer.borrow_mut().set_clip(x, y, w, h);
                Ok(())
            })?,
        )?;
    }

    // --- text / cursor / color ----------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "cursor",
            lua.create_function(move |_, args: Variadic<i32>| {
                let mut cursor = s.cursor.borrow_mut();
                match (args.first(), args.get(1)) {
                    (Some(&x), Some(&y)) => {
                        cursor.x = x;
                        cursor.y = y;
                        cursor.origin_x = x;
                    }
                    _ => {
                        cursor.x = 0;
                        cursor.y = 0;
                        cursor.origin_x = 0;
                    }
                }
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "color",
            lua.create_function(move |_, idx: Option<u8>| {
                s.cursor.borrow_mut().color = idx.unwrap_or(15);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "print",
            lua.create_function(
                move |_, (text, x, y, idx): (String, Option<i32>, Option<i32>, Option<u8>)| {
                    let color_idx = idx.unwrap_or_else(|| s.cursor.borrow().color);
                    let rgba = resolve_color(&s, color_idx);
                    match (x, y) {
                        (Some(x), Some(y)) => {
                            s.framebuffer.borrow_mut().print(&text, x, y, rgba);
                        }
                        _ => {
                            let (mut px, mut py, origin) = {
                                let c = s.cursor.borrow();
                                (c.x, c.y, c.origin_x)
                            };
                            let mut fb = s.framebuffer.borrow_mut();
                            for ch in text.chars() {
                                if ch == '\n' {
                                    py += 8;
                                    px = origin;
                                    continue;
                                }
                                fb.print(&ch.to_string(), px, py, rgba);
                                px += 6;
                            }
                            let mut c = s.cursor.borrow_mut();
                            c.x = px;
                            c.y = py;
                        }
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "print_xy",
            lua.create_function(move |_, (x, y, text, idx): (i32, i32, String, u8)| {
                let rgba = resolve_color(&s, idx);
                s.framebuffer.borrow_mut().print(&text, x, y, rgba);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "print_anchored",
            lua.create_function(move |_, (text, anchor, idx): (String, String, Option<u8>)| {
                let color_idx = idx.unwrap_or_else(|| s.cursor.borrow().color);
                let rgba = resolve_color(&s, color_idx);
                s.framebuffer
                    .borrow_mut()
                    .print_anchored(&text, Anchor::parse(&anchor), rgba);
                Ok(())
            })?,
        )?;
    }

    // --- palette -------------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "palette_set",
            lua.create_function(move |_, name: String| {
                *s.palette.borrow_mut() = crate::palette::named(&name);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "pal",
            lua.create_function(move |_, (from, to, p): (u8, u8, bool)| {
                let mut map = s.pal_map.borrow_mut();
                map[from as usize] = if p { Some(to) } else { None };
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "pal_reset",
            lua.create_function(move |_, ()| {
                *s.pal_map.borrow_mut() = [None; 256];
                Ok(())
            })?,
        )?;
    }

    // --- input -----------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "btn",
            lua.create_function(move |_, i: i64| Ok(s.input.borrow().btn(i.max(0) as usize)))?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "btnp",
            lua.create_function(move |_, i: i64| Ok(s.input.borrow().pressed(i.max(0) as usize)))?,
        )?;
    }

    // --- audio -------------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "tone",
            lua.create_function(move |_, (freq, dur, gain): (f64, f64, f64)| {
                s.audio.play_sine(freq, dur, gain);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "noise",
            lua.create_function(move |_, (dur, gain): (f64, f64)| {
                s.audio.play_noise(dur, gain);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "music",
            lua.create_function(move |_, (tokens, bpm, gain): (String, f64, f64)| {
                s.audio.play_notes(&tokens, bpm, gain);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sfx",
            lua.create_function(move |_, (name, action): (String, Option<Value>)| {
                if name == "stopall" {
                    s.audio.stop_all();
                    return Ok(());
                }
                if name == "thrust" {
                    let on = match action {
                        Some(Value::Boolean(b)) => b,
                        Some(Value::Nil) | None => true,
                        _ => true,
                    };
                    s.audio.thrust(on);
                    return Ok(());
                }
                if let Some(def) = s.sfx.borrow().get(&name).cloned() {
                    use crate::cart::SfxTag;
                    match def.tag {
                        SfxTag::Sine => {
                            let freq = def.frequency.unwrap_or(440.0);
                            s.audio.play_sine(freq, def.duration, def.gain);
                        }
                        SfxTag::Noise => s.audio.play_noise(def.duration, def.gain),
                        SfxTag::Thrust => s.audio.thrust(true),
                        SfxTag::Stopall => s.audio.stop_all(),
                    }
                }
                Ok(())
            })?,
        )?;
    }

    // --- math helpers --------------------------------------------------------------
    rf.set("flr", lua.create_function(|_, x: f64| Ok(x.floor() as i64))?)?;
    rf.set("ceil", lua.create_function(|_, x: f64| Ok(x.ceil() as i64))?)?;
    rf.set(
        "mid",
        lua.create_function(|_, (a, b, c): (f64, f64, f64)| {
            let mut v = [a, b, c];
            v.sort_by(|l, r| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal));
            Ok(v[1])
        })?,
    )?;
    rf.set(
        "sgn",
        lua.create_function(|_, x: f64| {
            Ok(if x > 0.0 {
                1
            } else if x < 0.0 {
                -1
            } else {
                0
            })
        })?,
    )?;
    rf.set(
        "chr",
        lua.create_function(|_, n: i64| {
            let byte = n.clamp(0, 255) as u8;
            Ok(String::from_utf8_lossy(&[byte]).into_owned())
        })?,
    )?;
    rf.set(
        "ord",
        lua.create_function(|_, s: String| Ok(s.as_bytes().first().copied().unwrap_or(0)))?,
    )?;

    // --- bitwise ---------------------------------------------------------------
    rf.set(
        "shl",
        lua.create_function(|_, (a, b): (i64, i64)| Ok(shl32(a, b)))?,
    )?;
    rf.set(
        "shr",
        lua.create_function(|_, (a, b): (i64, i64)| Ok(shr32(a, b)))?,
    )?;
    rf.set(
        "band",
        lua.create_function(|_, (a, b): (i64, i64)| Ok(((a as i32) & (b as i32)) as i64))?,
    )?;
    rf.set(
        "bor",
        lua.create_function(|_, (a, b): (i64, i64)| Ok(((a as i32) | (b as i32)) as i64))?,
    )?;
    rf.set(
        "bxor",
        lua.create_function(|_, (a, b): (i64, i64)| Ok(((a as i32) ^ (b as i32)) as i64))?,
    )?;
    rf.set(
        "bnot",
        lua.create_function(|_, a: i64| Ok((!(a as i32)) as i64))?,
    )?;

    // --- rng ------------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "srand",
            lua.create_function(move |_, seed: i64| {
                s.rng.set(seed as u32);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "rnd",
            lua.create_function(move |_, x: Option<f64>| {
                let u = advance_rng(&s);
                Ok(match x {
                    None => u,
                    Some(x) if x > 0.0 => u * x,
                    Some(x) if x < 0.0 => -(u * -x),
                    Some(_) => 0.0,
                })
            })?,
        )?;
    }

    // --- memory ------------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "poke",
            lua.create_function(move |_, (addr, byte): (i64, u8)| {
                s.memory.borrow_mut().poke(addr, byte);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "peek",
            lua.create_function(move |_, addr: i64| Ok(s.memory.borrow().peek(addr)))?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "cstore",
            lua.create_function(move |_, (dst, src, len): (i64, i64, i64)| {
                s.memory.borrow_mut().cstore(dst, src, len);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "reload",
            lua.create_function(move |_, (dst, src, len): (i64, i64, i64)| {
                s.memory.borrow_mut().reload(dst, src, len);
                Ok(())
            })?,
        )?;
    }

    // --- sprite editing -------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "newSprite",
            lua.create_function(move |_, (name, w, h): (String, u32, u32)| {
                let def = SpriteDef {
                    width: w,
                    height: h,
                    pixels: vec![vec![-1i32; w as usize]; h as usize],
                    use_collision: false,
                    mount_points: Vec::new(),
                    is_ui: true,
                    lifetime_ms: 0,
                    max_spawn: 0,
                };
                s.sprites.borrow_mut().insert(name, def);
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_pset",
            lua.create_function(move |_, (name, x, y, idx): (String, i32, i32, i32)| {
                if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                    sprite_pset(def, x, y, idx);
                }
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_line",
            lua.create_function(
                move |_, (name, x0, y0, x1, y1, idx): (String, i32, i32, i32, i32, i32)| {
                    if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                        sprite_line(def, x0, y0, x1, y1, idx);
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_rect",
            lua.create_function(
                move |_, (name, x, y, w, h, idx): (String, i32, i32, i32, i32, i32)| {
                    if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                        sprite_rect(def, x, y, w, h, idx);
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_rectfill",
            lua.create_function(
                move |_, (name, x, y, w, h, idx): (String, i32, i32, i32, i32, i32)| {
                    if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                        sprite_rect_fill(def, x, y, w, h, idx);
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_circ",
            lua.create_function(
                move |_, (name, cx, cy, r, idx): (String, i32, i32, i32, i32)| {
                    if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                        sprite_circ(def, cx, cy, r, idx, false);
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "sprite_circfill",
            lua.create_function(
                move |_, (name, cx, cy, r, idx): (String, i32, i32, i32, i32)| {
                    if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                        sprite_circ(def, cx, cy, r, idx, true);
                    }
                    Ok(())
                },
            )?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "setSpriteProperty",
            lua.create_function(move |_, (name, key, value): (String, String, Value)| {
                if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                    match key.as_str() {
                        "isUI" => def.is_ui = matches!(value, Value::Boolean(true)),
                        "useCollision" => def.use_collision = matches!(value, Value::Boolean(true)),
                        "lifetime" => {
                            if let Value::Integer(n) = value {
                                def.lifetime_ms = n.max(0) as u64;
                            } else if let Value::Number(n) = value {
                                def.lifetime_ms = n.max(0.0) as u64;
                            }
                        }
                        "maxSpawn" => {
                            if let Value::Integer(n) = value {
                                def.max_spawn = n.max(0) as u32;
                            } else if let Value::Number(n) = value {
                                def.max_spawn = n.max(0.0) as u32;
                            }
                        }
                        _ => {}
                    }
                }
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "addMountPoint",
            lua.create_function(move |_, (name, x, y, mp_name): (String, i32, i32, Option<String>)| {
                if let Some(def) = s.sprites.borrow_mut().get_mut(&name) {
                    def.mount_points.push(MountPoint { x, y, name: mp_name });
                }
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        let sprite_get = lua.create_function(move |lua, name: String| {
            match s.sprites.borrow().get(&name) {
                Some(def) => Ok(Value::Table(sprite_table(lua, def)?)),
                None => Ok(Value::Nil),
            }
        })?;
        rf.set("sprite", sprite_get)?;
    }

    // --- control ------------------------------------------------------------------
    {
        let s = Rc::clone(shared);
        rf.set(
            "quit",
            lua.create_function(move |_, ()| {
                s.quit.request();
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "printh",
            lua.create_function(move |_, msg: String| {
                if s.debug {
                    s.debug_log.borrow_mut().push_back(msg);
                }
                Ok(())
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "stat",
            lua.create_function(move |_, id: i64| {
                if !s.debug {
                    return Ok(0.0);
                }
                Ok(match id {
                    0 => s.frame_count.get() as f64,
                    1 => s.start_time.elapsed().as_secs_f64(),
                    _ => 0.0,
                })
            })?,
        )?;
    }
    {
        let s = Rc::clone(shared);
        rf.set(
            "time",
            lua.create_function(move |_, ()| Ok(s.start_time.elapsed().as_secs_f64()))?,
        )?;
    }

    lua.globals().set("rf", rf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shl_saturates_at_word_boundary() {
        assert_eq!(shl32(1, 40), 0);
        assert_eq!(shl32(-1, 40), -1);
    }

    #[test]
    fn shr_reverses_into_shl_on_negative_count() {
        assert_eq!(shr32(4, -1), shl32(4, 1));
    }

    #[test]
    fn bitwise_ops_truncate_to_32_bits() {
        assert_eq!(((0xFFi64 as i32) & (0x0Fi32)) as i64, 0x0F);
    }
}
