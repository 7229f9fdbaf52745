//! Palette-indexed software rasterizer (§4.3).
//!
//! The framebuffer stores raw RGBA bytes (alpha always forced to 0xFF on write); the
//! script bridge is responsible for palette-index -> RGBA translation before calling
//! into here. Every primitive takes world coordinates and applies the camera offset
//! before clipping and writing pixels.

use crate::font;

pub const DEFAULT_WIDTH: u32 = 480;
pub const DEFAULT_HEIGHT: u32 = 270;

/// An axis-aligned clip rectangle. `w == 0 && h == 0` disables clipping (§3).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl ClipRect {
    fn enabled(&self) -> bool {
        !(self.w == 0 && self.h == 0)
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        if !self.enabled() {
            return true;
        }
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

/// Nine anchor positions for `printAnchored` (§4.3, glossary "Anchor").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    /// Parse the script-facing anchor name (e.g. `"middlecenter"`); unrecognized names
    /// fall back to `TopLeft`.
    pub fn parse(name: &str) -> Anchor {
        match name.to_ascii_lowercase().as_str() {
            "topleft" => Anchor::TopLeft,
            "topcenter" => Anchor::TopCenter,
            "topright" => Anchor::TopRight,
            "middleleft" => Anchor::MiddleLeft,
            "middlecenter" => Anchor::MiddleCenter,
            "middleright" => Anchor::MiddleRight,
            "bottomleft" => Anchor::BottomLeft,
            "bottomcenter" => Anchor::BottomCenter,
            "bottomright" => Anchor::BottomRight,
            _ => Anchor::TopLeft,
        }
    }
}

/// Regular polygon shapes drawable at a center + circumradius (§4.3).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polygon {
    Triangle,
    Diamond,
    Square,
    Pentagon,
    Hexagon,
    Star,
}

/// The owned pixel buffer plus clip/camera state.
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    clip: ClipRect,
    camera: (i32, i32),
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; (width as usize) * (height as usize) * 4],
            clip: ClipRect::default(),
            camera: (0, 0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major, for presentation.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn set_clip(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.clip = ClipRect { x, y, w, h };
    }

    pub fn clip(&self) -> ClipRect {
        self.clip
    }

    pub fn set_camera(&mut self, x: i32, y: i32) {
        self.camera = (x, y);
    }

    pub fn camera(&self) -> (i32, i32) {
        self.camera
    }

    fn to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        (x - self.camera.0, y - self.camera.1)
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    fn write_screen(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        if !self.in_bounds(x, y) || !self.clip.contains(x, y) {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
        self.pixels[idx] = rgba[0];
        self.pixels[idx + 1] = rgba[1];
        self.pixels[idx + 2] = rgba[2];
        self.pixels[idx + 3] = 0xFF;
    }

    /// Plot a single world-space pixel.
    pub fn pset(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        let (sx, sy) = self.to_screen(x, y);
        self.write_screen(sx, sy, rgba);
    }

    /// Read back a pixel; out-of-bounds reads return transparent black (§4.3).
    pub fn pget(&self, x: i32, y: i32) -> [u8; 4] {
        let (sx, sy) = self.to_screen(x, y);
        if !self.in_bounds(sx, sy) {
            return [0, 0, 0, 0];
        }
        let idx = ((sy as u32 * self.width + sx as u32) * 4) as usize;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// Fill the whole buffer with a solid opaque color.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk[0] = rgba[0];
            chunk[1] = rgba[1];
            chunk[2] = rgba[2];
            chunk[3] = 0xFF;
        }
    }

    /// Bresenham line between two world-space points.
    pub fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, rgba: [u8; 4]) {
        let (mut x0, mut y0) = self.to_screen(x0, y0);
        let (x1, y1) = self.to_screen(x1, y1);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.write_screen(x0, y0, rgba);
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

    /// Outline rectangle (four lines), world space, width/height in pixels.
    pub fn rect(&mut self, x: i32, y: i32, w: i32, h: i32, rgba: [u8; 4]) {
        if w <= 0 || h <= 0 {
            return;
        }
        self.line(x, y, x + w - 1, y, rgba);
        self.line(x, y + h - 1, x + w - 1, y + h - 1, rgba);
        self.line(x, y, x, y + h - 1, rgba);
        self.line(x + w - 1, y, x + w - 1, y + h - 1, rgba);
    }

    /// Filled rectangle, scanline writes.
    pub fn rect_fill(&mut self, x: i32, y: i32, w: i32, h: i32, rgba: [u8; 4]) {
        if w <= 0 || h <= 0 {
            return;
        }
        for yy in y..y + h {
            for xx in x..x + w {
                self.pset(xx, yy, rgba);
            }
        }
    }

    /// Outline circle via the midpoint algorithm, world-space center/radius.
    pub fn circ(&mut self, cx: i32, cy: i32, r: i32, rgba: [u8; 4]) {
        if r < 0 {
            return;
        }
        let mut x = 0i32;
        let mut y = r;
        let mut d = 1 - r;
        while x <= y {
            for (px, py) in circle_octants(cx, cy, x, y) {
                self.pset(px, py, rgba);
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

    /// Filled circle: for each scanline, fill the horizontal span inside the circle.
    pub fn circ_fill(&mut self, cx: i32, cy: i32, r: i32, rgba: [u8; 4]) {
        if r < 0 {
            return;
        }
        for dy in -r..=r {
            let span = ((r * r - dy * dy) as f64).sqrt() as i32;
            self.line(cx - span, cy + dy, cx + span, cy + dy, rgba);
        }
    }

    /// Outline ellipse via the midpoint algorithm.
    pub fn ellipse(&mut self, cx: i32, cy: i32, rx: i32, ry: i32, rgba: [u8; 4]) {
        if rx < 0 || ry < 0 {
            return;
        }
        if rx == 0 || ry == 0 {
            self.line(cx - rx, cy - ry, cx + rx, cy + ry, rgba);
            return;
        }
        let steps = 4 * (rx.max(ry) + 1);
        for i in 0..steps {
            let t = (i as f64 / steps as f64) * std::f64::consts::TAU;
            let x = cx + (rx as f64 * t.cos()).round() as i32;
            let y = cy + (ry as f64 * t.sin()).round() as i32;
            self.pset(x, y, rgba);
        }
    }

    /// Filled ellipse: scanline fill using `x = rx*sqrt(1-(y/ry)^2)`.
    pub fn ellipse_fill(&mut self, cx: i32, cy: i32, rx: i32, ry: i32, rgba: [u8; 4]) {
        if rx < 0 || ry < 0 || ry == 0 {
            return;
        }
        for dy in -ry..=ry {
            let ratio = dy as f64 / ry as f64;
            let inner = (1.0 - ratio * ratio).max(0.0);
            let span = (rx as f64 * inner.sqrt()).round() as i32;
            self.line(cx - span, cy + dy, cx + span, cy + dy, rgba);
        }
    }

    /// Vertices of a regular polygon per §4.3's angle/offset rules.
    fn polygon_vertices(shape: Polygon, cx: i32, cy: i32, r: i32) -> Vec<(i32, i32)> {
        let r = r as f64;
        let cxf = cx as f64;
        let cyf = cy as f64;
        match shape {
            Polygon::Triangle => (0..3)
                .map(|i| {
                    let a = -std::f64::consts::FRAC_PI_2 + i as f64 * std::f64::consts::TAU / 3.0;
                    (cxf + r * a.cos(), cyf + r * a.sin())
                })
                .map(round_pt)
                .collect(),
            Polygon::Diamond => vec![
                (cxf, cyf - r),
                (cxf + r, cyf),
                (cxf, cyf + r),
                (cxf - r, cyf),
            ]
            .into_iter()
            .map(round_pt)
            .collect(),
            Polygon::Square => {
                let h = r / std::f64::consts::SQRT_2;
                vec![
                    (cxf - h, cyf - h),
                    (cxf + h, cyf - h),
                    (cxf + h, cyf + h),
                    (cxf - h, cyf + h),
                ]
                .into_iter()
                .map(round_pt)
                .collect()
            }
            Polygon::Pentagon => (0..5)
                .map(|i| {
                    let a = -std::f64::consts::FRAC_PI_2 + i as f64 * std::f64::consts::TAU / 5.0;
                    (cxf + r * a.cos(), cyf + r * a.sin())
                })
                .map(round_pt)
                .collect(),
            Polygon::Hexagon => (0..6)
                .map(|i| {
                    let a = -std::f64::consts::FRAC_PI_2 + i as f64 * std::f64::consts::TAU / 6.0;
                    (cxf + r * a.cos(), cyf + r * a.sin())
                })
                .map(round_pt)
                .collect(),
            Polygon::Star => (0..10)
                .map(|i| {
                    let a = -std::f64::consts::FRAC_PI_2 + i as f64 * std::f64::consts::TAU / 10.0;
                    let radius = if i % 2 == 0 { r } else { r / 2.0 };
                    (cxf + radius * a.cos(), cyf + radius * a.sin())
                })
                .map(round_pt)
                .collect(),
        }
    }

    /// Outline a regular polygon by tracing its edges with `line`.
    pub fn polygon(&mut self, shape: Polygon, cx: i32, cy: i32, r: i32, rgba: [u8; 4]) {
        if r < 0 {
            return;
        }
        let verts = Self::polygon_vertices(shape, cx, cy, r);
        for i in 0..verts.len() {
            let (x0, y0) = verts[i];
            let (x1, y1) = verts[(i + 1) % verts.len()];
            self.line(x0, y0, x1, y1, rgba);
        }
    }

    /// Fill a regular polygon with a scanline intersection algorithm.
    pub fn polygon_fill(&mut self, shape: Polygon, cx: i32, cy: i32, r: i32, rgba: [u8; 4]) {
        if r < 0 {
            return;
        }
        let verts = Self::polygon_vertices(shape, cx, cy, r);
        if verts.is_empty() {
            return;
        }
        let min_y = verts.iter().map(|p| p.1).min().unwrap();
        let max_y = verts.iter().map(|p| p.1).max().unwrap();

        for y in min_y..=max_y {
            let mut xs = Vec::new();
            let n = verts.len();
            for i in 0..n {
                let (x0, y0) = verts[i];
                let (x1, y1) = verts[(i + 1) % n];
                if (y0 <= y && y1 > y) || (y1 <= y && y0 > y) {
                    let t = (y - y0) as f64 / (y1 - y0) as f64;
                    let x = x0 as f64 + t * (x1 - x0) as f64;
                    xs.push(x.round() as i32);
                }
            }
            xs.sort_unstable();
            for pair in xs.chunks(2) {
                if let [xa, xb] = pair {
                    self.line(*xa, y, *xb, y, rgba);
                }
            }
        }
    }

    /// Draw text; newline advances `y` by `height+1` and resets `x`. Unknown glyphs
    /// advance by 6 pixels with no pixels drawn.
    pub fn print(&mut self, text: &str, x: i32, y: i32, rgba: [u8; 4]) {
        let origin_x = x;
        let mut cx = x;
        let mut cy = y;
        for ch in text.chars() {
            if ch == '\n' {
                cy += font::GLYPH_HEIGHT as i32 + 1;
                cx = origin_x;
                continue;
            }
            if let Some(glyph) = font::get(ch) {
                for r in 0..7usize {
                    for c in 0..5usize {
                        if glyph.pixel(r, c) {
                            self.pset(cx + c as i32, cy + r as i32, rgba);
                        }
                    }
                }
            }
            cx += font::ADVANCE;
        }
    }

    /// Measure a text block's bounding box in pixels (width of the widest line,
    /// height spanning all lines).
    pub fn measure(text: &str) -> (i32, i32) {
        let mut max_w = 0i32;
        let mut line_w = 0i32;
        let mut lines = 1i32;
        for ch in text.chars() {
            if ch == '\n' {
                max_w = max_w.max(line_w);
                line_w = 0;
                lines += 1;
                continue;
            }
            line_w += font::ADVANCE;
        }
        max_w = max_w.max(line_w);
        let height = lines * font::GLYPH_HEIGHT as i32 + (lines - 1).max(0);
        (max_w, height)
    }

    /// Place text's bounding box at one of the nine anchors; negative offsets clamp
    /// to zero (§4.3).
    pub fn print_anchored(&mut self, text: &str, anchor: Anchor, rgba: [u8; 4]) {
        let (tw, th) = Self::measure(text);
        let w = self.width as i32;
        let h = self.height as i32;

        let x = match anchor {
            Anchor::TopLeft | Anchor::MiddleLeft | Anchor::BottomLeft => 0,
            Anchor::TopCenter | Anchor::MiddleCenter | Anchor::BottomCenter => (w - tw) / 2,
            Anchor::TopRight | Anchor::MiddleRight | Anchor::BottomRight => w - tw,
        }
        .max(0);

        let y = match anchor {
            Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight => 0,
            Anchor::MiddleLeft | Anchor::MiddleCenter | Anchor::MiddleRight => (h - th) / 2,
            Anchor::BottomLeft | Anchor::BottomCenter | Anchor::BottomRight => h - th,
        }
        .max(0);

        self.print(text, x, y, rgba);
    }
}

fn round_pt(p: (f64, f64)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

fn circle_octants(cx: i32, cy: i32, x: i32, y: i32) -> [(i32, i32); 8] {
    [
        (cx + x, cy + y),
        (cx - x, cy + y),
        (cx + x, cy - y),
        (cx - x, cy - y),
        (cx + y, cy + x),
        (cx - y, cy + x),
        (cx + y, cy - x),
        (cx - y, cy - x),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    #[test]
    fn clear_forces_alpha_opaque() {
        let mut fb = Framebuffer::new(8, 8);
        fb.clear([10, 20, 30, 0]);
        for px in fb.pixels().chunks_exact(4) {
            assert_eq!(px[3], 0xFF);
        }
    }

    #[test]
    fn pget_out_of_bounds_is_transparent_black() {
        let fb = Framebuffer::new(4, 4);
        assert_eq!(fb.pget(-1, 0), [0, 0, 0, 0]);
        assert_eq!(fb.pget(4, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn pset_respects_clip_rect() {
        let mut fb = Framebuffer::new(10, 10);
        fb.set_clip(5, 5, 2, 2);
        fb.pset(0, 0, WHITE);
        assert_eq!(fb.pget(0, 0), [0, 0, 0, 0]);
        fb.pset(5, 5, WHITE);
        assert_eq!(fb.pget(5, 5), WHITE);
    }

    #[test]
    fn camera_offsets_world_coordinates() {
        let mut fb = Framebuffer::new(10, 10);
        fb.set_camera(2, 3);
        fb.pset(2, 3, WHITE);
        assert_eq!(fb.pget(2, 3), WHITE);
        assert_eq!(fb.pget(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn rect_fill_covers_interior() {
        let mut fb = Framebuffer::new(10, 10);
        fb.rect_fill(1, 1, 3, 3, WHITE);
        for y in 1..4 {
            for x in 1..4 {
                assert_eq!(fb.pget(x, y), WHITE);
            }
        }
        assert_eq!(fb.pget(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn zero_sized_rect_is_noop() {
        let mut fb = Framebuffer::new(10, 10);
        fb.rect_fill(1, 1, 0, 0, WHITE);
        assert_eq!(fb.pget(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn print_anchored_middle_center_paints_something() {
        let mut fb = Framebuffer::new(480, 270);
        fb.clear([0, 0, 0, 255]);
        fb.print_anchored("HELLO FROM RETROFORGE", Anchor::MiddleCenter, [1, 1, 1, 255]);
        let mut any_diff = false;
        for x in 200..280 {
            if fb.pget(x, 137) != [0, 0, 0, 255] {
                any_diff = true;
                break;
            }
        }
        assert!(any_diff, "expected at least one differing pixel on row 137");
    }

    #[test]
    fn anchor_parse_falls_back_to_top_left() {
        assert_eq!(Anchor::parse("bogus"), Anchor::TopLeft);
        assert_eq!(Anchor::parse("middlecenter"), Anchor::MiddleCenter);
    }
}
