//! Clip stream lines to rectangular grid cells
//!
//! Each line segment is clipped with Cohen-Sutherland, tracking the
//! parameter along the segment so that Z can be interpolated at the cut.

use geo_types::{Coord, LineString};
use swn_core::vector::LineStringZ;

/// A clipping rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ClipRect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Distance from (x, y) to the rectangle, zero inside
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        let dx = (self.min_x - x).max(x - self.max_x).max(0.0);
        let dy = (self.min_y - y).max(y - self.max_y).max(0.0);
        dx.hypot(dy)
    }
}

/// Cohen-Sutherland region codes
const INSIDE: u8 = 0b0000;
const LEFT: u8 = 0b0001;
const RIGHT: u8 = 0b0010;
const BOTTOM: u8 = 0b0100;
const TOP: u8 = 0b1000;

fn outcode(p: Coord<f64>, rect: &ClipRect) -> u8 {
    let mut code = INSIDE;
    if p.x < rect.min_x {
        code |= LEFT;
    }
    if p.x > rect.max_x {
        code |= RIGHT;
    }
    if p.y < rect.min_y {
        code |= BOTTOM;
    }
    if p.y > rect.max_y {
        code |= TOP;
    }
    code
}

/// Clip segment `a`-`b`, returning the retained parameter range (t0, t1)
fn clip_segment(a: Coord<f64>, b: Coord<f64>, rect: &ClipRect) -> Option<(f64, f64)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0, 1.0);
    let (mut p0, mut p1) = (a, b);
    let mut code0 = outcode(p0, rect);
    let mut code1 = outcode(p1, rect);

    loop {
        if (code0 | code1) == 0 {
            return Some((t0, t1));
        }
        if (code0 & code1) != 0 {
            return None;
        }

        let code_out = if code0 != 0 { code0 } else { code1 };
        // Snap the ordinate on the cut edge so the new outcode is exact
        let (t, point) = if code_out & TOP != 0 {
            let t = (rect.max_y - a.y) / dy;
            (t, Coord { x: a.x + t * dx, y: rect.max_y })
        } else if code_out & BOTTOM != 0 {
            let t = (rect.min_y - a.y) / dy;
            (t, Coord { x: a.x + t * dx, y: rect.min_y })
        } else if code_out & RIGHT != 0 {
            let t = (rect.max_x - a.x) / dx;
            (t, Coord { x: rect.max_x, y: a.y + t * dy })
        } else {
            let t = (rect.min_x - a.x) / dx;
            (t, Coord { x: rect.min_x, y: a.y + t * dy })
        };

        if code_out == code0 {
            t0 = t;
            p0 = point;
            code0 = outcode(p0, rect);
        } else {
            t1 = t;
            p1 = point;
            code1 = outcode(p1, rect);
        }
    }
}

struct Piece {
    start: f64,
    coords: Vec<Coord<f64>>,
    z: Vec<f64>,
}

impl Piece {
    fn finish(self, has_z: bool, out: &mut Vec<(f64, LineStringZ)>) {
        if self.coords.len() < 2 {
            return;
        }
        let z = has_z.then_some(self.z);
        if let Ok(line) = LineStringZ::new(LineString::new(self.coords), z) {
            if line.length() > 0.0 {
                out.push((self.start, line));
            }
        }
    }
}

/// Clip `line` to `rect`.
///
/// Returns each contiguous piece inside the rectangle, paired with the
/// planar distance along `line` to the start of the piece. Z values at the
/// cuts are linearly interpolated. Pieces with zero length (a line only
/// touching the rectangle) are dropped.
pub fn clip_line_to_rect(line: &LineStringZ, rect: &ClipRect) -> Vec<(f64, LineStringZ)> {
    let coords = line.coords();
    let zs = line.z();
    let mut out = Vec::new();
    let mut current: Option<Piece> = None;
    let mut travelled = 0.0;

    for i in 0..coords.len() - 1 {
        let (a, b) = (coords[i], coords[i + 1]);
        let seg_len = (b.x - a.x).hypot(b.y - a.y);
        let lerp = |t: f64| {
            let c = Coord { x: a.x + t * (b.x - a.x), y: a.y + t * (b.y - a.y) };
            let z = zs.map_or(0.0, |z| z[i] + t * (z[i + 1] - z[i]));
            (c, z)
        };

        if let Some((t0, t1)) = clip_segment(a, b, rect) {
            let (c0, z0) = if t0 == 0.0 { (a, lerp(0.0).1) } else { lerp(t0) };
            let (c1, z1) = if t1 == 1.0 { (b, lerp(1.0).1) } else { lerp(t1) };
            match current.as_mut() {
                Some(piece) if piece.coords.last() == Some(&c0) => {}
                _ => {
                    if let Some(done) = current.take() {
                        done.finish(zs.is_some(), &mut out);
                    }
                    current = Some(Piece {
                        start: travelled + t0 * seg_len,
                        coords: vec![c0],
                        z: vec![z0],
                    });
                }
            }
            if let Some(piece) = current.as_mut() {
                if c1 != c0 {
                    piece.coords.push(c1);
                    piece.z.push(z1);
                }
            }
            if t1 < 1.0 {
                if let Some(done) = current.take() {
                    done.finish(zs.is_some(), &mut out);
                }
            }
        } else if let Some(done) = current.take() {
            done.finish(zs.is_some(), &mut out);
        }
        travelled += seg_len;
    }
    if let Some(done) = current.take() {
        done.finish(zs.is_some(), &mut out);
    }
    out
}
