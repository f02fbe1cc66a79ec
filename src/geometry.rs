//! Pure geometry helpers shared by hit-testing, interaction and rendering.
//!
//! Everything here works on `egui`'s math types and holds no state. Paths are
//! kept as a small command list so that the same outline can be handed to the
//! raster backend or inspected in tests.

use egui::{pos2, vec2, Pos2, Rect, Vec2};

/// Cubic approximation constant for a quarter ellipse.
const KAPPA: f32 = 0.552_284_8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathEl {
    MoveTo(Pos2),
    LineTo(Pos2),
    QuadTo(Pos2, Pos2),
    CubicTo(Pos2, Pos2, Pos2),
    Close,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    elements: Vec<PathEl>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[PathEl] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn move_to(&mut self, p: Pos2) {
        self.elements.push(PathEl::MoveTo(p));
    }

    pub fn line_to(&mut self, p: Pos2) {
        self.elements.push(PathEl::LineTo(p));
    }

    pub fn quad_to(&mut self, control: Pos2, p: Pos2) {
        self.elements.push(PathEl::QuadTo(control, p));
    }

    pub fn cubic_to(&mut self, c1: Pos2, c2: Pos2, p: Pos2) {
        self.elements.push(PathEl::CubicTo(c1, c2, p));
    }

    pub fn close(&mut self) {
        self.elements.push(PathEl::Close);
    }

    pub fn extend(&mut self, other: &Path) {
        self.elements.extend_from_slice(&other.elements);
    }

    pub fn polyline(points: &[Pos2]) -> Self {
        let mut path = Self::new();
        let mut iter = points.iter();
        if let Some(first) = iter.next() {
            path.move_to(*first);
            for p in iter {
                path.line_to(*p);
            }
        }
        path
    }

    pub fn polygon(points: &[Pos2]) -> Self {
        let mut path = Self::polyline(points);
        if !path.is_empty() {
            path.close();
        }
        path
    }

    pub fn rect(rect: Rect) -> Self {
        Self::polygon(&[
            rect.left_top(),
            rect.right_top(),
            rect.right_bottom(),
            rect.left_bottom(),
        ])
    }

    /// Rounded rectangle; the radius is clamped to half of the shorter side.
    pub fn rounded_rect(rect: Rect, radius: f32) -> Self {
        let r = radius.min(rect.width() * 0.5).min(rect.height() * 0.5).max(0.0);
        if r <= f32::EPSILON {
            return Self::rect(rect);
        }
        let k = r * (1.0 - KAPPA);
        let (l, t, rt, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
        let mut path = Self::new();
        path.move_to(pos2(l + r, t));
        path.line_to(pos2(rt - r, t));
        path.cubic_to(pos2(rt - k, t), pos2(rt, t + k), pos2(rt, t + r));
        path.line_to(pos2(rt, b - r));
        path.cubic_to(pos2(rt, b - k), pos2(rt - k, b), pos2(rt - r, b));
        path.line_to(pos2(l + r, b));
        path.cubic_to(pos2(l + k, b), pos2(l, b - k), pos2(l, b - r));
        path.line_to(pos2(l, t + r));
        path.cubic_to(pos2(l, t + k), pos2(l + k, t), pos2(l + r, t));
        path.close();
        path
    }

    pub fn ellipse(rect: Rect) -> Self {
        let c = rect.center();
        let rx = rect.width() * 0.5;
        let ry = rect.height() * 0.5;
        let ox = rx * KAPPA;
        let oy = ry * KAPPA;
        let mut path = Self::new();
        path.move_to(pos2(c.x + rx, c.y));
        path.cubic_to(pos2(c.x + rx, c.y + oy), pos2(c.x + ox, c.y + ry), pos2(c.x, c.y + ry));
        path.cubic_to(pos2(c.x - ox, c.y + ry), pos2(c.x - rx, c.y + oy), pos2(c.x - rx, c.y));
        path.cubic_to(pos2(c.x - rx, c.y - oy), pos2(c.x - ox, c.y - ry), pos2(c.x, c.y - ry));
        path.cubic_to(pos2(c.x + ox, c.y - ry), pos2(c.x + rx, c.y - oy), pos2(c.x + rx, c.y));
        path.close();
        path
    }

    pub fn circle(center: Pos2, radius: f32) -> Self {
        Self::ellipse(Rect::from_center_size(center, Vec2::splat(radius * 2.0)))
    }

    pub fn segment(a: Pos2, b: Pos2) -> Self {
        Self::polyline(&[a, b])
    }
}

pub fn normalized(v: Vec2) -> Vec2 {
    let len = v.length();
    if len <= f32::EPSILON {
        Vec2::ZERO
    } else {
        v / len
    }
}

/// Left-hand normal of a direction (y grows downward).
pub fn perpendicular(v: Vec2) -> Vec2 {
    vec2(-v.y, v.x)
}

pub fn distance_point_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let ab_len_sq = ab.length_sq();
    if ab_len_sq <= f32::EPSILON {
        return ap.length();
    }
    let t = (ap.dot(ab) / ab_len_sq).clamp(0.0, 1.0);
    let projection = a + ab * t;
    (p - projection).length()
}

pub fn quadratic_point(start: Pos2, control: Pos2, end: Pos2, t: f32) -> Pos2 {
    let mt = 1.0 - t;
    let x = mt * mt * start.x + 2.0 * mt * t * control.x + t * t * end.x;
    let y = mt * mt * start.y + 2.0 * mt * t * control.y + t * t * end.y;
    pos2(x, y)
}

/// Minimum distance from `p` to the curve sampled at `samples + 1` points.
pub fn distance_point_to_quadratic_bezier(
    p: Pos2,
    start: Pos2,
    control: Pos2,
    end: Pos2,
    samples: usize,
) -> f32 {
    let samples = samples.max(1);
    (0..=samples)
        .map(|i| {
            let t = i as f32 / samples as f32;
            quadratic_point(start, control, end, t).distance(p)
        })
        .fold(f32::INFINITY, f32::min)
}

/// Distance from `p` to the infinite line through `a` and `b`.
fn perpendicular_distance(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len = ab.length();
    if len <= f32::EPSILON {
        return p.distance(a);
    }
    let ap = p - a;
    (ab.x * ap.y - ab.y * ap.x).abs() / len
}

/// Douglas-Peucker simplification. Endpoints are always kept as-is.
pub fn simplify(points: &[Pos2], tolerance: f32) -> Vec<Pos2> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_distance = 0.0;
    let mut split = 0;
    for (idx, p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = perpendicular_distance(*p, first, last);
        if d > max_distance {
            max_distance = d;
            split = idx;
        }
    }

    if max_distance > tolerance {
        let mut left = simplify(&points[..=split], tolerance);
        let right = simplify(&points[split..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Catmull-Rom spline through `points`, emitted as cubic segments.
pub fn smooth(points: &[Pos2]) -> Path {
    if points.len() < 3 {
        return Path::polyline(points);
    }
    let mut path = Path::new();
    path.move_to(points[0]);
    let last = points.len() - 1;
    for i in 0..last {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(last)];
        let c1 = p1 + (p2 - p0) / 6.0;
        let c2 = p2 - (p3 - p1) / 6.0;
        path.cubic_to(c1, c2, p2);
    }
    path
}

/// Seven-point arrow silhouette laid along `start -> end`.
pub fn arrow_polygon(
    start: Pos2,
    end: Pos2,
    tail_width: f32,
    head_width: f32,
    head_length: f32,
) -> Vec<Pos2> {
    let dir = end - start;
    let length = dir.length();
    let head_length = head_length.min(length);
    let shaft = length - head_length;
    let tail = tail_width * 0.5;
    let head = head_width * 0.5;

    let local = [
        vec2(0.0, -tail),
        vec2(shaft, -tail),
        vec2(shaft, -head),
        vec2(length, 0.0),
        vec2(shaft, head),
        vec2(shaft, tail),
        vec2(0.0, tail),
    ];

    let unit = normalized(dir);
    let normal = perpendicular(unit);
    local
        .iter()
        .map(|v| start + unit * v.x + normal * v.y)
        .collect()
}

/// Arrow whose shaft follows the quadratic curve `start, control, end`.
pub fn curved_arrow_polygon(
    start: Pos2,
    end: Pos2,
    control: Pos2,
    tail_width: f32,
    head_width: f32,
    head_length: f32,
) -> Path {
    let mut tangent = normalized(end - control);
    if tangent == Vec2::ZERO {
        tangent = normalized(end - start);
    }
    let base = end - tangent * head_length;

    let mut start_dir = normalized(control - start);
    if start_dir == Vec2::ZERO {
        start_dir = tangent;
    }
    let mut mid_dir = normalized(base - start);
    if mid_dir == Vec2::ZERO {
        mid_dir = tangent;
    }

    let half = tail_width * 0.5;
    let head = head_width * 0.5;
    let n_start = perpendicular(start_dir);
    let n_mid = perpendicular(mid_dir);
    let n_end = perpendicular(tangent);

    let mut path = Path::new();
    path.move_to(start + n_start * half);
    path.quad_to(control + n_mid * half, base + n_end * half);
    path.line_to(base + n_end * head);
    path.line_to(end);
    path.line_to(base - n_end * head);
    path.line_to(base - n_end * half);
    path.quad_to(control - n_mid * half, start - n_start * half);
    path.close();
    path
}

pub fn bounding_rect(points: &[Pos2]) -> Option<Rect> {
    let first = points.first()?;
    let mut rect = Rect::from_min_max(*first, *first);
    for p in &points[1..] {
        rect.extend_with(*p);
    }
    Some(rect)
}

/// Moves `current` so the box spanned from `start` is square.
pub fn constrain_square(start: Pos2, current: Pos2) -> Pos2 {
    let dx = current.x - start.x;
    let dy = current.y - start.y;
    let side = dx.abs().max(dy.abs());
    pos2(start.x + side * dx.signum(), start.y + side * dy.signum())
}

/// Rotates `current` around `origin` onto the nearest `increment_deg` ray.
pub fn constrain_angle(origin: Pos2, current: Pos2, increment_deg: f32) -> Pos2 {
    let delta = current - origin;
    let length = delta.length();
    if length <= f32::EPSILON || increment_deg <= 0.0 {
        return current;
    }
    let step = increment_deg.to_radians();
    let angle = (delta.y.atan2(delta.x) / step).round() * step;
    origin + vec2(angle.cos(), angle.sin()) * length
}
