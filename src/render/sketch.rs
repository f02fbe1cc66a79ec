//! Hand-drawn look for strokes.
//!
//! Every segment becomes a slightly bowed quadratic with jittered
//! endpoints. The jitter is seeded from the annotation id and the pass
//! number, so the same annotation wobbles the same way on every frame and
//! in the exported image.

use egui::{vec2, Pos2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::annotation::AnnotationId;
use crate::geometry::{Path, PathEl};

/// Number of overlaid passes drawn per sketched stroke.
pub const PASSES: u32 = 2;

struct Jitter {
    rng: StdRng,
}

impl Jitter {
    fn new(id: AnnotationId, pass: u32) -> Self {
        let seed = id
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(pass as u64 * 99_991);
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn offset(&mut self, amount: f32) -> f32 {
        if amount <= 0.0 {
            return 0.0;
        }
        self.rng.random_range(-amount..amount)
    }

    fn nudge(&mut self, p: Pos2, amount: f32) -> Pos2 {
        p + vec2(self.offset(amount), self.offset(amount))
    }
}

/// Roughened copy of `path`. `roughness` scales with the stroke width so
/// thick strokes wobble visibly and thin ones stay legible.
pub fn roughen(path: &Path, id: AnnotationId, pass: u32, roughness: f32) -> Path {
    if roughness <= 0.0 {
        return path.clone();
    }
    let max_offset = roughness * 2.0;
    let bowing = roughness;
    let mut jitter = Jitter::new(id, pass);

    let mut out = Path::new();
    let mut last = Pos2::ZERO;
    let mut subpath_start = Pos2::ZERO;
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                out.move_to(jitter.nudge(p, max_offset));
                last = p;
                subpath_start = p;
            }
            PathEl::LineTo(p) => {
                bowed_line(&mut out, &mut jitter, last, p, bowing, max_offset);
                last = p;
            }
            PathEl::QuadTo(c, p) => {
                out.quad_to(jitter.nudge(c, max_offset * 0.7), jitter.nudge(p, max_offset));
                last = p;
            }
            PathEl::CubicTo(c1, c2, p) => {
                out.cubic_to(
                    jitter.nudge(c1, max_offset * 0.5),
                    jitter.nudge(c2, max_offset * 0.5),
                    jitter.nudge(p, max_offset),
                );
                last = p;
            }
            PathEl::Close => {
                // Left open so the closing corner overshoots like the others.
                if last != subpath_start {
                    bowed_line(&mut out, &mut jitter, last, subpath_start, bowing, max_offset);
                }
                last = subpath_start;
            }
        }
    }
    out
}

fn bowed_line(
    out: &mut Path,
    jitter: &mut Jitter,
    from: Pos2,
    to: Pos2,
    bowing: f32,
    max_offset: f32,
) {
    let d = to - from;
    let len = d.length();
    let normal = if len > 0.001 {
        vec2(-d.y / len, d.x / len)
    } else {
        vec2(0.0, 0.0)
    };
    let bow = jitter.offset(bowing * bowing * len / 200.0);
    let control = from.lerp(to, 0.5) + normal * bow;
    out.quad_to(control, jitter.nudge(to, max_offset));
}

/// Roughness used for a stroke of `line_width`.
pub fn roughness_for(line_width: f32) -> f32 {
    (line_width * 0.5).clamp(0.8, 3.0)
}

#[cfg(test)]
mod tests {
    use egui::{pos2, Rect};

    use super::*;

    fn square() -> Path {
        Path::rect(Rect::from_min_max(pos2(0.0, 0.0), pos2(100.0, 100.0)))
    }

    #[test]
    fn same_seed_same_wobble() {
        let a = roughen(&square(), 7, 0, 1.5);
        let b = roughen(&square(), 7, 0, 1.5);
        assert_eq!(a, b);
    }

    #[test]
    fn passes_differ() {
        let a = roughen(&square(), 7, 0, 1.5);
        let b = roughen(&square(), 7, 1, 1.5);
        assert_ne!(a, b);
    }

    #[test]
    fn zero_roughness_is_identity() {
        assert_eq!(roughen(&square(), 3, 0, 0.0), square());
    }

    #[test]
    fn jitter_stays_bounded() {
        let rough = roughen(&square(), 11, 1, 2.0);
        for el in rough.elements() {
            let p = match *el {
                PathEl::MoveTo(p) | PathEl::LineTo(p) | PathEl::QuadTo(_, p) => p,
                PathEl::CubicTo(_, _, p) => p,
                PathEl::Close => continue,
            };
            assert!(p.x > -5.0 && p.x < 105.0 && p.y > -5.0 && p.y < 105.0, "{p:?}");
        }
    }
}
