//! Glyph rendering for text, callouts, pins, emoji stamps and ruler labels.
//!
//! Glyphs are rasterized with `ab_glyph` at the target scale and blended
//! straight into the pixmap, so text composites in paint order with every
//! other annotation. Text boxes carry a block size measured here when a
//! font is loaded, and fall back to [`crate::annotation::text_block_size`]
//! otherwise.

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, FontVec, GlyphId, PxScale, ScaleFont};
use egui::{Pos2, Rect, Vec2};
use tiny_skia::{Pixmap, PremultipliedColorU8, Transform};

use crate::annotation::{line_height, TextAlign};

const REGULAR_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/SFNS.ttf",
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "C:\\Windows\\Fonts\\segoeuib.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Horizontal shear applied to italic runs.
const ITALIC_SHEAR: f32 = 0.2;

#[derive(Clone, Default)]
pub struct FontBook {
    regular: Option<FontArc>,
    bold: Option<FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("regular", &self.regular.is_some())
            .field("bold", &self.bold.is_some())
            .finish()
    }
}

impl FontBook {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_font(font: FontArc) -> Self {
        Self {
            regular: Some(font),
            bold: None,
        }
    }

    /// Tries `extra` first, then the usual system locations.
    pub fn load(extra: &[PathBuf]) -> Self {
        let regular = extra
            .iter()
            .map(PathBuf::as_path)
            .chain(REGULAR_CANDIDATES.iter().map(Path::new))
            .find_map(load_font);
        let bold = BOLD_CANDIDATES.iter().map(Path::new).find_map(load_font);
        if regular.is_none() {
            log::warn!("no usable font found; text annotations will not be drawn");
        }
        Self { regular, bold }
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_none()
    }

    /// The face for a run, plus whether bold must be synthesized.
    fn face(&self, bold: bool) -> Option<(&FontArc, bool)> {
        match (bold, &self.bold, &self.regular) {
            (true, Some(face), _) => Some((face, false)),
            (true, None, Some(face)) => Some((face, true)),
            (false, _, Some(face)) => Some((face, false)),
            (false, _, None) => self.bold.as_ref().map(|face| (face, false)),
            (true, None, None) => None,
        }
    }

    /// Size of `content` laid out line by line at `size`, or `None` without
    /// a font.
    pub fn measure_block(&self, content: &str, size: f32, bold: bool) -> Option<Vec2> {
        let (font, synthetic_bold) = self.face(bold)?;
        let mut lines = 0;
        let mut widest: f32 = 0.0;
        for line in content.split('\n') {
            lines += 1;
            widest = widest.max(measure_line(font, line, size));
        }
        if synthetic_bold {
            widest += (size / 24.0).max(1.0).round();
        }
        let width = widest.max(size * 0.5).ceil();
        Some(Vec2::new(width, lines as f32 * line_height(size)))
    }

    pub fn has_glyph(&self, c: char) -> bool {
        self.regular
            .as_ref()
            .is_some_and(|font| font.glyph_id(c) != GlyphId(0))
    }
}

fn load_font(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    let is_collection = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ttc"));
    let font = if is_collection {
        FontVec::try_from_vec_and_index(bytes, 0).ok().map(FontArc::new)
    } else {
        FontArc::try_from_vec(bytes).ok()
    };
    if font.is_some() {
        log::debug!("loaded font {}", path.display());
    }
    font
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextRun {
    /// Font size in image units.
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub align: TextAlign,
    pub color: [u8; 4],
    pub opacity: f32,
}

impl TextRun {
    pub fn plain(size: f32, color: [u8; 4], opacity: f32) -> Self {
        Self {
            size,
            bold: false,
            italic: false,
            align: TextAlign::Left,
            color,
            opacity,
        }
    }
}

/// Lays `text` line by line into `block` (image space). Returns false when
/// no font is available.
pub fn draw_text_block(
    pixmap: &mut Pixmap,
    fonts: &FontBook,
    text: &str,
    block: Rect,
    run: &TextRun,
    transform: Transform,
) -> bool {
    let Some((font, synthetic_bold)) = fonts.face(run.bold) else {
        return false;
    };
    let scale = transform.sx.abs().max(f32::EPSILON);
    let px = run.size * scale;
    let scaled = font.as_scaled(PxScale::from(px));
    let line_px = line_height(run.size) * scale;
    let glyph_height = scaled.ascent() - scaled.descent();

    let left = block.min.x * scale + transform.tx;
    let top = block.min.y * scale + transform.ty;
    let width = block.width() * scale;

    for (index, line) in text.split('\n').enumerate() {
        let measured = measure_line(font, line, px);
        let x = match run.align {
            TextAlign::Left => left,
            TextAlign::Center => left + (width - measured) / 2.0,
            TextAlign::Right => left + width - measured,
        };
        let line_top = top + index as f32 * line_px;
        let baseline = line_top + (line_px - glyph_height) / 2.0 + scaled.ascent();
        draw_line(pixmap, font, line, x, baseline, px, run, synthetic_bold);
    }
    true
}

/// Draws one line centred on `center` (image space).
pub fn draw_text_centered(
    pixmap: &mut Pixmap,
    fonts: &FontBook,
    text: &str,
    center: Pos2,
    run: &TextRun,
    transform: Transform,
) -> bool {
    let Some((font, synthetic_bold)) = fonts.face(run.bold) else {
        return false;
    };
    let scale = transform.sx.abs().max(f32::EPSILON);
    let px = run.size * scale;
    let scaled = font.as_scaled(PxScale::from(px));
    let width = measure_line(font, text, px);
    let cx = center.x * scale + transform.tx;
    let cy = center.y * scale + transform.ty;
    let baseline = cy + (scaled.ascent() + scaled.descent()) / 2.0;
    draw_line(
        pixmap,
        font,
        text,
        cx - width / 2.0,
        baseline,
        px,
        run,
        synthetic_bold,
    );
    true
}

/// Advance width of one line in pixels at `px`.
pub fn measure_line(font: &FontArc, line: &str, px: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(px));
    let mut width = 0.0;
    let mut previous: Option<GlyphId> = None;
    for c in line.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        previous = Some(id);
    }
    width
}

#[allow(clippy::too_many_arguments)]
fn draw_line(
    pixmap: &mut Pixmap,
    font: &FontArc,
    line: &str,
    x: f32,
    baseline: f32,
    px: f32,
    run: &TextRun,
    synthetic_bold: bool,
) {
    let scaled = font.as_scaled(PxScale::from(px));
    let alpha = run.color[3] as f32 / 255.0 * run.opacity.clamp(0.0, 1.0);
    let color = [
        run.color[0] as f32 / 255.0,
        run.color[1] as f32 / 255.0,
        run.color[2] as f32 / 255.0,
    ];
    let bold_offset = if synthetic_bold {
        (px / 24.0).max(1.0).round() as i32
    } else {
        0
    };
    let shear = if run.italic { ITALIC_SHEAR } else { 0.0 };

    let mut caret = x;
    let mut previous: Option<GlyphId> = None;
    for c in line.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(px, point(caret, baseline));
        caret += scaled.h_advance(id);
        previous = Some(id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let py = bounds.min.y + gy as f32;
            let slant = ((baseline - py) * shear).round() as i32;
            let px_x = bounds.min.x as i32 + gx as i32 + slant;
            let px_y = py as i32;
            let a = alpha * coverage;
            blend(pixmap, px_x, px_y, color, a);
            if bold_offset > 0 {
                blend(pixmap, px_x + bold_offset, px_y, color, a);
            }
        });
    }
}

/// Source-over of a straight colour with alpha `a` onto one pixel.
fn blend(pixmap: &mut Pixmap, x: i32, y: i32, color: [f32; 3], a: f32) {
    if a <= 0.0 || x < 0 || y < 0 {
        return;
    }
    let (width, height) = (pixmap.width() as i32, pixmap.height() as i32);
    if x >= width || y >= height {
        return;
    }
    let index = (y * width + x) as usize;
    let Some(pixel) = pixmap.pixels_mut().get_mut(index) else {
        return;
    };
    let a = a.min(1.0);
    let inv = 1.0 - a;
    let out_a = a + pixel.alpha() as f32 / 255.0 * inv;
    let channel = |src: f32, dst: u8| src * a + dst as f32 / 255.0 * inv;
    let out_r = channel(color[0], pixel.red());
    let out_g = channel(color[1], pixel.green());
    let out_b = channel(color[2], pixel.blue());
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    let alpha = to_u8(out_a);
    let blended = PremultipliedColorU8::from_rgba(
        to_u8(out_r).min(alpha),
        to_u8(out_g).min(alpha),
        to_u8(out_b).min(alpha),
        alpha,
    );
    if let Some(blended) = blended {
        *pixel = blended;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_draws_nothing() {
        let mut pixmap = Pixmap::new(40, 20).expect("pixmap");
        let fonts = FontBook::empty();
        let run = TextRun::plain(14.0, [0, 0, 0, 255], 1.0);
        let drawn = draw_text_block(
            &mut pixmap,
            &fonts,
            "hi",
            Rect::from_min_size(Pos2::ZERO, egui::vec2(40.0, 20.0)),
            &run,
            Transform::identity(),
        );
        assert!(!drawn);
        assert!(pixmap.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn blend_composites_over_existing_pixel() {
        let mut pixmap = Pixmap::new(2, 1).expect("pixmap");
        pixmap.fill(tiny_skia::Color::WHITE);
        blend(&mut pixmap, 0, 0, [0.0, 0.0, 0.0], 0.5);
        let pixel = pixmap.pixels()[0];
        assert_eq!(pixel.alpha(), 255);
        assert!((126..=129).contains(&pixel.red()));
        // Out of bounds is ignored.
        blend(&mut pixmap, 5, 0, [0.0, 0.0, 0.0], 1.0);
        assert_eq!(pixmap.pixels()[1].red(), 255);
    }

    #[test]
    fn empty_book_has_no_measurement() {
        assert_eq!(FontBook::empty().measure_block("hello", 18.0, false), None);
    }

    #[test]
    fn measured_block_follows_glyph_advances() {
        let fonts = FontBook::load(&[]);
        let Some((font, _)) = fonts.face(false) else {
            return;
        };
        let narrow = fonts.measure_block("iiii", 20.0, false).expect("font");
        let wide = fonts.measure_block("WWWW", 20.0, false).expect("font");
        // A fixed per-character estimate would make these equal.
        assert!(wide.x > narrow.x, "{narrow:?} {wide:?}");
        assert_eq!(wide.x, measure_line(font, "WWWW", 20.0).max(10.0).ceil());

        let two = fonts.measure_block("iiii\nWWWW", 20.0, false).expect("font");
        assert_eq!(two.x, wide.x);
        assert_eq!(two.y, 2.0 * line_height(20.0));
    }

    #[test]
    fn loaded_font_renders_ink_when_available() {
        let fonts = FontBook::load(&[]);
        if fonts.is_empty() {
            return;
        }
        let mut pixmap = Pixmap::new(120, 40).expect("pixmap");
        let run = TextRun::plain(20.0, [0, 0, 0, 255], 1.0);
        assert!(draw_text_block(
            &mut pixmap,
            &fonts,
            "Hello",
            Rect::from_min_size(Pos2::new(4.0, 4.0), egui::vec2(100.0, 30.0)),
            &run,
            Transform::identity(),
        ));
        assert!(pixmap.pixels().iter().any(|p| p.alpha() > 0));
    }
}
