//! Rasterizes annotations onto a tiny-skia pixmap.
//!
//! The same code path feeds the live canvas and the exported image; the two
//! differ only in the transform (display fit vs identity) and in whether a
//! [`PatchCache`] is available for blur and pixelate results.

pub mod overlay;
pub mod sketch;
pub mod text;

use std::collections::HashMap;

use egui::{pos2, vec2, Pos2, Rect, Vec2};
use image::RgbaImage;
use tiny_skia::{
    BlendMode, Color, ColorU8, FillRule, FilterQuality, LineCap, LineJoin, Paint, Pattern,
    PathBuilder, Pixmap, PixmapPaint, SpreadMode, Stroke, StrokeDash, Transform,
};

use crate::annotation::{
    text_block_size, Annotation, AnnotationId, AnnotationKind, BlurMode, BrushKind, PinShape,
    SpotlightShape, Style, TailDirection, TEXT_PADDING_X, TEXT_PADDING_Y,
};
use crate::error::{RenderError, RenderResult};
use crate::filters::{average_border_color, ImageFilters, Origin, PixelRect};
use crate::geometry::{self, Path, PathEl};

use self::text::{FontBook, TextRun};

/// Fill alpha for shapes that are both filled and stroked.
const BOTH_FILL_ALPHA: f32 = 0.3;
const HIGHLIGHT_ALPHA: f32 = 0.4;
const SPOTLIGHT_DIM: u8 = 140;
const MARKER_ALPHA: f32 = 0.5;
const CALLOUT_PADDING: f32 = 10.0;
const RULER_LABEL_SIZE: f32 = 13.0;

/// The base screenshot in both layouts the renderer needs.
pub struct SourceImage {
    rgba: RgbaImage,
    pixmap: Pixmap,
}

impl SourceImage {
    pub fn new(rgba: RgbaImage) -> RenderResult<Self> {
        let pixmap = rgba_to_pixmap(&rgba)?;
        Ok(Self { rgba, pixmap })
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    pub fn size(&self) -> Vec2 {
        vec2(self.width() as f32, self.height() as f32)
    }

    pub fn frame(&self) -> Rect {
        Rect::from_min_size(Pos2::ZERO, self.size())
    }
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceImage({}x{})", self.width(), self.height())
    }
}

pub fn rgba_to_pixmap(image: &RgbaImage) -> RenderResult<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or(RenderError::PixmapAllocation { width, height })?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RenderResult<RgbaImage> {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let actual = data.len();
    RgbaImage::from_raw(width, height, data).ok_or(RenderError::SizeMismatch {
        expected: width as usize * height as usize * 4,
        actual,
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PatchKey {
    Blur {
        region: PixelRect,
        radius: f32,
        mode: BlurMode,
    },
    Pixelate {
        region: PixelRect,
        block_size: u32,
    },
}

struct PatchEntry {
    key: PatchKey,
    patch: Option<Pixmap>,
}

/// Filter results per annotation, reused while the annotation's region and
/// parameters stay the same. Failed filters are cached too.
#[derive(Default)]
pub struct PatchCache {
    entries: HashMap<AnnotationId, PatchEntry>,
}

impl PatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &mut self,
        id: AnnotationId,
        key: PatchKey,
        compute: impl FnOnce() -> Option<Pixmap>,
    ) -> Option<&Pixmap> {
        let fresh = self.entries.get(&id).is_some_and(|entry| entry.key == key);
        if !fresh {
            self.entries.insert(
                id,
                PatchEntry {
                    key,
                    patch: compute(),
                },
            );
        }
        self.entries.get(&id).and_then(|entry| entry.patch.as_ref())
    }

    /// Drops entries for annotations that no longer exist.
    pub fn retain_ids(&mut self, live: impl IntoIterator<Item = AnnotationId>) {
        let live: std::collections::HashSet<AnnotationId> = live.into_iter().collect();
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for PatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

pub struct RenderContext<'a> {
    pub source: &'a SourceImage,
    pub filters: &'a dyn ImageFilters,
    pub fonts: &'a FontBook,
    /// Image space to pixmap space.
    pub transform: Transform,
    pub pen_tolerance: f32,
    pub cache: Option<&'a mut PatchCache>,
}

pub fn render_all(pixmap: &mut Pixmap, annotations: &[Annotation], ctx: &mut RenderContext<'_>) {
    for annotation in annotations {
        render_annotation(pixmap, annotation, ctx);
    }
}

pub fn render_annotation(pixmap: &mut Pixmap, annotation: &Annotation, ctx: &mut RenderContext<'_>) {
    let style = &annotation.style;
    let opacity = style.clamped_opacity();
    let transform = ctx.transform;

    match &annotation.kind {
        AnnotationKind::Rectangle { rect } => {
            let outline = Path::rounded_rect(rect.to_rect(), style.corner_radius);
            draw_shape(pixmap, annotation, &outline, transform);
        }
        AnnotationKind::Ellipse { rect } => {
            let outline = Path::ellipse(rect.to_rect());
            draw_shape(pixmap, annotation, &outline, transform);
        }
        AnnotationKind::Line { start, end } => {
            let outline = Path::segment(start.to_pos2(), end.to_pos2());
            stroke_outline(pixmap, annotation, &outline, style.line_width, transform);
        }
        AnnotationKind::Arrow {
            start,
            end,
            control,
        } => draw_arrow(
            pixmap,
            annotation,
            start.to_pos2(),
            end.to_pos2(),
            control.map(|c| c.to_pos2()),
            transform,
        ),
        AnnotationKind::Ruler { start, end } => {
            draw_ruler(pixmap, style, start.to_pos2(), end.to_pos2(), ctx)
        }
        AnnotationKind::Text(text) => {
            let bounds = text.padded_rect();
            if let Some(background) = text.background {
                fill(
                    pixmap,
                    &Path::rounded_rect(bounds, 6.0),
                    &solid(background, opacity),
                    FillRule::Winding,
                    transform,
                );
            }
            let block = bounds.shrink2(vec2(TEXT_PADDING_X, TEXT_PADDING_Y));
            let run = TextRun {
                size: text.size.points(),
                bold: text.bold,
                italic: text.italic,
                align: text.align,
                color: style.color,
                opacity,
            };
            text::draw_text_block(pixmap, ctx.fonts, &text.content, block, &run, transform);
        }
        AnnotationKind::Pin {
            rect,
            number,
            shape,
        } => {
            let rect = rect.to_rect();
            let outline = match shape {
                PinShape::Circle => Path::ellipse(rect),
                PinShape::Square => Path::rect(rect),
                PinShape::RoundedSquare => {
                    Path::rounded_rect(rect, rect.width().min(rect.height()) * 0.25)
                }
            };
            fill(pixmap, &outline, &solid(style.color, opacity), FillRule::Winding, transform);
            let run = TextRun {
                bold: true,
                ..TextRun::plain(rect.height() * 0.5, contrasting(style.color), opacity)
            };
            text::draw_text_centered(
                pixmap,
                ctx.fonts,
                &number.to_string(),
                rect.center(),
                &run,
                transform,
            );
        }
        AnnotationKind::Pixelate { rect, block_size } => {
            let Some(region) = pixel_region(ctx.source, rect.to_rect()) else {
                return;
            };
            let key = PatchKey::Pixelate {
                region,
                block_size: *block_size,
            };
            draw_filtered(pixmap, annotation.id, region, key, opacity, FilterQuality::Nearest, ctx);
        }
        AnnotationKind::Highlighter { rect } => {
            let mut paint = solid(style.color, opacity * HIGHLIGHT_ALPHA);
            paint.blend_mode = BlendMode::Multiply;
            fill(pixmap, &Path::rect(rect.to_rect()), &paint, FillRule::Winding, transform);
        }
        AnnotationKind::Spotlight { rect, shape } => {
            let rect = rect.to_rect();
            let mut outline = Path::rect(ctx.source.frame());
            outline.extend(&match shape {
                SpotlightShape::Ellipse => Path::ellipse(rect),
                SpotlightShape::Rectangle => Path::rounded_rect(rect, style.corner_radius),
            });
            fill(
                pixmap,
                &outline,
                &solid([0, 0, 0, SPOTLIGHT_DIM], opacity),
                FillRule::EvenOdd,
                transform,
            );
        }
        AnnotationKind::Emoji { rect, glyph } => {
            let rect = rect.to_rect();
            let drawable = glyph.chars().next().is_some_and(|c| ctx.fonts.has_glyph(c));
            let run = TextRun::plain(rect.height() * 0.8, style.color, opacity);
            if !drawable
                || !text::draw_text_centered(pixmap, ctx.fonts, glyph, rect.center(), &run, transform)
            {
                // Stand-in disc when the glyph cannot be drawn.
                fill(pixmap, &Path::ellipse(rect), &solid(style.color, opacity), FillRule::Winding, transform);
            }
        }
        AnnotationKind::Pen { path, brush } => {
            let points: Vec<Pos2> = path.iter().map(|p| p.to_pos2()).collect();
            draw_pen(pixmap, style, &points, *brush, ctx.pen_tolerance, transform);
        }
        AnnotationKind::Blur { rect, radius, mode } => {
            let Some(region) = pixel_region(ctx.source, rect.to_rect()) else {
                return;
            };
            let key = PatchKey::Blur {
                region,
                radius: *radius,
                mode: *mode,
            };
            draw_filtered(pixmap, annotation.id, region, key, opacity, FilterQuality::Bilinear, ctx);
        }
        AnnotationKind::Callout {
            rect,
            text: content,
            size,
            tail,
        } => {
            let rect = rect.to_rect();
            let radius = style.corner_radius.max(8.0);
            let mut outline = Path::rounded_rect(rect, radius);
            outline.extend(&Path::polygon(&callout_tail(rect, *tail)));
            fill(pixmap, &outline, &solid(style.color, opacity), FillRule::Winding, transform);
            let run = TextRun::plain(size.points(), contrasting(style.color), opacity);
            let block = rect.shrink(CALLOUT_PADDING);
            if block.width() > 0.0 && block.height() > 0.0 {
                text::draw_text_block(pixmap, ctx.fonts, content, block, &run, transform);
            }
        }
        AnnotationKind::Magnifier {
            rect,
            magnification,
        } => draw_magnifier(pixmap, annotation, rect.to_rect(), *magnification, ctx),
    }
}

pub(crate) fn to_skia(path: &Path) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x, p.y),
            PathEl::LineTo(p) => pb.line_to(p.x, p.y),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x, c.y, p.x, p.y),
            PathEl::CubicTo(c1, c2, p) => pb.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y),
            PathEl::Close => pb.close(),
        }
    }
    pb.finish()
}

fn solid(color: [u8; 4], alpha_scale: f32) -> Paint<'static> {
    let alpha = (color[3] as f32 * alpha_scale.clamp(0.0, 1.0)).round() as u8;
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], alpha);
    paint.anti_alias = true;
    paint
}

fn stroke(width: f32, dashed: bool) -> Stroke {
    let width = width.max(0.5);
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        dash: if dashed {
            StrokeDash::new(vec![width * 3.0, width * 2.0], 0.0)
        } else {
            None
        },
        ..Stroke::default()
    }
}

fn fill(pixmap: &mut Pixmap, path: &Path, paint: &Paint<'_>, rule: FillRule, transform: Transform) {
    if let Some(path) = to_skia(path) {
        pixmap.fill_path(&path, paint, rule, transform, None);
    }
}

fn stroke_path(
    pixmap: &mut Pixmap,
    path: &Path,
    paint: &Paint<'_>,
    stroke: &Stroke,
    transform: Transform,
) {
    if let Some(path) = to_skia(path) {
        pixmap.stroke_path(&path, paint, stroke, transform, None);
    }
}

/// Strokes `outline` honouring the dashed and sketch flags.
fn stroke_outline(
    pixmap: &mut Pixmap,
    annotation: &Annotation,
    outline: &Path,
    width: f32,
    transform: Transform,
) {
    let style = &annotation.style;
    let paint = solid(style.color, style.clamped_opacity());
    let stroke = stroke(width, style.dashed);
    if style.sketch {
        let roughness = sketch::roughness_for(width);
        for pass in 0..sketch::PASSES {
            let rough = sketch::roughen(outline, annotation.id, pass, roughness);
            stroke_path(pixmap, &rough, &paint, &stroke, transform);
        }
    } else {
        stroke_path(pixmap, outline, &paint, &stroke, transform);
    }
}

fn draw_shape(pixmap: &mut Pixmap, annotation: &Annotation, outline: &Path, transform: Transform) {
    let style = &annotation.style;
    let opacity = style.clamped_opacity();
    if style.fill_mode.fills() {
        let alpha = if style.fill_mode.strokes() {
            BOTH_FILL_ALPHA
        } else {
            1.0
        };
        fill(pixmap, outline, &solid(style.color, opacity * alpha), FillRule::Winding, transform);
    }
    if style.fill_mode.strokes() {
        stroke_outline(pixmap, annotation, outline, style.line_width, transform);
    }
}

fn arrow_head_size(line_width: f32) -> (f32, f32) {
    let length = line_width * 3.0 + 8.0;
    (length * 0.9, length)
}

fn draw_arrow(
    pixmap: &mut Pixmap,
    annotation: &Annotation,
    start: Pos2,
    end: Pos2,
    control: Option<Pos2>,
    transform: Transform,
) {
    let style = &annotation.style;
    if (end - start).length() < 1.0 {
        return;
    }
    let width = style.line_width.max(1.0);
    let (head_width, head_length) = arrow_head_size(width);
    let paint = solid(style.color, style.clamped_opacity());

    if !style.dashed && !style.sketch {
        let outline = match control {
            Some(control) => {
                geometry::curved_arrow_polygon(start, end, control, width, head_width, head_length)
            }
            None => Path::polygon(&geometry::arrow_polygon(
                start,
                end,
                width,
                head_width,
                head_length,
            )),
        };
        fill(pixmap, &outline, &paint, FillRule::Winding, transform);
        return;
    }

    // Dashed or sketched: stroke the shaft, then a solid head.
    let mut tangent = geometry::normalized(end - control.unwrap_or(start));
    if tangent == Vec2::ZERO {
        tangent = geometry::normalized(end - start);
    }
    let head_length = head_length.min((end - start).length());
    let base = end - tangent * head_length;
    let mut shaft = Path::new();
    shaft.move_to(start);
    match control {
        Some(control) => shaft.quad_to(control, base),
        None => shaft.line_to(base),
    }
    stroke_outline(pixmap, annotation, &shaft, width, transform);
    let normal = geometry::perpendicular(tangent);
    let head = Path::polygon(&[
        end,
        base + normal * head_width * 0.5,
        base - normal * head_width * 0.5,
    ]);
    fill(pixmap, &head, &paint, FillRule::Winding, transform);
}

fn draw_ruler(pixmap: &mut Pixmap, style: &Style, start: Pos2, end: Pos2, ctx: &RenderContext<'_>) {
    let transform = ctx.transform;
    let opacity = style.clamped_opacity();
    let paint = solid(style.color, opacity);
    let width = style.line_width.max(1.0);
    let line_stroke = stroke(width, style.dashed);
    stroke_path(pixmap, &Path::segment(start, end), &paint, &line_stroke, transform);

    let dir = geometry::normalized(end - start);
    let mut normal = geometry::perpendicular(dir);
    if normal == Vec2::ZERO {
        normal = vec2(0.0, -1.0);
    }
    // Keep the label above the line.
    if normal.y > 0.0 {
        normal = -normal;
    }
    let tick = (width * 2.5).max(6.0);
    let tick_stroke = stroke(width, style.dashed);
    for p in [start, end] {
        stroke_path(
            pixmap,
            &Path::segment(p + normal * tick, p - normal * tick),
            &paint,
            &tick_stroke,
            transform,
        );
    }

    let label = format!("{} px", (end - start).length().round() as i64);
    let center = start.lerp(end, 0.5) + normal * (tick + RULER_LABEL_SIZE);
    let text_size = ctx
        .fonts
        .measure_block(&label, RULER_LABEL_SIZE, false)
        .unwrap_or_else(|| text_block_size(&label, RULER_LABEL_SIZE, false));
    let size = text_size + vec2(8.0, 0.0);
    fill(
        pixmap,
        &Path::rounded_rect(Rect::from_center_size(center, size), 4.0),
        &solid([0, 0, 0, 170], opacity),
        FillRule::Winding,
        transform,
    );
    let run = TextRun::plain(RULER_LABEL_SIZE, [255, 255, 255, 255], opacity);
    text::draw_text_centered(pixmap, ctx.fonts, &label, center, &run, transform);
}

fn draw_pen(
    pixmap: &mut Pixmap,
    style: &Style,
    points: &[Pos2],
    brush: BrushKind,
    tolerance: f32,
    transform: Transform,
) {
    let (width, alpha) = match brush {
        BrushKind::Marker => (style.line_width * 3.0, MARKER_ALPHA),
        BrushKind::Solid | BrushKind::Dashed => (style.line_width, 1.0),
    };
    let paint = solid(style.color, style.clamped_opacity() * alpha);
    let simplified = geometry::simplify(points, tolerance);
    let distinct = simplified.windows(2).any(|pair| pair[0] != pair[1]);
    if !distinct {
        if let Some(&dot) = simplified.first() {
            fill(pixmap, &Path::circle(dot, width.max(1.0) * 0.5), &paint, FillRule::Winding, transform);
        }
        return;
    }
    let dashed = brush == BrushKind::Dashed || style.dashed;
    let path = geometry::smooth(&simplified);
    stroke_path(pixmap, &path, &paint, &stroke(width, dashed), transform);
}

/// Triangle hanging off the `tail` side of a callout body.
fn callout_tail(rect: Rect, tail: TailDirection) -> [Pos2; 3] {
    let c = rect.center();
    let horizontal = matches!(tail, TailDirection::Top | TailDirection::Bottom);
    let (span, depth) = if horizontal {
        (rect.width(), rect.height())
    } else {
        (rect.height(), rect.width())
    };
    let half = (span * 0.08).clamp(6.0, 20.0);
    let length = (depth * 0.4).clamp(12.0, 48.0);
    let skew = length * 0.3;
    match tail {
        TailDirection::Bottom => [
            pos2(c.x - half, rect.max.y - 1.0),
            pos2(c.x + half, rect.max.y - 1.0),
            pos2(c.x - skew, rect.max.y + length),
        ],
        TailDirection::Top => [
            pos2(c.x - half, rect.min.y + 1.0),
            pos2(c.x + half, rect.min.y + 1.0),
            pos2(c.x - skew, rect.min.y - length),
        ],
        TailDirection::Left => [
            pos2(rect.min.x + 1.0, c.y - half),
            pos2(rect.min.x + 1.0, c.y + half),
            pos2(rect.min.x - length, c.y + skew),
        ],
        TailDirection::Right => [
            pos2(rect.max.x - 1.0, c.y - half),
            pos2(rect.max.x - 1.0, c.y + half),
            pos2(rect.max.x + length, c.y + skew),
        ],
    }
}

fn draw_magnifier(
    pixmap: &mut Pixmap,
    annotation: &Annotation,
    rect: Rect,
    magnification: f32,
    ctx: &RenderContext<'_>,
) {
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return;
    }
    let style = &annotation.style;
    let opacity = style.clamped_opacity();
    let m = magnification.max(1.0);
    let c = rect.center();
    // Source point s lands at c + (s - c) * m.
    let zoom = Transform::from_row(m, 0.0, 0.0, m, c.x * (1.0 - m), c.y * (1.0 - m));
    let lens = Path::ellipse(rect);
    let paint = Paint {
        shader: Pattern::new(
            ctx.source.pixmap().as_ref(),
            SpreadMode::Pad,
            FilterQuality::Bilinear,
            opacity,
            zoom,
        ),
        anti_alias: true,
        ..Paint::default()
    };
    fill(pixmap, &lens, &paint, FillRule::Winding, ctx.transform);
    stroke_outline(pixmap, annotation, &lens, style.line_width.max(1.0), ctx.transform);
}

fn pixel_region(source: &SourceImage, rect: Rect) -> Option<PixelRect> {
    PixelRect::from_rect(rect, source.width(), source.height())
}

fn contrasting(color: [u8; 4]) -> [u8; 4] {
    let luma = 0.299 * color[0] as f32 + 0.587 * color[1] as f32 + 0.114 * color[2] as f32;
    if luma > 160.0 {
        [0, 0, 0, 255]
    } else {
        [255, 255, 255, 255]
    }
}

fn solid_patch(region: PixelRect, color: [u8; 4]) -> Option<Pixmap> {
    let mut patch = Pixmap::new(region.width, region.height)?;
    patch.fill(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    Some(patch)
}

fn to_filter_space(origin: Origin, region: PixelRect, image_height: u32) -> PixelRect {
    match origin {
        Origin::TopLeft => region,
        Origin::BottomLeft => region.flip_vertical(image_height),
    }
}

/// [`compute_patch`] with a warning when the filter gives nothing back.
fn compute_patch_logged(
    source: &SourceImage,
    filters: &dyn ImageFilters,
    id: AnnotationId,
    key: PatchKey,
) -> Option<Pixmap> {
    let patch = compute_patch(source, filters, key);
    if patch.is_none() {
        log::warn!("filter failed for annotation {id}; drawing placeholder");
    }
    patch
}

fn compute_patch(source: &SourceImage, filters: &dyn ImageFilters, key: PatchKey) -> Option<Pixmap> {
    let image = source.rgba();
    let origin = filters.origin();
    let flip = |r: PixelRect| to_filter_space(origin, r, image.height());

    match key {
        PatchKey::Pixelate { region, block_size } => {
            let patch = filters.pixelate(image, flip(region), block_size)?;
            rgba_to_pixmap(&patch).ok()
        }
        PatchKey::Blur {
            region,
            mode: BlurMode::Full,
            radius,
        } => {
            let patch = filters.gaussian_blur(image, flip(region), radius)?;
            rgba_to_pixmap(&patch).ok()
        }
        PatchKey::Blur {
            region,
            mode: BlurMode::Erase,
            ..
        } => solid_patch(region, average_border_color(image, region)),
        PatchKey::Blur {
            region,
            radius,
            mode,
        } => {
            let mut canvas = Pixmap::new(region.width, region.height)?;
            let found_regions = filters.detect_text_regions(image, flip(region));
            if found_regions.is_empty() {
                if filters.detects_text() {
                    log::debug!("no text found in {region:?}; {mode:?} leaves it untouched");
                } else {
                    log::debug!("text detector unavailable; {mode:?} leaves {region:?} untouched");
                }
            }
            for found in found_regions {
                let Some(area) = flip(found).intersect(region) else {
                    continue;
                };
                let piece = if mode == BlurMode::TextOnly {
                    rgba_to_pixmap(&filters.gaussian_blur(image, flip(area), radius)?).ok()?
                } else {
                    solid_patch(area, average_border_color(image, area))?
                };
                canvas.draw_pixmap(
                    (area.x - region.x) as i32,
                    (area.y - region.y) as i32,
                    piece.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            Some(canvas)
        }
    }
}

fn draw_filtered(
    pixmap: &mut Pixmap,
    id: AnnotationId,
    region: PixelRect,
    key: PatchKey,
    opacity: f32,
    quality: FilterQuality,
    ctx: &mut RenderContext<'_>,
) {
    let source = ctx.source;
    let filters = ctx.filters;
    let transform = ctx.transform;

    let owned;
    let patch = match ctx.cache.as_deref_mut() {
        Some(cache) => {
            cache.get_or_insert_with(id, key, || compute_patch_logged(source, filters, id, key))
        }
        None => {
            owned = compute_patch_logged(source, filters, id, key);
            owned.as_ref()
        }
    };

    match patch {
        Some(patch) => pixmap.draw_pixmap(
            region.x as i32,
            region.y as i32,
            patch.as_ref(),
            &PixmapPaint {
                opacity,
                blend_mode: BlendMode::SourceOver,
                quality,
            },
            transform,
            None,
        ),
        None => {
            fill(
                pixmap,
                &Path::rect(region.to_rect()),
                &solid([128, 128, 128, 160], opacity),
                FillRule::Winding,
                transform,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use image::Rgba;

    use super::*;
    use crate::annotation::{FillMode, Point, RectData, TextSize};
    use crate::filters::RasterFilters;

    fn white(width: u32, height: u32) -> SourceImage {
        SourceImage::new(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
            .expect("source")
    }

    fn render(source: &SourceImage, filters: &dyn ImageFilters, annotation: &Annotation) -> RgbaImage {
        let fonts = FontBook::empty();
        let mut pixmap = source.pixmap().clone();
        let mut ctx = RenderContext {
            source,
            filters,
            fonts: &fonts,
            transform: Transform::identity(),
            pen_tolerance: 1.0,
            cache: None,
        };
        render_annotation(&mut pixmap, annotation, &mut ctx);
        pixmap_to_rgba(&pixmap).expect("rgba")
    }

    fn annotation(kind: AnnotationKind) -> Annotation {
        Annotation::new(1, Style::default(), kind)
    }

    struct FailingFilters;

    impl ImageFilters for FailingFilters {
        fn gaussian_blur(&self, _: &RgbaImage, _: PixelRect, _: f32) -> Option<RgbaImage> {
            None
        }

        fn pixelate(&self, _: &RgbaImage, _: PixelRect, _: u32) -> Option<RgbaImage> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingFilters {
        calls: AtomicUsize,
        seen: Mutex<Vec<PixelRect>>,
    }

    impl ImageFilters for RecordingFilters {
        fn gaussian_blur(&self, _: &RgbaImage, region: PixelRect, _: f32) -> Option<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(region);
            }
            Some(RgbaImage::from_pixel(region.width, region.height, Rgba([0, 0, 255, 255])))
        }

        fn pixelate(&self, _: &RgbaImage, region: PixelRect, _: u32) -> Option<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(RgbaImage::from_pixel(region.width, region.height, Rgba([0, 255, 0, 255])))
        }

        fn origin(&self) -> Origin {
            Origin::BottomLeft
        }
    }

    #[test]
    fn pixmap_round_trip_keeps_opaque_pixels() {
        let mut image = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        image.put_pixel(2, 1, Rgba([200, 100, 50, 255]));
        let pixmap = rgba_to_pixmap(&image).expect("pixmap");
        assert_eq!(pixmap_to_rgba(&pixmap).expect("rgba"), image);
    }

    #[test]
    fn zero_sized_image_is_an_allocation_error() {
        let err = SourceImage::new(RgbaImage::new(0, 0)).expect_err("no pixmap");
        assert!(matches!(err, RenderError::PixmapAllocation { .. }));
    }

    #[test]
    fn stroked_rectangle_leaves_interior_untouched() {
        let source = white(100, 100);
        let ann = annotation(AnnotationKind::Rectangle {
            rect: RectData::from_xywh(20.0, 20.0, 60.0, 60.0),
        });
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(50, 50).0, [255, 255, 255, 255]);
        let edge = out.get_pixel(20, 50).0;
        assert!(edge[1] < 200, "edge not painted: {edge:?}");
    }

    #[test]
    fn filled_rectangle_covers_interior() {
        let source = white(100, 100);
        let mut ann = annotation(AnnotationKind::Rectangle {
            rect: RectData::from_xywh(20.0, 20.0, 60.0, 60.0),
        });
        ann.style.fill_mode = FillMode::Fill;
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(50, 50).0, [229, 62, 62, 255]);
    }

    #[test]
    fn highlighter_multiplies_colour() {
        let mut base = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        base.put_pixel(5, 5, Rgba([0, 0, 0, 255]));
        let source = SourceImage::new(base).expect("source");
        let mut ann = annotation(AnnotationKind::Highlighter {
            rect: RectData::from_xywh(0.0, 0.0, 20.0, 20.0),
        });
        ann.style.color = [255, 230, 0, 255];
        let out = render(&source, &RasterFilters, &ann);
        // Dark pixels stay dark under multiply.
        assert_eq!(out.get_pixel(5, 5).0[0], 0);
        let tinted = out.get_pixel(10, 10).0;
        assert_eq!(tinted[0], 255);
        assert!(tinted[2] < 200);
    }

    #[test]
    fn spotlight_dims_only_outside() {
        let source = white(60, 60);
        let ann = annotation(AnnotationKind::Spotlight {
            rect: RectData::from_xywh(20.0, 20.0, 20.0, 20.0),
            shape: SpotlightShape::Rectangle,
        });
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(30, 30).0, [255, 255, 255, 255]);
        assert!(out.get_pixel(5, 5).0[0] < 200);
    }

    #[test]
    fn failing_filter_draws_placeholder() {
        let source = white(40, 40);
        let ann = annotation(AnnotationKind::Blur {
            rect: RectData::from_xywh(10.0, 10.0, 20.0, 20.0),
            radius: 8.0,
            mode: BlurMode::Full,
        });
        let out = render(&source, &FailingFilters, &ann);
        let pixel = out.get_pixel(20, 20).0;
        assert!(pixel[0] < 255 && pixel[0] == pixel[1] && pixel[1] == pixel[2]);
        assert_eq!(out.get_pixel(2, 2).0, [255, 255, 255, 255]);
    }

    #[test]
    fn bottom_left_filters_receive_flipped_rects() {
        let source = white(40, 100);
        let filters = RecordingFilters::default();
        let ann = annotation(AnnotationKind::Blur {
            rect: RectData::from_xywh(0.0, 10.0, 40.0, 20.0),
            radius: 4.0,
            mode: BlurMode::Full,
        });
        let out = render(&source, &filters, &ann);
        let seen = filters.seen.lock().expect("lock").clone();
        assert_eq!(seen, vec![PixelRect::new(0, 70, 40, 20)]);
        // The patch still lands at the top-left region.
        assert_eq!(out.get_pixel(20, 15).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(20, 80).0, [255, 255, 255, 255]);
    }

    #[test]
    fn erase_fills_with_surrounding_colour() {
        let mut base = RgbaImage::from_pixel(30, 30, Rgba([40, 80, 120, 255]));
        for y in 10..20 {
            for x in 10..20 {
                base.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let source = SourceImage::new(base).expect("source");
        let ann = annotation(AnnotationKind::Blur {
            rect: RectData::from_xywh(10.0, 10.0, 10.0, 10.0),
            radius: 4.0,
            mode: BlurMode::Erase,
        });
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(15, 15).0, [40, 80, 120, 255]);
    }

    #[test]
    fn patch_cache_reuses_until_key_changes() {
        let source = white(50, 50);
        let filters = RecordingFilters::default();
        let fonts = FontBook::empty();
        let mut cache = PatchCache::new();
        let mut ann = annotation(AnnotationKind::Pixelate {
            rect: RectData::from_xywh(0.0, 0.0, 20.0, 20.0),
            block_size: 4,
        });
        for _ in 0..3 {
            let mut pixmap = source.pixmap().clone();
            let mut ctx = RenderContext {
                source: &source,
                filters: &filters,
                fonts: &fonts,
                transform: Transform::identity(),
                pen_tolerance: 1.0,
                cache: Some(&mut cache),
            };
            render_annotation(&mut pixmap, &ann, &mut ctx);
        }
        assert_eq!(filters.calls.load(Ordering::SeqCst), 1);

        ann.set_rect(RectData::from_xywh(5.0, 5.0, 20.0, 20.0));
        let mut pixmap = source.pixmap().clone();
        let mut ctx = RenderContext {
            source: &source,
            filters: &filters,
            fonts: &fonts,
            transform: Transform::identity(),
            pen_tolerance: 1.0,
            cache: Some(&mut cache),
        };
        render_annotation(&mut pixmap, &ann, &mut ctx);
        assert_eq!(filters.calls.load(Ordering::SeqCst), 2);

        cache.retain_ids([]);
        assert!(cache.is_empty());
    }

    #[test]
    fn single_point_pen_draws_a_dot() {
        let source = white(20, 20);
        let ann = annotation(AnnotationKind::Pen {
            path: vec![Point::new(10.0, 10.0)],
            brush: BrushKind::Solid,
        });
        let out = render(&source, &RasterFilters, &ann);
        assert!(out.get_pixel(10, 10).0[1] < 200);
    }

    fn stroke_capable_kinds() -> Vec<AnnotationKind> {
        vec![
            AnnotationKind::Rectangle {
                rect: RectData::from_xywh(20.0, 20.0, 100.0, 80.0),
            },
            AnnotationKind::Ellipse {
                rect: RectData::from_xywh(20.0, 20.0, 100.0, 80.0),
            },
            AnnotationKind::Line {
                start: Point::new(10.0, 60.0),
                end: Point::new(150.0, 60.0),
            },
            AnnotationKind::Arrow {
                start: Point::new(10.0, 60.0),
                end: Point::new(150.0, 60.0),
                control: None,
            },
            AnnotationKind::Arrow {
                start: Point::new(10.0, 100.0),
                end: Point::new(150.0, 100.0),
                control: Some(Point::new(80.0, 20.0)),
            },
            AnnotationKind::Ruler {
                start: Point::new(10.0, 100.0),
                end: Point::new(150.0, 100.0),
            },
            AnnotationKind::Pen {
                path: vec![
                    Point::new(10.0, 60.0),
                    Point::new(80.0, 62.0),
                    Point::new(150.0, 60.0),
                ],
                brush: BrushKind::Solid,
            },
            AnnotationKind::Magnifier {
                rect: RectData::from_xywh(20.0, 20.0, 120.0, 120.0),
                magnification: 2.0,
            },
        ]
    }

    #[test]
    fn dashed_flag_changes_every_stroked_kind() {
        let source = white(160, 160);
        for kind in stroke_capable_kinds() {
            let mut ann = annotation(kind);
            ann.style.line_width = 4.0;
            let solid = render(&source, &RasterFilters, &ann);
            ann.style.dashed = true;
            let dashed = render(&source, &RasterFilters, &ann);
            assert_ne!(solid, dashed, "dashed ignored for {:?}", ann.kind);
        }
    }

    #[test]
    fn magnifier_border_honours_sketch() {
        let source = white(160, 160);
        let mut ann = annotation(AnnotationKind::Magnifier {
            rect: RectData::from_xywh(20.0, 20.0, 120.0, 120.0),
            magnification: 2.0,
        });
        ann.style.line_width = 4.0;
        let plain = render(&source, &RasterFilters, &ann);
        ann.style.sketch = true;
        assert_ne!(plain, render(&source, &RasterFilters, &ann));
    }

    #[test]
    fn opacity_scales_alpha() {
        let source = SourceImage::new(RgbaImage::new(60, 60)).expect("source");
        let mut ann = annotation(AnnotationKind::Rectangle {
            rect: RectData::from_xywh(10.0, 10.0, 40.0, 40.0),
        });
        ann.style.fill_mode = FillMode::Fill;
        let full = render(&source, &RasterFilters, &ann).get_pixel(30, 30).0;
        ann.style.opacity = 0.5;
        let half = render(&source, &RasterFilters, &ann).get_pixel(30, 30).0;
        assert_eq!(full[3], 255);
        assert!((126..=129).contains(&half[3]), "alpha {}", half[3]);
        // Colour is unchanged, only coverage drops.
        assert!(half[0].abs_diff(229) <= 2, "{half:?}");
    }

    #[test]
    fn magnifier_lens_shows_zoomed_source() {
        // Blue left of x = 62, green from there on.
        let base = RgbaImage::from_fn(100, 100, |x, _| {
            if x < 62 {
                Rgba([0, 0, 255, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });
        let source = SourceImage::new(base).expect("source");
        let ann = annotation(AnnotationKind::Magnifier {
            rect: RectData::from_xywh(20.0, 20.0, 60.0, 60.0),
            magnification: 2.0,
        });
        let out = render(&source, &RasterFilters, &ann);
        // Pixel 66 samples source x = 50 + 16.5 / 2, which is blue.
        let lens = out.get_pixel(66, 50).0;
        assert!(lens[2] >= 253 && lens[1] <= 2, "{lens:?}");
        // Outside the lens the source shows through.
        assert_eq!(out.get_pixel(95, 50).0, [0, 255, 0, 255]);
    }

    #[test]
    fn dashed_arrow_keeps_a_solid_head() {
        let source = white(160, 80);
        let mut ann = annotation(AnnotationKind::Arrow {
            start: Point::new(10.0, 40.0),
            end: Point::new(150.0, 40.0),
            control: None,
        });
        ann.style.line_width = 4.0;
        ann.style.dashed = true;
        let out = render(&source, &RasterFilters, &ann);
        // Head spans x 130..150; sample just behind the tip.
        for x in [136, 140, 145] {
            assert_eq!(out.get_pixel(x, 40).0, [229, 62, 62, 255], "x {x}");
        }
    }

    #[test]
    fn curved_arrow_bends_through_control() {
        let source = white(160, 120);
        let mut straight = annotation(AnnotationKind::Arrow {
            start: Point::new(10.0, 100.0),
            end: Point::new(150.0, 100.0),
            control: None,
        });
        straight.style.line_width = 8.0;
        let mut curved = straight.clone();
        if let AnnotationKind::Arrow { control, .. } = &mut curved.kind {
            *control = Some(Point::new(80.0, 20.0));
        }
        let straight = render(&source, &RasterFilters, &straight);
        let curved = render(&source, &RasterFilters, &curved);
        // Above x = 80 the shaft passes y = 53, about halfway to the control.
        assert_eq!(straight.get_pixel(80, 53).0, [255, 255, 255, 255]);
        assert!(curved.get_pixel(80, 53).0[1] < 200);
        assert!(curved.get_pixel(80, 100).0[1] > 200);
    }

    #[test]
    fn ruler_draws_label_plate_above_the_line() {
        let source = white(140, 100);
        let ann = annotation(AnnotationKind::Ruler {
            start: Point::new(20.0, 80.0),
            end: Point::new(120.0, 80.0),
        });
        let out = render(&source, &RasterFilters, &ann);
        // Plate centred at (70, 59.5), no font loaded.
        let plate = out.get_pixel(70, 59).0;
        assert!(plate[0] < 120 && plate[0] == plate[1] && plate[1] == plate[2], "{plate:?}");
        // End ticks cross the line.
        assert!(out.get_pixel(20, 74).0[1] < 200);
        assert_eq!(out.get_pixel(70, 90).0, [255, 255, 255, 255]);
    }

    #[test]
    fn callout_tail_hangs_below_the_body() {
        let source = white(120, 100);
        let ann = annotation(AnnotationKind::Callout {
            rect: RectData::from_xywh(20.0, 20.0, 80.0, 40.0),
            text: String::new(),
            size: TextSize::M,
            tail: TailDirection::Bottom,
        });
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(40, 40).0, [229, 62, 62, 255]);
        assert_eq!(out.get_pixel(57, 64).0, [229, 62, 62, 255]);
        assert_eq!(out.get_pixel(85, 64).0, [255, 255, 255, 255]);
    }

    #[test]
    fn pin_fills_its_shape() {
        let source = white(50, 50);
        let mut ann = annotation(AnnotationKind::Pin {
            rect: RectData::from_xywh(10.0, 10.0, 30.0, 30.0),
            number: 3,
            shape: PinShape::Circle,
        });
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(25, 25).0, [229, 62, 62, 255]);
        assert_eq!(out.get_pixel(11, 11).0, [255, 255, 255, 255]);

        if let AnnotationKind::Pin { shape, .. } = &mut ann.kind {
            *shape = PinShape::Square;
        }
        let out = render(&source, &RasterFilters, &ann);
        assert_eq!(out.get_pixel(11, 11).0, [229, 62, 62, 255]);
    }

    #[test]
    fn sketch_is_deterministic() {
        let source = white(80, 80);
        let mut ann = annotation(AnnotationKind::Ellipse {
            rect: RectData::from_xywh(10.0, 10.0, 60.0, 40.0),
        });
        ann.style.sketch = true;
        let a = render(&source, &RasterFilters, &ann);
        let b = render(&source, &RasterFilters, &ann);
        assert_eq!(a, b);
    }
}
