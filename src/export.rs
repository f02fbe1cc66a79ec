//! Presentation composite for Save/Share: the flattened screenshot placed
//! on a backdrop with padding, rounded corners, a drop shadow and a border.
//! The editable document is never touched.

use egui::{vec2, Pos2, Rect, Vec2};
use image::RgbaImage;
use imageproc::filter::gaussian_blur_f32;
use tiny_skia::{
    Color, FillRule, FilterQuality, GradientStop, LinearGradient, Mask, Paint, Pattern, Pixmap,
    PixmapPaint, Point, RadialGradient, Shader, SpreadMode, Transform,
};

use crate::error::{RenderError, RenderResult};
use crate::geometry::Path;
use crate::render::{pixmap_to_rgba, rgba_to_pixmap, to_skia};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Backdrop {
    /// Transparent surroundings.
    #[default]
    None,
    Solid([u8; 4]),
    LinearGradient {
        from: [u8; 4],
        to: [u8; 4],
        /// Direction in degrees, 0 = left to right, 90 = top to bottom.
        angle: f32,
    },
    RadialGradient {
        inner: [u8; 4],
        outer: [u8; 4],
    },
    /// Tiled repeatedly from the top-left corner.
    Pattern(RgbaImage),
    /// Scaled to cover the whole canvas, centred.
    Image(RgbaImage),
}

impl Backdrop {
    /// Two-colour checkerboard tile with `cell`-sized squares.
    pub fn checker(a: [u8; 4], b: [u8; 4], cell: u32) -> Self {
        let cell = cell.max(1);
        let tile = RgbaImage::from_fn(cell * 2, cell * 2, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                image::Rgba(a)
            } else {
                image::Rgba(b)
            }
        });
        Self::Pattern(tile)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub offset: [f32; 2],
    pub blur: f32,
    pub color: [u8; 4],
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            offset: [0.0, 12.0],
            blur: 18.0,
            color: [0, 0, 0, 110],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: [u8; 4],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportOptions {
    pub backdrop: Backdrop,
    pub padding: f32,
    pub corner_radius: f32,
    pub shadow: Option<Shadow>,
    pub border: Option<Border>,
}

impl ExportOptions {
    /// True when the composite would reproduce the input unchanged.
    pub fn is_plain(&self) -> bool {
        self.padding <= 0.0
            && self.corner_radius <= 0.0
            && self.shadow.is_none()
            && self.border.is_none()
    }
}

/// Places `image` on the backdrop described by `options`.
pub fn compose(image: &RgbaImage, options: &ExportOptions) -> RenderResult<RgbaImage> {
    if options.is_plain() {
        return Ok(image.clone());
    }
    let pad = options.padding.max(0.0).round() as u32;
    let width = image.width() + pad * 2;
    let height = image.height() + pad * 2;
    let mut canvas =
        Pixmap::new(width, height).ok_or(RenderError::PixmapAllocation { width, height })?;
    let canvas_size = vec2(width as f32, height as f32);

    paint_backdrop(&mut canvas, &options.backdrop, canvas_size)?;

    let card = Rect::from_min_size(
        Pos2::new(pad as f32, pad as f32),
        vec2(image.width() as f32, image.height() as f32),
    );
    let card_path = Path::rounded_rect(card, options.corner_radius);

    if let Some(shadow) = options.shadow {
        draw_shadow(&mut canvas, &card_path, &shadow)?;
    }

    let content = rgba_to_pixmap(image)?;
    let clip = if options.corner_radius > 0.0 {
        let mut mask =
            Mask::new(width, height).ok_or(RenderError::PixmapAllocation { width, height })?;
        if let Some(path) = to_skia(&card_path) {
            mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
        }
        Some(mask)
    } else {
        None
    };
    canvas.draw_pixmap(
        pad as i32,
        pad as i32,
        content.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        clip.as_ref(),
    );

    if let Some(border) = options.border.filter(|b| b.width > 0.0) {
        let inset = Path::rounded_rect(
            card.shrink(border.width * 0.5),
            (options.corner_radius - border.width * 0.5).max(0.0),
        );
        if let Some(path) = to_skia(&inset) {
            let mut paint = Paint::default();
            let [r, g, b, a] = border.color;
            paint.set_color_rgba8(r, g, b, a);
            paint.anti_alias = true;
            let stroke = tiny_skia::Stroke {
                width: border.width,
                ..tiny_skia::Stroke::default()
            };
            canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    log::debug!(
        "export composite {}x{} -> {width}x{height}",
        image.width(),
        image.height()
    );
    pixmap_to_rgba(&canvas)
}

fn color(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn paint_backdrop(canvas: &mut Pixmap, backdrop: &Backdrop, size: Vec2) -> RenderResult<()> {
    let full = tiny_skia::Rect::from_xywh(0.0, 0.0, size.x, size.y);
    let Some(full) = full else {
        return Ok(());
    };
    let shader = match backdrop {
        Backdrop::None => return Ok(()),
        Backdrop::Solid(c) => {
            canvas.fill(color(*c));
            return Ok(());
        }
        Backdrop::LinearGradient { from, to, angle } => {
            let (sin, cos) = angle.to_radians().sin_cos();
            let center = size / 2.0;
            // Half the projection of the canvas onto the gradient axis.
            let reach = (size.x * cos.abs() + size.y * sin.abs()) / 2.0;
            let start = center - vec2(cos, sin) * reach;
            let end = center + vec2(cos, sin) * reach;
            LinearGradient::new(
                Point::from_xy(start.x, start.y),
                Point::from_xy(end.x, end.y),
                vec![GradientStop::new(0.0, color(*from)), GradientStop::new(1.0, color(*to))],
                SpreadMode::Pad,
                Transform::identity(),
            )
        }
        Backdrop::RadialGradient { inner, outer } => {
            let center = Point::from_xy(size.x / 2.0, size.y / 2.0);
            RadialGradient::new(
                center,
                center,
                size.length() / 2.0,
                vec![GradientStop::new(0.0, color(*inner)), GradientStop::new(1.0, color(*outer))],
                SpreadMode::Pad,
                Transform::identity(),
            )
        }
        Backdrop::Pattern(tile) => {
            let tile = rgba_to_pixmap(tile)?;
            let paint = Paint {
                shader: Pattern::new(
                    tile.as_ref(),
                    SpreadMode::Repeat,
                    FilterQuality::Nearest,
                    1.0,
                    Transform::identity(),
                ),
                ..Paint::default()
            };
            canvas.fill_rect(full, &paint, Transform::identity(), None);
            return Ok(());
        }
        Backdrop::Image(picture) => {
            let picture = rgba_to_pixmap(picture)?;
            let (pw, ph) = (picture.width() as f32, picture.height() as f32);
            let scale = (size.x / pw).max(size.y / ph);
            let offset = (size - vec2(pw, ph) * scale) / 2.0;
            let paint = Paint {
                shader: Pattern::new(
                    picture.as_ref(),
                    SpreadMode::Pad,
                    FilterQuality::Bilinear,
                    1.0,
                    Transform::from_row(scale, 0.0, 0.0, scale, offset.x, offset.y),
                ),
                ..Paint::default()
            };
            canvas.fill_rect(full, &paint, Transform::identity(), None);
            return Ok(());
        }
    };
    // Degenerate gradients fall back to their first colour.
    let shader = shader.unwrap_or_else(|| match backdrop {
        Backdrop::LinearGradient { from, .. } => Shader::SolidColor(color(*from)),
        Backdrop::RadialGradient { inner, .. } => Shader::SolidColor(color(*inner)),
        _ => Shader::SolidColor(Color::TRANSPARENT),
    });
    let paint = Paint {
        shader,
        ..Paint::default()
    };
    canvas.fill_rect(full, &paint, Transform::identity(), None);
    Ok(())
}

fn draw_shadow(canvas: &mut Pixmap, card: &Path, shadow: &Shadow) -> RenderResult<()> {
    let (width, height) = (canvas.width(), canvas.height());
    let mut layer =
        Pixmap::new(width, height).ok_or(RenderError::PixmapAllocation { width, height })?;
    if let Some(path) = to_skia(card) {
        let mut paint = Paint::default();
        let [r, g, b, a] = shadow.color;
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        let offset = Transform::from_translate(shadow.offset[0], shadow.offset[1]);
        layer.fill_path(&path, &paint, FillRule::Winding, offset, None);
    }
    let layer = if shadow.blur > 0.0 {
        let blurred = gaussian_blur_f32(&pixmap_to_rgba(&layer)?, shadow.blur / 2.0);
        rgba_to_pixmap(&blurred)?
    } else {
        layer
    };
    canvas.draw_pixmap(
        0,
        0,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn shot() -> RgbaImage {
        RgbaImage::from_pixel(40, 30, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn plain_options_return_the_image() {
        let image = shot();
        assert_eq!(compose(&image, &ExportOptions::default()).expect("compose"), image);
    }

    #[test]
    fn padding_grows_canvas_with_backdrop() {
        let options = ExportOptions {
            backdrop: Backdrop::Solid([10, 20, 30, 255]),
            padding: 16.0,
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        assert_eq!(out.dimensions(), (72, 62));
        assert_eq!(out.get_pixel(2, 2).0, [10, 20, 30, 255]);
        assert_eq!(out.get_pixel(36, 31).0, [255, 255, 255, 255]);
    }

    #[test]
    fn rounded_corners_reveal_backdrop() {
        let options = ExportOptions {
            backdrop: Backdrop::Solid([0, 0, 255, 255]),
            padding: 4.0,
            corner_radius: 10.0,
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        // The image's own corner pixel is now outside the rounded card.
        assert_eq!(out.get_pixel(4, 4).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(24, 19).0, [255, 255, 255, 255]);
    }

    #[test]
    fn border_paints_card_edge() {
        let options = ExportOptions {
            border: Some(Border {
                width: 2.0,
                color: [255, 0, 0, 255],
            }),
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        assert_eq!(out.get_pixel(0, 15).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(20, 15).0, [255, 255, 255, 255]);
    }

    #[test]
    fn shadow_falls_below_the_card() {
        let options = ExportOptions {
            backdrop: Backdrop::Solid([255, 255, 255, 255]),
            padding: 20.0,
            shadow: Some(Shadow {
                offset: [0.0, 10.0],
                blur: 0.0,
                color: [0, 0, 0, 255],
            }),
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        // Just below the card, inside the offset shadow.
        assert_eq!(out.get_pixel(40, 55).0, [0, 0, 0, 255]);
        // Above the card there is no shadow.
        assert_eq!(out.get_pixel(40, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn linear_gradient_runs_along_its_angle() {
        let options = ExportOptions {
            backdrop: Backdrop::LinearGradient {
                from: [0, 0, 0, 255],
                to: [255, 255, 255, 255],
                angle: 0.0,
            },
            padding: 20.0,
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        let left = out.get_pixel(2, 35).0[0];
        let right = out.get_pixel(77, 35).0[0];
        assert!(left < 30 && right > 225, "{left} {right}");
    }

    #[test]
    fn checker_pattern_tiles() {
        let options = ExportOptions {
            backdrop: Backdrop::checker([0, 0, 0, 255], [255, 255, 255, 255], 4),
            padding: 8.0,
            ..ExportOptions::default()
        };
        let out = compose(&shot(), &options).expect("compose");
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(5, 1).0, [255, 255, 255, 255]);
    }
}
