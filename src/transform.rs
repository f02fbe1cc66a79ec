//! Mapping between image space and display space.
//!
//! The image is letterboxed into the canvas (fit scale), multiplied by the
//! user zoom and centred. Stored annotation geometry never depends on zoom.

use egui::{Pos2, Rect, Vec2};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    image_size: Vec2,
    canvas: Rect,
    zoom: f32,
}

impl ViewTransform {
    pub fn new(image_size: Vec2, canvas: Rect, zoom: f32) -> Self {
        Self {
            image_size,
            canvas,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// A canvas anchored at the origin, as used by offscreen targets.
    pub fn with_canvas_size(image_size: Vec2, canvas_size: Vec2, zoom: f32) -> Self {
        Self::new(image_size, Rect::from_min_size(Pos2::ZERO, canvas_size), zoom)
    }

    pub fn image_size(&self) -> Vec2 {
        self.image_size
    }

    pub fn canvas(&self) -> Rect {
        self.canvas
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn set_canvas(&mut self, canvas: Rect) {
        self.canvas = canvas;
    }

    /// Letterbox scale before zoom.
    pub fn fit_scale(&self) -> f32 {
        if self.image_size.x <= 0.0 || self.image_size.y <= 0.0 {
            return 1.0;
        }
        let sx = self.canvas.width() / self.image_size.x;
        let sy = self.canvas.height() / self.image_size.y;
        let scale = sx.min(sy);
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        }
    }

    /// Display units per image unit.
    pub fn scale(&self) -> f32 {
        self.fit_scale() * self.zoom
    }

    /// Offset of the image origin inside the canvas.
    pub fn offset(&self) -> Vec2 {
        (self.canvas.size() - self.image_size * self.scale()) / 2.0
    }

    pub fn to_display(&self, p: Pos2) -> Pos2 {
        self.canvas.min + p.to_vec2() * self.scale() + self.offset()
    }

    pub fn to_image(&self, p: Pos2) -> Pos2 {
        ((p - self.canvas.min - self.offset()) / self.scale()).to_pos2()
    }

    pub fn to_display_rect(&self, rect: Rect) -> Rect {
        Rect::from_two_pos(self.to_display(rect.min), self.to_display(rect.max))
    }

    pub fn to_image_rect(&self, rect: Rect) -> Rect {
        Rect::from_two_pos(self.to_image(rect.min), self.to_image(rect.max))
    }

    /// Converts a length measured on screen into image units.
    pub fn display_to_image_len(&self, len: f32) -> f32 {
        len / self.scale()
    }

    /// Where the whole image lands on screen.
    pub fn image_rect(&self) -> Rect {
        self.to_display_rect(Rect::from_min_size(Pos2::ZERO, self.image_size))
    }

    /// The same mapping relative to the canvas origin, for offscreen pixmaps.
    pub fn to_skia(&self) -> tiny_skia::Transform {
        let scale = self.scale();
        let offset = self.offset();
        tiny_skia::Transform::from_row(scale, 0.0, 0.0, scale, offset.x, offset.y)
    }
}

#[cfg(test)]
mod tests {
    use egui::{pos2, vec2};

    use super::*;

    #[test]
    fn letterboxes_wide_image() {
        let view = ViewTransform::with_canvas_size(vec2(200.0, 100.0), vec2(400.0, 400.0), 1.0);
        assert_eq!(view.fit_scale(), 2.0);
        assert_eq!(view.offset(), vec2(0.0, 100.0));
        assert_eq!(view.to_display(pos2(0.0, 0.0)), pos2(0.0, 100.0));
        assert_eq!(view.to_display(pos2(200.0, 100.0)), pos2(400.0, 300.0));
    }

    #[test]
    fn zoom_is_clamped_and_composes_with_fit() {
        let mut view = ViewTransform::with_canvas_size(vec2(100.0, 100.0), vec2(100.0, 100.0), 10.0);
        assert_eq!(view.zoom(), MAX_ZOOM);
        view.set_zoom(0.1);
        assert_eq!(view.zoom(), MIN_ZOOM);
        assert_eq!(view.scale(), 0.5);
        assert_eq!(view.offset(), vec2(25.0, 25.0));
    }

    #[test]
    fn display_round_trip_recovers_image_point() {
        let points = [pos2(0.0, 0.0), pos2(13.7, 99.1), pos2(1919.0, 1079.0), pos2(-4.0, 7.5)];
        for image_size in [vec2(1920.0, 1080.0), vec2(333.0, 777.0), vec2(1.0, 1.0)] {
            for canvas in [
                Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0)),
                Rect::from_min_size(pos2(37.0, 58.0), vec2(1280.0, 300.0)),
            ] {
                for zoom in [0.5, 1.0, 1.7, 4.0] {
                    let view = ViewTransform::new(image_size, canvas, zoom);
                    for p in points {
                        let back = view.to_image(view.to_display(p));
                        assert!((back - p).length() < 1e-2, "{p:?} -> {back:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_image_falls_back_to_unit_scale() {
        let view = ViewTransform::with_canvas_size(Vec2::ZERO, vec2(100.0, 100.0), 1.0);
        assert_eq!(view.fit_scale(), 1.0);
    }

    #[test]
    fn skia_transform_matches_display_mapping() {
        let view = ViewTransform::with_canvas_size(vec2(200.0, 100.0), vec2(400.0, 400.0), 1.5);
        let mut p = [tiny_skia::Point::from_xy(50.0, 20.0)];
        view.to_skia().map_points(&mut p);
        let expected = view.to_display(pos2(50.0, 20.0));
        assert!((p[0].x - expected.x).abs() < 1e-4);
        assert!((p[0].y - expected.y).abs() < 1e-4);
    }
}
