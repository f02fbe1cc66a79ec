//! Display-scale rendering for the live canvas.
//!
//! Each frame composites the base image, the committed annotations, the
//! gesture preview and the editing chrome (selection frame, handles, snap
//! guides, crop mask) into one pixmap the host uploads as a texture.

use egui::{ColorImage, Pos2, Rect};
use tiny_skia::{FillRule, FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::annotation::{Annotation, AnnotationId, Handle};
use crate::error::{RenderError, RenderResult};
use crate::filters::ImageFilters;
use crate::geometry::Path;
use crate::hit_test;
use crate::snapping::{GuideAxis, SnapGuide};
use crate::transform::ViewTransform;

use super::text::FontBook;
use super::{
    fill, render_annotation, solid, stroke, stroke_path, PatchCache, RenderContext, SourceImage,
};

const CANVAS_BG: [u8; 4] = [0x12, 0x14, 0x1A, 255];
const ACCENT: [u8; 4] = [77, 141, 255, 255];
const GUIDE: [u8; 4] = [255, 64, 160, 230];
const CROP_DIM: [u8; 4] = [0, 0, 0, 140];

/// Everything drawn on top of the base image for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayScene<'a> {
    pub annotations: &'a [Annotation],
    pub preview: Option<&'a Annotation>,
    pub selection: Option<AnnotationId>,
    /// Skipped while its text is being edited in place.
    pub hidden: Option<AnnotationId>,
    pub guides: &'a [SnapGuide],
    pub crop: Option<Rect>,
}

#[derive(Debug)]
pub struct OverlayRenderer {
    cache: PatchCache,
    handle_size: f32,
    pen_tolerance: f32,
}

impl OverlayRenderer {
    pub fn new(handle_size: f32, pen_tolerance: f32) -> Self {
        Self {
            cache: PatchCache::new(),
            handle_size,
            pen_tolerance,
        }
    }

    pub fn cache(&self) -> &PatchCache {
        &self.cache
    }

    /// Forgets cached filter patches; call when the base image changes.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn render(
        &mut self,
        source: &SourceImage,
        filters: &dyn ImageFilters,
        fonts: &FontBook,
        view: &ViewTransform,
        pixels_per_point: f32,
        scene: &OverlayScene<'_>,
    ) -> RenderResult<Pixmap> {
        let ppp = if pixels_per_point > 0.0 {
            pixels_per_point
        } else {
            1.0
        };
        let size = view.canvas().size() * ppp;
        let width = size.x.ceil().max(1.0) as u32;
        let height = size.y.ceil().max(1.0) as u32;
        let mut pixmap =
            Pixmap::new(width, height).ok_or(RenderError::PixmapAllocation { width, height })?;
        pixmap.fill(tiny_skia::Color::from_rgba8(
            CANVAS_BG[0],
            CANVAS_BG[1],
            CANVAS_BG[2],
            CANVAS_BG[3],
        ));

        let image_transform = view.to_skia().post_scale(ppp, ppp);
        pixmap.draw_pixmap(
            0,
            0,
            source.pixmap().as_ref(),
            &PixmapPaint {
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            },
            image_transform,
            None,
        );

        {
            let mut ctx = RenderContext {
                source,
                filters,
                fonts,
                transform: image_transform,
                pen_tolerance: self.pen_tolerance,
                cache: Some(&mut self.cache),
            };
            for annotation in scene.annotations {
                if Some(annotation.id) == scene.hidden {
                    continue;
                }
                render_annotation(&mut pixmap, annotation, &mut ctx);
            }
            if let Some(preview) = scene.preview {
                render_annotation(&mut pixmap, preview, &mut ctx);
            }
        }
        self.cache.retain_ids(
            scene
                .annotations
                .iter()
                .map(|a| a.id)
                .chain(scene.preview.map(|a| a.id)),
        );

        let chrome = Chrome {
            view,
            transform: Transform::from_scale(ppp, ppp),
            handle_size: self.handle_size,
        };
        if let Some(crop) = scene.crop {
            chrome.crop_mask(&mut pixmap, crop);
        }
        for guide in scene.guides {
            chrome.guide(&mut pixmap, *guide);
        }
        if let Some(selected) = scene
            .selection
            .filter(|id| Some(*id) != scene.hidden)
            .and_then(|id| scene.annotations.iter().find(|a| a.id == id))
        {
            chrome.selection(&mut pixmap, selected);
        }

        Ok(pixmap)
    }

    /// [`Self::render`] converted for upload as an egui texture.
    pub fn render_image(
        &mut self,
        source: &SourceImage,
        filters: &dyn ImageFilters,
        fonts: &FontBook,
        view: &ViewTransform,
        pixels_per_point: f32,
        scene: &OverlayScene<'_>,
    ) -> RenderResult<ColorImage> {
        let pixmap = self.render(source, filters, fonts, view, pixels_per_point, scene)?;
        Ok(ColorImage::from_rgba_premultiplied(
            [pixmap.width() as usize, pixmap.height() as usize],
            pixmap.data(),
        ))
    }
}

/// Decorations drawn in display space, on top of everything else.
struct Chrome<'a> {
    view: &'a ViewTransform,
    transform: Transform,
    handle_size: f32,
}

impl Chrome<'_> {
    fn to_local(&self, p: Pos2) -> Pos2 {
        Pos2::ZERO + (self.view.to_display(p) - self.view.canvas().min)
    }

    fn local_rect(&self, rect: Rect) -> Rect {
        Rect::from_two_pos(self.to_local(rect.min), self.to_local(rect.max))
    }

    fn selection(&self, pixmap: &mut Pixmap, annotation: &Annotation) {
        if annotation.endpoints().is_none() {
            let frame = self.local_rect(annotation.bounding_rect()).expand(2.0);
            stroke_path(
                pixmap,
                &Path::rect(frame),
                &solid(ACCENT, 1.0),
                &stroke(1.5, true),
                self.transform,
            );
        }
        let radius = (self.handle_size * 0.5 - 1.5).max(2.0);
        for (handle, position) in hit_test::annotation_handles(annotation) {
            let dot = Path::circle(self.to_local(position), radius);
            if handle == Handle::Control {
                let white = solid([255, 255, 255, 230], 1.0);
                fill(pixmap, &dot, &white, FillRule::Winding, self.transform);
                let ring = solid(ACCENT, 1.0);
                stroke_path(pixmap, &dot, &ring, &stroke(1.5, false), self.transform);
            } else {
                fill(pixmap, &dot, &solid(ACCENT, 1.0), FillRule::Winding, self.transform);
                stroke_path(
                    pixmap,
                    &dot,
                    &solid([255, 255, 255, 200], 1.0),
                    &stroke(1.0, false),
                    self.transform,
                );
            }
        }
    }

    fn guide(&self, pixmap: &mut Pixmap, guide: SnapGuide) {
        let image = self.local_rect(Rect::from_min_size(Pos2::ZERO, self.view.image_size()));
        let line = match guide.axis {
            GuideAxis::Vertical => {
                let x = self.to_local(Pos2::new(guide.position, 0.0)).x;
                Path::segment(Pos2::new(x, image.min.y), Pos2::new(x, image.max.y))
            }
            GuideAxis::Horizontal => {
                let y = self.to_local(Pos2::new(0.0, guide.position)).y;
                Path::segment(Pos2::new(image.min.x, y), Pos2::new(image.max.x, y))
            }
        };
        stroke_path(pixmap, &line, &solid(GUIDE, 1.0), &stroke(1.0, false), self.transform);
    }

    fn crop_mask(&self, pixmap: &mut Pixmap, crop: Rect) {
        let image = self.local_rect(Rect::from_min_size(Pos2::ZERO, self.view.image_size()));
        let crop = self.local_rect(crop);
        let mut mask = Path::rect(image);
        mask.extend(&Path::rect(crop));
        fill(pixmap, &mask, &solid(CROP_DIM, 1.0), FillRule::EvenOdd, self.transform);

        let thirds = solid([255, 255, 255, 90], 1.0);
        let thin = stroke(1.0, false);
        for i in 1..3 {
            let t = i as f32 / 3.0;
            let x = crop.min.x + crop.width() * t;
            let y = crop.min.y + crop.height() * t;
            let vertical = Path::segment(Pos2::new(x, crop.min.y), Pos2::new(x, crop.max.y));
            let horizontal = Path::segment(Pos2::new(crop.min.x, y), Pos2::new(crop.max.x, y));
            stroke_path(pixmap, &vertical, &thirds, &thin, self.transform);
            stroke_path(pixmap, &horizontal, &thirds, &thin, self.transform);
        }
        stroke_path(
            pixmap,
            &Path::rect(crop),
            &solid([255, 255, 255, 255], 1.0),
            &stroke(1.5, false),
            self.transform,
        );
    }
}

#[cfg(test)]
mod tests {
    use egui::{pos2, vec2};
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::annotation::{AnnotationKind, BlurMode, RectData, Style};
    use crate::filters::RasterFilters;

    fn source() -> SourceImage {
        SourceImage::new(RgbaImage::from_pixel(100, 50, Rgba([255, 255, 255, 255])))
            .expect("source")
    }

    fn view() -> ViewTransform {
        // Fit scale 2: the 100x50 image fills a 200x100 canvas.
        ViewTransform::with_canvas_size(vec2(100.0, 50.0), vec2(200.0, 100.0), 1.0)
    }

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let p = pixmap.pixels()[(y * pixmap.width() + x) as usize];
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    #[test]
    fn frame_matches_canvas_and_shows_image() {
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let pixmap = overlay
            .render(
                &source(),
                &RasterFilters,
                &FontBook::empty(),
                &view(),
                1.0,
                &OverlayScene::default(),
            )
            .expect("render");
        assert_eq!((pixmap.width(), pixmap.height()), (200, 100));
        assert_eq!(pixel(&pixmap, 100, 50), [255, 255, 255, 255]);
    }

    #[test]
    fn annotations_scale_with_the_view() {
        let mut style = Style::default();
        style.fill_mode = crate::annotation::FillMode::Fill;
        let filled = Annotation::new(
            1,
            style,
            AnnotationKind::Rectangle {
                rect: RectData::from_xywh(10.0, 10.0, 20.0, 10.0),
            },
        );
        let annotations = [filled];
        let scene = OverlayScene {
            annotations: &annotations,
            ..OverlayScene::default()
        };
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let pixmap = overlay
            .render(&source(), &RasterFilters, &FontBook::empty(), &view(), 1.0, &scene)
            .expect("render");
        // Image (20, 15) lands at display (40, 30).
        assert_eq!(pixel(&pixmap, 40, 30), [229, 62, 62, 255]);
        assert_eq!(pixel(&pixmap, 70, 30), [255, 255, 255, 255]);
    }

    #[test]
    fn hidden_annotation_is_skipped() {
        let mut style = Style::default();
        style.fill_mode = crate::annotation::FillMode::Fill;
        let annotations = [Annotation::new(
            4,
            style,
            AnnotationKind::Rectangle {
                rect: RectData::from_xywh(10.0, 10.0, 20.0, 10.0),
            },
        )];
        let scene = OverlayScene {
            annotations: &annotations,
            hidden: Some(4),
            ..OverlayScene::default()
        };
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let pixmap = overlay
            .render(&source(), &RasterFilters, &FontBook::empty(), &view(), 1.0, &scene)
            .expect("render");
        assert_eq!(pixel(&pixmap, 40, 30), [255, 255, 255, 255]);
    }

    #[test]
    fn crop_mask_dims_outside_only() {
        let scene = OverlayScene {
            crop: Some(Rect::from_min_max(pos2(25.0, 10.0), pos2(75.0, 40.0))),
            ..OverlayScene::default()
        };
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let pixmap = overlay
            .render(&source(), &RasterFilters, &FontBook::empty(), &view(), 1.0, &scene)
            .expect("render");
        assert!(pixel(&pixmap, 10, 10)[0] < 200);
        assert_eq!(pixel(&pixmap, 90, 45), [255, 255, 255, 255]);
    }

    #[test]
    fn cache_drops_removed_annotations() {
        let blur = Annotation::new(
            9,
            Style::default(),
            AnnotationKind::Blur {
                rect: RectData::from_xywh(0.0, 0.0, 20.0, 20.0),
                radius: 4.0,
                mode: BlurMode::Full,
            },
        );
        let annotations = [blur];
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let scene = OverlayScene {
            annotations: &annotations,
            ..OverlayScene::default()
        };
        overlay
            .render(&source(), &RasterFilters, &FontBook::empty(), &view(), 1.0, &scene)
            .expect("render");
        assert_eq!(overlay.cache().len(), 1);
        overlay
            .render(
                &source(),
                &RasterFilters,
                &FontBook::empty(),
                &view(),
                1.0,
                &OverlayScene::default(),
            )
            .expect("render");
        assert!(overlay.cache().is_empty());
    }

    #[test]
    fn hidpi_doubles_the_pixel_size() {
        let mut overlay = OverlayRenderer::new(12.0, 1.0);
        let pixmap = overlay
            .render(
                &source(),
                &RasterFilters,
                &FontBook::empty(),
                &view(),
                2.0,
                &OverlayScene::default(),
            )
            .expect("render");
        assert_eq!((pixmap.width(), pixmap.height()), (400, 200));
    }
}
