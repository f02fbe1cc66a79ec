//! One editing session over a screenshot.
//!
//! The session owns the base image and everything derived from it. Any
//! operation that replaces the base image (apply, crop, rotate, flip,
//! expand) also re-offsets or clears the annotations and forgets the
//! command history, because old entries refer to the previous image.

use std::sync::Arc;

use egui::{pos2, ColorImage, Pos2, Rect, Vec2};
use image::{imageops, Rgba, RgbaImage};

use crate::annotation::{AnnotationId, Style, Tool};
use crate::config::EditorConfig;
use crate::document::{Document, Reorder};
use crate::error::RenderResult;
use crate::export::{self, ExportOptions};
use crate::filters::{ImageFilters, PixelRect, RasterFilters};
use crate::flatten::{self, FlattenJob, FlattenWorker};
use crate::interaction::{Interaction, InteractionEvent, Modifiers, ToolSettings};
use crate::render::overlay::{OverlayRenderer, OverlayScene};
use crate::render::text::FontBook;
use crate::render::SourceImage;
use crate::transform::ViewTransform;

/// Samples the base image for the eyedropper and its magnified preview.
#[derive(Clone, Debug)]
pub struct Loupe {
    radius: u32,
    last: Option<[u8; 4]>,
}

impl Loupe {
    pub fn new(radius: u32) -> Self {
        Self { radius, last: None }
    }

    pub fn last_sample(&self) -> Option<[u8; 4]> {
        self.last
    }

    pub fn sample(&mut self, image: &RgbaImage, point: Pos2) -> Option<[u8; 4]> {
        let (x, y) = pixel_at(image, point)?;
        let color = image.get_pixel(x, y).0;
        self.last = Some(color);
        Some(color)
    }

    /// Square of pixels around `point`; outside pixels are transparent.
    pub fn patch(&self, image: &RgbaImage, point: Pos2) -> RgbaImage {
        let side = self.radius * 2 + 1;
        let cx = point.x.floor() as i64;
        let cy = point.y.floor() as i64;
        RgbaImage::from_fn(side, side, |px, py| {
            let x = cx + px as i64 - self.radius as i64;
            let y = cy + py as i64 - self.radius as i64;
            if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
                Rgba([0, 0, 0, 0])
            } else {
                *image.get_pixel(x as u32, y as u32)
            }
        })
    }
}

fn pixel_at(image: &RgbaImage, point: Pos2) -> Option<(u32, u32)> {
    if point.x < 0.0 || point.y < 0.0 {
        return None;
    }
    let (x, y) = (point.x.floor() as u32, point.y.floor() as u32);
    (x < image.width() && y < image.height()).then_some((x, y))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flip {
    Horizontal,
    Vertical,
}

/// Extra canvas added around the image by [`Session::expand_canvas`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Insets {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Insets {
    pub fn uniform(amount: u32) -> Self {
        Self {
            left: amount,
            top: amount,
            right: amount,
            bottom: amount,
        }
    }
}

pub struct Session {
    source: Arc<SourceImage>,
    document: Document,
    interaction: Interaction,
    config: EditorConfig,
    filters: Arc<dyn ImageFilters>,
    fonts: FontBook,
    overlay: OverlayRenderer,
    worker: FlattenWorker,
    loupe: Loupe,
    zoom: f32,
}

impl Session {
    pub fn new(image: RgbaImage, config: EditorConfig) -> RenderResult<Self> {
        let fonts = FontBook::load(&config.font_paths);
        Self::with_parts(image, config, Arc::new(RasterFilters), fonts)
    }

    pub fn with_parts(
        image: RgbaImage,
        config: EditorConfig,
        filters: Arc<dyn ImageFilters>,
        fonts: FontBook,
    ) -> RenderResult<Self> {
        let source = Arc::new(SourceImage::new(image)?);
        log::info!("session opened on {}x{} image", source.width(), source.height());
        Ok(Self {
            source,
            document: Document::with_history(config.history()),
            interaction: Interaction::new(&config),
            overlay: OverlayRenderer::new(config.handle_size, config.pen_tolerance),
            worker: FlattenWorker::new(),
            loupe: Loupe::new(5),
            zoom: 1.0,
            filters,
            fonts,
            config,
        })
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn image_size(&self) -> Vec2 {
        self.source.size()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn loupe(&self) -> &Loupe {
        &self.loupe
    }

    pub fn active_style(&self) -> Style {
        self.interaction.settings().style
    }

    /// Defaults for the next annotation; edits here never touch the document.
    pub fn tool_settings_mut(&mut self) -> &mut ToolSettings {
        self.interaction.settings_mut()
    }

    // View

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(crate::transform::MIN_ZOOM, crate::transform::MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * self.config.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / self.config.zoom_step);
    }

    pub fn view(&self, canvas: Rect) -> ViewTransform {
        ViewTransform::new(self.image_size(), canvas, self.zoom)
    }

    // Pointer input

    pub fn press(
        &mut self,
        view: &ViewTransform,
        display: Pos2,
        modifiers: Modifiers,
    ) -> Option<InteractionEvent> {
        let event = self
            .interaction
            .press(&mut self.document, view, display, modifiers);
        self.react(event)
    }

    pub fn drag(&mut self, view: &ViewTransform, display: Pos2, modifiers: Modifiers) {
        self.interaction
            .drag(&mut self.document, view, display, modifiers);
    }

    pub fn release(
        &mut self,
        view: &ViewTransform,
        display: Pos2,
        modifiers: Modifiers,
    ) -> Option<InteractionEvent> {
        let event = self
            .interaction
            .release(&mut self.document, view, display, modifiers);
        self.react(event)
    }

    fn react(&mut self, event: Option<InteractionEvent>) -> Option<InteractionEvent> {
        if let Some(InteractionEvent::SampleColor(point)) = &event {
            self.sample_color(*point);
        }
        event
    }

    /// Eyedropper: makes the pixel under `point` the active colour.
    pub fn sample_color(&mut self, point: Pos2) -> Option<[u8; 4]> {
        let color = self.loupe.sample(self.source.rgba(), point)?;
        self.interaction.settings_mut().style.color = color;
        log::debug!("sampled colour {color:?} at {point:?}");
        Some(color)
    }

    pub fn cancel_gesture(&mut self) {
        self.interaction.cancel(&mut self.document);
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.interaction.set_tool(&mut self.document, tool);
    }

    pub fn set_snapping(&mut self, enabled: bool) {
        self.interaction.set_snapping(enabled);
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.interaction.select(id);
    }

    // Edits

    pub fn undo(&mut self) -> bool {
        self.interaction.cancel(&mut self.document);
        let undone = self.document.undo();
        self.interaction.prune_selection(&self.document);
        self.measure_text();
        undone
    }

    pub fn redo(&mut self) -> bool {
        self.interaction.cancel(&mut self.document);
        let redone = self.document.redo();
        self.interaction.prune_selection(&self.document);
        self.measure_text();
        redone
    }

    pub fn delete_selected(&mut self) -> bool {
        self.interaction.delete_selected(&mut self.document)
    }

    /// Arrow-key nudge: one unit, or the large step with shift.
    pub fn nudge_selected(&mut self, direction: Vec2, large: bool) -> bool {
        let step = if large {
            self.config.nudge_step_large
        } else {
            self.config.nudge_step
        };
        self.interaction
            .nudge_selected(&mut self.document, direction.x * step, direction.y * step)
    }

    pub fn reorder_selected(&mut self, direction: Reorder) -> bool {
        self.interaction
            .reorder_selected(&mut self.document, direction)
    }

    pub fn apply_style(&mut self, style: Style) -> bool {
        self.interaction.apply_style(&mut self.document, style)
    }

    pub fn commit_new_text(&mut self, at: Pos2, content: &str) -> Option<AnnotationId> {
        let id = self
            .interaction
            .commit_new_text(&mut self.document, at, content);
        self.measure_text();
        id
    }

    pub fn commit_text_edit(&mut self, id: AnnotationId, content: &str) -> bool {
        let changed = self
            .interaction
            .commit_text_edit(&mut self.document, id, content);
        self.measure_text();
        changed
    }

    /// Sizes new or edited text boxes with the loaded font, so hit boxes
    /// and selection frames match the drawn glyphs.
    fn measure_text(&mut self) {
        let fonts = &self.fonts;
        self.document.measure_text(|text| {
            fonts.measure_block(&text.content, text.size.points(), text.bold)
        });
    }

    pub fn cancel_text_edit(&mut self) {
        self.interaction.cancel_text_edit();
    }

    // Rendering

    pub fn render_overlay(
        &mut self,
        view: &ViewTransform,
        pixels_per_point: f32,
    ) -> RenderResult<ColorImage> {
        let preview = self.interaction.preview_annotation();
        let scene = OverlayScene {
            annotations: self.document.annotations(),
            preview: preview.as_ref(),
            selection: self.interaction.selection(),
            hidden: self.interaction.editing(),
            guides: self.interaction.guides(),
            crop: self.interaction.crop_rect(),
        };
        self.overlay.render_image(
            &self.source,
            self.filters.as_ref(),
            &self.fonts,
            view,
            pixels_per_point,
            &scene,
        )
    }

    /// The document baked into a copy of the base image. Nothing changes.
    pub fn flatten(&self) -> RenderResult<RgbaImage> {
        flatten::flatten(
            &self.source,
            self.document.annotations(),
            self.filters.as_ref(),
            &self.fonts,
            self.config.pen_tolerance,
        )
    }

    /// Apply: bakes the annotations into a new base image, then clears the
    /// document, the pin counter and the history.
    pub fn apply(&mut self) -> RenderResult<()> {
        self.interaction.cancel(&mut self.document);
        let flattened = self.flatten()?;
        let count = self.document.len();
        self.source = Arc::new(SourceImage::new(flattened)?);
        self.document.clear();
        self.interaction.prune_selection(&self.document);
        self.overlay.invalidate();
        log::info!("applied {count} annotations to the base image");
        Ok(())
    }

    /// Export composite; the live document is left as is.
    pub fn export_image(&self, options: &ExportOptions) -> RenderResult<RgbaImage> {
        export::compose(&self.flatten()?, options)
    }

    pub fn export_png(&self, options: &ExportOptions) -> RenderResult<Vec<u8>> {
        flatten::encode_png(&self.export_image(options)?)
    }

    /// Starts an export on the flatten worker from a snapshot of the
    /// current document. Editing may continue meanwhile.
    pub fn start_export(&mut self, options: ExportOptions) -> RenderResult<()> {
        self.worker.start(FlattenJob {
            source: Arc::clone(&self.source),
            annotations: self.document.snapshot(),
            filters: Arc::clone(&self.filters),
            fonts: self.fonts.clone(),
            pen_tolerance: self.config.pen_tolerance,
            export: options,
        })
    }

    pub fn export_pending(&self) -> bool {
        self.worker.is_busy()
    }

    pub fn poll_export(&mut self) -> Option<RenderResult<RgbaImage>> {
        self.worker.poll()
    }

    pub fn wait_export(&mut self) -> Option<RenderResult<RgbaImage>> {
        self.worker.wait()
    }

    // Base image replacement

    /// Crops to the pending crop rect, if any. Annotations with no overlap
    /// are dropped; the rest move into the new coordinate space.
    pub fn confirm_crop(&mut self) -> RenderResult<bool> {
        let Some(rect) = self.interaction.take_pending_crop() else {
            return Ok(false);
        };
        let Some(region) = PixelRect::from_rect(rect, self.source.width(), self.source.height())
        else {
            return Ok(false);
        };
        let cropped = imageops::crop_imm(
            self.source.rgba(),
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();
        self.replace_base(cropped)?;
        let dropped = self.document.crop_to(region.to_rect());
        log::info!(
            "cropped to {}x{} at ({}, {}), dropped {dropped} annotations",
            region.width,
            region.height,
            region.x,
            region.y
        );
        self.interaction.prune_selection(&self.document);
        Ok(true)
    }

    pub fn cancel_crop(&mut self) {
        self.interaction.cancel_crop();
    }

    pub fn rotate(&mut self, rotation: Rotation) -> RenderResult<()> {
        let (width, height) = (self.source.width() as f32, self.source.height() as f32);
        let rotated = match rotation {
            Rotation::Clockwise => imageops::rotate90(self.source.rgba()),
            Rotation::CounterClockwise => imageops::rotate270(self.source.rgba()),
        };
        self.replace_base(rotated)?;
        match rotation {
            Rotation::Clockwise => self.document.remap_all(|p| pos2(height - p.y, p.x)),
            Rotation::CounterClockwise => self.document.remap_all(|p| pos2(p.y, width - p.x)),
        }
        log::info!("rotated {rotation:?}");
        Ok(())
    }

    pub fn flip(&mut self, flip: Flip) -> RenderResult<()> {
        let (width, height) = (self.source.width() as f32, self.source.height() as f32);
        let flipped = match flip {
            Flip::Horizontal => imageops::flip_horizontal(self.source.rgba()),
            Flip::Vertical => imageops::flip_vertical(self.source.rgba()),
        };
        self.replace_base(flipped)?;
        match flip {
            Flip::Horizontal => self.document.remap_all(|p| pos2(width - p.x, p.y)),
            Flip::Vertical => self.document.remap_all(|p| pos2(p.x, height - p.y)),
        }
        log::info!("flipped {flip:?}");
        Ok(())
    }

    /// Grows the canvas by `insets`, filling new pixels with `fill`.
    pub fn expand_canvas(&mut self, insets: Insets, fill: [u8; 4]) -> RenderResult<()> {
        let width = self.source.width() + insets.left + insets.right;
        let height = self.source.height() + insets.top + insets.bottom;
        let mut expanded = RgbaImage::from_pixel(width, height, Rgba(fill));
        imageops::overlay(
            &mut expanded,
            self.source.rgba(),
            insets.left as i64,
            insets.top as i64,
        );
        self.replace_base(expanded)?;
        let offset = Vec2::new(insets.left as f32, insets.top as f32);
        self.document.remap_all(|p| p + offset);
        log::info!("expanded canvas to {width}x{height}");
        Ok(())
    }

    fn replace_base(&mut self, image: RgbaImage) -> RenderResult<()> {
        self.interaction.cancel(&mut self.document);
        self.source = Arc::new(SourceImage::new(image)?);
        self.document.reset_history();
        self.overlay.invalidate();
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source)
            .field("annotations", &self.document.len())
            .field("tool", &self.interaction.tool())
            .field("zoom", &self.zoom)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use egui::vec2;

    use super::*;
    use crate::annotation::{Annotation, AnnotationKind, FillMode, RectData, TEXT_PADDING_X};

    fn session(width: u32, height: u32) -> Session {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        Session::with_parts(
            image,
            EditorConfig::default(),
            Arc::new(RasterFilters),
            FontBook::empty(),
        )
        .expect("session")
    }

    /// Display space equals image space.
    fn identity_view(session: &Session) -> ViewTransform {
        ViewTransform::with_canvas_size(session.image_size(), session.image_size(), 1.0)
    }

    fn add_rect(session: &mut Session, x: f32, y: f32, w: f32, h: f32) -> AnnotationId {
        let id = session.document.next_annotation_id();
        let mut style = Style::default();
        style.fill_mode = FillMode::Fill;
        session.document.add(Annotation::new(
            id,
            style,
            AnnotationKind::Rectangle {
                rect: RectData::from_xywh(x, y, w, h),
            },
        ));
        id
    }

    #[test]
    fn pin_then_apply_resets_counter_and_history() {
        let mut session = session(100, 100);
        let view = identity_view(&session);
        session.set_tool(Tool::Pin);
        let event = session.press(&view, pos2(50.0, 50.0), Modifiers::default());
        assert!(matches!(event, Some(InteractionEvent::Committed(_))));
        session.release(&view, pos2(50.0, 50.0), Modifiers::default());
        assert_eq!(session.document().pin_counter(), 2);
        assert!(matches!(
            session.document().annotations()[0].kind,
            AnnotationKind::Pin { number: 1, .. }
        ));

        session.apply().expect("apply");
        assert!(session.document().is_empty());
        assert_eq!(session.document().pin_counter(), 1);
        assert!(!session.undo());
        // The pin is now part of the pixels.
        assert_ne!(session.source().rgba().get_pixel(50, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn crop_drops_annotations_outside_and_offsets_the_rest() {
        let mut session = session(200, 200);
        let outside = add_rect(&mut session, 150.0, 150.0, 20.0, 20.0);
        let partial = add_rect(&mut session, 90.0, 20.0, 40.0, 20.0);
        let view = identity_view(&session);

        session.set_tool(Tool::Crop);
        session.press(&view, pos2(10.0, 10.0), Modifiers::default());
        session.drag(&view, pos2(60.0, 60.0), Modifiers::default());
        let event = session.release(&view, pos2(110.0, 110.0), Modifiers::default());
        assert!(matches!(event, Some(InteractionEvent::CropPending(_))));
        assert!(session.confirm_crop().expect("crop"));

        assert_eq!(session.image_size(), vec2(100.0, 100.0));
        assert!(session.document().find(outside).is_none());
        let kept = session.document().find(partial).expect("partial kept");
        // Offset, not clamped: it still reaches past the new right edge.
        assert_eq!(kept.bounding_rect(), Rect::from_min_size(pos2(80.0, 10.0), vec2(40.0, 20.0)));
        assert!(!session.undo());
    }

    #[test]
    fn export_leaves_document_editable() {
        let mut session = session(40, 40);
        add_rect(&mut session, 5.0, 5.0, 10.0, 10.0);
        let options = ExportOptions {
            padding: 4.0,
            ..ExportOptions::default()
        };
        let exported = session.export_image(&options).expect("export");
        assert_eq!(exported.dimensions(), (48, 48));
        assert_eq!(session.document().len(), 1);
        assert!(session.undo());
    }

    #[test]
    fn background_export_matches_sync_export() {
        let mut session = session(40, 40);
        add_rect(&mut session, 5.0, 5.0, 10.0, 10.0);
        let sync = session.export_image(&ExportOptions::default()).expect("sync");
        session.start_export(ExportOptions::default()).expect("start");
        assert!(session.export_pending());
        assert!(session.start_export(ExportOptions::default()).is_err());
        // Editing continues against the live document.
        add_rect(&mut session, 20.0, 20.0, 10.0, 10.0);
        let background = session.wait_export().expect("pending").expect("export");
        assert_eq!(background, sync);
    }

    #[test]
    fn rotate_clockwise_remaps_geometry() {
        let mut session = session(100, 50);
        let id = add_rect(&mut session, 10.0, 5.0, 20.0, 10.0);
        session.rotate(Rotation::Clockwise).expect("rotate");
        assert_eq!(session.image_size(), vec2(50.0, 100.0));
        let rect = session.document().find(id).expect("kept").bounding_rect();
        assert_eq!(rect, Rect::from_min_max(pos2(35.0, 10.0), pos2(45.0, 30.0)));
        session.rotate(Rotation::CounterClockwise).expect("rotate back");
        let rect = session.document().find(id).expect("kept").bounding_rect();
        assert_eq!(rect, Rect::from_min_size(pos2(10.0, 5.0), vec2(20.0, 10.0)));
    }

    #[test]
    fn flip_and_expand_keep_annotations_on_their_pixels() {
        let mut session = session(100, 50);
        let id = add_rect(&mut session, 10.0, 5.0, 20.0, 10.0);
        session.flip(Flip::Horizontal).expect("flip");
        let rect = session.document().find(id).expect("kept").bounding_rect();
        assert_eq!(rect, Rect::from_min_max(pos2(70.0, 5.0), pos2(90.0, 15.0)));

        session
            .expand_canvas(Insets::uniform(8), [0, 0, 0, 255])
            .expect("expand");
        assert_eq!(session.image_size(), vec2(116.0, 66.0));
        let rect = session.document().find(id).expect("kept").bounding_rect();
        assert_eq!(rect.min, pos2(78.0, 13.0));
        assert_eq!(session.source().rgba().get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert!(!session.undo());
    }

    #[test]
    fn eyedropper_sets_active_colour() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        image.put_pixel(4, 6, Rgba([12, 34, 56, 255]));
        let mut session = Session::with_parts(
            image,
            EditorConfig::default(),
            Arc::new(RasterFilters),
            FontBook::empty(),
        )
        .expect("session");
        let view = identity_view(&session);
        session.set_tool(Tool::Eyedropper);
        session.press(&view, pos2(4.5, 6.5), Modifiers::default());
        assert_eq!(session.active_style().color, [12, 34, 56, 255]);
        assert!(session.document().is_empty());
        assert_eq!(session.loupe().last_sample(), Some([12, 34, 56, 255]));
        let patch = session.loupe().patch(session.source().rgba(), pos2(0.0, 0.0));
        assert_eq!(patch.dimensions(), (11, 11));
        assert_eq!(patch.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn undo_prunes_a_vanished_selection() {
        let mut session = session(100, 100);
        let view = identity_view(&session);
        session.set_tool(Tool::Rectangle);
        session.press(&view, pos2(10.0, 10.0), Modifiers::default());
        session.drag(&view, pos2(40.0, 40.0), Modifiers::default());
        let event = session.release(&view, pos2(60.0, 50.0), Modifiers::default());
        let Some(InteractionEvent::Committed(id)) = event else {
            panic!("expected commit, got {event:?}");
        };
        assert_eq!(session.interaction().selection(), Some(id));
        assert!(session.undo());
        assert!(session.document().is_empty());
        assert_eq!(session.interaction().selection(), None);
        assert!(session.redo());
        assert_eq!(session.document().len(), 1);
    }

    #[test]
    fn overlay_renders_at_canvas_size() {
        let mut session = session(100, 50);
        add_rect(&mut session, 10.0, 10.0, 20.0, 10.0);
        let view = session.view(Rect::from_min_size(pos2(30.0, 40.0), vec2(200.0, 100.0)));
        let image = session.render_overlay(&view, 1.0).expect("overlay");
        assert_eq!(image.size, [200, 100]);
    }

    #[test]
    fn nudge_uses_configured_steps() {
        let mut session = session(100, 100);
        let id = add_rect(&mut session, 10.0, 10.0, 20.0, 20.0);
        session.select(Some(id));
        assert!(session.nudge_selected(vec2(1.0, 0.0), false));
        assert!(session.nudge_selected(vec2(0.0, 1.0), true));
        let rect = session.document().find(id).expect("kept").bounding_rect();
        assert_eq!(rect.min, pos2(11.0, 20.0));
    }

    #[test]
    fn committed_text_is_sized_by_the_loaded_font() {
        let config = EditorConfig::default();
        let fonts = FontBook::load(&[]);
        let size = config.text_size.points();
        let Some(expected) = fonts.measure_block("WWWW", size, config.text_bold) else {
            return;
        };
        let image = RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]));
        let mut session =
            Session::with_parts(image, config, Arc::new(RasterFilters), fonts).expect("session");
        let width = |session: &Session, id| {
            session
                .document()
                .find(id)
                .expect("text")
                .bounding_rect()
                .width()
        };

        let id = session
            .commit_new_text(pos2(10.0, 10.0), "WWWW")
            .expect("text");
        let wide = width(&session, id);
        assert_eq!(wide, expected.x + TEXT_PADDING_X * 2.0);

        assert!(session.commit_text_edit(id, "iiii"));
        assert!(width(&session, id) < wide);
        assert!(session.undo());
        assert_eq!(width(&session, id), wide);
    }
}
