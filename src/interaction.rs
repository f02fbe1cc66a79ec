//! Pointer gesture handling.
//!
//! `press`/`drag`/`release` route display-space pointer positions through
//! the view transform and hit-testing, preview geometry changes on the
//! document without logging them, and commit exactly one logged command
//! per gesture on release.

use egui::{Pos2, Rect, Vec2};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, BlurMode, BrushKind, Endpoints, Handle, PinShape,
    Point, RectData, SpotlightShape, Style, TailDirection, TextAlign, TextBox, TextSize, Tool,
};
use crate::config::EditorConfig;
use crate::document::{Document, Reorder};
use crate::geometry;
use crate::history::Command;
use crate::hit_test::{self, HandleSet, HitTolerance};
use crate::snapping::{SnapConfig, SnapEngine, SnapGuide};
use crate::transform::ViewTransform;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Square shapes, 45° segments, square corner resizes.
    pub shift: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TextEditRequest {
    New { at: Pos2 },
    Existing { id: AnnotationId, content: String },
}

/// What the host should react to after a pointer event.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionEvent {
    Selected(Option<AnnotationId>),
    Committed(AnnotationId),
    EditText(TextEditRequest),
    SampleColor(Pos2),
    CropPending(Rect),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Drawing {
        tool: Tool,
        start: Pos2,
        current: Pos2,
        path: Vec<Pos2>,
    },
    ResizingHandle {
        id: AnnotationId,
        handle: Handle,
        original: Annotation,
        original_rect: Rect,
        current: Rect,
    },
    MovingAnnotation {
        id: AnnotationId,
        start: Pos2,
        original: Annotation,
        offset: Vec2,
    },
    DraggingEndpoint {
        id: AnnotationId,
        is_start: bool,
        original: Annotation,
        current: Endpoints,
    },
    DraggingControlPoint {
        id: AnnotationId,
        original: Annotation,
        current: Endpoints,
    },
    Erasing {
        removed: Vec<Command>,
        restore: Vec<Command>,
    },
    Cropping {
        start: Pos2,
        current: Pos2,
    },
}

impl DragState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Drawing { .. } => "drawing",
            Self::ResizingHandle { .. } => "resizing",
            Self::MovingAnnotation { .. } => "moving",
            Self::DraggingEndpoint { .. } => "endpoint",
            Self::DraggingControlPoint { .. } => "control point",
            Self::Erasing { .. } => "erasing",
            Self::Cropping { .. } => "cropping",
        }
    }
}

/// Style and per-kind defaults applied to newly created annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub style: Style,
    pub text_size: TextSize,
    pub bold: bool,
    pub italic: bool,
    pub align: TextAlign,
    pub text_background: Option<[u8; 4]>,
    pub pin_shape: PinShape,
    pub pin_diameter: f32,
    pub emoji: String,
    pub emoji_size: f32,
    pub blur_radius: f32,
    pub blur_mode: BlurMode,
    pub pixelate_block: u32,
    pub magnification: f32,
    pub spotlight_shape: SpotlightShape,
    pub brush: BrushKind,
    pub callout_tail: TailDirection,
}

impl ToolSettings {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            style: config.style,
            text_size: config.text_size,
            bold: config.text_bold,
            italic: config.text_italic,
            align: TextAlign::Left,
            text_background: None,
            pin_shape: config.pin_shape,
            pin_diameter: config.pin_diameter,
            emoji: config.emoji.clone(),
            emoji_size: config.emoji_size,
            blur_radius: config.blur_radius,
            blur_mode: config.blur_mode,
            pixelate_block: config.pixelate_block,
            magnification: config.magnification,
            spotlight_shape: config.spotlight_shape,
            brush: config.brush,
            callout_tail: config.callout_tail,
        }
    }
}

pub struct Interaction {
    tool: Tool,
    drag: DragState,
    selection: Option<AnnotationId>,
    editing: Option<AnnotationId>,
    press_display: Option<Pos2>,
    travel: f32,
    guides: Vec<SnapGuide>,
    pending_crop: Option<Rect>,
    settings: ToolSettings,
    snap: SnapEngine,
    config: EditorConfig,
}

impl Interaction {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            tool: Tool::Select,
            drag: DragState::Idle,
            selection: None,
            editing: None,
            press_display: None,
            travel: 0.0,
            guides: Vec::new(),
            pending_crop: None,
            settings: ToolSettings::from_config(config),
            snap: SnapEngine::new(SnapConfig {
                enabled: config.snap_enabled,
                threshold: config.snap_threshold,
            }),
            config: config.clone(),
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn selection(&self) -> Option<AnnotationId> {
        self.selection
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.selection = id;
    }

    pub fn editing(&self) -> Option<AnnotationId> {
        self.editing
    }

    pub fn guides(&self) -> &[SnapGuide] {
        &self.guides
    }

    pub fn pending_crop(&self) -> Option<Rect> {
        self.pending_crop
    }

    pub fn take_pending_crop(&mut self) -> Option<Rect> {
        self.pending_crop.take()
    }

    pub fn cancel_crop(&mut self) {
        self.pending_crop = None;
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    pub fn set_snapping(&mut self, enabled: bool) {
        self.snap.set_enabled(enabled);
    }

    pub fn snapping(&self) -> bool {
        self.snap.config().enabled
    }

    pub fn set_tool(&mut self, document: &mut Document, tool: Tool) {
        self.cancel(document);
        if tool != Tool::Crop {
            self.pending_crop = None;
        }
        self.editing = None;
        log::debug!("tool: {:?} -> {:?}", self.tool, tool);
        self.tool = tool;
    }

    /// Drops a selection whose annotation no longer exists (after undo).
    pub fn prune_selection(&mut self, document: &Document) {
        if let Some(id) = self.selection {
            if document.index_of(id).is_none() {
                self.selection = None;
            }
        }
        if let Some(id) = self.editing {
            if document.index_of(id).is_none() {
                self.editing = None;
            }
        }
    }

    pub fn press(
        &mut self,
        document: &mut Document,
        view: &ViewTransform,
        display: Pos2,
        _modifiers: Modifiers,
    ) -> Option<InteractionEvent> {
        self.cancel(document);
        self.press_display = Some(display);
        self.travel = 0.0;
        let point = view.to_image(display);
        let tolerance = HitTolerance::new(&self.config, view.scale());

        match self.tool {
            Tool::Eyedropper => return Some(InteractionEvent::SampleColor(point)),
            Tool::Eraser => {
                let mut removed = Vec::new();
                let mut restore = Vec::new();
                self.erase_at(document, point, &tolerance, &mut removed, &mut restore);
                self.set_drag(DragState::Erasing { removed, restore });
                return None;
            }
            Tool::Crop => {
                let start = clamp_to_image(point, view.image_size());
                self.pending_crop = None;
                self.set_drag(DragState::Cropping {
                    start,
                    current: start,
                });
                return None;
            }
            _ => {}
        }

        if self.grab_selected_handle(document, point, &tolerance) {
            return None;
        }

        if let Some(index) = hit_test::find_annotation(document.annotations(), point, &tolerance) {
            let annotation = document.get(index)?.clone();
            let id = annotation.id;
            self.selection = Some(id);
            if self.tool == Tool::Text && matches!(annotation.kind, AnnotationKind::Text(_)) {
                self.editing = Some(id);
                let content = annotation.text().unwrap_or_default().to_string();
                return Some(InteractionEvent::EditText(TextEditRequest::Existing {
                    id,
                    content,
                }));
            }
            self.set_drag(DragState::MovingAnnotation {
                id,
                start: point,
                original: annotation,
                offset: Vec2::ZERO,
            });
            return Some(InteractionEvent::Selected(Some(id)));
        }

        if self.tool.draws_by_drag() {
            self.selection = None;
            self.set_drag(DragState::Drawing {
                tool: self.tool,
                start: point,
                current: point,
                path: vec![point],
            });
            return None;
        }

        match self.tool {
            Tool::Text => {
                self.selection = None;
                Some(InteractionEvent::EditText(TextEditRequest::New { at: point }))
            }
            Tool::Pin | Tool::Emoji => {
                let id = self.place_stamp(document, point)?;
                Some(InteractionEvent::Committed(id))
            }
            _ => {
                let had_selection = self.selection.take().is_some();
                had_selection.then_some(InteractionEvent::Selected(None))
            }
        }
    }

    pub fn drag(
        &mut self,
        document: &mut Document,
        view: &ViewTransform,
        display: Pos2,
        modifiers: Modifiers,
    ) {
        if let Some(press) = self.press_display {
            self.travel = self.travel.max(press.distance(display));
        }
        let point = view.to_image(display);
        let state = std::mem::take(&mut self.drag);
        self.drag = match state {
            DragState::Idle => DragState::Idle,
            DragState::Drawing {
                tool,
                start,
                mut path,
                ..
            } => {
                let current = constrain_drawing(tool, start, point, modifiers);
                if tool == Tool::Pen && path.last().map_or(true, |last| last.distance(point) >= 0.5) {
                    path.push(point);
                }
                DragState::Drawing {
                    tool,
                    start,
                    current,
                    path,
                }
            }
            DragState::MovingAnnotation {
                id,
                start,
                original,
                ..
            } => {
                let offset = self.move_preview(document, view, id, &original, point - start);
                DragState::MovingAnnotation {
                    id,
                    start,
                    original,
                    offset,
                }
            }
            DragState::ResizingHandle {
                id,
                handle,
                original,
                original_rect,
                ..
            } => {
                let corners_only = hit_test::handles_for(original.tool()) == HandleSet::Corners;
                let current = hit_test::resize_rect(
                    original_rect,
                    handle,
                    point,
                    self.config.min_resize,
                    corners_only || modifiers.shift,
                );
                let mut resized = original.clone();
                resized.set_rect(RectData::from_rect(current));
                preview_geometry(document, id, resized.kind);
                DragState::ResizingHandle {
                    id,
                    handle,
                    original,
                    original_rect,
                    current,
                }
            }
            DragState::DraggingEndpoint {
                id,
                is_start,
                original,
                mut current,
            } => {
                let anchor = if is_start { current.end } else { current.start };
                let target = if modifiers.shift {
                    geometry::constrain_angle(anchor.to_pos2(), point, 45.0)
                } else {
                    point
                };
                if is_start {
                    current.start = Point::from_pos2(target);
                } else {
                    current.end = Point::from_pos2(target);
                }
                preview_endpoints(document, id, current);
                DragState::DraggingEndpoint {
                    id,
                    is_start,
                    original,
                    current,
                }
            }
            DragState::DraggingControlPoint {
                id,
                original,
                mut current,
            } => {
                current.control = Some(Point::from_pos2(point));
                preview_endpoints(document, id, current);
                DragState::DraggingControlPoint {
                    id,
                    original,
                    current,
                }
            }
            DragState::Erasing {
                mut removed,
                mut restore,
            } => {
                let tolerance = HitTolerance::new(&self.config, view.scale());
                self.erase_at(document, point, &tolerance, &mut removed, &mut restore);
                DragState::Erasing { removed, restore }
            }
            DragState::Cropping { start, .. } => {
                let mut current = clamp_to_image(point, view.image_size());
                if let Some(aspect) = self.config.crop_aspect {
                    current = constrain_aspect(start, current, aspect);
                }
                DragState::Cropping { start, current }
            }
        };
    }

    pub fn release(
        &mut self,
        document: &mut Document,
        view: &ViewTransform,
        display: Pos2,
        modifiers: Modifiers,
    ) -> Option<InteractionEvent> {
        self.drag(document, view, display, modifiers);
        let is_click = self.travel < self.config.click_slop;
        self.press_display = None;
        self.guides.clear();
        let state = std::mem::take(&mut self.drag);
        log::debug!("interaction: release from {} (click: {is_click})", state.label());

        match state {
            DragState::Idle => None,
            DragState::Drawing {
                tool,
                start,
                current,
                path,
            } => {
                if is_click {
                    return None;
                }
                let id = document.next_annotation_id();
                let annotation = self.build_annotation(id, tool, start, current, &path)?;
                if !document.add(annotation) {
                    return None;
                }
                self.selection = Some(id);
                if !tool.stays_active() {
                    self.tool = Tool::Select;
                }
                if tool == Tool::Callout {
                    self.editing = Some(id);
                    return Some(InteractionEvent::EditText(TextEditRequest::Existing {
                        id,
                        content: String::new(),
                    }));
                }
                Some(InteractionEvent::Committed(id))
            }
            DragState::MovingAnnotation {
                id,
                original,
                offset,
                ..
            } => {
                let index = document.index_of(id)?;
                if offset != Vec2::ZERO {
                    restore_geometry(document, index, &original);
                }
                if is_click {
                    if let Some(content) = original.text() {
                        self.editing = Some(id);
                        return Some(InteractionEvent::EditText(TextEditRequest::Existing {
                            id,
                            content: content.to_string(),
                        }));
                    }
                    return Some(InteractionEvent::Selected(Some(id)));
                }
                if offset == Vec2::ZERO || !document.nudge(index, offset.x, offset.y) {
                    return None;
                }
                Some(InteractionEvent::Committed(id))
            }
            DragState::ResizingHandle {
                id,
                original,
                original_rect,
                current,
                ..
            } => {
                let index = document.index_of(id)?;
                restore_geometry(document, index, &original);
                if is_click || current == original_rect {
                    return None;
                }
                document
                    .set_rect(index, RectData::from_rect(current))
                    .then_some(InteractionEvent::Committed(id))
            }
            DragState::DraggingEndpoint {
                id,
                original,
                current,
                ..
            }
            | DragState::DraggingControlPoint {
                id,
                original,
                current,
            } => {
                let index = document.index_of(id)?;
                restore_geometry(document, index, &original);
                if is_click || original.endpoints() == Some(current) {
                    return None;
                }
                document
                    .set_endpoints(index, current)
                    .then_some(InteractionEvent::Committed(id))
            }
            DragState::Erasing { removed, restore } => {
                if removed.is_empty() {
                    return None;
                }
                document.preview(Command::Batch(restore.into_iter().rev().collect()));
                document.execute(Command::Batch(removed));
                self.prune_selection(document);
                Some(InteractionEvent::Selected(self.selection))
            }
            DragState::Cropping { start, current } => {
                let rect = Rect::from_two_pos(start, current);
                if is_click || rect.width() < 1.0 || rect.height() < 1.0 {
                    self.pending_crop = None;
                    return None;
                }
                self.pending_crop = Some(rect);
                Some(InteractionEvent::CropPending(rect))
            }
        }
    }

    /// Abandons the current gesture and rolls back any previewed change.
    pub fn cancel(&mut self, document: &mut Document) {
        let state = std::mem::take(&mut self.drag);
        self.guides.clear();
        self.press_display = None;
        match state {
            DragState::MovingAnnotation { id, original, .. }
            | DragState::ResizingHandle { id, original, .. }
            | DragState::DraggingEndpoint { id, original, .. }
            | DragState::DraggingControlPoint { id, original, .. } => {
                if let Some(index) = document.index_of(id) {
                    restore_geometry(document, index, &original);
                }
            }
            DragState::Erasing { restore, .. } if !restore.is_empty() => {
                document.preview(Command::Batch(restore.into_iter().rev().collect()));
            }
            _ => {}
        }
    }

    /// The not-yet-committed shape being drawn, for live preview.
    pub fn preview_annotation(&self) -> Option<Annotation> {
        match &self.drag {
            DragState::Drawing {
                tool,
                start,
                current,
                path,
            } => self.build_annotation(0, *tool, *start, *current, path),
            _ => None,
        }
    }

    /// Crop rect being dragged or awaiting confirmation.
    pub fn crop_rect(&self) -> Option<Rect> {
        match &self.drag {
            DragState::Cropping { start, current } => Some(Rect::from_two_pos(*start, *current)),
            _ => self.pending_crop,
        }
    }

    pub fn handle_under(
        &self,
        document: &Document,
        view: &ViewTransform,
        display: Pos2,
    ) -> Option<Handle> {
        let id = self.selection?;
        let annotation = document.find(id)?;
        let tolerance = HitTolerance::new(&self.config, view.scale());
        hit_test::detect_handle(view.to_image(display), annotation, tolerance.handle)
    }

    pub fn annotation_under(
        &self,
        document: &Document,
        view: &ViewTransform,
        display: Pos2,
    ) -> Option<AnnotationId> {
        let tolerance = HitTolerance::new(&self.config, view.scale());
        let index =
            hit_test::find_annotation(document.annotations(), view.to_image(display), &tolerance)?;
        document.get(index).map(|annotation| annotation.id)
    }

    pub fn commit_new_text(
        &mut self,
        document: &mut Document,
        at: Pos2,
        content: &str,
    ) -> Option<AnnotationId> {
        self.editing = None;
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let id = document.next_annotation_id();
        let annotation = Annotation::new(
            id,
            self.settings.style,
            AnnotationKind::Text(TextBox {
                origin: Point::from_pos2(at),
                content: content.to_string(),
                size: self.settings.text_size,
                bold: self.settings.bold,
                italic: self.settings.italic,
                align: self.settings.align,
                background: self.settings.text_background,
                measured: None,
            }),
        );
        if !document.add(annotation) {
            return None;
        }
        self.selection = Some(id);
        self.tool = Tool::Select;
        Some(id)
    }

    /// Writes edited text back. Emptying a text annotation deletes it;
    /// callouts keep their box.
    pub fn commit_text_edit(
        &mut self,
        document: &mut Document,
        id: AnnotationId,
        content: &str,
    ) -> bool {
        self.editing = None;
        let Some(index) = document.index_of(id) else {
            return false;
        };
        let content = content.trim();
        let Some(annotation) = document.get(index) else {
            return false;
        };
        if annotation.text() == Some(content) {
            return false;
        }
        if content.is_empty() && matches!(annotation.kind, AnnotationKind::Text(_)) {
            if self.selection == Some(id) {
                self.selection = None;
            }
            return document.remove_by_id(id).is_some();
        }
        document.set_text(index, content.to_string())
    }

    pub fn cancel_text_edit(&mut self) {
        self.editing = None;
    }

    pub fn delete_selected(&mut self, document: &mut Document) -> bool {
        let Some(id) = self.selection.take() else {
            return false;
        };
        document.remove_by_id(id).is_some()
    }

    pub fn nudge_selected(&mut self, document: &mut Document, dx: f32, dy: f32) -> bool {
        let Some(index) = self.selection.and_then(|id| document.index_of(id)) else {
            return false;
        };
        document.nudge(index, dx, dy)
    }

    pub fn reorder_selected(&mut self, document: &mut Document, direction: Reorder) -> bool {
        let Some(index) = self.selection.and_then(|id| document.index_of(id)) else {
            return false;
        };
        document.reorder(index, direction)
    }

    /// Makes `style` the active style and applies it to the selection.
    pub fn apply_style(&mut self, document: &mut Document, style: Style) -> bool {
        self.settings.style = style;
        let Some(index) = self.selection.and_then(|id| document.index_of(id)) else {
            return false;
        };
        if document.get(index).map(|annotation| annotation.style) == Some(style) {
            return false;
        }
        document.set_style(index, style)
    }

    fn set_drag(&mut self, state: DragState) {
        log::debug!("interaction: {} -> {}", self.drag.label(), state.label());
        self.drag = state;
    }

    fn grab_selected_handle(
        &mut self,
        document: &Document,
        point: Pos2,
        tolerance: &HitTolerance,
    ) -> bool {
        let Some(id) = self.selection else {
            return false;
        };
        if self.editing == Some(id) {
            return false;
        }
        let Some(annotation) = document.find(id) else {
            return false;
        };
        let Some(handle) = hit_test::detect_handle(point, annotation, tolerance.handle) else {
            return false;
        };
        let original = annotation.clone();
        let state = match handle {
            Handle::Start | Handle::End => {
                let Some(current) = original.endpoints() else {
                    return false;
                };
                DragState::DraggingEndpoint {
                    id,
                    is_start: handle == Handle::Start,
                    original,
                    current,
                }
            }
            Handle::Control => {
                let Some(current) = original.endpoints() else {
                    return false;
                };
                DragState::DraggingControlPoint {
                    id,
                    original,
                    current,
                }
            }
            _ => {
                let original_rect = original.bounding_rect();
                DragState::ResizingHandle {
                    id,
                    handle,
                    original,
                    original_rect,
                    current: original_rect,
                }
            }
        };
        self.set_drag(state);
        true
    }

    fn move_preview(
        &mut self,
        document: &mut Document,
        view: &ViewTransform,
        id: AnnotationId,
        original: &Annotation,
        delta: Vec2,
    ) -> Vec2 {
        let candidate = original.bounding_rect().translate(delta);
        let others: Vec<Rect> = document
            .annotations()
            .iter()
            .filter(|annotation| annotation.id != id)
            .map(Annotation::bounding_rect)
            .collect();
        let snapped = self.snap.snap(candidate, others, view.image_size());
        self.guides = snapped.guides;
        let offset = delta + snapped.offset;

        let mut moved = original.clone();
        moved.move_by(offset);
        preview_geometry(document, id, moved.kind);
        offset
    }

    fn erase_at(
        &mut self,
        document: &mut Document,
        point: Pos2,
        tolerance: &HitTolerance,
        removed: &mut Vec<Command>,
        restore: &mut Vec<Command>,
    ) {
        while let Some(index) = hit_test::find_annotation(document.annotations(), point, tolerance)
        {
            let command = Command::RemoveAt(index);
            let Some(inverse) = document.preview(command.clone()) else {
                break;
            };
            removed.push(command);
            restore.push(inverse);
        }
        self.prune_selection(document);
    }

    fn place_stamp(&mut self, document: &mut Document, at: Pos2) -> Option<AnnotationId> {
        let id = document.next_annotation_id();
        let kind = match self.tool {
            Tool::Pin => {
                let size = Vec2::splat(self.settings.pin_diameter);
                AnnotationKind::Pin {
                    rect: RectData::from_rect(Rect::from_center_size(at, size)),
                    number: document.take_pin_number(),
                    shape: self.settings.pin_shape,
                }
            }
            Tool::Emoji => {
                let size = Vec2::splat(self.settings.emoji_size);
                AnnotationKind::Emoji {
                    rect: RectData::from_rect(Rect::from_center_size(at, size)),
                    glyph: self.settings.emoji.clone(),
                }
            }
            _ => return None,
        };
        let annotation = Annotation::new(id, self.settings.style, kind);
        if !document.add(annotation) {
            return None;
        }
        self.selection = Some(id);
        Some(id)
    }

    fn build_annotation(
        &self,
        id: AnnotationId,
        tool: Tool,
        start: Pos2,
        current: Pos2,
        path: &[Pos2],
    ) -> Option<Annotation> {
        let settings = &self.settings;
        let rect = RectData::from_points(Point::from_pos2(start), Point::from_pos2(current));
        let has_area = rect.width() >= 1.0 && rect.height() >= 1.0;
        let has_length = start.distance(current) >= 1.0;
        let start_point = Point::from_pos2(start);
        let end_point = Point::from_pos2(current);

        let kind = match tool {
            Tool::Rectangle if has_area => AnnotationKind::Rectangle { rect },
            Tool::Ellipse if has_area => AnnotationKind::Ellipse { rect },
            Tool::Highlighter if has_area => AnnotationKind::Highlighter { rect },
            Tool::Spotlight if has_area => AnnotationKind::Spotlight {
                rect,
                shape: settings.spotlight_shape,
            },
            Tool::Pixelate if has_area => AnnotationKind::Pixelate {
                rect,
                block_size: settings.pixelate_block.max(1),
            },
            Tool::Blur if has_area => AnnotationKind::Blur {
                rect,
                radius: settings.blur_radius,
                mode: settings.blur_mode,
            },
            Tool::Callout if has_area => AnnotationKind::Callout {
                rect,
                text: String::new(),
                size: settings.text_size,
                tail: settings.callout_tail,
            },
            Tool::Magnifier if has_area => AnnotationKind::Magnifier {
                rect,
                magnification: settings.magnification.max(1.0),
            },
            Tool::Line if has_length => AnnotationKind::Line {
                start: start_point,
                end: end_point,
            },
            Tool::Arrow if has_length => AnnotationKind::Arrow {
                start: start_point,
                end: end_point,
                control: None,
            },
            Tool::Ruler if has_length => AnnotationKind::Ruler {
                start: start_point,
                end: end_point,
            },
            Tool::Pen if path.len() >= 2 => AnnotationKind::Pen {
                path: path.iter().copied().map(Point::from_pos2).collect(),
                brush: settings.brush,
            },
            _ => return None,
        };
        Some(Annotation::new(id, settings.style, kind))
    }
}

fn preview_geometry(document: &mut Document, id: AnnotationId, kind: AnnotationKind) {
    if let Some(index) = document.index_of(id) {
        document.preview(Command::SetGeometry { index, kind });
    }
}

fn preview_endpoints(document: &mut Document, id: AnnotationId, endpoints: Endpoints) {
    if let Some(index) = document.index_of(id) {
        document.preview(Command::SetEndpoints { index, endpoints });
    }
}

fn restore_geometry(document: &mut Document, index: usize, original: &Annotation) {
    document.preview(Command::SetGeometry {
        index,
        kind: original.kind.clone(),
    });
}

fn constrain_drawing(tool: Tool, start: Pos2, point: Pos2, modifiers: Modifiers) -> Pos2 {
    match tool {
        Tool::Magnifier => geometry::constrain_square(start, point),
        Tool::Rectangle | Tool::Ellipse | Tool::Spotlight if modifiers.shift => {
            geometry::constrain_square(start, point)
        }
        Tool::Line | Tool::Arrow | Tool::Ruler if modifiers.shift => {
            geometry::constrain_angle(start, point, 45.0)
        }
        _ => point,
    }
}

fn clamp_to_image(point: Pos2, image_size: Vec2) -> Pos2 {
    Pos2::new(
        point.x.clamp(0.0, image_size.x.max(0.0)),
        point.y.clamp(0.0, image_size.y.max(0.0)),
    )
}

/// Shrinks the dragged span so width / height equals `aspect`.
fn constrain_aspect(start: Pos2, current: Pos2, aspect: f32) -> Pos2 {
    if aspect <= 0.0 {
        return current;
    }
    let dx = current.x - start.x;
    let dy = current.y - start.y;
    let mut width = dx.abs();
    let mut height = width / aspect;
    if height > dy.abs() {
        height = dy.abs();
        width = height * aspect;
    }
    Pos2::new(start.x + width * dx.signum(), start.y + height * dy.signum())
}
