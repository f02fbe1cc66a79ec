//! The ordered annotation list for one editing session.
//!
//! All mutations go through [`Document::apply`], which interprets a
//! [`Command`] and hands back its inverse. Logged operations push that
//! inverse onto the [`CommandLog`]; previews (live drag feedback) do not.
//! Index-based operations against a stale index are silent no-ops.

use std::sync::Arc;

use egui::{Pos2, Rect, Vec2};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, Endpoints, RectData, Style, TextBox,
};
use crate::history::{Command, CommandLog, HistoryConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reorder {
    BringToFront,
    SendToBack,
    Forward,
    Backward,
}

#[derive(Clone, Debug)]
pub struct Document {
    annotations: Vec<Annotation>,
    next_pin: u32,
    next_id: AnnotationId,
    log: CommandLog,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_history(HistoryConfig::default())
    }

    pub fn with_history(config: HistoryConfig) -> Self {
        Self {
            annotations: Vec::new(),
            next_pin: 1,
            next_id: 1,
            log: CommandLog::with_config(config),
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Annotation> {
        self.annotations.get(index)
    }

    pub fn find(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    pub fn index_of(&self, id: AnnotationId) -> Option<usize> {
        self.annotations
            .iter()
            .position(|annotation| annotation.id == id)
    }

    pub fn history(&self) -> &CommandLog {
        &self.log
    }

    /// Immutable copy handed to background flattening.
    pub fn snapshot(&self) -> Arc<[Annotation]> {
        Arc::from(self.annotations.clone())
    }

    pub fn next_annotation_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Number the next pin will carry.
    pub fn pin_counter(&self) -> u32 {
        self.next_pin
    }

    /// Takes the current pin number and advances the counter.
    pub fn take_pin_number(&mut self) -> u32 {
        let number = self.next_pin;
        self.next_pin = self.next_pin.saturating_add(1);
        number
    }

    pub fn add(&mut self, annotation: Annotation) -> bool {
        self.execute(Command::Append(annotation))
    }

    pub fn remove_by_id(&mut self, id: AnnotationId) -> Option<(Annotation, usize)> {
        let index = self.index_of(id)?;
        let annotation = self.annotations[index].clone();
        self.execute(Command::RemoveAt(index))
            .then_some((annotation, index))
    }

    pub fn insert_at(&mut self, annotation: Annotation, index: usize) -> bool {
        self.execute(Command::InsertAt { index, annotation })
    }

    pub fn set_rect(&mut self, index: usize, rect: RectData) -> bool {
        self.execute(Command::SetRect { index, rect })
    }

    pub fn set_endpoints(&mut self, index: usize, endpoints: Endpoints) -> bool {
        self.execute(Command::SetEndpoints { index, endpoints })
    }

    pub fn set_text(&mut self, index: usize, text: String) -> bool {
        self.execute(Command::SetText { index, text })
    }

    pub fn nudge(&mut self, index: usize, dx: f32, dy: f32) -> bool {
        self.execute(Command::Nudge { index, dx, dy })
    }

    pub fn set_style(&mut self, index: usize, style: Style) -> bool {
        self.execute(Command::SetStyle { index, style })
    }

    pub fn reorder(&mut self, index: usize, direction: Reorder) -> bool {
        if index >= self.annotations.len() {
            return false;
        }
        let last = self.annotations.len() - 1;
        let to = match direction {
            Reorder::BringToFront => last,
            Reorder::SendToBack => 0,
            Reorder::Forward => (index + 1).min(last),
            Reorder::Backward => index.saturating_sub(1),
        };
        if to == index {
            return false;
        }
        self.execute(Command::Move { from: index, to })
    }

    /// Applies a command and records its inverse for undo.
    pub fn execute(&mut self, command: Command) -> bool {
        match self.apply(command) {
            Some(inverse) => {
                self.log.record(inverse);
                true
            }
            None => false,
        }
    }

    /// Applies a command without touching the log. The inverse is returned
    /// so callers can roll the preview back before committing.
    pub fn preview(&mut self, command: Command) -> Option<Command> {
        self.apply(command)
    }

    pub fn undo(&mut self) -> bool {
        let Some(inverse) = self.log.pop_undo() else {
            return false;
        };
        log::debug!("undo: '{}'", inverse.description());
        match self.apply(inverse) {
            Some(redo) => {
                self.log.push_redo(redo);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let Some(command) = self.log.pop_redo() else {
            return false;
        };
        log::debug!("redo: '{}'", command.description());
        match self.apply(command) {
            Some(inverse) => {
                self.log.push_undo(inverse);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Drops every annotation, resets numbering and forgets history.
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.next_pin = 1;
        self.log.clear();
    }

    /// Forgets history without touching annotations. Called whenever the
    /// base image is replaced.
    pub fn reset_history(&mut self) {
        self.log.clear();
    }

    /// Applies `f` to every coordinate of every annotation. Not logged.
    pub fn remap_all(&mut self, f: impl Fn(Pos2) -> Pos2) {
        for annotation in &mut self.annotations {
            annotation.map_points(&f);
        }
    }

    /// Fills in `measured` for text boxes that have none. Not logged.
    pub fn measure_text(&mut self, measure: impl Fn(&TextBox) -> Option<Vec2>) {
        for annotation in &mut self.annotations {
            if let AnnotationKind::Text(text) = &mut annotation.kind {
                if text.measured.is_none() {
                    text.measured = measure(text).map(|size| [size.x, size.y]);
                }
            }
        }
    }

    /// Moves everything into the coordinate space of `crop` and drops
    /// annotations that no longer overlap it. Returns the number dropped.
    pub fn crop_to(&mut self, crop: Rect) -> usize {
        let before = self.annotations.len();
        self.annotations
            .retain(|annotation| overlaps(annotation.bounding_rect(), crop));
        let delta = Vec2::new(-crop.min.x, -crop.min.y);
        for annotation in &mut self.annotations {
            annotation.move_by(delta);
        }
        before - self.annotations.len()
    }

    fn apply(&mut self, command: Command) -> Option<Command> {
        match command {
            Command::Append(annotation) => {
                if self.index_of(annotation.id).is_some() {
                    return None;
                }
                self.annotations.push(annotation);
                Some(Command::RemoveLast)
            }
            Command::RemoveLast => self.annotations.pop().map(Command::Append),
            Command::RemoveAt(index) => {
                if index >= self.annotations.len() {
                    return None;
                }
                let annotation = self.annotations.remove(index);
                Some(Command::InsertAt { index, annotation })
            }
            Command::InsertAt { index, annotation } => {
                if index > self.annotations.len() || self.index_of(annotation.id).is_some() {
                    return None;
                }
                self.annotations.insert(index, annotation);
                Some(Command::RemoveAt(index))
            }
            Command::SetRect { index, rect } => {
                let annotation = self.annotations.get_mut(index)?;
                let inverse = match annotation.stored_rect() {
                    Some(before) => Command::SetRect {
                        index,
                        rect: before,
                    },
                    None => Command::SetGeometry {
                        index,
                        kind: annotation.kind.clone(),
                    },
                };
                annotation.set_rect(rect);
                Some(inverse)
            }
            Command::SetEndpoints { index, endpoints } => {
                let annotation = self.annotations.get_mut(index)?;
                let before = annotation.endpoints()?;
                annotation.set_endpoints(endpoints);
                Some(Command::SetEndpoints {
                    index,
                    endpoints: before,
                })
            }
            Command::SetText { index, text } => {
                let annotation = self.annotations.get_mut(index)?;
                let before = annotation.set_text(text)?;
                Some(Command::SetText {
                    index,
                    text: before,
                })
            }
            Command::Nudge { index, dx, dy } => {
                let annotation = self.annotations.get_mut(index)?;
                let before = annotation.kind.clone();
                annotation.move_by(Vec2::new(dx, dy));
                Some(Command::SetGeometry {
                    index,
                    kind: before,
                })
            }
            Command::SetGeometry { index, kind } => {
                let annotation = self.annotations.get_mut(index)?;
                if std::mem::discriminant(&annotation.kind) != std::mem::discriminant(&kind) {
                    return None;
                }
                let before = std::mem::replace(&mut annotation.kind, kind);
                Some(Command::SetGeometry {
                    index,
                    kind: before,
                })
            }
            Command::SetStyle { index, style } => {
                let annotation = self.annotations.get_mut(index)?;
                let before = std::mem::replace(&mut annotation.style, style);
                Some(Command::SetStyle {
                    index,
                    style: before,
                })
            }
            Command::Move { from, to } => {
                let len = self.annotations.len();
                if from >= len || to >= len {
                    return None;
                }
                let annotation = self.annotations.remove(from);
                self.annotations.insert(to, annotation);
                Some(Command::Move { from: to, to: from })
            }
            Command::Batch(commands) => {
                let mut inverses: Vec<Command> = commands
                    .into_iter()
                    .filter_map(|command| self.apply(command))
                    .collect();
                if inverses.is_empty() {
                    return None;
                }
                inverses.reverse();
                Some(Command::Batch(inverses))
            }
        }
    }
}

/// Open-interval overlap on both axes, so zero-width bounds (a horizontal
/// line) still count when they cross the crop area.
fn overlaps(bounds: Rect, crop: Rect) -> bool {
    bounds.min.x < crop.max.x
        && bounds.max.x > crop.min.x
        && bounds.min.y < crop.max.y
        && bounds.max.y > crop.min.y
}
