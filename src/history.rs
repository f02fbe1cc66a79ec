//! Command log for undo/redo.
//!
//! Commands are plain values interpreted by [`crate::document::Document`].
//! Applying a command yields its inverse, so both stacks only ever hold
//! commands that are ready to be applied.

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationKind, Endpoints, RectData, Style};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Append(Annotation),
    RemoveLast,
    RemoveAt(usize),
    InsertAt { index: usize, annotation: Annotation },
    SetRect { index: usize, rect: RectData },
    SetEndpoints { index: usize, endpoints: Endpoints },
    SetText { index: usize, text: String },
    Nudge { index: usize, dx: f32, dy: f32 },
    /// Restores a full geometry snapshot. Used as the inverse of edits
    /// whose arithmetic inverse would not be bit-exact.
    SetGeometry { index: usize, kind: AnnotationKind },
    SetStyle { index: usize, style: Style },
    Move { from: usize, to: usize },
    Batch(Vec<Command>),
}

impl Command {
    pub fn description(&self) -> String {
        match self {
            Command::Append(_) => "Add annotation".to_string(),
            Command::RemoveLast | Command::RemoveAt(_) => "Delete annotation".to_string(),
            Command::InsertAt { .. } => "Restore annotation".to_string(),
            Command::SetRect { .. } => "Resize annotation".to_string(),
            Command::SetEndpoints { .. } => "Reshape annotation".to_string(),
            Command::SetText { .. } => "Edit text".to_string(),
            Command::Nudge { .. } => "Move annotation".to_string(),
            Command::SetGeometry { .. } => "Restore geometry".to_string(),
            Command::SetStyle { .. } => "Change style".to_string(),
            Command::Move { .. } => "Reorder annotation".to_string(),
            Command::Batch(commands) => format!("{} changes", commands.len()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HistoryConfig {
    pub max_history: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_history: 200 }
    }
}

/// Two-stack undo/redo log. Each entry is the command that reverses the
/// step it was recorded for.
#[derive(Clone, Debug, Default)]
pub struct CommandLog {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    config: HistoryConfig,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Records the inverse of a fresh user action. Clears the redo side.
    pub fn record(&mut self, inverse: Command) {
        log::debug!("undo: recorded '{}'", inverse.description());
        self.redo_stack.clear();
        self.push_undo(inverse);
    }

    pub(crate) fn push_undo(&mut self, inverse: Command) {
        self.undo_stack.push(inverse);
        if self.undo_stack.len() > self.config.max_history {
            let overflow = self.undo_stack.len() - self.config.max_history;
            self.undo_stack.drain(..overflow);
        }
    }

    pub(crate) fn push_redo(&mut self, command: Command) {
        self.redo_stack.push(command);
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Command> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Command> {
        self.redo_stack.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.last().map(Command::description)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        log::debug!("undo: history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandLog, HistoryConfig};

    #[test]
    fn record_clears_redo() {
        let mut log = CommandLog::new();
        log.record(Command::RemoveLast);
        let undone = log.pop_undo();
        assert_eq!(undone, Some(Command::RemoveLast));
        log.push_redo(Command::RemoveAt(0));
        assert!(log.can_redo());

        log.record(Command::RemoveLast);
        assert!(!log.can_redo());
        assert_eq!(log.undo_count(), 1);
    }

    #[test]
    fn history_is_capped() {
        let mut log = CommandLog::with_config(HistoryConfig { max_history: 3 });
        for index in 0..5 {
            log.record(Command::RemoveAt(index));
        }
        assert_eq!(log.undo_count(), 3);
        assert_eq!(log.pop_undo(), Some(Command::RemoveAt(4)));
    }

    #[test]
    fn empty_log_pops_nothing() {
        let mut log = CommandLog::new();
        assert_eq!(log.pop_undo(), None);
        assert_eq!(log.pop_redo(), None);
        assert!(log.undo_description().is_none());
    }
}
