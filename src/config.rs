use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::annotation::{
    BlurMode, BrushKind, PinShape, SpotlightShape, Style, TailDirection, TextSize,
};
use crate::error::ConfigError;
use crate::history::HistoryConfig;

/// Editor tunables. Distances marked "display" are in screen units and
/// are converted through the current view scale; the rest are image units.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// Line/arrow/ruler hit distance (display).
    pub hit_threshold: f32,
    /// Side of the square hit box around a handle (display).
    pub handle_size: f32,
    /// Pointer travel below which a release counts as a click (display).
    pub click_slop: f32,
    pub min_resize: f32,
    pub snap_threshold: f32,
    pub snap_enabled: bool,
    pub bezier_samples: usize,
    pub pen_tolerance: f32,
    pub zoom_step: f32,
    /// Width over height. `None` leaves crop unconstrained.
    pub crop_aspect: Option<f32>,
    pub nudge_step: f32,
    pub nudge_step_large: f32,
    pub history_limit: usize,

    pub style: Style,
    pub text_size: TextSize,
    pub text_bold: bool,
    pub text_italic: bool,
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

    /// Fonts tried before the platform defaults.
    pub font_paths: Vec<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            hit_threshold: 10.0,
            handle_size: 12.0,
            click_slop: 5.0,
            min_resize: 20.0,
            snap_threshold: 5.0,
            snap_enabled: true,
            bezier_samples: 20,
            pen_tolerance: 1.0,
            zoom_step: 1.25,
            crop_aspect: None,
            nudge_step: 1.0,
            nudge_step_large: 10.0,
            history_limit: 200,
            style: Style::default(),
            text_size: TextSize::M,
            text_bold: false,
            text_italic: false,
            pin_shape: PinShape::Circle,
            pin_diameter: 28.0,
            emoji: "\u{2B50}".to_string(),
            emoji_size: 48.0,
            blur_radius: 12.0,
            blur_mode: BlurMode::Full,
            pixelate_block: 12,
            magnification: 2.0,
            spotlight_shape: SpotlightShape::Ellipse,
            brush: BrushKind::Solid,
            callout_tail: TailDirection::Bottom,
            font_paths: Vec::new(),
        }
    }
}

impl EditorConfig {
    fn file_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("com", "shotmark", "shotmark")?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok()?;
        Some(config_dir.join("editor.json"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(path)
    }

    /// Reads the user config, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                log::warn!("using default editor config: {err}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::file_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn history(&self) -> HistoryConfig {
        HistoryConfig {
            max_history: self.history_limit.max(1),
        }
    }
}
