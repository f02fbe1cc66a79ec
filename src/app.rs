use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::Local;
use eframe::egui::{self, vec2, Context as EguiContext, Key, TopBottomPanel};
use eframe::{App, Frame};
use image::{DynamicImage, ImageFormat, RgbaImage};

use shotmark::annotation::Tool;
use shotmark::document::Reorder;
use shotmark::export::{Backdrop, ExportOptions, Shadow};
use shotmark::session::Insets;
use shotmark::{EditorConfig, Session};

use crate::canvas::{self, CanvasState};
use crate::clipboard;
use crate::toolbar::{self, ToolbarOutput};

const EXPAND_MARGIN: u32 = 32;

/// Where a finished background export goes.
#[derive(Clone, Debug, PartialEq)]
enum ExportTarget {
    Clipboard,
    File(PathBuf),
}

pub struct ShotmarkApp {
    config: EditorConfig,
    session: Option<Session>,
    canvas: CanvasState,
    export_target: Option<ExportTarget>,
    framed_export: bool,
    copy_feedback_until: Option<f64>,
}

impl ShotmarkApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, initial: Option<PathBuf>) -> Self {
        let config = EditorConfig::load_or_default();
        let mut app = Self {
            config,
            session: None,
            canvas: CanvasState::default(),
            export_target: None,
            framed_export: false,
            copy_feedback_until: None,
        };
        if let Some(path) = initial {
            match clipboard::read_image_from_path(&path) {
                Ok(image) => app.load_image(image),
                Err(err) => log::error!("{err:#}"),
            }
        }
        app
    }

    fn load_image(&mut self, image: RgbaImage) {
        match Session::new(image, self.config.clone()) {
            Ok(session) => {
                self.session = Some(session);
                self.canvas = CanvasState::default();
                self.export_target = None;
            }
            Err(err) => log::error!("cannot open image: {err}"),
        }
    }

    fn export_options(&self) -> ExportOptions {
        if !self.framed_export {
            return ExportOptions::default();
        }
        ExportOptions {
            backdrop: Backdrop::LinearGradient {
                from: [0x4D, 0x8D, 0xFF, 0xFF],
                to: [0x80, 0x5A, 0xD5, 0xFF],
                angle: 45.0,
            },
            padding: 48.0,
            corner_radius: 12.0,
            shadow: Some(Shadow::default()),
            border: None,
        }
    }

    fn handle_shortcuts(&mut self, ctx: &EguiContext) {
        if self.canvas.is_editing_text() {
            if ctx.input(|input| input.key_pressed(Key::Escape)) {
                if let Some(session) = self.session.as_mut() {
                    self.canvas.cancel_text_edit(session);
                }
            }
            return;
        }

        let cmd = ctx.input(|input| input.modifiers.command || input.modifiers.ctrl);
        let shift = ctx.input(|input| input.modifiers.shift);

        if cmd && ctx.input(|input| input.key_pressed(Key::V)) {
            self.paste_image();
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        if ctx.input(|input| input.key_pressed(Key::Escape)) {
            if session.interaction().pending_crop().is_some() {
                session.cancel_crop();
            } else {
                session.cancel_gesture();
                session.set_tool(Tool::Select);
            }
        }

        if ctx.input(|input| input.key_pressed(Key::Enter))
            && session.interaction().pending_crop().is_some()
        {
            if let Err(err) = session.confirm_crop() {
                log::error!("crop failed: {err}");
            }
        }

        if !cmd {
            if ctx.wants_keyboard_input() {
                return;
            }
            let pressed = ctx.input(|input| {
                input.events.iter().find_map(|event| match event {
                    egui::Event::Text(text) => text.chars().next(),
                    _ => None,
                })
            });
            if let Some(tool) = pressed.and_then(tool_for_key) {
                session.set_tool(tool);
            }

            if ctx
                .input(|input| input.key_pressed(Key::Delete) || input.key_pressed(Key::Backspace))
            {
                session.delete_selected();
            }

            let arrows = [
                (Key::ArrowLeft, vec2(-1.0, 0.0)),
                (Key::ArrowRight, vec2(1.0, 0.0)),
                (Key::ArrowUp, vec2(0.0, -1.0)),
                (Key::ArrowDown, vec2(0.0, 1.0)),
            ];
            for (key, direction) in arrows {
                if ctx.input(|input| input.key_pressed(key)) {
                    session.nudge_selected(direction, shift);
                }
            }

            if ctx.input(|input| input.key_pressed(Key::OpenBracket)) {
                session.reorder_selected(if shift {
                    Reorder::SendToBack
                } else {
                    Reorder::Backward
                });
            }
            if ctx.input(|input| input.key_pressed(Key::CloseBracket)) {
                session.reorder_selected(if shift {
                    Reorder::BringToFront
                } else {
                    Reorder::Forward
                });
            }
            return;
        }

        if ctx.input(|input| input.key_pressed(Key::Z)) {
            if shift {
                session.redo();
            } else {
                session.undo();
            }
        }

        if ctx.input(|input| input.key_pressed(Key::Plus) || input.key_pressed(Key::Equals)) {
            session.zoom_in();
        }
        if ctx.input(|input| input.key_pressed(Key::Minus)) {
            session.zoom_out();
        }
        if ctx.input(|input| input.key_pressed(Key::Num0)) {
            session.set_zoom(1.0);
        }

        if ctx.input(|input| input.key_pressed(Key::C)) {
            self.start_export(ExportTarget::Clipboard);
        }
        if ctx.input(|input| input.key_pressed(Key::S)) {
            self.save_to_file();
        }
    }

    fn paste_image(&mut self) {
        match clipboard::read_image_from_clipboard() {
            Ok(Some(image)) => self.load_image(image),
            Ok(None) => {}
            Err(err) => log::error!("cannot paste image: {err:#}"),
        }
    }

    fn save_to_file(&mut self) {
        if self.session.is_none() {
            return;
        }
        let default_name = format!("Screenshot {}", Local::now().format("%Y-%m-%d at %H.%M.%S"));
        let file = rfd::FileDialog::new()
            .set_title("Save annotated screenshot")
            .set_file_name(&default_name)
            .add_filter("PNG", &["png"])
            .add_filter("JPEG", &["jpg", "jpeg"])
            .save_file();
        if let Some(path) = file {
            self.start_export(ExportTarget::File(path));
        }
    }

    fn start_export(&mut self, target: ExportTarget) {
        let options = self.export_options();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.start_export(options) {
            Ok(()) => self.export_target = Some(target),
            Err(err) => log::warn!("export not started: {err}"),
        }
    }

    fn poll_export(&mut self, ctx: &EguiContext) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(result) = session.poll_export() else {
            if session.export_pending() {
                ctx.request_repaint();
            }
            return;
        };
        let Some(target) = self.export_target.take() else {
            return;
        };
        let delivered = result
            .context("export failed")
            .and_then(|image| deliver(&image, &target));
        match delivered {
            Ok(()) => {
                if target == ExportTarget::Clipboard {
                    self.copy_feedback_until = Some(ctx.input(|input| input.time) + 1.5);
                }
            }
            Err(err) => log::error!("{err:#}"),
        }
    }

    fn run_toolbar_output(&mut self, output: ToolbarOutput) {
        if output.copy {
            self.start_export(ExportTarget::Clipboard);
        }
        if output.save {
            self.save_to_file();
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if output.undo {
            session.undo();
        }
        if output.redo {
            session.redo();
        }
        let result = if output.apply {
            session.apply()
        } else if output.confirm_crop {
            session.confirm_crop().map(|_| ())
        } else if let Some(rotation) = output.rotate {
            session.rotate(rotation)
        } else if let Some(flip) = output.flip {
            session.flip(flip)
        } else if output.expand {
            session.expand_canvas(Insets::uniform(EXPAND_MARGIN), [255, 255, 255, 255])
        } else {
            Ok(())
        };
        if let Err(err) = result {
            log::error!("image operation failed: {err}");
        }
        if output.cancel_crop {
            session.cancel_crop();
        }
    }
}

fn tool_for_key(key: char) -> Option<Tool> {
    let key = key.to_ascii_uppercase();
    Tool::ALL
        .into_iter()
        .find(|tool| toolbar::shortcut_hint(*tool) == Some(key))
}

fn deliver(image: &RgbaImage, target: &ExportTarget) -> Result<()> {
    match target {
        ExportTarget::Clipboard => clipboard::write_image_to_clipboard(image),
        ExportTarget::File(path) => save_image(image, path),
    }
}

fn format_for_path(path: &Path) -> ImageFormat {
    let ext = path
        .extension()
        .and_then(|item| item.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    if ext == "jpg" || ext == "jpeg" {
        ImageFormat::Jpeg
    } else {
        ImageFormat::Png
    }
}

fn save_image(image: &RgbaImage, path: &Path) -> Result<()> {
    match format_for_path(path) {
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, ImageFormat::Jpeg)
            .with_context(|| format!("cannot save jpeg to {}", path.display()))?,
        format => image
            .save_with_format(path, format)
            .with_context(|| format!("cannot save png to {}", path.display()))?,
    }
    log::info!("saved {}", path.display());
    Ok(())
}

impl App for ShotmarkApp {
    fn update(&mut self, ctx: &EguiContext, _frame: &mut Frame) {
        self.handle_shortcuts(ctx);
        self.poll_export(ctx);

        let exporting = self.export_target.is_some();
        let copied = self
            .copy_feedback_until
            .is_some_and(|deadline| ctx.input(|input| input.time) <= deadline);

        let output = TopBottomPanel::top("toolbar")
            .show(ctx, |ui| {
                let Some(session) = self.session.as_mut() else {
                    ui.label("No image");
                    return ToolbarOutput::default();
                };
                let output = toolbar::show_toolbar(ui, session, exporting);
                ui.horizontal(|ui| {
                    ui.checkbox(&mut self.framed_export, "Framed export");
                    if copied {
                        ui.label("Copied to clipboard");
                    }
                });
                output
            })
            .inner;
        self.run_toolbar_output(output);

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| match self.session.as_mut() {
                Some(session) => canvas::show_canvas(ui, ctx, session, &mut self.canvas),
                None => canvas::empty_canvas(ui),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_extension_selects_jpeg() {
        assert_eq!(format_for_path(Path::new("a.JPG")), ImageFormat::Jpeg);
        assert_eq!(format_for_path(Path::new("a.jpeg")), ImageFormat::Jpeg);
        assert_eq!(format_for_path(Path::new("a.png")), ImageFormat::Png);
        assert_eq!(format_for_path(Path::new("noext")), ImageFormat::Png);
    }

    #[test]
    fn letter_keys_map_to_tools() {
        assert_eq!(tool_for_key('r'), Some(Tool::Rectangle));
        assert_eq!(tool_for_key('A'), Some(Tool::Arrow));
        assert_eq!(tool_for_key('z'), None);
    }

    #[test]
    fn save_image_writes_a_decodable_png() {
        let dir = std::env::temp_dir().join(format!("shotmark-save-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("out.png");
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]));
        save_image(&image, &path).expect("save");
        let loaded = image::open(&path).expect("open").to_rgba8();
        assert_eq!(loaded, image);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
