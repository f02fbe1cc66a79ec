use egui::{vec2, Align, Color32, ComboBox, Layout, RichText, Sense, Slider, Stroke, Ui};

use shotmark::annotation::{FillMode, PinShape, TextSize, Tool};
use shotmark::session::{Flip, Rotation};
use shotmark::Session;

const PALETTE: [[u8; 4]; 8] = [
    [0xE5, 0x3E, 0x3E, 0xFF],
    [0xDD, 0x6B, 0x20, 0xFF],
    [0xD6, 0x9E, 0x2E, 0xFF],
    [0x38, 0xA1, 0x69, 0xFF],
    [0x31, 0x82, 0xCE, 0xFF],
    [0x80, 0x5A, 0xD5, 0xFF],
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0x1A, 0x20, 0x2C, 0xFF],
];

const TOOL_GROUPS: [&[Tool]; 4] = [
    &[Tool::Select, Tool::Move, Tool::Eraser, Tool::Eyedropper, Tool::Crop],
    &[
        Tool::Rectangle,
        Tool::Ellipse,
        Tool::Line,
        Tool::Arrow,
        Tool::Ruler,
        Tool::Pen,
    ],
    &[Tool::Text, Tool::Callout, Tool::Pin, Tool::Emoji],
    &[
        Tool::Highlighter,
        Tool::Spotlight,
        Tool::Magnifier,
        Tool::Pixelate,
        Tool::Blur,
    ],
];

/// Commands the host runs after the toolbar has been drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ToolbarOutput {
    pub undo: bool,
    pub redo: bool,
    pub apply: bool,
    pub copy: bool,
    pub save: bool,
    pub confirm_crop: bool,
    pub cancel_crop: bool,
    pub rotate: Option<Rotation>,
    pub flip: Option<Flip>,
    pub expand: bool,
}

pub fn shortcut_hint(tool: Tool) -> Option<char> {
    match tool {
        Tool::Select => Some('V'),
        Tool::Rectangle => Some('R'),
        Tool::Ellipse => Some('E'),
        Tool::Line => Some('L'),
        Tool::Arrow => Some('A'),
        Tool::Text => Some('T'),
        Tool::Pin => Some('N'),
        Tool::Pen => Some('P'),
        Tool::Highlighter => Some('H'),
        Tool::Blur => Some('B'),
        Tool::Crop => Some('C'),
        Tool::Eyedropper => Some('I'),
        _ => None,
    }
}

pub fn show_toolbar(ui: &mut Ui, session: &mut Session, exporting: bool) -> ToolbarOutput {
    let mut out = ToolbarOutput::default();

    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing = vec2(6.0, 4.0);

        for (index, group) in TOOL_GROUPS.iter().enumerate() {
            if index > 0 {
                ui.separator();
            }
            for tool in group.iter().copied() {
                tool_button(ui, session, tool);
            }
        }

        ui.separator();
        render_palette(ui, session);

        ui.separator();
        render_style_controls(ui, session);
        render_tool_specific(ui, session);
    });

    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing = vec2(6.0, 0.0);
        let document = session.document();
        out.undo = ui
            .add_enabled(document.can_undo(), egui::Button::new("Undo"))
            .clicked();
        out.redo = ui
            .add_enabled(document.can_redo(), egui::Button::new("Redo"))
            .clicked();

        ui.separator();
        if ui.button("⟳").on_hover_text("Rotate clockwise").clicked() {
            out.rotate = Some(Rotation::Clockwise);
        }
        if ui.button("⟲").on_hover_text("Rotate counter-clockwise").clicked() {
            out.rotate = Some(Rotation::CounterClockwise);
        }
        if ui.button("⇋").on_hover_text("Flip horizontally").clicked() {
            out.flip = Some(Flip::Horizontal);
        }
        if ui.button("⇵").on_hover_text("Flip vertically").clicked() {
            out.flip = Some(Flip::Vertical);
        }
        out.expand = ui.button("Expand").on_hover_text("Add margin").clicked();

        if session.interaction().pending_crop().is_some() {
            ui.separator();
            out.confirm_crop = ui.button("Crop").clicked();
            out.cancel_crop = ui.button("Cancel").clicked();
        }

        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            out.save = ui
                .add_enabled(!exporting, egui::Button::new("Save"))
                .on_hover_text("⌘S")
                .clicked();
            out.copy = ui
                .add_enabled(!exporting, egui::Button::new("Copy"))
                .on_hover_text("⌘C")
                .clicked();
            out.apply = ui
                .add_enabled(!session.document().is_empty(), egui::Button::new("Apply"))
                .on_hover_text("Bake annotations into the image")
                .clicked();
            if exporting {
                ui.spinner();
            }
        });
    });

    out
}

fn tool_button(ui: &mut Ui, session: &mut Session, tool: Tool) {
    let selected = session.interaction().tool() == tool;
    let hint = match shortcut_hint(tool) {
        Some(key) => format!("{} ({key})", tool.label()),
        None => tool.label().to_string(),
    };
    if ui
        .selectable_label(selected, tool.label())
        .on_hover_text(hint)
        .clicked()
    {
        session.set_tool(tool);
    }
}

fn render_palette(ui: &mut Ui, session: &mut Session) {
    let active = session.active_style();
    for color in PALETTE {
        let (rect, response) = ui.allocate_exact_size(vec2(18.0, 18.0), Sense::click());
        let fill = Color32::from_rgba_unmultiplied(color[0], color[1], color[2], color[3]);
        let painter = ui.painter();
        painter.circle_filled(rect.center(), 8.0, fill);
        if active.color == color {
            painter.circle_stroke(rect.center(), 9.5, Stroke::new(1.5, Color32::WHITE));
        }
        if response.on_hover_text("Choose color").clicked() {
            let mut style = active;
            style.color = color;
            session.apply_style(style);
        }
    }
}

fn render_style_controls(ui: &mut Ui, session: &mut Session) {
    let mut style = session.active_style();

    ui.label(RichText::new("Width").size(12.0));
    ui.add(Slider::new(&mut style.line_width, 1.0..=20.0).max_decimals(0));
    ui.label(RichText::new("Opacity").size(12.0));
    ui.add(Slider::new(&mut style.opacity, 0.1..=1.0).max_decimals(2));

    ComboBox::from_id_source("shotmark_fill_mode")
        .selected_text(fill_label(style.fill_mode))
        .width(70.0)
        .show_ui(ui, |ui| {
            for mode in [FillMode::Stroke, FillMode::Fill, FillMode::Both] {
                ui.selectable_value(&mut style.fill_mode, mode, fill_label(mode));
            }
        });
    ui.checkbox(&mut style.dashed, "Dashed");
    ui.checkbox(&mut style.sketch, "Sketch");

    if style != session.active_style() {
        session.apply_style(style);
    }

    let mut snapping = session.interaction().snapping();
    if ui.checkbox(&mut snapping, "Snap").changed() {
        session.set_snapping(snapping);
    }
}

fn render_tool_specific(ui: &mut Ui, session: &mut Session) {
    let tool = session.interaction().tool();
    let settings = session.tool_settings_mut();
    match tool {
        Tool::Text | Tool::Callout => {
            let mut points = settings.text_size.points();
            ui.label(RichText::new("Size").size(12.0));
            if ui
                .add(Slider::new(&mut points, TextSize::MIN..=TextSize::MAX).max_decimals(0))
                .changed()
            {
                settings.text_size = TextSize::from_points(points);
            }
            if tool == Tool::Text {
                ui.checkbox(&mut settings.bold, "Bold");
                ui.checkbox(&mut settings.italic, "Italic");
            }
        }
        Tool::Pin => {
            ComboBox::from_id_source("shotmark_pin_shape")
                .selected_text(format!("{:?}", settings.pin_shape))
                .width(80.0)
                .show_ui(ui, |ui| {
                    for shape in [PinShape::Circle, PinShape::Square, PinShape::RoundedSquare] {
                        ui.selectable_value(&mut settings.pin_shape, shape, format!("{shape:?}"));
                    }
                });
        }
        Tool::Emoji => {
            ui.add(egui::TextEdit::singleline(&mut settings.emoji).desired_width(32.0));
        }
        Tool::Blur => {
            ui.label(RichText::new("Radius").size(12.0));
            ui.add(Slider::new(&mut settings.blur_radius, 2.0..=48.0).max_decimals(0));
        }
        Tool::Pixelate => {
            ui.label(RichText::new("Block").size(12.0));
            ui.add(Slider::new(&mut settings.pixelate_block, 4..=48));
        }
        Tool::Magnifier => {
            ui.label(RichText::new("Zoom").size(12.0));
            ui.add(Slider::new(&mut settings.magnification, 1.5..=6.0).max_decimals(1));
        }
        _ => {}
    }
}

fn fill_label(mode: FillMode) -> &'static str {
    match mode {
        FillMode::Stroke => "Outline",
        FillMode::Fill => "Filled",
        FillMode::Both => "Both",
    }
}
