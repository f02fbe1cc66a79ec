use egui::{
    Align2, Color32, Context, FontId, Id, Key, Pos2, Rect, Response, Sense, Stroke, TextureHandle,
    TextureOptions, Ui,
};

use shotmark::interaction::{InteractionEvent, Modifiers, TextEditRequest};
use shotmark::transform::ViewTransform;
use shotmark::Session;

/// Per-window canvas state that the engine does not own.
#[derive(Default)]
pub struct CanvasState {
    texture: Option<TextureHandle>,
    pointer_down: bool,
    text_edit: Option<TextEdit>,
}

struct TextEdit {
    request: TextEditRequest,
    buffer: String,
    screen_pos: Pos2,
}

impl CanvasState {
    pub fn is_editing_text(&self) -> bool {
        self.text_edit.is_some()
    }

    pub fn cancel_text_edit(&mut self, session: &mut Session) {
        if self.text_edit.take().is_some() {
            session.cancel_text_edit();
        }
    }
}

pub fn empty_canvas(ui: &mut Ui) {
    let (rect, _) = ui.allocate_exact_size(ui.available_size(), Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 16.0, Color32::from_rgb(0x12, 0x14, 0x1A));
    painter.text(
        rect.center(),
        Align2::CENTER_CENTER,
        "Paste an image (Cmd+V) or pass a file path",
        FontId::proportional(19.0),
        Color32::from_gray(170),
    );
}

pub fn show_canvas(ui: &mut Ui, ctx: &Context, session: &mut Session, state: &mut CanvasState) {
    let (canvas_rect, response) =
        ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
    let view = session.view(canvas_rect);

    if state.text_edit.is_none() {
        handle_pointer(ctx, session, state, &response, &view);
    }
    handle_zoom_scroll(ctx, session, &response);

    let pixels_per_point = ctx.pixels_per_point();
    match session.render_overlay(&view, pixels_per_point) {
        Ok(image) => match &mut state.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                state.texture =
                    Some(ctx.load_texture("shotmark_overlay", image, TextureOptions::LINEAR));
            }
        },
        Err(err) => log::error!("overlay render failed: {err}"),
    }

    if let Some(texture) = &state.texture {
        ui.painter_at(canvas_rect).image(
            texture.id(),
            canvas_rect,
            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            Color32::WHITE,
        );
    }

    draw_text_editor(ui, session, state);
}

fn handle_pointer(
    ctx: &Context,
    session: &mut Session,
    state: &mut CanvasState,
    response: &Response,
    view: &ViewTransform,
) {
    let (pressed, down, released, position, shift) = ctx.input(|input| {
        (
            input.pointer.primary_pressed(),
            input.pointer.primary_down(),
            input.pointer.primary_released(),
            input.pointer.interact_pos(),
            input.modifiers.shift,
        )
    });
    let Some(position) = position else {
        return;
    };
    let modifiers = Modifiers { shift };

    if pressed && response.hovered() {
        state.pointer_down = true;
        let event = session.press(view, position, modifiers);
        handle_event(session, state, view, event);
        return;
    }
    if !state.pointer_down {
        return;
    }
    if released {
        state.pointer_down = false;
        let event = session.release(view, position, modifiers);
        handle_event(session, state, view, event);
    } else if down {
        session.drag(view, position, modifiers);
    }
}

fn handle_zoom_scroll(ctx: &Context, session: &mut Session, response: &Response) {
    if !response.hovered() {
        return;
    }
    let zoom_delta = ctx.input(|input| input.zoom_delta());
    if zoom_delta != 1.0 {
        session.set_zoom(session.zoom() * zoom_delta);
    }
}

fn handle_event(
    session: &Session,
    state: &mut CanvasState,
    view: &ViewTransform,
    event: Option<InteractionEvent>,
) {
    let Some(InteractionEvent::EditText(request)) = event else {
        return;
    };
    let (buffer, anchor) = match &request {
        TextEditRequest::New { at } => (String::new(), *at),
        TextEditRequest::Existing { id, content } => {
            let anchor = session
                .document()
                .find(*id)
                .map(|annotation| annotation.bounding_rect().left_top())
                .unwrap_or_default();
            (content.clone(), anchor)
        }
    };
    state.text_edit = Some(TextEdit {
        request,
        buffer,
        screen_pos: view.to_display(anchor),
    });
}

fn draw_text_editor(ui: &mut Ui, session: &mut Session, state: &mut CanvasState) {
    let Some(edit) = state.text_edit.as_mut() else {
        return;
    };

    let mut commit = false;
    let mut cancel = false;
    egui::Area::new(Id::new("shotmark_text_edit"))
        .order(egui::Order::Foreground)
        .fixed_pos(edit.screen_pos)
        .show(ui.ctx(), |ui| {
            egui::Frame::popup(ui.style())
                .stroke(Stroke::new(1.0, Color32::from_rgb(77, 141, 255)))
                .show(ui, |ui| {
                    ui.set_min_width(280.0);
                    let response = ui.add(
                        egui::TextEdit::multiline(&mut edit.buffer)
                            .desired_rows(3)
                            .desired_width(f32::INFINITY)
                            .hint_text("Type text"),
                    );
                    if !response.has_focus() && !response.lost_focus() {
                        response.request_focus();
                    }

                    let (enter, command, escape) = ui.input(|input| {
                        (
                            input.key_pressed(Key::Enter),
                            input.modifiers.command || input.modifiers.ctrl,
                            input.key_pressed(Key::Escape),
                        )
                    });
                    let click_away =
                        response.lost_focus() && ui.input(|input| input.pointer.any_released());
                    commit = (enter && command) || click_away;
                    cancel = escape;
                });
        });

    if cancel {
        state.text_edit = None;
        session.cancel_text_edit();
        return;
    }
    if !commit {
        return;
    }
    let Some(edit) = state.text_edit.take() else {
        return;
    };
    match edit.request {
        TextEditRequest::New { at } => {
            session.commit_new_text(at, &edit.buffer);
        }
        TextEditRequest::Existing { id, .. } => {
            session.commit_text_edit(id, &edit.buffer);
        }
    }
}
