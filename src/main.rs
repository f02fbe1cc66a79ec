mod app;
mod canvas;
mod clipboard;
mod toolbar;

use std::path::PathBuf;

use eframe::egui;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let initial = std::env::args_os().nth(1).map(PathBuf::from);

    let viewport = egui::ViewportBuilder::default()
        .with_title("Shotmark")
        .with_inner_size([1080.0, 760.0])
        .with_min_inner_size([640.0, 480.0]);

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Shotmark",
        options,
        Box::new(|cc| Box::new(app::ShotmarkApp::new(cc, initial))),
    )
}
