use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use image::{ImageFormat, RgbaImage};
use tiny_skia::Transform;

use crate::annotation::Annotation;
use crate::error::{RenderError, RenderResult};
use crate::export::{self, ExportOptions};
use crate::filters::ImageFilters;
use crate::render::text::FontBook;
use crate::render::{self, RenderContext, SourceImage};

/// Bakes `annotations` into a full-resolution copy of `source`.
pub fn flatten(
    source: &SourceImage,
    annotations: &[Annotation],
    filters: &dyn ImageFilters,
    fonts: &FontBook,
    pen_tolerance: f32,
) -> RenderResult<RgbaImage> {
    let mut pixmap = source.pixmap().clone();
    let mut ctx = RenderContext {
        source,
        filters,
        fonts,
        transform: Transform::identity(),
        pen_tolerance,
        cache: None,
    };
    render::render_all(&mut pixmap, annotations, &mut ctx);
    render::pixmap_to_rgba(&pixmap)
}

pub fn encode_png(image: &RgbaImage) -> RenderResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Everything a background flatten reads. Nothing here is shared mutably
/// with the editor, so pointer input can continue while it runs.
#[derive(Clone)]
pub struct FlattenJob {
    pub source: Arc<SourceImage>,
    pub annotations: Arc<[Annotation]>,
    pub filters: Arc<dyn ImageFilters>,
    pub fonts: FontBook,
    pub pen_tolerance: f32,
    pub export: ExportOptions,
}

impl FlattenJob {
    pub fn run(&self) -> RenderResult<RgbaImage> {
        let flattened = flatten(
            &self.source,
            &self.annotations,
            self.filters.as_ref(),
            &self.fonts,
            self.pen_tolerance,
        )?;
        if self.export.is_plain() {
            return Ok(flattened);
        }
        export::compose(&flattened, &self.export)
    }
}

struct Pending {
    result_rx: Receiver<RenderResult<RgbaImage>>,
    _worker: thread::JoinHandle<()>,
}

/// Runs at most one flatten at a time on a helper thread.
#[derive(Default)]
pub struct FlattenWorker {
    pending: Option<Pending>,
}

impl FlattenWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn start(&mut self, job: FlattenJob) -> RenderResult<()> {
        if self.pending.is_some() {
            return Err(RenderError::FlattenBusy);
        }
        let (result_tx, result_rx) = mpsc::channel();
        let count = job.annotations.len();
        let worker = thread::Builder::new()
            .name("flatten".to_string())
            .spawn(move || {
                let result = job.run();
                // The receiver may be gone if the editor closed meanwhile.
                let _ = result_tx.send(result);
            })
            .map_err(RenderError::Spawn)?;
        log::debug!("flatten started for {count} annotations");
        self.pending = Some(Pending {
            result_rx,
            _worker: worker,
        });
        Ok(())
    }

    /// Non-blocking check for a finished flatten.
    pub fn poll(&mut self) -> Option<RenderResult<RgbaImage>> {
        let pending = self.pending.as_ref()?;
        let result = match pending.result_rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(RenderError::WorkerGone),
        };
        self.pending = None;
        Some(Self::finish(result))
    }

    /// Blocks until the outstanding flatten, if any, completes.
    pub fn wait(&mut self) -> Option<RenderResult<RgbaImage>> {
        let pending = self.pending.take()?;
        let result = pending
            .result_rx
            .recv()
            .unwrap_or(Err(RenderError::WorkerGone));
        Some(Self::finish(result))
    }

    fn finish(result: RenderResult<RgbaImage>) -> RenderResult<RgbaImage> {
        match &result {
            Ok(image) => log::info!("flatten finished ({}x{})", image.width(), image.height()),
            Err(err) => log::error!("flatten failed: {err}"),
        }
        result
    }
}

impl std::fmt::Debug for FlattenWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlattenWorker")
            .field("busy", &self.is_busy())
            .finish()
    }
}
