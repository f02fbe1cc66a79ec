//! Screenshot annotation engine: a vector document over a raster image,
//! with undo, pointer interaction, and one renderer shared by the live
//! overlay and the flattened export.

pub mod annotation;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod filters;
pub mod flatten;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod render;
pub mod session;
pub mod snapping;
pub mod transform;

pub use annotation::{Annotation, AnnotationId, AnnotationKind, Style, Tool};
pub use config::EditorConfig;
pub use document::Document;
pub use error::{RenderError, RenderResult};
pub use session::Session;
