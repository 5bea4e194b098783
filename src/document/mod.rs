//! Document model, package inspection, and .docx load/store.

pub mod io;
pub mod loader;
pub mod models;
pub mod writer;

pub use loader::{load_document, load_document_from_bytes};
pub use models::{
    AutoNumbering, DocumentModel, DrawingNode, EmbeddedImage, ParagraphNode, RunNode,
    TextAlignment, TextFormatting,
};
pub use writer::{write_document, write_document_to_path};
