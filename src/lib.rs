//! reportforge: rebuilds incident-notification .docx files from a template.
//!
//! The library transplants the body of a source notification into the
//! official template, normalizes heading numbers and authority names,
//! commits the result through a tiered save pipeline with backups, and can
//! drive a headless word processor for PDF export and page-aware stamp
//! placement.

pub mod bridge;
pub mod config;
pub mod document;
pub mod layout;
pub mod persist;
pub mod pipeline;
pub mod transplant;

pub use config::Settings;
pub use document::models::DocumentModel;
pub use persist::{SaveAttemptResult, SaveMethod};
pub use pipeline::{Pipeline, RewriteOutcome, RewriteRequest};
pub use transplant::TransplantRange;
