//! Post-write integrity validation.
//!
//! A save only counts once the file on disk reopens as a document with
//! plausible content. Two threshold sets exist: the normal one for
//! direct/repaired saves and a looser one for the minimal fallback document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::loader;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegrityThresholds {
    pub min_bytes: u64,
    pub min_paragraphs: usize,
    pub min_content_paragraphs: usize,
}

impl IntegrityThresholds {
    pub const NORMAL: Self = Self {
        min_bytes: 10 * 1024,
        min_paragraphs: 5,
        min_content_paragraphs: 3,
    };

    pub const FALLBACK: Self = Self {
        min_bytes: 5 * 1024,
        min_paragraphs: 2,
        min_content_paragraphs: 2,
    };
}

/// Computed by reopening the just-written file. Never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub file_exists: bool,
    pub size_ok: bool,
    pub readable: bool,
    pub paragraph_count: usize,
    pub content_paragraph_count: usize,
    pub error: Option<String>,
}

impl IntegrityReport {
    pub fn is_valid(&self, thresholds: &IntegrityThresholds) -> bool {
        self.file_exists
            && self.size_ok
            && self.readable
            && self.paragraph_count >= thresholds.min_paragraphs
            && self.content_paragraph_count >= thresholds.min_content_paragraphs
    }
}

/// Reopens `path` and measures it against `thresholds`. Every failure mode
/// lands in the report; this function itself never fails.
pub fn validate(path: &Path, thresholds: &IntegrityThresholds) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            report.error = Some(format!("missing file: {err}"));
            return report;
        }
    };
    report.file_exists = true;
    report.size_ok = metadata.len() >= thresholds.min_bytes;
    if !report.size_ok {
        report.error = Some(format!(
            "file is {} bytes, below the {} byte floor",
            metadata.len(),
            thresholds.min_bytes
        ));
    }

    match loader::load_document(path) {
        Ok(doc) => {
            report.readable = true;
            report.paragraph_count = doc.len();
            report.content_paragraph_count = doc.content_paragraph_count();
        }
        Err(err) => {
            report.error = Some(format!("reopen failed: {err}"));
        }
    }

    report
}
