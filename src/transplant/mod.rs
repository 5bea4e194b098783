//! Content transplantation: copying a paragraph range from a source
//! notification into a template at its insertion marker.

pub mod images;
pub mod numbering;
pub mod substitute;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::models::{DocumentModel, ParagraphNode};

/// A template paragraph containing this glyph marks where the source
/// content is spliced in.
pub const INSERTION_MARKER: &str = "*";

#[derive(Error, Debug)]
pub enum TransplantError {
    #[error("template has no '{INSERTION_MARKER}' insertion marker paragraph")]
    MarkerNotFound,
    #[error("paragraph range {start}..{end} does not fit a document of {len} paragraphs")]
    InvalidRange { start: i64, end: i64, len: usize },
}

/// Which source paragraphs to copy, in author-facing 1-based half-open
/// numbering. A negative `end` counts back from the tail: `-1` names the
/// second-to-last paragraph, which as the exclusive bound leaves the last
/// two paragraphs behind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransplantRange {
    pub start: i64,
    pub end: i64,
}

impl Default for TransplantRange {
    fn default() -> Self {
        // Skip the source letterhead and trailing signature block.
        Self { start: 3, end: -1 }
    }
}

impl TransplantRange {
    /// Resolves to a 0-based half-open index range over `len` paragraphs.
    pub fn resolve(&self, len: usize) -> Result<std::ops::Range<usize>, TransplantError> {
        let invalid = || TransplantError::InvalidRange {
            start: self.start,
            end: self.end,
            len,
        };

        if self.start < 1 {
            return Err(invalid());
        }
        let start = (self.start - 1) as usize;

        // Normalize to a 1-based exclusive bound, then shift to 0-based.
        let end_1based = if self.end < 0 {
            len as i64 + self.end
        } else {
            self.end.min(len as i64 + 1)
        };
        if end_1based < 1 {
            return Err(invalid());
        }
        let end = (end_1based - 1) as usize;

        if start >= end || start >= len {
            return Err(invalid());
        }
        Ok(start..end)
    }
}

/// What the copy pass did, for the pipeline's outcome report.
#[derive(Debug, Default, Clone)]
pub struct TransplantReport {
    pub copied: usize,
    pub image_failures: usize,
    pub substitution_skips: usize,
    pub renumbered: usize,
}

/// Finds the first paragraph of `template` containing the marker glyph,
/// if any.
pub fn locate_marker(template: &DocumentModel) -> Option<usize> {
    template
        .paragraphs
        .iter()
        .position(|p| p.text().contains(INSERTION_MARKER))
}

/// Copies `range` of `source` into `template` in place of its insertion
/// marker. Paragraph text, run formatting, drawings, styles, alignment, and
/// numbering references all travel with the copy; the marker paragraph
/// itself is removed.
pub fn transplant(
    template: &mut DocumentModel,
    source: &DocumentModel,
    range: TransplantRange,
) -> Result<TransplantReport, TransplantError> {
    let marker = locate_marker(template).ok_or(TransplantError::MarkerNotFound)?;
    let span = range.resolve(source.len())?;

    let copies: Vec<ParagraphNode> = source.paragraphs[span].to_vec();
    let copied = copies.len();
    log::info!(
        "transplanting {} paragraphs at template position {}",
        copied,
        marker + 1
    );

    template.paragraphs.splice(marker..=marker, copies);

    Ok(TransplantReport {
        copied,
        ..Default::default()
    })
}
