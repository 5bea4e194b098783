//! Core data structures for document representation
//!
//! This module defines the typed node tree used throughout the rewrite
//! pipeline: a document is a flat list of paragraphs, each paragraph an
//! ordered list of styled runs, each run optionally carrying embedded
//! drawings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// EMU (English Metric Units) per inch, the unit OOXML uses for extents.
pub const EMU_PER_INCH: u32 = 914_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentModel {
    pub paragraphs: Vec<ParagraphNode>,
    /// Path of the package this model was loaded from, if any. Needed by
    /// the image fallback chain to reopen the zip container.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl DocumentModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Number of paragraphs with at least one non-whitespace character.
    pub fn content_paragraph_count(&self) -> usize {
        self.paragraphs.iter().filter(|p| !p.is_blank()).count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParagraphNode {
    pub runs: Vec<RunNode>,
    /// Paragraph style id (e.g. "Heading1"), when the source declared one.
    pub style: Option<String>,
    pub alignment: TextAlignment,
    /// Word automatic-numbering reference (w:numPr), if present.
    pub numbering: Option<AutoNumbering>,
}

impl ParagraphNode {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            runs: vec![RunNode::text(text)],
            ..Self::default()
        }
    }

    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }

    pub fn has_drawings(&self) -> bool {
        self.runs.iter().any(|r| !r.drawings.is_empty())
    }

    /// Collapse the paragraph to a single run carrying `text`, keeping the
    /// first run's formatting. Drawings survive the collapse.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let formatting = self
            .runs
            .first()
            .map(|r| r.formatting.clone())
            .unwrap_or_default();
        let drawings: Vec<DrawingNode> = self
            .runs
            .drain(..)
            .flat_map(|r| r.drawings.into_iter())
            .collect();
        self.runs.push(RunNode {
            text: text.into(),
            formatting,
            drawings,
            hyperlink: false,
            field_code: false,
        });
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunNode {
    pub text: String,
    pub formatting: TextFormatting,
    pub drawings: Vec<DrawingNode>,
    /// The run sits inside a w:hyperlink wrapper.
    pub hyperlink: bool,
    /// The run carries field characters or instruction text (w:fldChar /
    /// w:instrText), the other shape hyperlinks take.
    pub field_code: bool,
}

impl RunNode {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when touching this run's text risks corrupting a link.
    pub fn carries_link(&self) -> bool {
        self.hyperlink || self.field_code
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextFormatting {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub font_size: Option<f32>,
    pub color: Option<String>,
}

/// Word automatic-numbering reference: numbering definition id + level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoNumbering {
    pub num_id: i32,
    pub level: u8,
}

/// An embedded drawing. Freshly loaded documents only know the relationship
/// id and extent; the image fallback chain fills in `image` so the writer
/// can re-embed the bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawingNode {
    /// r:embed relationship id into the source package, when resolvable.
    pub relationship_id: Option<String>,
    /// (cx, cy) extent in EMU from the original drawing, when present.
    pub extent_emu: Option<(u32, u32)>,
    /// Resolved image payload, once a fallback strategy succeeded.
    pub image: Option<EmbeddedImage>,
    /// Anchored (floating) rather than inline layout.
    pub floating: bool,
    /// (x, y) anchor offset in EMU for floating drawings.
    pub offset_emu: Option<(i32, i32)>,
    /// Free-form label, used by the watermark idempotence guard.
    pub description: Option<String>,
}

impl DrawingNode {
    pub fn is_resolved(&self) -> bool {
        self.image.is_some()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    /// Extension without the dot ("png", "jpg", ...).
    pub ext: String,
}

impl std::fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("bytes", &self.bytes.len())
            .field("ext", &self.ext)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}
