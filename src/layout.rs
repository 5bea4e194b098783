//! Per-page floating watermark placement.
//!
//! Page boundaries are only knowable through the word processor, so the page
//! count comes from a `PageCounter`. When no counter is available the module
//! estimates one page per twenty paragraphs and flags the run for manual
//! review.

use serde::{Deserialize, Serialize};

use crate::document::models::{DocumentModel, DrawingNode, EmbeddedImage, ParagraphNode, RunNode};
use crate::transplant::images::emu_to_inches;

/// Paragraphs per page used when no real page count is obtainable.
const PARAGRAPHS_PER_PAGE_ESTIMATE: usize = 20;

/// Fixed placement constants for the confirmation stamp, in EMU.
pub const WATERMARK_OFFSET_EMU: (i32, i32) = (1_731_645, 201_295);
pub const WATERMARK_EXTENT_EMU: (u32, u32) = (2_134_235, 1_280_160);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkOptions {
    /// First page that receives a stamp. Page 1 is the title page.
    pub start_page: usize,
    /// Filename-style label forming the idempotence signature together with
    /// the byte size.
    pub signature_name: String,
    pub offset_emu: (i32, i32),
    pub extent_emu: (u32, u32),
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            start_page: 2,
            signature_name: "confirm_stamp.png".to_string(),
            offset_emu: WATERMARK_OFFSET_EMU,
            extent_emu: WATERMARK_EXTENT_EMU,
        }
    }
}

/// Supplies the current page count of a document model. The automation
/// bridge backs the real implementation; tests use fixed counters.
pub trait PageCounter {
    fn count_pages(&mut self, doc: &DocumentModel) -> Option<usize>;
}

/// What the placement pass did.
#[derive(Debug, Default, Clone)]
pub struct LayoutReport {
    pub inserted: usize,
    pub skipped_existing: usize,
    pub pages_seen: usize,
    pub needs_manual_review: bool,
}

/// Notification documents carry the stamp; anything else is left alone.
pub fn is_notification_document(doc: &DocumentModel) -> bool {
    doc.paragraphs
        .iter()
        .take(5)
        .any(|p| p.text().contains("通报"))
}

/// Paragraph index range belonging to `page`. Pages two and three use fixed
/// ranges calibrated for the template family; later pages split the
/// remainder evenly.
pub fn page_paragraph_range(
    page: usize,
    total_pages: usize,
    paragraph_count: usize,
) -> std::ops::Range<usize> {
    let clamp = |i: usize| i.min(paragraph_count);
    match page {
        2 => clamp(16)..clamp(33),
        3 => clamp(33)..paragraph_count,
        _ => {
            let total = total_pages.max(1);
            let start = page.saturating_sub(1) * paragraph_count / total;
            let end = page * paragraph_count / total;
            clamp(start)..clamp(end)
        }
    }
}

/// Picks the least disruptive insertion index inside `range`: the first
/// short or empty paragraph, else a plain paragraph in the top 20% of the
/// range, else one in the bottom 20%, else the range start.
pub fn find_insertion_point(doc: &DocumentModel, range: &std::ops::Range<usize>) -> usize {
    let paras = &doc.paragraphs;
    let range = range.start.min(paras.len())..range.end.min(paras.len());
    if range.is_empty() {
        return range.start;
    }

    for i in range.clone() {
        if paras[i].text().trim().chars().count() < 10 {
            return i;
        }
    }

    let len = range.end - range.start;
    let slice_len = (len / 5).max(1);
    let plain = |i: usize| paras[i].numbering.is_none() && paras[i].style.is_none();

    if let Some(i) = (range.start..range.start + slice_len).find(|&i| plain(i)) {
        return i;
    }
    if let Some(i) = (range.end - slice_len..range.end).find(|&i| plain(i)) {
        return i;
    }
    range.start
}

fn signature_matches(drawing: &DrawingNode, options: &WatermarkOptions, size: usize) -> bool {
    drawing.description.as_deref() == Some(options.signature_name.as_str())
        && drawing.image.as_ref().is_some_and(|img| img.bytes.len() == size)
}

/// Whether `range` already holds a stamp with the same signature.
fn page_already_stamped(
    doc: &DocumentModel,
    range: &std::ops::Range<usize>,
    options: &WatermarkOptions,
    size: usize,
) -> bool {
    doc.paragraphs[range.start.min(doc.len())..range.end.min(doc.len())]
        .iter()
        .flat_map(|p| &p.runs)
        .flat_map(|r| &r.drawings)
        .any(|d| signature_matches(d, options, size))
}

fn stamp_paragraph(image: &EmbeddedImage, options: &WatermarkOptions) -> ParagraphNode {
    let drawing = DrawingNode {
        relationship_id: None,
        extent_emu: Some(options.extent_emu),
        image: Some(image.clone()),
        floating: true,
        offset_emu: Some(options.offset_emu),
        description: Some(options.signature_name.clone()),
    };
    ParagraphNode {
        runs: vec![RunNode {
            drawings: vec![drawing],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Places one floating stamp per page from `start_page` to the end,
/// re-querying the page count after each insertion and extending the loop
/// over any pages the insertions created.
pub fn apply_watermarks(
    doc: &mut DocumentModel,
    image: &EmbeddedImage,
    options: &WatermarkOptions,
    counter: &mut dyn PageCounter,
) -> LayoutReport {
    let mut report = LayoutReport::default();

    let mut total_pages = match counter.count_pages(doc) {
        Some(n) => n,
        None => {
            report.needs_manual_review = true;
            let estimate = doc.len().div_ceil(PARAGRAPHS_PER_PAGE_ESTIMATE).max(1);
            log::warn!("page count unavailable, estimating {estimate} pages");
            estimate
        }
    };

    // A zero start page from hand-edited settings means "from the first".
    let mut page = options.start_page.max(1);
    while page <= total_pages {
        report.pages_seen += 1;
        let range = page_paragraph_range(page, total_pages, doc.len());

        if page_already_stamped(doc, &range, options, image.bytes.len()) {
            log::debug!("page {page} already stamped, skipping");
            report.skipped_existing += 1;
            page += 1;
            continue;
        }

        let at = find_insertion_point(doc, &range);
        doc.paragraphs.insert(at, stamp_paragraph(image, options));
        report.inserted += 1;
        log::info!(
            "stamp placed on page {page} before paragraph {at} ({:.2}in x {:.2}in)",
            emu_to_inches(options.extent_emu.0),
            emu_to_inches(options.extent_emu.1)
        );

        if !report.needs_manual_review {
            if let Some(n) = counter.count_pages(doc) {
                if n > total_pages {
                    log::debug!("insertion grew the document to {n} pages");
                }
                total_pages = n;
            } else {
                report.needs_manual_review = true;
            }
        }
        page += 1;
    }

    report
}
