//! Embedded-image recovery for transplanted drawings.
//!
//! Copied drawing nodes reference binary parts of the *source* package, so
//! they must be re-embedded with actual bytes before the merged document is
//! written. Three strategies run in strict order, stopping at the first that
//! yields a readable image; total failure downgrades the drawing rather than
//! failing the transplant.

use std::path::Path;

use anyhow::Result;

use crate::document::io;
use crate::document::models::{DocumentModel, DrawingNode, EmbeddedImage, EMU_PER_INCH};

/// Last-resort image extraction through the external word processor. The
/// automation bridge implements this; tests stub it.
pub trait ImageRescue {
    /// Extracts the first inline image of `source` to a raster file and
    /// returns its bytes.
    fn rescue_first_image(&self, source: &Path) -> Result<Vec<u8>>;
}

/// Converts drawing extent metadata to print units.
pub fn emu_to_inches(emu: u32) -> f64 {
    emu as f64 / EMU_PER_INCH as f64
}

/// Resolves every unresolved drawing in `doc` against the package at
/// `source_path`. Returns the number of drawings that could not be
/// recovered by any strategy.
pub fn resolve_images(
    doc: &mut DocumentModel,
    source_path: &Path,
    rescue: Option<&dyn ImageRescue>,
) -> usize {
    let relationships = io::read_relationships(source_path).unwrap_or_else(|err| {
        log::warn!("relationship table unavailable for {}: {err}", source_path.display());
        Default::default()
    });

    let mut failures = 0usize;
    for para in &mut doc.paragraphs {
        for run in &mut para.runs {
            for drawing in &mut run.drawings {
                if drawing.is_resolved() {
                    continue;
                }
                match resolve_one(drawing, source_path, &relationships, rescue) {
                    Some(image) => drawing.image = Some(image),
                    None => {
                        failures += 1;
                        log::warn!(
                            "image unrecoverable (rel id {:?}) in {}",
                            drawing.relationship_id,
                            source_path.display()
                        );
                    }
                }
            }
        }
    }
    failures
}

fn resolve_one(
    drawing: &DrawingNode,
    source_path: &Path,
    relationships: &std::collections::HashMap<String, String>,
    rescue: Option<&dyn ImageRescue>,
) -> Option<EmbeddedImage> {
    // 1. Direct relationship lookup.
    if let Some(rel_id) = &drawing.relationship_id {
        if let Some(target) = relationships.get(rel_id) {
            match io::read_media_part(source_path, target) {
                Ok(bytes) if io::is_readable_image(&bytes) => {
                    return Some(embed(bytes));
                }
                Ok(_) => log::debug!("part {target} is not a decodable image"),
                Err(err) => log::debug!("part {target} unreadable: {err}"),
            }
        }
    }

    // 2. Scan the media directory for any readable image.
    if let Ok(parts) = io::list_media_parts(source_path) {
        for part in parts {
            if let Ok(bytes) = io::read_media_part(source_path, &part) {
                if io::is_readable_image(&bytes) {
                    log::debug!("recovered image from media scan: {part}");
                    return Some(embed(bytes));
                }
            }
        }
    }

    // 3. Ask the external application to extract it.
    if let Some(rescue) = rescue {
        match rescue.rescue_first_image(source_path) {
            Ok(bytes) if io::is_readable_image(&bytes) => {
                log::info!("image rescued via external application");
                return Some(embed(bytes));
            }
            Ok(_) => log::debug!("rescued bytes are not a decodable image"),
            Err(err) => log::debug!("external image rescue failed: {err}"),
        }
    }

    None
}

fn embed(bytes: Vec<u8>) -> EmbeddedImage {
    let ext = io::sniff_image_extension(&bytes);
    EmbeddedImage {
        bytes,
        ext: ext.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emu_conversion_matches_office_units() {
        assert_eq!(emu_to_inches(914_400), 1.0);
        assert!((emu_to_inches(457_200) - 0.5).abs() < f64::EPSILON);
    }

    struct FixedRescue(Vec<u8>);

    impl ImageRescue for FixedRescue {
        fn rescue_first_image(&self, _source: &Path) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    // Single-pixel PNG, enough for the image crate to decode.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
        0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
        0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x8E, 0xB1, 0x13,
        0x9A, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn rescue_is_the_last_resort() {
        let mut doc = DocumentModel::new();
        let mut para = crate::document::models::ParagraphNode::default();
        para.runs.push(crate::document::models::RunNode {
            drawings: vec![DrawingNode {
                relationship_id: Some("rId9".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        doc.paragraphs.push(para);

        // No package on disk, so tiers 1 and 2 fail and the stub serves.
        let rescue = FixedRescue(TINY_PNG.to_vec());
        let failures = resolve_images(&mut doc, Path::new("/nonexistent/source.docx"), Some(&rescue));

        assert_eq!(failures, 0);
        let drawing = &doc.paragraphs[0].runs[0].drawings[0];
        assert!(drawing.is_resolved());
        assert_eq!(drawing.image.as_ref().unwrap().ext, "png");
    }

    #[test]
    fn total_failure_is_counted_not_fatal() {
        let mut doc = DocumentModel::new();
        let mut para = crate::document::models::ParagraphNode::default();
        para.runs.push(crate::document::models::RunNode {
            drawings: vec![DrawingNode::default()],
            ..Default::default()
        });
        doc.paragraphs.push(para);

        let failures = resolve_images(&mut doc, Path::new("/nonexistent/source.docx"), None);
        assert_eq!(failures, 1);
        assert!(!doc.paragraphs[0].runs[0].drawings[0].is_resolved());
    }
}
