//! Document writing: `DocumentModel` -> .docx bytes
//!
//! The inverse of the loader, built on the docx-rs builder API. Paragraph
//! borders are intentionally never emitted; the transplantation rules strip
//! them from copied content anyway.

use anyhow::{bail, Result};
use std::io::Cursor;
use std::path::Path;

use super::io::is_readable_image;
use super::models::*;

/// Serializes the model into an in-memory .docx package.
pub fn write_document(model: &DocumentModel) -> Result<Vec<u8>> {
    let mut docx = docx_rs::Docx::new();

    for para in &model.paragraphs {
        // docx-rs panics on image bytes it cannot decode, so reject them
        // here and let the save ladder fall back to a text-only rebuild.
        for drawing in para.runs.iter().flat_map(|r| &r.drawings) {
            if let Some(img) = &drawing.image {
                if !is_readable_image(&img.bytes) {
                    bail!("embedded image does not decode ({} bytes)", img.bytes.len());
                }
            }
        }
        docx = docx.add_paragraph(build_paragraph(para));
    }

    let mut buf = Cursor::new(Vec::new());
    docx.build().pack(&mut buf)?;
    Ok(buf.into_inner())
}

/// Serializes the model and writes it to `path` in one shot. Callers that
/// need atomicity go through the persistence subsystem instead.
pub fn write_document_to_path(model: &DocumentModel, path: &Path) -> Result<()> {
    let bytes = write_document(model)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn build_paragraph(para: &ParagraphNode) -> docx_rs::Paragraph {
    let mut p = docx_rs::Paragraph::new();

    if let Some(style) = &para.style {
        p = p.style(style);
    }
    p = p.align(map_alignment(para.alignment));

    if let Some(numbering) = para.numbering {
        p = p.numbering(
            docx_rs::NumberingId::new(numbering.num_id.max(0) as usize),
            docx_rs::IndentLevel::new(numbering.level as usize),
        );
    }

    for run in &para.runs {
        if !run.text.is_empty() || run.drawings.iter().any(DrawingNode::is_resolved) {
            p = p.add_run(build_run(run));
        }
    }

    p
}

fn build_run(run: &RunNode) -> docx_rs::Run {
    let mut r = docx_rs::Run::new();

    let f = &run.formatting;
    if f.bold {
        r = r.bold();
    }
    if f.italic {
        r = r.italic();
    }
    if f.underline {
        r = r.underline("single");
    }
    if f.strikethrough {
        r = r.strike();
    }
    if let Some(size) = f.font_size {
        // docx sizes are half-points
        r = r.size((size * 2.0) as usize);
    }
    if let Some(color) = &f.color {
        r = r.color(color.clone());
    }

    for (i, line) in run.text.split('\n').enumerate() {
        if i > 0 {
            r = r.add_break(docx_rs::BreakType::TextWrapping);
        }
        if !line.is_empty() {
            r = r.add_text(line);
        }
    }

    for drawing in &run.drawings {
        let Some(img) = &drawing.image else {
            // Unresolved reference: nothing to embed, reported upstream by
            // the transplant engine.
            log::debug!("skipping unresolved drawing ({:?})", drawing.relationship_id);
            continue;
        };

        let mut pic = docx_rs::Pic::new(&img.bytes);
        if let Some((cx, cy)) = drawing.extent_emu {
            pic = pic.size(cx, cy);
        }
        if drawing.floating {
            pic = pic.floating();
            if let Some((x, y)) = drawing.offset_emu {
                pic = pic.offset_x(x).offset_y(y);
            }
        }
        r = r.add_image(pic);
    }

    r
}

fn map_alignment(alignment: TextAlignment) -> docx_rs::AlignmentType {
    match alignment {
        TextAlignment::Left => docx_rs::AlignmentType::Left,
        TextAlignment::Center => docx_rs::AlignmentType::Center,
        TextAlignment::Right => docx_rs::AlignmentType::Right,
        TextAlignment::Justify => docx_rs::AlignmentType::Both,
    }
}
