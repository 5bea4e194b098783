//! Document loading: .docx package -> `DocumentModel`
//!
//! Parsing goes through docx-rs; only the pieces the rewrite pipeline needs
//! survive into the model (run text + formatting, paragraph style and
//! alignment, automatic numbering, embedded drawings, link markers).

use anyhow::Result;
use std::path::Path;

use super::io::validate_docx_file;
use super::models::*;

/// Loads a .docx file into the typed node tree.
pub fn load_document(file_path: &Path) -> Result<DocumentModel> {
    validate_docx_file(file_path)?;

    let file_data = std::fs::read(file_path)?;
    let mut model = load_document_from_bytes(&file_data)?;
    model.source_path = Some(file_path.to_path_buf());
    Ok(model)
}

/// Loads a .docx byte buffer into the typed node tree. The resulting model
/// has no `source_path`, so the zip-based image fallbacks are unavailable.
pub fn load_document_from_bytes(data: &[u8]) -> Result<DocumentModel> {
    let docx = docx_rs::read_docx(data)?;

    let mut model = DocumentModel::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(para) = child {
            model.paragraphs.push(convert_paragraph(para));
        }
    }
    Ok(model)
}

fn convert_paragraph(para: &docx_rs::Paragraph) -> ParagraphNode {
    let mut node = ParagraphNode {
        style: para.property.style.as_ref().map(|s| s.val.clone()),
        alignment: para
            .property
            .alignment
            .as_ref()
            .map(|j| parse_alignment(&j.val))
            .unwrap_or_default(),
        numbering: extract_numbering(&para.property),
        ..Default::default()
    };

    collect_runs(&para.children, false, &mut node.runs);
    node
}

/// Walks paragraph children, flattening hyperlink wrappers into their runs
/// while remembering that those runs must not be edited.
fn collect_runs(children: &[docx_rs::ParagraphChild], in_hyperlink: bool, out: &mut Vec<RunNode>) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                out.push(convert_run(run, in_hyperlink));
            }
            docx_rs::ParagraphChild::Hyperlink(link) => {
                collect_runs(&link.children, true, out);
            }
            docx_rs::ParagraphChild::Insert(insert) => {
                // Accepted tracked insertions count as regular content.
                for ic in &insert.children {
                    if let docx_rs::InsertChild::Run(run) = ic {
                        out.push(convert_run(run, in_hyperlink));
                    }
                }
            }
            docx_rs::ParagraphChild::Delete(_) => {
                // Skip deletions (track changes).
            }
            _ => {}
        }
    }
}

fn convert_run(run: &docx_rs::Run, in_hyperlink: bool) -> RunNode {
    let mut node = RunNode {
        formatting: extract_run_formatting(run),
        hyperlink: in_hyperlink,
        ..Default::default()
    };

    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(text_elem) => {
                node.text.push_str(&text_elem.text);
            }
            docx_rs::RunChild::Tab(_) => {
                node.text.push('\t');
            }
            docx_rs::RunChild::Break(_) => {
                node.text.push('\n');
            }
            docx_rs::RunChild::Drawing(drawing) => {
                if let Some(d) = convert_drawing(drawing) {
                    node.drawings.push(d);
                }
            }
            docx_rs::RunChild::FieldChar(_) => {
                node.field_code = true;
            }
            docx_rs::RunChild::InstrText(_) => {
                node.field_code = true;
            }
            _ => {}
        }
    }

    node
}

fn convert_drawing(drawing: &docx_rs::Drawing) -> Option<DrawingNode> {
    let docx_rs::DrawingData::Pic(pic) = drawing.data.as_ref()? else {
        return None;
    };

    Some(DrawingNode {
        relationship_id: (!pic.id.is_empty()).then(|| pic.id.clone()),
        extent_emu: (pic.size.0 > 0 && pic.size.1 > 0).then_some((pic.size.0, pic.size.1)),
        image: None,
        floating: false,
        offset_emu: None,
        description: None,
    })
}

/// Extract formatting information from a run.
pub(crate) fn extract_run_formatting(run: &docx_rs::Run) -> TextFormatting {
    let mut formatting = TextFormatting::default();

    let props = &run.run_property;
    formatting.bold = props.bold.is_some();
    formatting.italic = props.italic.is_some();
    formatting.underline = props.underline.is_some();
    formatting.strikethrough = props.strike.is_some() || props.dstrike.is_some();

    // Extract color through debug formatting as a workaround for private
    // field access in docx-rs.
    if let Some(color) = &props.color {
        let color_debug = format!("{color:?}");
        if let Some(start) = color_debug.find("val: \"") {
            let search_from = start + 6; // length of "val: \""
            if let Some(end) = color_debug[search_from..].find("\"") {
                let color_val = &color_debug[search_from..search_from + end];
                formatting.color = Some(color_val.to_string());
            }
        }
    }

    formatting
}

fn extract_numbering(property: &docx_rs::ParagraphProperty) -> Option<AutoNumbering> {
    let num_pr = property.numbering_property.as_ref()?;
    let num_id = num_pr.id.as_ref()?.id as i32;
    let level = num_pr.level.as_ref().map(|l| l.val as u8).unwrap_or(0);
    Some(AutoNumbering { num_id, level })
}

fn parse_alignment(val: &str) -> TextAlignment {
    match val {
        "center" => TextAlignment::Center,
        "right" | "end" => TextAlignment::Right,
        "both" | "justify" | "distribute" => TextAlignment::Justify,
        _ => TextAlignment::Left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_strings_map_to_variants() {
        assert_eq!(parse_alignment("center"), TextAlignment::Center);
        assert_eq!(parse_alignment("both"), TextAlignment::Justify);
        assert_eq!(parse_alignment("start"), TextAlignment::Left);
        assert_eq!(parse_alignment("end"), TextAlignment::Right);
    }
}
