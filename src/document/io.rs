//! Package-level I/O: validation and raw access to the OOXML zip container.
//!
//! The document model deliberately stays ignorant of the container format;
//! everything that needs to look inside the zip (validation, relationship
//! resolution, media extraction) lives here.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Validates that the file is a legitimate .docx package.
pub fn validate_docx_file(file_path: &Path) -> Result<()> {
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    if extension != "docx" {
        bail!(
            "Invalid file format. Expected .docx file, got .{}\n\
            Note: reportforge only processes Word .docx files (not .doc, .xlsx, .zip, etc.)",
            extension
        );
    }

    let file = File::open(file_path)
        .with_context(|| format!("cannot open {}", file_path.display()))?;
    let mut archive = ZipArchive::new(file)?;

    if archive.by_name("word/document.xml").is_err() {
        if archive.by_name("xl/workbook.xml").is_ok() {
            bail!(
                "This appears to be an Excel file (.xlsx).\n\
                reportforge only processes Word documents (.docx)."
            );
        }

        bail!(
            "Invalid .docx file: missing word/document.xml\n\
            This file may be corrupted or is not a valid Word document."
        );
    }

    Ok(())
}

static RELATIONSHIP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Relationship\b[^>]*/?>").unwrap());
static REL_ID_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Id="([^"]+)""#).unwrap());
static REL_TARGET_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Target="([^"]+)""#).unwrap());

/// Maps relationship ids (rId NN) to their targets inside the package
/// (e.g. "media/image1.png"), read from word/_rels/document.xml.rels.
pub fn read_relationships(file_path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(file_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut rels_xml = String::new();
    archive
        .by_name("word/_rels/document.xml.rels")
        .context("package has no relationship part")?
        .read_to_string(&mut rels_xml)?;

    let mut map = HashMap::new();
    for tag in RELATIONSHIP_TAG.find_iter(&rels_xml) {
        let tag = tag.as_str();
        // Attribute order is not fixed in the wild, so pull each one out
        // independently.
        if let (Some(id), Some(target)) = (
            REL_ID_ATTR.captures(tag).and_then(|c| c.get(1)),
            REL_TARGET_ATTR.captures(tag).and_then(|c| c.get(1)),
        ) {
            map.insert(id.as_str().to_string(), target.as_str().to_string());
        }
    }

    Ok(map)
}

/// Reads one binary part, given a relationship target relative to word/.
pub fn read_media_part(file_path: &Path, target: &str) -> Result<Vec<u8>> {
    let file = File::open(file_path)?;
    let mut archive = ZipArchive::new(file)?;

    let name = if target.starts_with("word/") {
        target.to_string()
    } else {
        format!("word/{}", target.trim_start_matches('/'))
    };

    let mut bytes = Vec::new();
    archive
        .by_name(&name)
        .with_context(|| format!("missing media part {name}"))?
        .read_to_end(&mut bytes)?;

    if bytes.is_empty() {
        bail!("media part {name} is empty");
    }
    Ok(bytes)
}

/// Lists every entry under word/media/, in archive order.
pub fn list_media_parts(file_path: &Path) -> Result<Vec<String>> {
    let file = File::open(file_path)?;
    let archive = ZipArchive::new(file)?;

    let names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("word/media/"))
        .map(|n| n.to_string())
        .collect();
    Ok(names)
}

/// Best-effort extension for an image payload, sniffed from the magic
/// bytes. Defaults to png when the format is unrecognized.
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::Png) => "png",
        Ok(image::ImageFormat::Gif) => "gif",
        Ok(image::ImageFormat::Bmp) => "bmp",
        Ok(image::ImageFormat::Tiff) => "tiff",
        Ok(image::ImageFormat::WebP) => "webp",
        _ => "png",
    }
}

/// True when the payload decodes as a raster format we can re-embed.
pub fn is_readable_image(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_extension() {
        let err = validate_docx_file(Path::new("report.doc")).unwrap_err();
        assert!(err.to_string().contains("Expected .docx"));
    }

    #[test]
    fn relationship_regex_tolerates_attribute_order() {
        let xml = r#"<Relationships>
            <Relationship Id="rId3" Type="t" Target="media/image1.png"/>
            <Relationship Target="media/image2.jpg" Id="rId4"/>
        </Relationships>"#;

        let mut map = HashMap::new();
        for tag in RELATIONSHIP_TAG.find_iter(xml) {
            let tag = tag.as_str();
            let id = REL_ID_ATTR.captures(tag).unwrap()[1].to_string();
            let target = REL_TARGET_ATTR.captures(tag).unwrap()[1].to_string();
            map.insert(id, target);
        }

        assert_eq!(map["rId3"], "media/image1.png");
        assert_eq!(map["rId4"], "media/image2.jpg");
    }

    #[test]
    fn sniffs_png_and_jpeg_headers() {
        assert_eq!(
            sniff_image_extension(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]),
            "png"
        );
        assert_eq!(sniff_image_extension(&[0xff, 0xd8, 0xff, 0xe0]), "jpg");
    }
}
