//! Conversion operations on top of the bridge: PDF export, page counting,
//! and last-resort image extraction.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{AutomationBridge, BridgeError};
use crate::document::io;
use crate::transplant::images::ImageRescue;

impl AutomationBridge {
    /// Exports `docx` to a PDF in `out_dir`, returning the PDF path. Paths
    /// over the platform ceiling are detoured through a temp directory. A
    /// watchdog timeout triggers one save-as-style retry with an explicit
    /// export filter before the whole export fails.
    pub fn convert_to_pdf(&self, docx: &Path, out_dir: &Path) -> Result<PathBuf, BridgeError> {
        let detour = self.path_detour(docx)?;
        let (work_input, work_outdir) = match &detour {
            Some(d) => (d.input.clone(), d.dir.path().to_path_buf()),
            None => (docx.to_path_buf(), out_dir.to_path_buf()),
        };

        let result = self.export(&work_input, &work_outdir, "pdf").or_else(|err| {
            log::warn!("standard export failed ({err}), retrying with explicit filter");
            self.export(&work_input, &work_outdir, "pdf:writer_pdf_Export")
        })?;

        if detour.is_some() {
            let final_path = copy_back_target(docx, out_dir, &result);
            std::fs::copy(&result, &final_path)
                .map_err(|err| BridgeError::ExportFailed(format!("copy-back failed: {err}")))?;
            return Ok(final_path);
        }
        Ok(result)
    }

    /// Saves a throwaway copy, exports it, and counts the page objects of
    /// the resulting PDF.
    pub fn page_count(&self, docx: &Path) -> Result<usize, BridgeError> {
        let scratch = tempfile::tempdir()
            .map_err(|err| BridgeError::ExportFailed(err.to_string()))?;
        let copy = scratch.path().join("pagecount.docx");
        std::fs::copy(docx, &copy)
            .map_err(|err| BridgeError::ExportFailed(format!("scratch copy failed: {err}")))?;

        let pdf = self.export(&copy, scratch.path(), "pdf")?;
        let bytes = std::fs::read(&pdf)
            .map_err(|err| BridgeError::ExportFailed(format!("pdf unreadable: {err}")))?;
        let pages = count_pdf_pages(&bytes);
        if pages == 0 {
            return Err(BridgeError::ExportFailed("pdf contains no pages".into()));
        }
        Ok(pages)
    }

    fn export(&self, input: &Path, out_dir: &Path, filter: &str) -> Result<PathBuf, BridgeError> {
        let input_str = input.to_string_lossy();
        let outdir_str = out_dir.to_string_lossy();
        self.run_with_profiles(
            input,
            &["--convert-to", filter, "--outdir", &outdir_str, &input_str],
        )?;

        let ext = filter.split(':').next().unwrap_or(filter);
        let produced = out_dir
            .join(input.file_stem().unwrap_or_default())
            .with_extension(ext);
        if produced.exists() {
            Ok(produced)
        } else {
            Err(BridgeError::ExportFailed(format!(
                "converter exited cleanly but {} is missing",
                produced.display()
            )))
        }
    }

    /// When the input path exceeds the ceiling, stages it under a short
    /// temp name for the duration of the conversion.
    fn path_detour(&self, docx: &Path) -> Result<Option<PathDetour>, BridgeError> {
        if docx.as_os_str().len() <= self.config().path_ceiling {
            return Ok(None);
        }
        log::info!("path over {} chars, detouring via temp dir", self.config().path_ceiling);
        let dir = tempfile::tempdir()
            .map_err(|err| BridgeError::ExportFailed(err.to_string()))?;
        let input = dir.path().join("input.docx");
        std::fs::copy(docx, &input)
            .map_err(|err| BridgeError::ExportFailed(format!("detour copy failed: {err}")))?;
        Ok(Some(PathDetour { dir, input }))
    }
}

struct PathDetour {
    dir: tempfile::TempDir,
    input: PathBuf,
}

/// Final location for a detoured conversion: the intended output directory
/// with the original document's stem, not the staged temp name.
fn copy_back_target(original: &Path, out_dir: &Path, produced: &Path) -> PathBuf {
    let ext = produced.extension().and_then(|e| e.to_str()).unwrap_or("pdf");
    out_dir
        .join(original.file_stem().unwrap_or_default())
        .with_extension(ext)
}

impl ImageRescue for AutomationBridge {
    /// Converts the source to HTML, which materializes embedded pictures as
    /// sibling raster files, and returns the first readable one.
    fn rescue_first_image(&self, source: &Path) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        self.export(source, scratch.path(), "html")
            .map_err(|err| anyhow::anyhow!("html export failed: {err}"))?;

        let mut entries: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png" | "jpg" | "jpeg" | "gif" | "bmp")
                )
            })
            .collect();
        entries.sort();

        for path in entries {
            let bytes = std::fs::read(&path)?;
            if io::is_readable_image(&bytes) {
                return Ok(bytes);
            }
        }
        anyhow::bail!("html export produced no readable image")
    }
}

/// Counts page objects in a PDF byte stream: `/Type /Page` entries, not the
/// `/Type /Pages` tree nodes.
pub fn count_pdf_pages(bytes: &[u8]) -> usize {
    const TYPE_KEY: &[u8] = b"/Type";
    const PAGE: &[u8] = b"/Page";

    let mut count = 0usize;
    let mut i = 0usize;
    while i + TYPE_KEY.len() < bytes.len() {
        if &bytes[i..i + TYPE_KEY.len()] != TYPE_KEY {
            i += 1;
            continue;
        }
        let mut j = i + TYPE_KEY.len();
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes[j..].starts_with(PAGE) {
            let after = bytes.get(j + PAGE.len());
            // 's' means /Pages; any other delimiter ends the name.
            if after != Some(&b's') {
                count += 1;
            }
        }
        i += TYPE_KEY.len();
    }
    count
}
