//! Resilient persistence: direct save, repair save, fallback save.
//!
//! `save` is the only entry point and never panics or propagates an error
//! past its boundary; every outcome, including total failure with backup
//! restore, comes back as a `SaveAttemptResult`.

pub mod backup;
pub mod integrity;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::document::models::{DocumentModel, ParagraphNode, TextAlignment};
use crate::document::writer;
use backup::BackupHandle;
use integrity::{IntegrityReport, IntegrityThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveMethod {
    Direct,
    Repaired,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub direct_retries: usize,
    pub retry_delay: Duration,
    pub keep_backups: usize,
    /// Title for the minimal fallback document.
    pub fallback_title: String,
    pub thresholds: IntegrityThresholds,
    pub fallback_thresholds: IntegrityThresholds,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            direct_retries: 3,
            retry_delay: Duration::from_millis(500),
            keep_backups: 2,
            fallback_title: "网络安全漏洞通报".to_string(),
            thresholds: IntegrityThresholds::NORMAL,
            fallback_thresholds: IntegrityThresholds::FALLBACK,
        }
    }
}

/// Terminal state of one `save` call.
#[derive(Debug, Clone)]
pub struct SaveAttemptResult {
    pub succeeded: bool,
    pub method: SaveMethod,
    pub validation: IntegrityReport,
    pub error: Option<String>,
}

/// Commits `doc` to `dest` through the direct → repair → fallback ladder.
/// An existing destination is backed up first and restored if every tier
/// fails.
pub fn save(doc: &DocumentModel, dest: &Path, options: &SaveOptions) -> SaveAttemptResult {
    let backup = match backup::create_backup(dest) {
        Ok(handle) => handle,
        Err(err) => {
            log::warn!("proceeding without backup: {err}");
            None
        }
    };

    let result = run_tiers(doc, dest, options, backup.as_ref());

    if result.succeeded {
        if let Err(err) = backup::prune_backups(dest, options.keep_backups) {
            log::warn!("backup pruning failed: {err}");
        }
    }
    result
}

fn run_tiers(
    doc: &DocumentModel,
    dest: &Path,
    options: &SaveOptions,
    backup: Option<&BackupHandle>,
) -> SaveAttemptResult {
    let mut last_error = None;

    for attempt in 1..=options.direct_retries {
        match write_and_validate(doc, dest, &options.thresholds) {
            Ok(validation) => {
                log::info!("direct save succeeded on attempt {attempt}");
                return SaveAttemptResult {
                    succeeded: true,
                    method: SaveMethod::Direct,
                    validation,
                    error: None,
                };
            }
            Err(err) => {
                log::warn!("direct save attempt {attempt} failed: {err}");
                last_error = Some(err.to_string());
                if attempt < options.direct_retries {
                    std::thread::sleep(options.retry_delay);
                }
            }
        }
    }

    log::warn!("direct save exhausted, attempting repair save");
    let repaired = repair_document(doc);
    match write_and_validate(&repaired, dest, &options.thresholds) {
        Ok(validation) => {
            return SaveAttemptResult {
                succeeded: true,
                method: SaveMethod::Repaired,
                validation,
                error: None,
            };
        }
        Err(err) => {
            log::warn!("repair save failed: {err}");
            last_error = Some(err.to_string());
        }
    }

    log::warn!("attempting minimal fallback save");
    let fallback = fallback_document(doc, &options.fallback_title);
    match write_and_validate(&fallback, dest, &options.fallback_thresholds) {
        Ok(validation) => SaveAttemptResult {
            succeeded: true,
            method: SaveMethod::Fallback,
            validation,
            error: None,
        },
        Err(err) => {
            log::error!("all save tiers failed: {err}");
            if let Some(handle) = backup {
                if let Err(restore_err) = backup::restore_from_backup(handle, dest) {
                    log::error!("backup restore also failed: {restore_err}");
                }
            }
            SaveAttemptResult {
                succeeded: false,
                method: SaveMethod::Fallback,
                validation: integrity::validate(dest, &options.fallback_thresholds),
                error: last_error.or(Some(err.to_string())),
            }
        }
    }
}

/// Serializes to a temp file in the destination directory, validates it by
/// reopening there, and only then moves it into place. A failing attempt
/// never touches the destination.
fn write_and_validate(
    doc: &DocumentModel,
    dest: &Path,
    thresholds: &IntegrityThresholds,
) -> Result<IntegrityReport> {
    let bytes = writer::write_document(doc)?;

    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = tempfile::Builder::new()
        .suffix(".docx")
        .tempfile_in(dir.unwrap_or_else(|| Path::new(".")))
        .context("creating temp file for save")?;
    std::io::Write::write_all(&mut temp, &bytes).context("writing document bytes")?;

    let report = integrity::validate(temp.path(), thresholds);
    if !report.is_valid(thresholds) {
        anyhow::bail!(
            "integrity check failed: {}",
            report.error.as_deref().unwrap_or("below content thresholds")
        );
    }

    temp.persist(dest)
        .with_context(|| format!("moving temp file into {}", dest.display()))?;
    Ok(report)
}

/// Rebuilds the document keeping only paragraph text with best-effort style
/// and alignment. Drops drawings, numbering references, and run-level
/// formatting that may be the corruption source.
fn repair_document(doc: &DocumentModel) -> DocumentModel {
    let mut repaired = DocumentModel::new();
    for para in &doc.paragraphs {
        let mut node = ParagraphNode::from_text(&para.text());
        node.style = para.style.clone();
        node.alignment = para.alignment;
        repaired.paragraphs.push(node);
    }
    repaired
}

/// Builds the minimal document: a fixed title plus every source paragraph
/// whose text runs at least six characters.
fn fallback_document(doc: &DocumentModel, title: &str) -> DocumentModel {
    let mut minimal = DocumentModel::new();
    let mut heading = ParagraphNode::from_text(title);
    heading.alignment = TextAlignment::Center;
    minimal.paragraphs.push(heading);

    for para in &doc.paragraphs {
        let text = para.text();
        let trimmed = text.trim();
        if trimmed.chars().count() >= 6 {
            minimal.paragraphs.push(ParagraphNode::from_text(trimmed));
        }
    }
    minimal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich_document() -> DocumentModel {
        let mut doc = DocumentModel::new();
        doc.paragraphs.push(ParagraphNode::from_text("网络安全漏洞通报"));
        for i in 0..6 {
            doc.paragraphs.push(ParagraphNode::from_text(&format!(
                "第{i}段：该系统存在高危漏洞，请相关单位立即组织整改并反馈。"
            )));
        }
        doc
    }

    // Small test packages stay under the production byte floors, so the
    // content thresholds do the validating here.
    fn test_options() -> SaveOptions {
        SaveOptions {
            thresholds: IntegrityThresholds {
                min_bytes: 256,
                ..IntegrityThresholds::NORMAL
            },
            fallback_thresholds: IntegrityThresholds {
                min_bytes: 128,
                ..IntegrityThresholds::FALLBACK
            },
            ..SaveOptions::default()
        }
    }

    #[test]
    fn direct_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.docx");

        let result = save(&rich_document(), &dest, &test_options());

        assert!(result.succeeded);
        assert_eq!(result.method, SaveMethod::Direct);
        assert!(result.validation.readable);
        assert!(dest.exists());
    }

    #[test]
    fn repair_strips_formatting_but_keeps_text() {
        let mut doc = rich_document();
        doc.paragraphs[1].runs[0].formatting.bold = true;
        doc.paragraphs[1].numbering = Some(crate::document::models::AutoNumbering {
            num_id: 5,
            level: 0,
        });

        let repaired = repair_document(&doc);
        assert_eq!(repaired.len(), doc.len());
        assert_eq!(repaired.paragraphs[1].text(), doc.paragraphs[1].text());
        assert!(!repaired.paragraphs[1].runs[0].formatting.bold);
        assert!(repaired.paragraphs[1].numbering.is_none());
    }

    #[test]
    fn fallback_keeps_only_substantial_paragraphs() {
        let mut doc = DocumentModel::new();
        doc.paragraphs.push(ParagraphNode::from_text("短"));
        doc.paragraphs.push(ParagraphNode::from_text("这是一段足够长的正文内容。"));

        let minimal = fallback_document(&doc, "网络安全漏洞通报");
        let texts: Vec<String> = minimal.paragraphs.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["网络安全漏洞通报", "这是一段足够长的正文内容。"]);
    }

    #[test]
    fn thin_document_escalates_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.docx");

        // Two paragraphs can never clear the normal five-paragraph floor, but
        // title + both survivors satisfies the fallback one.
        let mut doc = DocumentModel::new();
        doc.paragraphs.push(ParagraphNode::from_text("该系统存在未授权访问漏洞。"));
        doc.paragraphs.push(ParagraphNode::from_text("请相关单位立即组织整改。"));

        let options = SaveOptions {
            direct_retries: 1,
            retry_delay: Duration::from_millis(1),
            ..test_options()
        };
        let result = save(&doc, &dest, &options);

        assert!(result.succeeded);
        assert_eq!(result.method, SaveMethod::Fallback);
        assert!(result.validation.is_valid(&options.fallback_thresholds));
    }

    #[test]
    fn overwrite_creates_and_prunes_backups() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.docx");
        std::fs::write(&dest, b"previous contents that matter").unwrap();

        let result = save(&rich_document(), &dest, &test_options());
        assert!(result.succeeded);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".backup_"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
