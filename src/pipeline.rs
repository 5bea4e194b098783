//! End-to-end rewrite operation: load, transplant, normalize, persist,
//! stamp, export.
//!
//! Every public entry returns a structured `RewriteOutcome`; errors are
//! folded into it rather than propagated past the pipeline boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::bridge::{AutomationBridge, BridgeConfig};
use crate::config::{CounterStore, Settings};
use crate::document::models::{DocumentModel, EmbeddedImage};
use crate::document::{io, loader};
use crate::layout::{self, PageCounter, WatermarkOptions};
use crate::persist::{self, SaveMethod, SaveOptions};
use crate::transplant::{self, numbering, substitute, TransplantError, TransplantRange};

/// Days granted for remediation when filling the deadline field.
const REMEDIATION_DAYS: i64 = 5;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("no template matching {keyword:?} under {dir}")]
    TemplateNotFound { dir: PathBuf, keyword: String },
    #[error(transparent)]
    Transplant(#[from] TransplantError),
    #[error("source document unusable: {0}")]
    Source(String),
}

/// One rewrite job.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub source: PathBuf,
    /// Explicit template; auto-discovered by filename keyword when absent.
    pub template: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub range: TransplantRange,
    pub export_pdf: bool,
    /// Confirmation stamp to place per page, when given.
    pub watermark_image: Option<PathBuf>,
    /// Delete a digit-prefixed source file after a fully successful run.
    pub remove_source: bool,
}

impl RewriteRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            template: None,
            output_dir: None,
            range: TransplantRange::default(),
            export_pdf: false,
            watermark_image: None,
            remove_source: false,
        }
    }
}

/// Structured result of one rewrite; nothing is thrown past this boundary.
#[derive(Debug, Default, Clone)]
pub struct RewriteOutcome {
    pub success: bool,
    pub output_file: Option<PathBuf>,
    pub backup_file: Option<PathBuf>,
    pub pdf_file: Option<PathBuf>,
    pub save_method: Option<SaveMethod>,
    /// Operator follow-up reasons; empty when the run is fully trustworthy.
    pub needs_manual_processing: Vec<String>,
    pub skip_reason: Option<String>,
}

impl RewriteOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            needs_manual_processing: vec![reason.into()],
            ..Default::default()
        }
    }
}

/// Company/vulnerability metadata parsed from the source filename.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilenameInfo {
    pub company: Option<String>,
    pub vulnerability: Option<String>,
}

static LEADING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[-._、\s]*").expect("leading digits regex"));

static ISSUE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"〔\d{4}〕第\s*[0-9XxN]*\s*期").expect("issue number regex"));

static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}年\d{1,2}月\d{1,2}日").expect("date regex"));

static BLANK_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*年\s*月\s*日\s*$").expect("blank date regex"));

/// Ordered ladder; the first pattern that matches the stem wins.
static FILENAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"关于(?P<company>.+?)存在(?P<vuln>.+?)(?:漏洞|隐患|风险)的通报",
        r"(?P<company>.+?)存在(?P<vuln>.+?)(?:漏洞|隐患)",
        r"(?P<company>.+?)(?P<vuln>弱口令|未授权访问|信息泄露|SQL注入)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("filename pattern"))
    .collect()
});

/// Strips the leading digit run (batch prefixes like `03-`) from the source
/// filename to form the output name.
pub fn derive_output_name(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stripped = LEADING_DIGITS.replace(&stem, "");
    if stripped.is_empty() {
        return name;
    }
    match source.extension() {
        Some(ext) => format!("{stripped}.{}", ext.to_string_lossy()),
        None => stripped.into_owned(),
    }
}

/// Parses company and vulnerability names out of the filename stem.
pub fn extract_info_from_filename(source: &Path) -> FilenameInfo {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = LEADING_DIGITS.replace(&stem, "");

    for pattern in FILENAME_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&stem) {
            return FilenameInfo {
                company: caps.name("company").map(|m| m.as_str().trim().to_string()),
                vulnerability: caps.name("vuln").map(|m| m.as_str().trim().to_string()),
            };
        }
    }
    log::debug!("no metadata recognized in filename: {stem}");
    FilenameInfo::default()
}

/// Finds the notification template: explicit path first, then the template
/// directory, then the working directory.
pub fn find_template(settings: &Settings, explicit: Option<&Path>) -> Result<PathBuf, RewriteError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(RewriteError::TemplateNotFound {
            dir: path.to_path_buf(),
            keyword: settings.template_keyword.clone(),
        });
    }

    for dir in [settings.template_dir.as_path(), Path::new(".")] {
        if let Some(found) = scan_for_template(dir, &settings.template_keyword) {
            return Ok(found);
        }
    }
    Err(RewriteError::TemplateNotFound {
        dir: settings.template_dir.clone(),
        keyword: settings.template_keyword.clone(),
    })
}

fn scan_for_template(dir: &Path, keyword: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("docx")
                && p.file_stem()
                    .map(|s| s.to_string_lossy().contains(keyword))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Rewrites the `〔YYYY〕第NN期` token wherever it appears. Paragraphs with
/// linked runs are left alone.
pub fn apply_issue_number(doc: &mut DocumentModel, year: i32, number: u32) -> bool {
    let replacement = format!("〔{year}〕第{number}期");
    let mut applied = false;
    for para in &mut doc.paragraphs {
        let text = para.text();
        if !ISSUE_NUMBER.is_match(&text) {
            continue;
        }
        if para.runs.iter().any(|r| r.carries_link()) {
            log::warn!("issue-number paragraph holds a link, left unchanged");
            continue;
        }
        para.set_text(ISSUE_NUMBER.replace_all(&text, replacement.as_str()));
        applied = true;
    }
    applied
}

/// Fills the template's variable fields: company and vulnerability
/// placeholders, the issuing date, and the remediation deadline.
pub fn replace_template_fields(doc: &mut DocumentModel, info: &FilenameInfo, today: NaiveDate) {
    let date_text = format_date(today);
    let deadline_text = format_date(today + chrono::Duration::days(REMEDIATION_DAYS));

    for para in &mut doc.paragraphs {
        if let Some(company) = &info.company {
            substitute::replace_in_paragraph(para, "XX单位", company);
            substitute::replace_in_paragraph(para, "XX公司", company);
        }
        if let Some(vuln) = &info.vulnerability {
            substitute::replace_in_paragraph(para, "XX漏洞", &format!("{vuln}漏洞"));
        }

        let text = para.text();
        if para.runs.iter().any(|r| r.carries_link()) {
            continue;
        }
        if text.contains("前完成整改") && DATE_TOKEN.is_match(&text) {
            para.set_text(DATE_TOKEN.replace(&text, deadline_text.as_str()));
        } else if BLANK_DATE.is_match(text.trim()) {
            let indent = text.len() - text.trim_start().len();
            let prefix = &text[..indent];
            para.set_text(format!("{prefix}{date_text}"));
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    format!("{}年{}月{}日", date.year(), date.month(), date.day())
}

/// Page counter backed by the bridge: persists a scratch copy and asks the
/// converter for its statistics.
struct BridgePageCounter {
    bridge: Arc<AutomationBridge>,
}

impl PageCounter for BridgePageCounter {
    fn count_pages(&mut self, doc: &DocumentModel) -> Option<usize> {
        let dir = tempfile::tempdir().ok()?;
        let scratch = dir.path().join("pagecount.docx");
        crate::document::writer::write_document_to_path(doc, &scratch).ok()?;
        match self.bridge.page_count(&scratch) {
            Ok(pages) => Some(pages),
            Err(err) => {
                log::warn!("page count query failed: {err}");
                None
            }
        }
    }
}

struct EstimatingCounter;

impl PageCounter for EstimatingCounter {
    fn count_pages(&mut self, _doc: &DocumentModel) -> Option<usize> {
        None
    }
}

/// Owns the settings, the counter record, and a lazily created bridge.
pub struct Pipeline {
    settings: Settings,
    counters: CounterStore,
    bridge: Option<Arc<AutomationBridge>>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        let counters = CounterStore::new(settings.counter_file.clone());
        Self {
            settings,
            counters,
            bridge: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn save_options(&self) -> SaveOptions {
        SaveOptions {
            keep_backups: self.settings.keep_backups,
            thresholds: self.settings.save_thresholds,
            fallback_thresholds: self.settings.fallback_save_thresholds,
            ..SaveOptions::default()
        }
    }

    /// Hands out a healthy bridge, creating or recreating one as needed.
    /// `None` means the word processor is unavailable on this machine.
    pub fn bridge(&mut self) -> Option<Arc<AutomationBridge>> {
        if let Some(bridge) = &self.bridge {
            if bridge.health_check() {
                return Some(Arc::clone(bridge));
            }
            log::warn!("bridge went stale, recreating");
            self.bridge = None;
        }
        match AutomationBridge::create(BridgeConfig::default()) {
            Ok(bridge) => {
                let bridge = Arc::new(bridge);
                self.bridge = Some(Arc::clone(&bridge));
                Some(bridge)
            }
            Err(err) => {
                log::warn!("word processor unavailable: {err}");
                None
            }
        }
    }

    /// Runs one full rewrite. Blocking stages (tiered save, external
    /// conversion) are pushed onto the blocking pool.
    pub async fn rewrite(&mut self, request: RewriteRequest) -> RewriteOutcome {
        let source = request.source.clone();
        log::info!("rewriting {}", source.display());

        if let Err(err) = io::validate_docx_file(&source) {
            return RewriteOutcome::skipped(format!("source rejected: {err}"));
        }
        let source_name = source.file_name().unwrap_or_default().to_string_lossy();
        if source_name.contains(&self.settings.template_keyword) {
            return RewriteOutcome::skipped("source is itself a template");
        }

        let template_path = match find_template(&self.settings, request.template.as_deref()) {
            Ok(path) => path,
            Err(err) => return RewriteOutcome::failed(err.to_string()),
        };

        let source_doc = match loader::load_document(&source) {
            Ok(doc) => doc,
            Err(err) => return RewriteOutcome::failed(format!("source unreadable: {err}")),
        };
        let mut merged = match loader::load_document(&template_path) {
            Ok(doc) => doc,
            Err(err) => return RewriteOutcome::failed(format!("template unreadable: {err}")),
        };

        let mut outcome = RewriteOutcome::default();

        let mut report = match transplant::transplant(&mut merged, &source_doc, request.range) {
            Ok(report) => report,
            Err(err) => return RewriteOutcome::failed(err.to_string()),
        };

        let has_drawings = merged.paragraphs.iter().any(|p| p.has_drawings());
        let rescue = if has_drawings { self.bridge() } else { None };
        report.image_failures = transplant::images::resolve_images(
            &mut merged,
            &source,
            rescue.as_deref().map(|b| b as &dyn transplant::images::ImageRescue),
        );
        if report.image_failures > 0 {
            outcome.needs_manual_processing.push(format!(
                "{} embedded image(s) could not be recovered",
                report.image_failures
            ));
        }

        let rules = substitute::default_rules(&self.settings.authority_name);
        let (_, skips) = substitute::apply_rules(&mut merged, &rules);
        report.substitution_skips = skips;

        report.renumbered = numbering::renumber_sequence(&mut merged, &self.settings.rules);

        let today = Local::now().date_naive();
        let info = extract_info_from_filename(&source);
        replace_template_fields(&mut merged, &info, today);

        let year = today.year();
        let number = self.counters.peek(year);
        apply_issue_number(&mut merged, year, number);

        log::info!(
            "transplanted {} paragraphs, {} relabeled, {} substitution skips",
            report.copied,
            report.renumbered,
            report.substitution_skips
        );

        // Watermark placement mutates the model, so it runs before the save.
        if let Some(image_path) = &request.watermark_image {
            self.place_watermarks(&mut merged, image_path, &mut outcome).await;
        }

        let output_dir = request
            .output_dir
            .clone()
            .or_else(|| source.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let dest = output_dir.join(derive_output_name(&source));

        let save_options = self.save_options();
        let save_doc = merged.clone();
        let save_dest = dest.clone();
        let result = tokio::task::spawn_blocking(move || {
            persist::save(&save_doc, &save_dest, &save_options)
        })
        .await
        .unwrap_or_else(|err| {
            persist::SaveAttemptResult {
                succeeded: false,
                method: SaveMethod::Direct,
                validation: Default::default(),
                error: Some(format!("save task panicked: {err}")),
            }
        });

        outcome.save_method = Some(result.method);
        if !result.succeeded {
            outcome.needs_manual_processing.push(format!(
                "save failed: {}",
                result.error.as_deref().unwrap_or("unknown")
            ));
            return outcome;
        }
        if result.method != SaveMethod::Direct {
            outcome
                .needs_manual_processing
                .push(format!("document saved via {:?} tier, review fidelity", result.method));
        }
        outcome.output_file = Some(dest.clone());

        // Fixed-suffix sibling copy for the operator.
        let backup = dest.with_extension("backup.docx");
        match std::fs::copy(&dest, &backup) {
            Ok(_) => outcome.backup_file = Some(backup),
            Err(err) => log::warn!("could not write sibling backup: {err}"),
        }

        if request.export_pdf {
            self.export_pdf(&dest, &output_dir, &mut outcome).await;
        }

        if let Err(err) = self.counters.commit(year, number) {
            log::warn!("counter commit failed: {err}");
        }

        outcome.success = true;

        // Only digit-prefixed batch files qualify for removal, and only
        // after every stage succeeded without manual follow-ups.
        if request.remove_source
            && outcome.needs_manual_processing.is_empty()
            && LEADING_DIGITS.is_match(&source_name)
            && source != dest
        {
            match std::fs::remove_file(&source) {
                Ok(()) => log::info!("removed processed source {}", source.display()),
                Err(err) => log::warn!("could not remove source: {err}"),
            }
        }

        outcome
    }

    /// Stamps an already-committed file in place.
    pub async fn stamp_existing(&mut self, file: &Path, image_path: &Path) -> RewriteOutcome {
        let mut outcome = RewriteOutcome::default();
        let mut doc = match loader::load_document(file) {
            Ok(doc) => doc,
            Err(err) => return RewriteOutcome::failed(format!("document unreadable: {err}")),
        };

        self.place_watermarks(&mut doc, image_path, &mut outcome).await;

        let save_options = self.save_options();
        let dest = file.to_path_buf();
        let result =
            tokio::task::spawn_blocking(move || persist::save(&doc, &dest, &save_options))
                .await
                .ok();

        match result {
            Some(result) if result.succeeded => {
                outcome.save_method = Some(result.method);
                outcome.output_file = Some(file.to_path_buf());
                outcome.success = true;
            }
            Some(result) => {
                outcome.needs_manual_processing.push(format!(
                    "save failed: {}",
                    result.error.as_deref().unwrap_or("unknown")
                ));
            }
            None => {
                outcome
                    .needs_manual_processing
                    .push("save task aborted".to_string());
            }
        }
        outcome
    }

    async fn place_watermarks(
        &mut self,
        merged: &mut DocumentModel,
        image_path: &Path,
        outcome: &mut RewriteOutcome,
    ) {
        if !layout::is_notification_document(merged) {
            log::debug!("not a notification document, skipping stamps");
            return;
        }
        let bytes = match tokio::fs::read(image_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                outcome
                    .needs_manual_processing
                    .push(format!("stamp image unreadable: {err}"));
                return;
            }
        };
        if !io::is_readable_image(&bytes) {
            outcome
                .needs_manual_processing
                .push("stamp image is not a decodable raster file".to_string());
            return;
        }
        let image = EmbeddedImage {
            ext: io::sniff_image_extension(&bytes).to_string(),
            bytes,
        };
        let options = WatermarkOptions {
            signature_name: image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| WatermarkOptions::default().signature_name),
            ..WatermarkOptions::default()
        };

        let report = match self.bridge() {
            Some(bridge) => {
                let mut doc = merged.clone();
                let image2 = image.clone();
                let options2 = options.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let mut counter = BridgePageCounter { bridge };
                    let report = layout::apply_watermarks(&mut doc, &image2, &options2, &mut counter);
                    (doc, report)
                })
                .await;
                match joined {
                    Ok((doc, report)) => {
                        *merged = doc;
                        report
                    }
                    Err(err) => {
                        outcome
                            .needs_manual_processing
                            .push(format!("stamp placement aborted: {err}"));
                        return;
                    }
                }
            }
            None => layout::apply_watermarks(merged, &image, &options, &mut EstimatingCounter),
        };

        if report.needs_manual_review {
            outcome
                .needs_manual_processing
                .push("page count estimated, verify stamp placement".to_string());
        }
        log::info!(
            "stamps: {} placed, {} pages already stamped",
            report.inserted,
            report.skipped_existing
        );
    }

    async fn export_pdf(&mut self, dest: &Path, output_dir: &Path, outcome: &mut RewriteOutcome) {
        let Some(bridge) = self.bridge() else {
            outcome
                .needs_manual_processing
                .push("pdf export skipped, word processor unavailable".to_string());
            return;
        };
        let dest = dest.to_path_buf();
        let out_dir = output_dir.to_path_buf();
        let converted = tokio::task::spawn_blocking(move || bridge.convert_to_pdf(&dest, &out_dir))
            .await
            .map_err(|err| crate::bridge::BridgeError::ExportFailed(err.to_string()));
        match converted {
            Ok(Ok(pdf)) => outcome.pdf_file = Some(pdf),
            Ok(Err(err)) | Err(err) => outcome
                .needs_manual_processing
                .push(format!("pdf export failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::ParagraphNode;

    #[test]
    fn output_name_drops_the_batch_prefix() {
        assert_eq!(
            derive_output_name(Path::new("03-关于某公司的通报.docx")),
            "关于某公司的通报.docx"
        );
        assert_eq!(
            derive_output_name(Path::new("关于某公司的通报.docx")),
            "关于某公司的通报.docx"
        );
        // A purely numeric name keeps its prefix rather than vanishing.
        assert_eq!(derive_output_name(Path::new("2024.docx")), "2024.docx");
    }

    #[test]
    fn filename_ladder_extracts_company_and_vulnerability() {
        let info = extract_info_from_filename(Path::new(
            "12-关于宁波某科技有限公司存在弱口令漏洞的通报.docx",
        ));
        assert_eq!(info.company.as_deref(), Some("宁波某科技有限公司"));
        assert_eq!(info.vulnerability.as_deref(), Some("弱口令"));

        let info = extract_info_from_filename(Path::new("某单位存在SQL注入漏洞.docx"));
        assert_eq!(info.company.as_deref(), Some("某单位"));
        assert_eq!(info.vulnerability.as_deref(), Some("SQL注入"));
    }

    #[test]
    fn unrecognized_filenames_yield_empty_info() {
        let info = extract_info_from_filename(Path::new("meeting-notes.docx"));
        assert_eq!(info, FilenameInfo::default());
    }

    #[test]
    fn issue_number_token_is_rewritten() {
        let mut doc = DocumentModel::new();
        doc.paragraphs.push(ParagraphNode::from_text("〔2024〕第 X 期"));

        assert!(apply_issue_number(&mut doc, 2025, 12));
        assert_eq!(doc.paragraphs[0].text(), "〔2025〕第12期");

        // Idempotent literal form is still matched and normalized.
        assert!(apply_issue_number(&mut doc, 2025, 12));
        assert_eq!(doc.paragraphs[0].text(), "〔2025〕第12期");
    }

    #[test]
    fn template_fields_are_filled() {
        let mut doc = DocumentModel::new();
        doc.paragraphs.push(ParagraphNode::from_text("关于XX单位存在XX漏洞的通报"));
        doc.paragraphs.push(ParagraphNode::from_text(
            "请于2024年1月1日前完成整改并反馈。",
        ));
        doc.paragraphs.push(ParagraphNode::from_text("　　年　月　日"));

        let info = FilenameInfo {
            company: Some("某科技公司".into()),
            vulnerability: Some("弱口令".into()),
        };
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        replace_template_fields(&mut doc, &info, today);

        assert_eq!(doc.paragraphs[0].text(), "关于某科技公司存在弱口令漏洞的通报");
        assert_eq!(doc.paragraphs[1].text(), "请于2025年3月12日前完成整改并反馈。");
        assert_eq!(doc.paragraphs[2].text(), "　　2025年3月7日");
    }

    #[test]
    fn template_discovery_prefers_the_template_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tpl_dir = dir.path().join("Report_Template");
        std::fs::create_dir(&tpl_dir).unwrap();
        std::fs::write(tpl_dir.join("通报模板2025.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("其他文件.docx"), b"x").unwrap();

        let settings = Settings {
            template_dir: tpl_dir.clone(),
            ..Settings::default()
        };
        let found = find_template(&settings, None).unwrap();
        assert_eq!(found, tpl_dir.join("通报模板2025.docx"));
    }

    #[test]
    fn missing_template_is_a_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            template_dir: dir.path().join("empty"),
            ..Settings::default()
        };
        assert!(matches!(
            find_template(&settings, None),
            Err(RewriteError::TemplateNotFound { .. })
        ));
    }
}
