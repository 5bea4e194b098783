//! Full rewrite runs over real packages on disk.

use std::path::Path;

use chrono::Datelike;
use reportforge::config::CounterStore;
use reportforge::document::models::{DocumentModel, ParagraphNode};
use reportforge::document::{load_document, write_document_to_path};
use reportforge::persist::integrity::IntegrityThresholds;
use reportforge::pipeline::{Pipeline, RewriteRequest};
use reportforge::Settings;

fn doc_with(texts: &[&str]) -> DocumentModel {
    let mut doc = DocumentModel::new();
    for t in texts {
        doc.paragraphs.push(ParagraphNode::from_text(*t));
    }
    doc
}

fn write_template(dir: &Path) -> std::path::PathBuf {
    let template = doc_with(&[
        "网络安全漏洞通报",
        "〔2024〕第X期",
        "关于XX单位存在XX漏洞的通报",
        "*",
        "请于2024年1月1日前完成整改并反馈。",
        "　　年　月　日",
    ]);
    let path = dir.join("通报模板.docx");
    write_document_to_path(&template, &path).expect("template written");
    path
}

fn write_source(dir: &Path) -> std::path::PathBuf {
    let source = doc_with(&[
        "来文单位抬头",
        "签发栏",
        "3.漏洞描述",
        "经检测，该公司管理系统存在弱口令，海曙区网信办已验证属实。",
        "5、整改建议",
        "请立即修改全部默认口令，并于规定期限内反馈整改情况。",
        "落款单位",
        "落款日期",
    ]);
    let path = dir.join("07-关于测试公司存在弱口令漏洞的通报.docx");
    write_document_to_path(&source, &path).expect("source written");
    path
}

fn settings_for(dir: &Path) -> Settings {
    Settings {
        template_dir: dir.to_path_buf(),
        counter_file: dir.join("counters.json"),
        save_thresholds: IntegrityThresholds {
            min_bytes: 256,
            ..IntegrityThresholds::NORMAL
        },
        fallback_save_thresholds: IntegrityThresholds {
            min_bytes: 128,
            ..IntegrityThresholds::FALLBACK
        },
        ..Settings::default()
    }
}

#[tokio::test]
async fn rewrite_produces_a_merged_notification() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(dir.path());
    let source = write_source(dir.path());
    let settings = settings_for(dir.path());
    let counter_file = settings.counter_file.clone();

    let mut pipeline = Pipeline::new(settings);
    let request = RewriteRequest {
        template: Some(template),
        ..RewriteRequest::new(&source)
    };
    let outcome = pipeline.rewrite(request).await;

    assert!(outcome.success, "outcome: {outcome:?}");
    let output = outcome.output_file.expect("output path");
    assert_eq!(
        output.file_name().unwrap().to_string_lossy(),
        "关于测试公司存在弱口令漏洞的通报.docx"
    );

    let merged = load_document(&output).unwrap();
    let texts: Vec<String> = merged.paragraphs.iter().map(|p| p.text()).collect();

    // Marker gone, body transplanted in order, headings renumbered from 1.
    assert!(texts.iter().all(|t| t.trim() != "*"));
    assert!(texts.contains(&"1.漏洞描述".to_string()));
    assert!(texts.contains(&"2.整改建议".to_string()));

    // Authority normalized inside the transplanted body.
    assert!(texts.iter().any(|t| t.contains("鄞州区网信办")));
    assert!(texts.iter().all(|t| !t.contains("海曙区网信办")));

    // Template fields filled from the filename and the issue counter.
    let year = chrono::Local::now().year();
    assert!(texts.contains(&format!("〔{year}〕第1期")));
    assert!(texts.contains(&"关于测试公司存在弱口令漏洞的通报".to_string()));

    // Sibling backup with the fixed suffix.
    let backup = outcome.backup_file.expect("backup path");
    assert!(backup.to_string_lossy().ends_with(".backup.docx"));
    assert!(backup.exists());

    // Counter advanced for the next notification.
    assert_eq!(CounterStore::new(counter_file).peek(year), 2);
}

#[tokio::test]
async fn template_sources_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(dir.path());
    let mut pipeline = Pipeline::new(settings_for(dir.path()));

    let outcome = pipeline.rewrite(RewriteRequest::new(&template)).await;

    assert!(!outcome.success);
    assert!(outcome.skip_reason.is_some());
}

#[tokio::test]
async fn missing_marker_is_reported_not_thrown() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path());

    let bare = doc_with(&["没有插入标记的模板", "正文"]);
    let bare_path = dir.path().join("无标记通报模板.docx");
    write_document_to_path(&bare, &bare_path).unwrap();

    let mut pipeline = Pipeline::new(settings_for(dir.path()));
    let request = RewriteRequest {
        template: Some(bare_path),
        ..RewriteRequest::new(&source)
    };
    let outcome = pipeline.rewrite(request).await;

    assert!(!outcome.success);
    assert!(outcome
        .needs_manual_processing
        .iter()
        .any(|r| r.contains("marker")));
}
