//! Save-tier behavior against a real filesystem.

use std::time::Duration;

use reportforge::document::models::{DocumentModel, DrawingNode, EmbeddedImage, ParagraphNode};
use reportforge::persist::integrity::IntegrityThresholds;
use reportforge::persist::{save, SaveMethod, SaveOptions};

fn options() -> SaveOptions {
    SaveOptions {
        direct_retries: 1,
        retry_delay: Duration::from_millis(1),
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

fn full_document() -> DocumentModel {
    let mut doc = DocumentModel::new();
    doc.paragraphs.push(ParagraphNode::from_text("网络安全漏洞通报"));
    for i in 0..8 {
        doc.paragraphs.push(ParagraphNode::from_text(&format!(
            "第{i}段：系统存在漏洞，请相关单位按要求完成整改并书面反馈。"
        )));
    }
    doc
}

#[test]
fn direct_save_reopens_with_identical_text() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("通报.docx");
    let doc = full_document();

    let result = save(&doc, &dest, &options());
    assert!(result.succeeded);
    assert_eq!(result.method, SaveMethod::Direct);

    let reloaded = reportforge::document::load_document(&dest).unwrap();
    assert_eq!(reloaded.len(), doc.len());
    assert_eq!(reloaded.paragraphs[0].text(), "网络安全漏洞通报");
}

#[test]
fn corrupt_drawing_escalates_to_repair_save() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("通报.docx");

    // Undecodable image bytes make every direct attempt fail; the repair
    // rebuild drops drawings and keeps the text.
    let mut doc = full_document();
    doc.paragraphs[1].runs[0].drawings.push(DrawingNode {
        image: Some(EmbeddedImage {
            bytes: vec![0u8; 64],
            ext: "png".into(),
        }),
        ..Default::default()
    });

    let result = save(&doc, &dest, &options());

    assert!(result.succeeded);
    assert_eq!(result.method, SaveMethod::Repaired);

    let reloaded = reportforge::document::load_document(&dest).unwrap();
    assert_eq!(reloaded.len(), doc.len());
    assert_eq!(reloaded.paragraphs[0].text(), "网络安全漏洞通报");
    assert!(reloaded.paragraphs.iter().all(|p| !p.has_drawings()));
}

#[test]
fn total_failure_restores_the_original_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("通报.docx");
    let original = b"pre-existing destination contents".to_vec();
    std::fs::write(&dest, &original).unwrap();

    // An empty model fails every tier: no paragraphs for direct or repair,
    // and the fallback document is a lone title below the paragraph floor.
    let result = save(&DocumentModel::new(), &dest, &options());

    assert!(!result.succeeded);
    assert!(result.error.is_some());
    assert!(dest.exists(), "destination must never vanish");
    assert_eq!(std::fs::read(&dest).unwrap(), original);
}

#[test]
fn failed_save_without_preexisting_file_reports_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("fresh.docx");

    let result = save(&DocumentModel::new(), &dest, &options());

    assert!(!result.succeeded);
    assert!(result.error.is_some());
    // Failed attempts validate at the temp path, so nothing invalid ever
    // lands at the destination.
    assert!(!dest.exists());
}
