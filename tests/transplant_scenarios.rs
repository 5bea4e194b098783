//! Transplantation properties over the document model.

use reportforge::document::models::{DocumentModel, ParagraphNode, RunNode};
use reportforge::transplant::numbering::{renumber_sequence, NumberingRules};
use reportforge::transplant::substitute::{apply_rules, default_rules};
use reportforge::transplant::{transplant, TransplantRange};

fn doc_with(texts: &[String]) -> DocumentModel {
    let mut doc = DocumentModel::new();
    for t in texts {
        doc.paragraphs.push(ParagraphNode::from_text(t));
    }
    doc
}

fn numbered_source(paragraphs: usize) -> DocumentModel {
    let texts: Vec<String> = (0..paragraphs)
        .map(|i| format!("源文第{i}段，描述系统漏洞的相关情况与整改要求。"))
        .collect();
    doc_with(&texts)
}

#[test]
fn forty_paragraph_scenario() {
    // Source of 40 paragraphs, copying from the 3rd to the second-to-last,
    // into a template whose 7th paragraph is the marker.
    let source = numbered_source(40);
    let mut template_texts: Vec<String> =
        (0..12).map(|i| format!("模板固定段{i}")).collect();
    template_texts[6] = "*".to_string();
    let mut template = doc_with(&template_texts);

    let range = TransplantRange { start: 3, end: -1 };
    let report = transplant(&mut template, &source, range).expect("transplant");

    assert_eq!(report.copied, 36);
    assert_eq!(template.len(), 12 - 1 + 36);
    assert!(template.paragraphs.iter().all(|p| p.text().trim() != "*"));
}

#[test]
fn transplanted_region_preserves_source_order() {
    let source = numbered_source(20);
    let mut template = doc_with(&["头".into(), "*".into(), "尾".into()]);

    let range = TransplantRange { start: 5, end: 15 };
    transplant(&mut template, &source, range).expect("transplant");

    // 1-based [5, 15) is source indices 4..14, ten paragraphs.
    let copied: Vec<String> = template.paragraphs[1..11].iter().map(|p| p.text()).collect();
    let expected: Vec<String> = source.paragraphs[4..14].iter().map(|p| p.text()).collect();
    assert_eq!(copied, expected);
}

#[test]
fn renumbering_after_transplant_starts_at_one() {
    let source = doc_with(&[
        "来文单位".into(),
        "抄送".into(),
        "3.漏洞描述".into(),
        "系统存在弱口令漏洞，攻击者可利用其登录后台管理系统。".into(),
        "7、整改建议".into(),
        "请立即修改所有默认口令并开启登录审计。".into(),
        "落款".into(),
    ]);
    let mut template = doc_with(&["标题通报".into(), "*".into()]);

    transplant(&mut template, &source, TransplantRange::default()).expect("transplant");
    renumber_sequence(&mut template, &NumberingRules::default());

    let texts: Vec<String> = template.paragraphs.iter().map(|p| p.text()).collect();
    assert!(texts.contains(&"1.漏洞描述".to_string()));
    assert!(texts.contains(&"2.整改建议".to_string()));
}

#[test]
fn hyperlink_guard_survives_the_full_pass() {
    let mut linked = ParagraphNode::default();
    linked.runs.push(RunNode {
        text: "点击查看江东区网信办通告".into(),
        hyperlink: true,
        ..Default::default()
    });

    let mut doc = DocumentModel::new();
    doc.paragraphs.push(ParagraphNode::from_text("经江东区网信办研判。"));
    doc.paragraphs.push(linked);

    let (replaced, skipped) = apply_rules(&mut doc, &default_rules("鄞州区网信办"));

    assert_eq!(replaced, 1);
    assert_eq!(skipped, 1);
    assert_eq!(doc.paragraphs[0].text(), "经鄞州区网信办研判。");
    assert_eq!(doc.paragraphs[1].text(), "点击查看江东区网信办通告");
}
