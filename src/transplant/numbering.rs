//! Heading-number reclassification and sequential relabeling.
//!
//! Transplanted content often mixes automatic list numbering with literal
//! "1." style labels. The classifier decides per paragraph whether a number
//! belongs there at all, and the renumbering pass rewrites the survivors
//! into one contiguous literal sequence so the two schemes never coexist.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::models::{DocumentModel, ParagraphNode};

/// Leading numeric label in either ASCII or CJK punctuation: "1." "2、" "3）".
static NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[.、．）)]\s*").expect("number prefix regex"));

/// Keyword tables driving the classifier. Calibrated against one template
/// family; kept as data so other families can ship their own tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingRules {
    /// Severity/status literals that are values, not headings.
    pub severity_literals: Vec<String>,
    /// Section keywords that mark a genuine heading when the text is short.
    pub section_keywords: Vec<String>,
    /// Paragraph styles treated as headings outright.
    pub heading_styles: Vec<String>,
    /// Ceiling for keyword-matched headings, in characters.
    pub keyword_max_chars: usize,
    /// Ceiling for prefix-numbered headings, in characters.
    pub prefixed_max_chars: usize,
    /// Ceiling for colon-terminated field labels and bare numbered
    /// headings, in characters.
    pub label_max_chars: usize,
}

impl Default for NumberingRules {
    fn default() -> Self {
        Self {
            severity_literals: ["高危", "中危", "低危", "严重", "一般", "轻微"]
                .map(String::from)
                .to_vec(),
            section_keywords: ["漏洞描述", "验证情况", "整改要求", "整改建议", "处置措施"]
                .map(String::from)
                .to_vec(),
            heading_styles: vec!["Heading1".into(), "Heading2".into(), "Heading3".into()],
            keyword_max_chars: 15,
            prefixed_max_chars: 20,
            label_max_chars: 10,
        }
    }
}

/// Whether a paragraph should carry a sequence number, and in what form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingDecision {
    /// Already carries a literal label worth keeping in the sequence.
    KeepAsHeading,
    /// A heading numbered automatically; gets a literal label instead.
    ConvertToSequentialText,
    /// Not a heading. Any numbering is removed.
    Strip,
}

/// Classifies one paragraph. Deterministic and side-effect free.
pub fn classify(para: &ParagraphNode, rules: &NumberingRules) -> NumberingDecision {
    let text = para.text();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return NumberingDecision::Strip;
    }

    let char_count = trimmed.chars().count();
    let stripped = NUMBER_PREFIX.replace(trimmed, "");
    let stripped = stripped.trim();

    // Severity values and short field labels look like headings but are not.
    if rules.severity_literals.iter().any(|s| stripped == s) {
        return NumberingDecision::Strip;
    }
    if (stripped.ends_with('：') || stripped.ends_with(':'))
        && stripped.chars().count() <= rules.label_max_chars
    {
        return NumberingDecision::Strip;
    }

    let has_keyword = rules
        .section_keywords
        .iter()
        .any(|k| stripped.contains(k.as_str()));

    // A numeric prefix alone is not enough: the text must also carry a
    // section keyword, or be short enough to be a bare label.
    let is_heading = para
        .style
        .as_deref()
        .is_some_and(|s| rules.heading_styles.iter().any(|h| h == s))
        || (char_count <= rules.keyword_max_chars && has_keyword)
        || (NUMBER_PREFIX.is_match(trimmed)
            && ((has_keyword && char_count <= rules.prefixed_max_chars)
                || char_count <= rules.label_max_chars));

    if !is_heading {
        return NumberingDecision::Strip;
    }

    if para.numbering.is_some() {
        NumberingDecision::ConvertToSequentialText
    } else {
        NumberingDecision::KeepAsHeading
    }
}

/// Walks every paragraph, strips numbering where the classifier says so, and
/// rewrites surviving heading labels to a literal `1.` `2.` `3.` sequence.
/// Automatic numbering never survives this pass. Running it twice yields the
/// same document.
pub fn renumber_sequence(doc: &mut DocumentModel, rules: &NumberingRules) -> usize {
    let mut next = 1usize;
    let mut relabeled = 0usize;

    for para in &mut doc.paragraphs {
        match classify(para, rules) {
            NumberingDecision::Strip => {
                if para.numbering.take().is_some() {
                    log::debug!("stripped automatic numbering from: {:?}", para.text().trim());
                }
            }
            NumberingDecision::KeepAsHeading | NumberingDecision::ConvertToSequentialText => {
                para.numbering = None;
                let text = para.text();
                let body = NUMBER_PREFIX.replace(text.trim(), "");
                let label = format!("{next}.{body}");
                if label != text {
                    para.set_text(label);
                    relabeled += 1;
                }
                next += 1;
            }
        }
    }

    relabeled
}
