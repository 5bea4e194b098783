//! Regex text substitution over runs, with a hyperlink guard.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::models::{DocumentModel, ParagraphNode};

/// One pattern/replacement pair applied to run text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub pattern: String,
    pub replacement: String,
}

static AUTHORITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[一-龥]+网信办").expect("authority regex"));

/// The builtin rule set: normalize whichever district authority name the
/// source document carries to the issuing one.
pub fn default_rules(authority_name: &str) -> Vec<SubstitutionRule> {
    vec![SubstitutionRule {
        pattern: AUTHORITY_PATTERN.as_str().to_string(),
        replacement: authority_name.to_string(),
    }]
}

/// Applies `rules` to every run of every paragraph. Runs that sit inside a
/// hyperlink or carry a field code are left untouched even when a pattern
/// matches; each such skip is logged and counted so the caller can report
/// degraded fidelity. Returns `(replacements, skips)`.
pub fn apply_rules(doc: &mut DocumentModel, rules: &[SubstitutionRule]) -> (usize, usize) {
    let mut replaced = 0usize;
    let mut skipped = 0usize;

    let compiled: Vec<(Regex, &str)> = rules
        .iter()
        .filter_map(|rule| match Regex::new(&rule.pattern) {
            Ok(re) => Some((re, rule.replacement.as_str())),
            Err(err) => {
                log::warn!("ignoring invalid substitution pattern {:?}: {err}", rule.pattern);
                None
            }
        })
        .collect();

    for para in &mut doc.paragraphs {
        for run in &mut para.runs {
            for (re, replacement) in &compiled {
                if !re.is_match(&run.text) {
                    continue;
                }
                if run.carries_link() {
                    log::warn!(
                        "substitution skipped on linked run: {:?}",
                        run.text.trim()
                    );
                    skipped += 1;
                    continue;
                }
                run.text = re.replace_all(&run.text, *replacement).into_owned();
                replaced += 1;
            }
        }
    }

    (replaced, skipped)
}

/// Replaces `needle` with `replacement` in a paragraph even when the match
/// spans run boundaries. The paragraph collapses to a single run keeping the
/// first run's formatting, which matches how template field paragraphs are
/// laid out. Paragraphs containing linked runs are never rewritten.
pub fn replace_in_paragraph(para: &mut ParagraphNode, needle: &str, replacement: &str) -> bool {
    let text = para.text();
    if !text.contains(needle) {
        return false;
    }
    if para.runs.iter().any(|r| r.carries_link()) {
        log::warn!("cross-run replacement skipped, paragraph holds a link: {:?}", text.trim());
        return false;
    }
    para.set_text(text.replace(needle, replacement));
    true
}
