//! Security rule engine shared scaffolding (spec §4.4): rule record shape,
//! per-file dedup, and deterministic emission order. Each language's closed
//! rule catalog lives in its own submodule.

pub mod dart;
pub mod js;
pub mod python;

use crate::model::{Finding, Severity};
use crate::sanitize::LineIndex;
use std::collections::HashSet;

/// One entry in a closed rule table: compiled lazily by each language module.
pub struct SanitizedRule {
    pub id: &'static str,
    pub pattern: &'static str,
    pub severity: Severity,
    pub message: &'static str,
}

/// Runs a closed set of regexes against `sanitized` (or `raw`, depending on
/// `source`), producing findings with line/column from `idx`. Declaration
/// order is preserved by iterating `rules` in order and letting `evaluate`'s
/// caller dedup/sort afterward.
pub fn scan_with_regex(text: &str, idx: &LineIndex, file: &str, rule_id: &'static str, severity: Severity, message: &str, re: &regex::Regex) -> Vec<Finding> {
    re.find_iter(text)
        .map(|m| Finding {
            rule_id: rule_id.to_string(),
            severity,
            message: message.to_string(),
            file: file.to_string(),
            line: idx.line_at(m.start()),
            column: Some(idx.column_at(m.start())),
            snippet: m.as_str().trim().chars().take(200).collect(),
            code: None,
            start_offset: m.start(),
            end_offset: m.end(),
        })
        .collect()
}

/// Dedups by `(ruleId, startOffset, endOffset)`, then sorts by rule
/// declaration order (the order findings were appended in, since callers
/// push rules in catalog order) and match offset (spec §4.4).
pub fn dedup_and_order(mut findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, usize, usize)> = HashSet::new();
    findings.retain(|f| seen.insert(f.dedup_key()));
    findings.sort_by_key(|f| f.start_offset);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_drops_exact_duplicate_spans() {
        let f = |start: usize| Finding {
            rule_id: "x".into(),
            severity: Severity::High,
            message: "m".into(),
            file: "a.js".into(),
            line: 1,
            column: None,
            snippet: "s".into(),
            code: None,
            start_offset: start,
            end_offset: start + 4,
        };
        let findings = vec![f(10), f(10), f(20)];
        let deduped = dedup_and_order(findings);
        assert_eq!(deduped.len(), 2);
    }
}
