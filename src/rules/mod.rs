//! Deterministic per-issuer parsers.
//!
//! Well-known statement layouts don't need an LLM: each issuer rule
//! declares its column set, structure, and detection heuristics, and a
//! line walker harvests transactions directly. The engine is an
//! accelerator, not an authority — the pipeline consults it before the
//! LLM text path, takes a successful parse at zero cost, and falls
//! through on failure.

pub mod issuers;
mod walker;

use regex::Regex;

use crate::types::Record;

/// Semantic tag for a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Date,
    AmountIn,
    AmountOut,
    Balance,
    Text,
}

impl ColumnRole {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::AmountIn | Self::AmountOut | Self::Balance)
    }
}

/// Expected transaction layout within the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureHint {
    /// One transaction per line, fields space-separated.
    SpaceSeparated,
    /// One field per line; a date line opens each transaction.
    LineSeparated,
    /// One transaction per line, fields tab- or wide-space-separated.
    Tabular,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
}

/// One issuer's deterministic parser configuration.
#[derive(Debug)]
pub struct IssuerRule {
    pub id: String,
    /// Names under which the issuer appears in statements.
    pub aliases: Vec<String>,
    pub columns: Vec<ColumnSpec>,
    pub structure: StructureHint,
    /// Rare strings that identify this issuer outright.
    pub signature_keywords: Vec<String>,
    /// Header vocabulary used for score-based detection.
    pub header_keywords: Vec<String>,
    /// Anchored pattern matching this issuer's transaction-date prefix.
    pub date_pattern: Regex,
}

impl IssuerRule {
    /// Column names in declared order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn header_score(&self, text: &str) -> usize {
        self.header_keywords
            .iter()
            .filter(|kw| text.contains(kw.as_str()))
            .count()
    }

    fn date_line_count(&self, text: &str) -> usize {
        text.lines()
            .filter(|line| self.date_pattern.is_match(line.trim()))
            .count()
    }
}

/// Document head searched for issuer aliases.
const ALIAS_HEAD_CHARS: usize = 600;
/// Minimum date-pattern lines for structural detection.
const MIN_STRUCTURAL_LINES: usize = 5;
/// Minimum header-keyword hits for score-based detection.
const MIN_HEADER_SCORE: usize = 4;

/// Registry of issuer rules with layered detection.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<IssuerRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<IssuerRule>) -> Self {
        Self { rules }
    }

    /// Engine loaded with the built-in issuer set.
    pub fn with_builtin() -> Self {
        Self::new(issuers::builtin_rules())
    }

    /// An engine that never matches (rule parsing disabled).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Layered detection:
    /// 1. rare signature keywords,
    /// 2. structural match (dense date lines + some header vocabulary),
    /// 3. issuer alias in the document head,
    /// 4. header keyword score ≥ 4.
    pub fn detect(&self, text: &str) -> Option<&IssuerRule> {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.signature_keywords.iter().any(|kw| text.contains(kw.as_str())))
        {
            return Some(rule);
        }

        if let Some(rule) = self.rules.iter().find(|r| {
            r.date_line_count(text) >= MIN_STRUCTURAL_LINES && r.header_score(text) >= 2
        }) {
            return Some(rule);
        }

        let head: String = text.chars().take(ALIAS_HEAD_CHARS).collect();
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.aliases.iter().any(|a| head.contains(a.as_str())))
        {
            return Some(rule);
        }

        self.rules
            .iter()
            .map(|r| (r, r.header_score(text)))
            .filter(|(_, score)| *score >= MIN_HEADER_SCORE)
            .max_by_key(|(_, score)| *score)
            .map(|(rule, _)| rule)
    }

    /// Apply a rule's deterministic walker. An empty result means the
    /// layout did not line up; callers fall through to the LLM path.
    pub fn parse(&self, text: &str, rule: &IssuerRule) -> Vec<Record> {
        walker::parse(text, rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RuleEngine {
        RuleEngine::with_builtin()
    }

    #[test]
    fn builtin_registry_is_populated() {
        let engine = engine();
        assert!(engine.rules.len() >= 3);
        for rule in &engine.rules {
            assert!(!rule.columns.is_empty(), "rule {} has no columns", rule.id);
            assert!(
                rule.columns.iter().any(|c| c.role == ColumnRole::Date),
                "rule {} has no date column",
                rule.id
            );
        }
    }

    #[test]
    fn signature_keyword_detects_immediately() {
        let engine = engine();
        let text = "KB국민은행 거래내역조회\n2024.03.01 급여 0 1,500,000 1,500,000";
        let rule = engine.detect(text).unwrap();
        assert_eq!(rule.id, "kookmin");
    }

    #[test]
    fn alias_in_head_detects() {
        let engine = engine();
        let text = "거래내역서 — 신한은행 발급\n일자 내용 금액";
        let rule = engine.detect(text).unwrap();
        assert_eq!(rule.id, "shinhan");
    }

    #[test]
    fn alias_beyond_head_ignored() {
        let engine = engine();
        let mut text = "x".repeat(2000);
        text.push_str("신한은행");
        assert!(engine.detect(&text).is_none());
    }

    #[test]
    fn header_score_detects_without_issuer_name() {
        let engine = engine();
        // Kookmin header vocabulary, no bank name anywhere.
        let text = "거래일시 적요 출금 입금 잔액\n2024.03.01 이체 500,000 0 1,000,000";
        let rule = engine.detect(text).unwrap();
        assert_eq!(rule.id, "kookmin");
    }

    #[test]
    fn structural_detection_needs_dense_date_lines() {
        let engine = engine();
        let mut text = String::from("출금 입금\n");
        for day in 1..=8 {
            text.push_str(&format!("2024.03.{day:02} 메모 1,000 0 9,000\n"));
        }
        // 8 date lines + 2 header keywords → structural layer fires.
        assert!(engine.detect(&text).is_some());
    }

    #[test]
    fn unrelated_text_not_detected() {
        let engine = engine();
        assert!(engine.detect("Quarterly revenue report for fiscal 2024.").is_none());
        assert!(engine.detect("").is_none());
    }

    #[test]
    fn disabled_engine_never_matches() {
        let engine = RuleEngine::disabled();
        assert!(engine.detect("KB국민은행 거래일시 적요 출금 입금 잔액").is_none());
    }
}
