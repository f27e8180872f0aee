//! Core data model for the extraction pipeline.
//!
//! Column schemas are data, not code: a `Record` is an ordered map from
//! discovered column names to values, and the `Schema` is the column order
//! fixed by the first parsed unit of a document. Nothing in here hardcodes
//! bank-specific column names.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered column-name list established by the first unit of a document.
pub type Schema = Vec<String>;

/// A single extracted transaction: column name → value, in column order.
///
/// `serde_json` runs with `preserve_order`, so key order survives a round
/// trip through JSON (the LLM's object key order defines the schema).
pub type Record = IndexMap<String, Value>;

/// A cell value: free text or a finite number.
///
/// Numeric-looking strings (thousands separators and currency glyphs
/// stripped) are coerced to `Number` during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// True for `Text("")` — used when deciding whether a date-like column
    /// actually carries a date.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

/// Document classification produced by triage. Never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    TextPdf,
    ImagePdf,
    Image,
    Spreadsheet,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextPdf => "text_pdf",
            Self::ImagePdf => "image_pdf",
            Self::Image => "image",
            Self::Spreadsheet => "spreadsheet",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this kind is parsed through the LLM vision path.
    pub fn needs_vision(&self) -> bool {
        matches!(self, Self::ImagePdf | Self::Image)
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_pdf" => Ok(Self::TextPdf),
            "image_pdf" => Ok(Self::ImagePdf),
            "image" => Ok(Self::Image),
            "spreadsheet" => Ok(Self::Spreadsheet),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

/// Token and currency accounting for one extraction.
///
/// Monotonically non-decreasing within an extraction; reset at entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub usd: f64,
    pub krw: f64,
}

/// Final output of one extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub records: Vec<Record>,
    pub schema: Schema,
    pub cost: Cost,
    pub from_cache: bool,
    pub kind: DocumentKind,
}

/// Cooperative cancellation handle threaded through the pipeline.
///
/// Checked before each branch step and at every batch boundary. In-flight
/// HTTP requests are abandoned when their worker returns; partial results
/// are discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-call options for [`crate::pipeline::Extractor::extract`].
///
/// `None` fields fall back to the extractor's configuration.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Bypass the cache read and delete any stale entry; a successful
    /// extraction still rewrites the cache.
    pub force_refresh: bool,
    /// BCP-47 tags forwarded to the OCR/LLM path (e.g. `ko-KR`).
    pub language_hints: Vec<String>,
    /// PDF rasterization scale (1.0 = 72 DPI).
    pub raster_scale: Option<f32>,
    /// Cap on rasterized pages; excess pages are truncated.
    pub max_pages: Option<usize>,
    /// Per-call LLM output token budget.
    pub llm_max_output_tokens: Option<u32>,
    /// Cooperative cancellation handle.
    pub cancel: Option<CancelToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_roundtrips_through_json() {
        let mut record = Record::new();
        record.insert("적요".into(), Value::Text("급여".into()));
        record.insert("입금".into(), Value::Number(1_500_000.0));

        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        // preserve_order keeps the column order intact
        let keys: Vec<_> = back.keys().cloned().collect();
        assert_eq!(keys, vec!["적요", "입금"]);
    }

    #[test]
    fn untagged_value_deserializes_by_shape() {
        let v: Value = serde_json::from_str("42.5").unwrap();
        assert_eq!(v, Value::Number(42.5));
        let v: Value = serde_json::from_str("\"42.5\"").unwrap();
        assert_eq!(v, Value::Text("42.5".into()));
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn document_kind_str_roundtrip() {
        for kind in [
            DocumentKind::TextPdf,
            DocumentKind::ImagePdf,
            DocumentKind::Image,
            DocumentKind::Spreadsheet,
            DocumentKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn vision_kinds() {
        assert!(DocumentKind::ImagePdf.needs_vision());
        assert!(DocumentKind::Image.needs_vision());
        assert!(!DocumentKind::TextPdf.needs_vision());
        assert!(!DocumentKind::Spreadsheet.needs_vision());
    }
}
