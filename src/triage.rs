//! Document-type triage.
//!
//! Filename extensions settle spreadsheets and standalone images; PDFs
//! are probed by sampling structured text from their first pages — a
//! scanned statement yields next to none, a digital one plenty. The
//! resulting [`DocumentKind`] picks the pipeline branch and is never
//! mutated afterwards.

use serde::Serialize;
use tracing::debug;

use crate::error::ExtractError;
use crate::pdf::{self, PdfEngine};
use crate::types::DocumentKind;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff", "gif"];

/// Pages sampled from the head of a PDF.
const SAMPLE_PAGES: usize = 3;
/// A text-PDF must average at least this many characters per sampled page…
const MIN_AVG_CHARS: f64 = 100.0;
/// …and at least this fraction of sampled pages must carry ≥ 50 chars.
const MIN_TEXT_PAGE_RATIO: f64 = 0.7;
/// A sampled page with at least this many characters counts as textual.
const TEXTUAL_PAGE_CHARS: usize = 50;

/// Rough effort estimate for diagnostics and queue display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingClass {
    /// Direct tabular read, no model calls.
    Light,
    /// A handful of LLM calls.
    Standard,
    /// Many vision calls (large scanned documents).
    Heavy,
}

/// Classification plus the sampling evidence behind it.
#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub kind: DocumentKind,
    /// Total pages, for PDFs.
    pub page_count: Option<usize>,
    /// Mean characters per sampled page (PDFs only, else 0).
    pub avg_chars: f64,
    /// Fraction of sampled pages with ≥ 50 chars (PDFs only, else 0).
    pub text_page_ratio: f64,
    pub class: ProcessingClass,
}

/// Classify a blob into a pipeline branch.
///
/// Unknown kinds fail here with `InputRejected`; password-protected PDFs
/// are rejected with the distinguishing flag before any rendering work.
pub fn classify(
    engine: &dyn PdfEngine,
    bytes: &[u8],
    filename: &str,
) -> Result<TriageReport, ExtractError> {
    let ext = extension(filename);

    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(TriageReport {
            kind: DocumentKind::Spreadsheet,
            page_count: None,
            avg_chars: 0.0,
            text_page_ratio: 0.0,
            class: ProcessingClass::Light,
        });
    }

    if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(TriageReport {
            kind: DocumentKind::Image,
            page_count: None,
            avg_chars: 0.0,
            text_page_ratio: 0.0,
            class: ProcessingClass::Standard,
        });
    }

    if ext == "pdf" {
        return classify_pdf(engine, bytes);
    }

    Err(ExtractError::rejected(format!(
        "unsupported document type: {}",
        if ext.is_empty() { "(no extension)" } else { &ext }
    )))
}

fn classify_pdf(engine: &dyn PdfEngine, bytes: &[u8]) -> Result<TriageReport, ExtractError> {
    if pdf_head_has_encrypt_marker(bytes) {
        return Err(ExtractError::password_protected());
    }

    let page_count = engine.page_count(bytes).map_err(ExtractError::from)?;
    if page_count == 0 {
        return Err(ExtractError::rejected("PDF has no pages"));
    }

    let samples = pdf::sample_page_texts(engine, bytes, SAMPLE_PAGES).map_err(ExtractError::from)?;
    let (kind, avg_chars, text_page_ratio) = classify_from_samples(&samples);

    let class = match kind {
        DocumentKind::TextPdf => ProcessingClass::Standard,
        _ if page_count > 10 => ProcessingClass::Heavy,
        _ => ProcessingClass::Standard,
    };

    debug!(
        kind = kind.as_str(),
        page_count, avg_chars, text_page_ratio, "PDF triage"
    );

    Ok(TriageReport {
        kind,
        page_count: Some(page_count),
        avg_chars,
        text_page_ratio,
        class,
    })
}

/// Pure classification rule over sampled page texts.
///
/// `TEXT_PDF` iff `avg_chars ≥ 100` and at least 70% of sampled pages
/// carry ≥ 50 characters; otherwise `IMAGE_PDF`.
fn classify_from_samples(samples: &[String]) -> (DocumentKind, f64, f64) {
    if samples.is_empty() {
        return (DocumentKind::ImagePdf, 0.0, 0.0);
    }
    let sampled = samples.len() as f64;
    let total_chars: usize = samples.iter().map(|s| s.chars().count()).sum();
    let textual_pages = samples
        .iter()
        .filter(|s| s.chars().count() >= TEXTUAL_PAGE_CHARS)
        .count();

    let avg_chars = total_chars as f64 / sampled;
    let ratio = textual_pages as f64 / sampled;

    let kind = if avg_chars >= MIN_AVG_CHARS && ratio >= MIN_TEXT_PAGE_RATIO {
        DocumentKind::TextPdf
    } else {
        DocumentKind::ImagePdf
    };
    (kind, avg_chars, ratio)
}

/// Fast password-protection check on raw bytes: encrypted PDFs carry an
/// `/Encrypt` dictionary, typically near the trailer of the head section.
fn pdf_head_has_encrypt_marker(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(64 * 1024)];
    head.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

fn extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::MockPdfEngine;

    fn long_text() -> String {
        "2024.03.01 10:00 급여 0 1,500,000 1,500,000 ".repeat(10)
    }

    #[test]
    fn spreadsheet_extensions_short_circuit() {
        let engine = MockPdfEngine::with_page_count(0);
        for name in ["stmt.xlsx", "stmt.XLS", "stmt.ods"] {
            let report = classify(&engine, b"bytes", name).unwrap();
            assert_eq!(report.kind, DocumentKind::Spreadsheet);
            assert_eq!(report.class, ProcessingClass::Light);
        }
    }

    #[test]
    fn raster_extensions_short_circuit() {
        let engine = MockPdfEngine::with_page_count(0);
        for name in ["scan.png", "scan.JPG", "scan.jpeg", "scan.tiff"] {
            let report = classify(&engine, b"bytes", name).unwrap();
            assert_eq!(report.kind, DocumentKind::Image);
        }
    }

    #[test]
    fn unknown_extension_rejected() {
        let engine = MockPdfEngine::with_page_count(0);
        let err = classify(&engine, b"bytes", "statement.hwp").unwrap_err();
        assert!(matches!(err, ExtractError::InputRejected { .. }));
        assert!(!err.is_password_protected());
    }

    #[test]
    fn missing_extension_rejected() {
        let engine = MockPdfEngine::with_page_count(0);
        assert!(classify(&engine, b"bytes", "statement").is_err());
    }

    #[test]
    fn text_heavy_pdf_classified_text() {
        let text = long_text();
        let engine = MockPdfEngine::with_texts(&[&text, &text, &text]);
        let report = classify(&engine, b"%PDF-1.4", "stmt.pdf").unwrap();
        assert_eq!(report.kind, DocumentKind::TextPdf);
        assert_eq!(report.page_count, Some(3));
        assert!(report.avg_chars >= 100.0);
        assert!(report.text_page_ratio >= 0.7);
    }

    #[test]
    fn sparse_pdf_classified_image() {
        let engine = MockPdfEngine::with_texts(&["", " ", ""]);
        let report = classify(&engine, b"%PDF-1.4", "scan.pdf").unwrap();
        assert_eq!(report.kind, DocumentKind::ImagePdf);
    }

    #[test]
    fn mixed_pdf_needs_both_thresholds() {
        // One dense page, two blank: avg may pass but ratio fails.
        let dense = "x".repeat(600);
        let engine = MockPdfEngine::with_texts(&[dense.as_str(), "", ""]);
        let report = classify(&engine, b"%PDF-1.4", "stmt.pdf").unwrap();
        assert_eq!(report.kind, DocumentKind::ImagePdf);
        assert!(report.avg_chars >= 100.0);
        assert!(report.text_page_ratio < 0.7);
    }

    #[test]
    fn single_page_text_pdf() {
        let text = long_text();
        let engine = MockPdfEngine::with_texts(&[&text]);
        let report = classify(&engine, b"%PDF-1.4", "stmt.pdf").unwrap();
        assert_eq!(report.kind, DocumentKind::TextPdf);
    }

    #[test]
    fn encrypted_pdf_rejected_with_flag() {
        let engine = MockPdfEngine::with_page_count(1);
        let bytes = b"%PDF-1.6 /Encrypt << /Filter /Standard >> endobj";
        let err = classify(&engine, bytes, "locked.pdf").unwrap_err();
        assert!(err.is_password_protected());
    }

    #[test]
    fn empty_pdf_rejected() {
        let engine = MockPdfEngine::with_page_count(0);
        let err = classify(&engine, b"%PDF-1.4", "empty.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::InputRejected { .. }));
    }

    #[test]
    fn large_scanned_pdf_classed_heavy() {
        let mut texts: Vec<String> = vec![String::new(); 20];
        texts[0] = "tiny".into();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let engine = MockPdfEngine::with_texts(&refs);
        let report = classify(&engine, b"%PDF-1.4", "big-scan.pdf").unwrap();
        assert_eq!(report.kind, DocumentKind::ImagePdf);
        assert_eq!(report.class, ProcessingClass::Heavy);
    }
}
