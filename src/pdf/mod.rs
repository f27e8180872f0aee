//! PDF access: page counting, structured-text extraction, and page
//! rasterization behind one engine trait.
//!
//! Production: [`PdfiumEngine`] (pdfium-render via PDFium).
//! Testing: [`MockPdfEngine`] (scripted page texts + minimal PNGs).
//!
//! Rasterization is sequential within one document — the PDFium handle is
//! created per operation and never shared across threads.

pub mod pdfium;

use thiserror::Error;
use tracing::warn;

pub use pdfium::{MockPdfEngine, PdfiumEngine};

#[derive(Error, Debug)]
pub enum PdfError {
    /// PDFium failed to render a page.
    #[error("PDF rendering failed for page {page}: {reason}")]
    Rendering { page: usize, reason: String },

    /// Document requires a password to open.
    #[error("PDF is password-protected")]
    Encrypted,

    /// The PDFium dynamic library could not be loaded.
    #[error("PDFium library unavailable: {0}")]
    Library(String),

    #[error("PDF text extraction failed for page {page}: {reason}")]
    Text { page: usize, reason: String },

    #[error("PNG encoding failed: {0}")]
    ImageEncoding(String),
}

/// Unified PDF engine seam: everything the pipeline needs from a PDF.
pub trait PdfEngine: Send + Sync {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, PdfError>;

    /// Structured text of a single 0-indexed page.
    fn page_text(&self, pdf: &[u8], page: usize) -> Result<String, PdfError>;

    /// Render a single 0-indexed page to PNG at the given scale
    /// (1.0 = 72 DPI).
    fn render_page(&self, pdf: &[u8], page: usize, scale: f32) -> Result<Vec<u8>, PdfError>;
}

/// One rasterized page, transient.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub png: Vec<u8>,
}

/// Result of rasterizing a document, with the truncation event recorded.
#[derive(Debug)]
pub struct RasterizedDocument {
    pub pages: Vec<Page>,
    /// True when the document had more pages than `max_pages`.
    pub truncated: bool,
}

/// Rasterize every page up to `max_pages`, in order.
pub fn rasterize(
    engine: &dyn PdfEngine,
    pdf: &[u8],
    scale: f32,
    max_pages: usize,
) -> Result<RasterizedDocument, PdfError> {
    let total = engine.page_count(pdf)?;
    let truncated = total > max_pages;
    if truncated {
        warn!(
            total_pages = total,
            max_pages, "Rasterization truncated at page cap"
        );
    }

    let count = total.min(max_pages);
    let mut pages = Vec::with_capacity(count);
    for index in 0..count {
        let png = engine.render_page(pdf, index, scale)?;
        pages.push(Page { index, png });
    }

    Ok(RasterizedDocument { pages, truncated })
}

/// Concatenated structured text of all pages, separated by a paragraph
/// break. For text-PDFs only.
pub fn extract_text(engine: &dyn PdfEngine, pdf: &[u8]) -> Result<String, PdfError> {
    let total = engine.page_count(pdf)?;
    let mut pages = Vec::with_capacity(total);
    for index in 0..total {
        pages.push(engine.page_text(pdf, index)?);
    }
    Ok(pages.join("\n\n"))
}

/// Text of up to the first `limit` pages, for triage sampling.
pub fn sample_page_texts(
    engine: &dyn PdfEngine,
    pdf: &[u8],
    limit: usize,
) -> Result<Vec<String>, PdfError> {
    let total = engine.page_count(pdf)?;
    let count = total.min(limit);
    let mut texts = Vec::with_capacity(count);
    for index in 0..count {
        texts.push(engine.page_text(pdf, index)?);
    }
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterize_respects_page_cap() {
        let engine = MockPdfEngine::with_page_count(12);
        let doc = rasterize(&engine, b"pdf", 1.5, 10).unwrap();
        assert_eq!(doc.pages.len(), 10);
        assert!(doc.truncated);
        assert_eq!(doc.pages[9].index, 9);
    }

    #[test]
    fn rasterize_small_document_not_truncated() {
        let engine = MockPdfEngine::with_page_count(3);
        let doc = rasterize(&engine, b"pdf", 1.5, 50).unwrap();
        assert_eq!(doc.pages.len(), 3);
        assert!(!doc.truncated);
    }

    #[test]
    fn extract_text_joins_pages_with_paragraph_break() {
        let engine = MockPdfEngine::with_texts(&["page one", "page two"]);
        let text = extract_text(&engine, b"pdf").unwrap();
        assert_eq!(text, "page one\n\npage two");
    }

    #[test]
    fn sample_limits_pages() {
        let engine = MockPdfEngine::with_texts(&["a", "b", "c", "d", "e"]);
        let samples = sample_page_texts(&engine, b"pdf", 3).unwrap();
        assert_eq!(samples, vec!["a", "b", "c"]);
    }

    #[test]
    fn sample_of_short_document_returns_all() {
        let engine = MockPdfEngine::with_texts(&["only"]);
        let samples = sample_page_texts(&engine, b"pdf", 3).unwrap();
        assert_eq!(samples.len(), 1);
    }
}
