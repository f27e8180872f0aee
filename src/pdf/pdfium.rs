//! PDF engine backed by Google PDFium.
//!
//! `PdfiumEngine` is stateless (`Send + Sync`). Each operation creates a
//! fresh `Pdfium` instance because the upstream type is `!Send`; the OS
//! caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::io::Cursor;

use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::{PdfEngine, PdfError};

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd scale settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// Stateless PDFium adapter for rendering and text extraction.
pub struct PdfiumEngine;

impl PdfiumEngine {
    /// Create a new engine, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, PdfError> {
        // Fail fast if the library is missing.
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, PdfError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| PdfError::Library(format!("failed to load PDFium from {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        PdfError::Library(format!(
            "PDFium not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors — detect password-protected documents by the
/// library's error message.
fn map_load_error(e: PdfiumError) -> PdfError {
    let msg = format!("{e}").to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        PdfError::Encrypted
    } else {
        PdfError::Rendering {
            page: 0,
            reason: format!("failed to load PDF: {e}"),
        }
    }
}

/// Compute pixel dimensions for rendering at `scale` (1.0 = 72 DPI),
/// clamped to [1, MAX_DIMENSION_PX] with aspect ratio preserved.
fn compute_render_dimensions(width_points: f32, height_points: f32, scale: f32) -> (u32, u32) {
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfEngine for PdfiumEngine {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, PdfError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn page_text(&self, pdf: &[u8], page: usize) -> Result<String, PdfError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;

        let index = u16::try_from(page).map_err(|_| PdfError::Text {
            page,
            reason: format!("page index {page} exceeds u16 maximum"),
        })?;
        let pdf_page = document.pages().get(index).map_err(|_| PdfError::Text {
            page,
            reason: "page out of range".into(),
        })?;

        let text = pdf_page
            .text()
            .map_err(|e| PdfError::Text {
                page,
                reason: format!("{e}"),
            })?
            .all();
        Ok(text)
    }

    fn render_page(&self, pdf: &[u8], page: usize, scale: f32) -> Result<Vec<u8>, PdfError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let index = u16::try_from(page).map_err(|_| PdfError::Rendering {
            page,
            reason: format!("page index {page} exceeds u16 maximum"),
        })?;
        let pdf_page = pages.get(index).map_err(|_| PdfError::Rendering {
            page,
            reason: format!("page out of range (document has {} pages)", pages.len()),
        })?;

        let width_points = pdf_page.width().value;
        let height_points = pdf_page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, scale);

        let uncapped_w = (width_points * scale) as u32;
        let uncapped_h = (height_points * scale) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| PdfError::Rendering {
                page,
                reason: format!("rendering failed: {e}"),
            })?;

        let dynamic_image = bitmap.as_image();
        let mut cursor = Cursor::new(Vec::new());
        dynamic_image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| PdfError::ImageEncoding(e.to_string()))?;

        let png = cursor.into_inner();
        debug!(
            page,
            width = target_w,
            height = target_h,
            png_size = png.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Scripted PDF engine for tests that must not require the PDFium binary.
///
/// Each page carries a text payload and renders to a minimal valid PNG.
pub struct MockPdfEngine {
    texts: Vec<String>,
}

impl MockPdfEngine {
    /// A document of `count` pages with empty text.
    pub fn with_page_count(count: usize) -> Self {
        Self {
            texts: vec![String::new(); count],
        }
    }

    /// A document whose pages carry the given texts.
    pub fn with_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.as_ref().to_string()).collect(),
        }
    }
}

impl PdfEngine for MockPdfEngine {
    fn page_count(&self, _pdf: &[u8]) -> Result<usize, PdfError> {
        Ok(self.texts.len())
    }

    fn page_text(&self, _pdf: &[u8], page: usize) -> Result<String, PdfError> {
        self.texts.get(page).cloned().ok_or(PdfError::Text {
            page,
            reason: format!("page out of range (mock has {} pages)", self.texts.len()),
        })
    }

    fn render_page(&self, _pdf: &[u8], page: usize, _scale: f32) -> Result<Vec<u8>, PdfError> {
        if page >= self.texts.len() {
            return Err(PdfError::Rendering {
                page,
                reason: format!("page out of range (mock has {} pages)", self.texts.len()),
            });
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 white pixel PNG for mock rendering.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
