//! Bank statement extraction pipeline.
//!
//! Ingests account statements (text PDFs, scanned PDFs, standalone
//! images, spreadsheets) and produces a normalized, de-duplicated
//! sequence of transaction records whose column schema is discovered per
//! document — the statement's own headers, not a hardcoded set. Parsing
//! runs through an LLM (text chunks or page images) with schema
//! propagation, salvage of truncated responses, bounded-parallel
//! batching, content-addressed caching, and per-extraction cost
//! accounting. Deterministic issuer rules short-circuit the LLM for
//! well-known statement layouts.
//!
//! ```no_run
//! use bankbook::{ExtractOptions, Extractor, ExtractorConfig};
//!
//! # fn main() -> Result<(), bankbook::ExtractError> {
//! let extractor = Extractor::new(ExtractorConfig::from_env())?;
//! let bytes = std::fs::read("statement.pdf").expect("readable input");
//! let result = extractor.extract(&bytes, "statement.pdf", &ExtractOptions::default())?;
//! println!("{} records, {} columns", result.records.len(), result.schema.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunk;
pub mod config;
pub mod cost;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod rules;
pub mod salvage;
pub mod schema;
pub mod sheet;
pub mod store;
pub mod triage;
pub mod types;

pub use config::ExtractorConfig;
pub use error::{ErrorKind, ExtractError};
pub use pipeline::Extractor;
pub use types::{
    CancelToken, Cost, DocumentKind, ExtractOptions, ParseResult, Record, Schema, Value,
};

use tracing_subscriber::EnvFilter;

/// Initialize `tracing` output for binaries and tests embedding the
/// pipeline. Respects `RUST_LOG`; defaults to info-level crate logs.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
