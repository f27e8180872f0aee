//! Pipeline configuration.
//!
//! All knobs are read from the environment with sensible defaults, so the
//! embedding application can tune the pipeline without code changes. Unset
//! or unparsable variables silently fall back to their defaults.

use std::path::PathBuf;

pub const APP_NAME: &str = "bankbook";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chunk size for the text-PDF branch, in characters.
pub const DEFAULT_CHUNK_TARGET_CHARS: usize = 2000;
/// Default bounded-parallel batch size for LLM/vision calls.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;
/// Default cap on rasterized pages per document.
pub const DEFAULT_PDF_MAX_PAGES: usize = 50;
/// Default PDF rasterization scale (1.0 = 72 DPI).
pub const DEFAULT_RASTER_SCALE: f32 = 1.5;

/// Everything the extractor needs to know, resolved once at construction.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// When false the parse cache is never probed or written.
    pub cache_enabled: bool,
    /// TTL applied at cache `put`, in days.
    pub cache_ttl_days: i64,
    /// SQLite file backing the parse cache.
    pub cache_path: PathBuf,

    /// Base URL of an OpenAI-compatible chat-completions endpoint.
    pub llm_base_url: String,
    /// Bearer token for the LLM endpoint, if it requires one.
    pub llm_api_key: Option<String>,
    /// Model identifier sent with every completion request.
    pub llm_model: String,
    /// USD per million prompt tokens.
    pub llm_price_input_per_m: f64,
    /// USD per million completion tokens.
    pub llm_price_output_per_m: f64,
    /// Per-call deadline for LLM and OCR requests, in seconds.
    pub llm_timeout_secs: u64,

    /// Exchange rate used for KRW cost reporting.
    pub fx_usd_to_krw: f64,

    pub pdf_max_pages: usize,
    pub raster_scale: f32,
    pub batch_concurrency: usize,
    pub chunk_target_chars: usize,
    /// Wall-clock budget for one extraction, in seconds.
    pub pipeline_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_days: 30,
            cache_path: default_cache_path(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            llm_model: "gpt-4o-mini".to_string(),
            llm_price_input_per_m: 0.15,
            llm_price_output_per_m: 0.60,
            llm_timeout_secs: 60,
            fx_usd_to_krw: 1350.0,
            pdf_max_pages: DEFAULT_PDF_MAX_PAGES,
            raster_scale: DEFAULT_RASTER_SCALE,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            chunk_target_chars: DEFAULT_CHUNK_TARGET_CHARS,
            pipeline_timeout_secs: 300,
        }
    }
}

impl ExtractorConfig {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_enabled: env_flag("CACHE_ENABLED", defaults.cache_enabled),
            cache_ttl_days: env_parse("CACHE_TTL_DAYS", defaults.cache_ttl_days),
            cache_path: std::env::var("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            llm_base_url: env_string("LLM_BASE_URL", &defaults.llm_base_url),
            llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: env_string("LLM_MODEL", &defaults.llm_model),
            llm_price_input_per_m: env_parse("LLM_PRICE_INPUT_PER_M", defaults.llm_price_input_per_m),
            llm_price_output_per_m: env_parse(
                "LLM_PRICE_OUTPUT_PER_M",
                defaults.llm_price_output_per_m,
            ),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs),
            fx_usd_to_krw: env_parse("FX_USD_TO_KRW", defaults.fx_usd_to_krw),
            pdf_max_pages: env_parse("PDF_MAX_PAGES", defaults.pdf_max_pages),
            raster_scale: env_parse("RASTER_SCALE", defaults.raster_scale),
            batch_concurrency: env_parse("BATCH_CONCURRENCY", defaults.batch_concurrency).max(1),
            chunk_target_chars: env_parse("CHUNK_TARGET_CHARS", defaults.chunk_target_chars),
            pipeline_timeout_secs: env_parse("PIPELINE_TIMEOUT_SECS", defaults.pipeline_timeout_secs),
        }
    }
}

/// Application data directory, `~/.bankbook/` on all platforms.
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".bankbook")
}

/// Default location of the SQLite parse cache.
pub fn default_cache_path() -> PathBuf {
    app_data_dir().join("parse-cache.sqlite3")
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info")
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
