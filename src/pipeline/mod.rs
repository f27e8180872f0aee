//! The extraction pipeline: triage, branch dispatch, bounded-parallel LLM
//! batching, salvage-aware retries, de-duplication, caching, and cost
//! accounting.
//!
//! Per-extraction state (cost accumulator, schema cell, dedup set) is
//! created on entry and released on return. Rasterization is sequential
//! within a document; LLM calls run in bounded batches of scoped worker
//! threads — each in-flight HTTP request parks one worker, and a batch
//! completes before the next starts, which keeps outbound API concurrency
//! predictable.

pub mod dedup;
pub mod prompt;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn};

use crate::cache::ParseCache;
use crate::chunk::{self, Chunk};
use crate::config::ExtractorConfig;
use crate::cost::CostTracker;
use crate::error::ExtractError;
use crate::fingerprint;
use crate::llm::{Completion, CompletionOptions, HttpLlmClient, LlmClient, LlmError};
use crate::ocr::OcrClient;
use crate::pdf::{self, PdfEngine, PdfiumEngine};
use crate::rules::RuleEngine;
use crate::salvage;
use crate::schema::{retain_meaningful, SchemaBroker};
use crate::sheet;
use crate::store::BlobStore;
use crate::triage;
use crate::types::{
    CancelToken, Cost, DocumentKind, ExtractOptions, ParseResult, Record, Schema, Value,
};

/// The orchestration core. One instance serves many documents; all
/// per-document state lives in a [`Run`] created per call, so `extract`
/// is reentrant across documents.
pub struct Extractor {
    config: ExtractorConfig,
    llm: Arc<dyn LlmClient>,
    pdf: Arc<dyn PdfEngine>,
    ocr: Option<Arc<dyn OcrClient>>,
    cache: Option<ParseCache>,
    rules: RuleEngine,
}

impl Extractor {
    /// Build an extractor with production collaborators.
    ///
    /// A configured-but-unreachable cache is downgraded to "no cache" with
    /// a warning; extraction proceeds unconditionally.
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            &config.llm_base_url,
            config.llm_api_key.clone(),
            config.llm_timeout_secs,
        ));
        let pdf: Arc<dyn PdfEngine> = Arc::new(PdfiumEngine::new()?);

        let cache = if config.cache_enabled {
            match ParseCache::open(&config.cache_path, config.cache_ttl_days) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(error = %e, "Parse cache unavailable — continuing without cache");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            llm,
            pdf,
            ocr: None,
            cache,
            rules: RuleEngine::with_builtin(),
        })
    }

    /// Dependency-injected constructor for tests and embedders.
    pub fn with_components(
        config: ExtractorConfig,
        llm: Arc<dyn LlmClient>,
        pdf: Arc<dyn PdfEngine>,
        ocr: Option<Arc<dyn OcrClient>>,
        cache: Option<ParseCache>,
        rules: RuleEngine,
    ) -> Self {
        Self {
            config,
            llm,
            pdf,
            ocr,
            cache,
            rules,
        }
    }

    /// Attach an OCR client for the text-branch fallback.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrClient>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Extract a normalized, de-duplicated transaction sequence from one
    /// document.
    pub fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ExtractOptions,
    ) -> Result<ParseResult, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::rejected("empty input"));
        }

        let fingerprint = fingerprint::hash(bytes);
        let _span = info_span!("extract", fingerprint = %fingerprint, filename).entered();

        if let Some(cache) = &self.cache {
            if options.force_refresh {
                if let Err(e) = cache.delete(&fingerprint) {
                    warn!(error = %e, "Forced-refresh cache delete failed");
                }
            } else {
                match cache.get(&fingerprint) {
                    Ok(Some(entry)) => {
                        info!(records = entry.records.len(), "Serving cached extraction");
                        return Ok(ParseResult {
                            records: entry.records,
                            schema: entry.schema,
                            // This call spent nothing; the entry keeps the
                            // original cost for bookkeeping.
                            cost: Cost::default(),
                            from_cache: true,
                            kind: entry.kind,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Cache read failed — treating as miss"),
                }
            }
        }

        let run = Run::new(&self.config, options);
        run.checkpoint()?;

        let report = triage::classify(self.pdf.as_ref(), bytes, filename)?;
        info!(
            kind = report.kind.as_str(),
            pages = report.page_count,
            class = ?report.class,
            "Document triaged"
        );

        let (records, schema) = match report.kind {
            DocumentKind::Spreadsheet => self.run_spreadsheet(bytes, filename)?,
            DocumentKind::TextPdf => self.run_text_pdf(bytes, &run)?,
            DocumentKind::ImagePdf => self.run_image_pdf(bytes, &run)?,
            DocumentKind::Image => self.run_image(bytes, &run)?,
            DocumentKind::Unknown => {
                return Err(ExtractError::Internal(
                    "triage let an unknown document kind through".into(),
                ))
            }
        };

        let records = dedup::dedup(records);
        if records.is_empty() {
            return Err(ExtractError::ExtractionEmpty(
                "no transaction records found in any unit".into(),
            ));
        }

        let cost = run.cost.total();
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(
                &fingerprint,
                filename,
                bytes.len() as u64,
                &records,
                &schema,
                &cost,
                report.kind,
            ) {
                warn!(error = %e, "Cache write failed — result returned uncached");
            }
        }

        info!(
            records = records.len(),
            columns = schema.len(),
            prompt_tokens = cost.prompt_tokens,
            completion_tokens = cost.completion_tokens,
            usd = cost.usd,
            "Extraction complete"
        );

        Ok(ParseResult {
            records,
            schema,
            cost,
            from_cache: false,
            kind: report.kind,
        })
    }

    /// Download a blob from the object store, extract it, and delete the
    /// storage object best-effort regardless of outcome.
    pub fn extract_from_store(
        &self,
        store: &dyn BlobStore,
        storage_path: &str,
        file_name: &str,
        options: &ExtractOptions,
    ) -> Result<ParseResult, ExtractError> {
        let bytes = store.download(storage_path).map_err(ExtractError::from)?;
        let result = self.extract(&bytes, file_name, options);
        if let Err(e) = store.delete(storage_path) {
            warn!(storage_path, error = %e, "Best-effort storage cleanup failed");
        }
        result
    }

    /// Janitor hook: delete expired cache entries, returning the count.
    pub fn reap_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.reap_expired().unwrap_or_else(|e| {
                warn!(error = %e, "Cache reap failed");
                0
            }),
            None => 0,
        }
    }

    // ── branches ──────────────────────────────────────────

    fn run_spreadsheet(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<(Vec<Record>, Schema), ExtractError> {
        let (records, schema) = sheet::parse_workbook(bytes, filename)?;
        Ok((retain_meaningful(records), schema))
    }

    fn run_text_pdf(&self, bytes: &[u8], run: &Run) -> Result<(Vec<Record>, Schema), ExtractError> {
        let text = pdf::extract_text(self.pdf.as_ref(), bytes).map_err(ExtractError::from)?;
        let text = if text.trim().is_empty() {
            self.ocr_fallback_text(bytes, run)?
        } else {
            text
        };

        // Deterministic issuer rules short-circuit the LLM at zero cost.
        if let Some(rule) = self.rules.detect(&text) {
            let records = retain_meaningful(self.rules.parse(&text, rule));
            if !records.is_empty() {
                info!(
                    rule = %rule.id,
                    records = records.len(),
                    "Issuer rule short-circuited the LLM path"
                );
                return Ok((records, rule.column_names()));
            }
            debug!(rule = %rule.id, "Issuer rule matched but parsed nothing — falling through");
        }

        let merged = chunk::merge_lines(&text);
        let chunks = chunk::split(&merged, self.config.chunk_target_chars);
        if chunks.is_empty() {
            return Err(ExtractError::ExtractionEmpty(
                "statement text reduced to nothing after line merge".into(),
            ));
        }
        debug!(chunks = chunks.len(), "Text branch chunked");

        // First chunk runs serially to establish the schema; any error
        // here is fatal for the document.
        run.checkpoint()?;
        let first = self.parse_chunk(&chunks[0], None, &[], run)?;
        run.broker.declare(&first)?;
        let first = retain_meaningful(run.broker.normalize(first));
        let samples: Vec<Record> = first.first().cloned().into_iter().collect();
        let mut records = first;

        for batch in chunks[1..].chunks(self.config.batch_concurrency) {
            run.checkpoint()?;
            let schema = run.broker.schema();
            let schema_ref = schema.as_ref();
            let samples_ref: &[Record] = &samples;

            let results: Vec<Result<Vec<Record>, ExtractError>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|chunk| {
                        scope.spawn(move || self.parse_chunk(chunk, schema_ref, samples_ref, run))
                    })
                    .collect();
                handles.into_iter().map(join_unit).collect()
            });

            for result in results {
                let unit = run.broker.normalize(result?);
                records.extend(retain_meaningful(unit));
            }
        }

        Ok((records, run.broker.schema().unwrap_or_default()))
    }

    fn run_image_pdf(&self, bytes: &[u8], run: &Run) -> Result<(Vec<Record>, Schema), ExtractError> {
        run.checkpoint()?;
        let raster = pdf::rasterize(
            self.pdf.as_ref(),
            bytes,
            run.raster_scale(&self.config),
            run.max_pages(&self.config),
        )
        .map_err(ExtractError::from)?;
        if raster.pages.is_empty() {
            return Err(ExtractError::ExtractionEmpty(
                "PDF rasterized to no pages".into(),
            ));
        }

        // Page 0 establishes the schema serially.
        run.checkpoint()?;
        let first = self.parse_page(&raster.pages[0].png, None, &[], run)?;
        run.broker.declare(&first)?;
        let first = retain_meaningful(run.broker.normalize(first));
        let samples: Vec<Record> = first.first().cloned().into_iter().collect();
        let mut records = first;

        for batch in raster.pages[1..].chunks(self.config.batch_concurrency) {
            run.checkpoint()?;
            let schema = run.broker.schema();
            let schema_ref = schema.as_ref();
            let samples_ref: &[Record] = &samples;

            let results: Vec<Result<Vec<Record>, ExtractError>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|page| {
                        scope
                            .spawn(move || self.parse_page(&page.png, schema_ref, samples_ref, run))
                    })
                    .collect();
                handles.into_iter().map(join_unit).collect()
            });

            for result in results {
                let unit = run.broker.normalize(result?);
                records.extend(retain_meaningful(unit));
            }
        }

        Ok((records, run.broker.schema().unwrap_or_default()))
    }

    fn run_image(&self, bytes: &[u8], run: &Run) -> Result<(Vec<Record>, Schema), ExtractError> {
        run.checkpoint()?;
        let records = self.parse_page(bytes, None, &[], run)?;
        run.broker.declare(&records)?;
        let records = retain_meaningful(run.broker.normalize(records));
        Ok((records, run.broker.schema().unwrap_or_default()))
    }

    // ── units ─────────────────────────────────────────────

    fn parse_chunk(
        &self,
        chunk: &Chunk,
        schema: Option<&Schema>,
        samples: &[Record],
        run: &Run,
    ) -> Result<Vec<Record>, ExtractError> {
        let prompt = prompt::chunk_prompt(&chunk.text, schema, samples);
        let values = self.call_with_retry(|| self.llm.complete(&prompt, &run.completion), run)?;
        debug!(chunk = chunk.index, rows = values.len(), "Chunk parsed");
        Ok(values_to_records(values))
    }

    fn parse_page(
        &self,
        png: &[u8],
        schema: Option<&Schema>,
        samples: &[Record],
        run: &Run,
    ) -> Result<Vec<Record>, ExtractError> {
        let prompt = prompt::vision_prompt(schema, samples, &run.options.language_hints);
        let images = [png.to_vec()];
        let values =
            self.call_with_retry(|| self.llm.complete_vision(&prompt, &images, &run.completion), run)?;
        Ok(values_to_records(values))
    }

    /// One LLM attempt with the salvage-before-retry policy: retry once,
    /// with the same prompt, only when salvage found nothing AND the
    /// response contained no `[` at all. A salvaged prefix is kept as-is.
    fn call_with_retry<F>(&self, call: F, run: &Run) -> Result<Vec<serde_json::Value>, ExtractError>
    where
        F: Fn() -> Result<Completion, LlmError>,
    {
        let completion = call().map_err(ExtractError::from)?;
        run.cost.add(completion.prompt_tokens, completion.completion_tokens);

        let values = salvage::parse_array(&completion.text);
        if !values.is_empty() || completion.text.contains('[') {
            return Ok(values);
        }

        debug!("Response carried no array — retrying once with the same prompt");
        let retry = call().map_err(ExtractError::from)?;
        run.cost.add(retry.prompt_tokens, retry.completion_tokens);
        Ok(salvage::parse_array(&retry.text))
    }

    /// Text-branch fallback: a text-PDF with no text layer is rasterized
    /// and OCR'd page by page. Without an OCR client this is the end of
    /// the road.
    fn ocr_fallback_text(&self, bytes: &[u8], run: &Run) -> Result<String, ExtractError> {
        let Some(ocr) = &self.ocr else {
            return Err(ExtractError::ExtractionEmpty(
                "text PDF has no extractable text".into(),
            ));
        };

        info!("Text layer empty — falling back to OCR over rasterized pages");
        let raster = pdf::rasterize(
            self.pdf.as_ref(),
            bytes,
            run.raster_scale(&self.config),
            run.max_pages(&self.config),
        )
        .map_err(ExtractError::from)?;

        let mut pages = Vec::with_capacity(raster.pages.len());
        for page in &raster.pages {
            run.checkpoint()?;
            pages.push(
                ocr.ocr_image(&page.png, &run.options.language_hints)
                    .map_err(ExtractError::from)?,
            );
        }

        let text = pages.join("\n\n");
        if text.trim().is_empty() {
            return Err(ExtractError::ExtractionEmpty("OCR produced no text".into()));
        }
        Ok(text)
    }
}

/// Per-extraction state: cost accumulator, schema cell, resolved options,
/// and the wall-clock deadline.
struct Run<'a> {
    cost: CostTracker,
    broker: SchemaBroker,
    options: &'a ExtractOptions,
    completion: CompletionOptions,
    deadline: Instant,
    budget_secs: u64,
}

impl<'a> Run<'a> {
    fn new(config: &ExtractorConfig, options: &'a ExtractOptions) -> Self {
        let cost = CostTracker::new(
            config.llm_price_input_per_m,
            config.llm_price_output_per_m,
            config.fx_usd_to_krw,
        );
        cost.reset();
        Self {
            cost,
            broker: SchemaBroker::new(),
            options,
            completion: CompletionOptions {
                model: config.llm_model.clone(),
                max_output_tokens: options.llm_max_output_tokens,
            },
            deadline: Instant::now() + Duration::from_secs(config.pipeline_timeout_secs),
            budget_secs: config.pipeline_timeout_secs,
        }
    }

    /// Cancellation and deadline check at branch steps and batch
    /// boundaries.
    fn checkpoint(&self) -> Result<(), ExtractError> {
        if self
            .options
            .cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
        {
            return Err(ExtractError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ExtractError::Transport(format!(
                "pipeline wall-clock budget of {}s exceeded",
                self.budget_secs
            )));
        }
        Ok(())
    }

    fn raster_scale(&self, config: &ExtractorConfig) -> f32 {
        self.options.raster_scale.unwrap_or(config.raster_scale)
    }

    fn max_pages(&self, config: &ExtractorConfig) -> usize {
        self.options.max_pages.unwrap_or(config.pdf_max_pages)
    }
}

fn join_unit(
    handle: thread::ScopedJoinHandle<'_, Result<Vec<Record>, ExtractError>>,
) -> Result<Vec<Record>, ExtractError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ExtractError::Internal("parser worker panicked".into())))
}

/// Convert salvaged JSON elements into records, skipping non-objects.
/// `preserve_order` keeps each object's key order intact.
fn values_to_records(values: Vec<serde_json::Value>) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::Object(map) => {
                let record: Record = map
                    .into_iter()
                    .map(|(name, cell)| (name, json_to_cell(cell)))
                    .collect();
                (!record.is_empty()).then_some(record)
            }
            _ => None,
        })
        .collect()
}

fn json_to_cell(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        serde_json::Value::Null => Value::Text(String::new()),
        other => Value::Text(other.to_string()),
    }
}
