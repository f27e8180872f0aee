//! LLM adapter layer.
//!
//! The pipeline talks to a single narrow trait; the production
//! implementation is an OpenAI-compatible HTTP client, and tests use a
//! scripted mock. No retries live here — retry policy belongs to the
//! pipeline.

pub mod http;

use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;

pub use http::HttpLlmClient;

/// One completed LLM call.
///
/// Token counts come from the provider's `usage` block; when the provider
/// omits them both counts are zero and the cost tracker accumulates
/// accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Per-call options forwarded by the pipeline.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub max_output_tokens: Option<u32>,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("cannot reach LLM endpoint at {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// Provider-side quota or rate limit (HTTP 429).
    #[error("LLM quota exhausted (HTTP {status}): {message}")]
    Quota { status: u16, message: String },

    #[error("LLM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed LLM response: {0}")]
    ResponseParsing(String),
}

/// Narrow seam over an external LLM.
///
/// Implementations must surface provider token counts and typed transport
/// errors; they must not retry internally.
pub trait LlmClient: Send + Sync {
    /// Text-only completion.
    fn complete(&self, prompt: &str, options: &CompletionOptions)
        -> Result<Completion, LlmError>;

    /// Vision completion over one or more PNG images.
    fn complete_vision(
        &self,
        prompt: &str,
        images_png: &[Vec<u8>],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;
}

// ──────────────────────────────────────────────
// MockLlmClient (testing)
// ──────────────────────────────────────────────

/// One call observed by the mock, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub image_count: usize,
}

/// Scripted LLM double: responses are consumed front-to-back, and every
/// call is recorded. When the script runs dry the mock returns an empty
/// array so accidental extra calls are visible in tests rather than
/// panicking a worker thread.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with default token counts (100 prompt, 50 completion).
    pub fn push_response(&self, text: &str) {
        self.push_response_with_tokens(text, 100, 50);
    }

    pub fn push_response_with_tokens(&self, text: &str, prompt_tokens: u64, completion_tokens: u64) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(Completion {
                text: text.to_string(),
                prompt_tokens,
                completion_tokens,
            }));
    }

    pub fn push_error(&self, error: LlmError) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next(&self, prompt: &str, image_count: usize) -> Result<Completion, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                prompt: prompt.to_string(),
                image_count,
            });
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Completion {
                    text: "[]".to_string(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                })
            })
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.next(prompt, 0)
    }

    fn complete_vision(
        &self,
        prompt: &str,
        images_png: &[Vec<u8>],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.next(prompt, images_png.len())
    }
}
