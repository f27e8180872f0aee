//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` wire shape
//! (OpenAI, Azure, Ollama's compatibility layer, vLLM, …), which keeps the
//! pipeline vendor-agnostic. Vision inputs ride along as base64 data URLs.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Completion, CompletionOptions, LlmClient, LlmError};

pub struct HttpLlmClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpLlmClient {
    /// Create a client for the given endpoint.
    ///
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`);
    /// the chat-completions path is appended per call.
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            timeout_secs,
        }
    }

    fn post_chat(&self, body: &ChatRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Api {
                    status: 0,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let message = response.text().unwrap_or_default();
            return Err(LlmError::Quota {
                status: 429,
                message: truncate(&message, 200),
            });
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ResponseParsing("response carried no choices".into()))?;

        let usage = parsed.usage.unwrap_or_default();
        Ok(Completion {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let body = ChatRequest {
            model: options.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: json!(prompt),
            }],
            max_tokens: options.max_output_tokens,
        };
        self.post_chat(&body)
    }

    fn complete_vision(
        &self,
        prompt: &str,
        images_png: &[Vec<u8>],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let mut parts = vec![json!({"type": "text", "text": prompt})];
        for png in images_png {
            let encoded = base64::engine::general_purpose::STANDARD.encode(png);
            parts.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{encoded}")}
            }));
        }
        let body = ChatRequest {
            model: options.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: json!(parts),
            }],
            max_tokens: options.max_output_tokens,
        };
        self.post_chat(&body)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

// ── wire types ──

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
