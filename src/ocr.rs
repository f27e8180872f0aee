//! Vision-OCR adapter seam.
//!
//! The LLM-vision path is the primary reader for image documents; OCR is
//! consulted only when the text branch needs rasterized pages read back
//! into text (a text-PDF with no text layer). Deployments that never hit
//! that fallback can omit the client entirely.

use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("cannot reach OCR endpoint at {0}")]
    Connection(String),

    #[error("OCR request timed out after {0}s")]
    Timeout(u64),

    #[error("OCR quota exhausted (HTTP {status}): {message}")]
    Quota { status: u16, message: String },

    #[error("OCR API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed OCR response: {0}")]
    ResponseParsing(String),
}

/// Single image in, full text out.
pub trait OcrClient: Send + Sync {
    fn ocr_image(&self, png: &[u8], language_hints: &[String]) -> Result<String, OcrError>;
}

/// HTTP adapter over an external vision-OCR service.
///
/// Posts `{image, language_hints}` as JSON and expects `{text}` back — the
/// minimal wire shape shared by the common annotate-style APIs once their
/// vendor envelopes are stripped by a thin gateway.
pub struct HttpOcrClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpOcrClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
            timeout_secs,
        }
    }
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl OcrClient for HttpOcrClient {
    fn ocr_image(&self, png: &[u8], language_hints: &[String]) -> Result<String, OcrError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        let body = json!({
            "image": encoded,
            "language_hints": language_hints,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                OcrError::Connection(self.endpoint.clone())
            } else if e.is_timeout() {
                OcrError::Timeout(self.timeout_secs)
            } else {
                OcrError::Api {
                    status: 0,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(OcrError::Quota {
                status: 429,
                message: "rate limited".into(),
            });
        }
        if !status.is_success() {
            return Err(OcrError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let parsed: OcrResponse = response
            .json()
            .map_err(|e| OcrError::ResponseParsing(e.to_string()))?;
        Ok(parsed.text)
    }
}

/// Mock OCR client returning fixed text per call, in order.
pub struct MockOcrClient {
    pages: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl MockOcrClient {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: std::sync::Mutex::new(pages.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl OcrClient for MockOcrClient {
    fn ocr_image(&self, _png: &[u8], _language_hints: &[String]) -> Result<String, OcrError> {
        Ok(self
            .pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_pages_in_order() {
        let mock = MockOcrClient::new(&["page one", "page two"]);
        assert_eq!(mock.ocr_image(b"a", &[]).unwrap(), "page one");
        assert_eq!(mock.ocr_image(b"b", &[]).unwrap(), "page two");
        assert_eq!(mock.ocr_image(b"c", &[]).unwrap(), "");
    }

    #[test]
    fn endpoint_slash_trimmed() {
        let client = HttpOcrClient::new("http://localhost:9000/ocr/", None, 30);
        assert_eq!(client.endpoint, "http://localhost:9000/ocr");
    }

    #[test]
    fn response_shape_parses() {
        let parsed: OcrResponse =
            serde_json::from_str(r#"{"text": "거래일시 적요"}"#).unwrap();
        assert_eq!(parsed.text, "거래일시 적요");
    }
}
