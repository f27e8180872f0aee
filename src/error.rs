//! Error taxonomy for the extraction pipeline.
//!
//! Every fatal failure carries a human-readable message plus a
//! machine-readable [`ErrorKind`]. Module-level errors (`PdfError`,
//! `LlmError`, …) convert into this taxonomy at the pipeline boundary;
//! provider response bodies and credentials are never echoed into messages.

use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::llm::LlmError;
use crate::ocr::OcrError;
use crate::pdf::PdfError;
use crate::sheet::SheetError;
use crate::store::StoreError;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputRejected,
    ExtractionEmpty,
    Transport,
    UpstreamQuota,
    CacheUnavailable,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Unknown or unsupported document kind, empty input, or a
    /// password-protected PDF (flagged separately).
    #[error("unsupported input: {reason}")]
    InputRejected {
        reason: String,
        password_protected: bool,
    },

    /// No text in a text-PDF, or no records parsed from any branch.
    #[error("no extractable content: {0}")]
    ExtractionEmpty(String),

    /// Network error or timeout from the LLM, OCR, or storage collaborator.
    #[error("upstream transport failure: {0}")]
    Transport(String),

    /// Quota or rate-limit error surfaced by the provider.
    #[error("upstream quota exhausted: {0}")]
    UpstreamQuota(String),

    /// Persistent cache configured but unreachable. Non-fatal on the read
    /// path — the pipeline proceeds with a miss.
    #[error("parse cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Caller aborted through the cancellation token.
    #[error("extraction cancelled")]
    Cancelled,

    /// Invariant violation: schema redeclaration, worker panic, etc.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputRejected { .. } => ErrorKind::InputRejected,
            Self::ExtractionEmpty(_) => ErrorKind::ExtractionEmpty,
            Self::Transport(_) => ErrorKind::Transport,
            Self::UpstreamQuota(_) => ErrorKind::UpstreamQuota,
            Self::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the input was a password-protected PDF.
    pub fn is_password_protected(&self) -> bool {
        matches!(
            self,
            Self::InputRejected {
                password_protected: true,
                ..
            }
        )
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self::InputRejected {
            reason: reason.into(),
            password_protected: false,
        }
    }

    pub(crate) fn password_protected() -> Self {
        Self::InputRejected {
            reason: "document is password-protected".into(),
            password_protected: true,
        }
    }
}

impl From<PdfError> for ExtractError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::Encrypted => Self::password_protected(),
            PdfError::Library(msg) => Self::Internal(format!("PDF engine unavailable: {msg}")),
            other => Self::rejected(other.to_string()),
        }
    }
}

impl From<LlmError> for ExtractError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Quota { status, .. } => {
                Self::UpstreamQuota(format!("LLM provider returned HTTP {status}"))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<OcrError> for ExtractError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::Quota { status, .. } => {
                Self::UpstreamQuota(format!("OCR provider returned HTTP {status}"))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<SheetError> for ExtractError {
    fn from(e: SheetError) -> Self {
        Self::rejected(e.to_string())
    }
}

impl From<StoreError> for ExtractError {
    fn from(e: StoreError) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<CacheError> for ExtractError {
    fn from(e: CacheError) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            ExtractError::rejected("bad").kind(),
            ErrorKind::InputRejected
        );
        assert_eq!(ExtractError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            ExtractError::ExtractionEmpty("empty".into()).kind(),
            ErrorKind::ExtractionEmpty
        );
    }

    #[test]
    fn password_flag_only_on_protected_inputs() {
        assert!(ExtractError::password_protected().is_password_protected());
        assert!(!ExtractError::rejected("unsupported").is_password_protected());
        assert!(!ExtractError::Cancelled.is_password_protected());
    }

    #[test]
    fn encrypted_pdf_maps_to_password_rejection() {
        let err: ExtractError = PdfError::Encrypted.into();
        assert!(err.is_password_protected());
        assert_eq!(err.kind(), ErrorKind::InputRejected);
    }

    #[test]
    fn llm_quota_maps_to_upstream_quota() {
        let err: ExtractError = LlmError::Quota {
            status: 429,
            message: "rate limited".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UpstreamQuota);
    }

    #[test]
    fn llm_connection_maps_to_transport() {
        let err: ExtractError = LlmError::Connection("http://localhost:9".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UpstreamQuota).unwrap();
        assert_eq!(json, "\"upstream_quota\"");
    }
}
