//! Per-extraction token and currency accounting.
//!
//! The tracker is shared across the concurrent units of one document, so
//! the accumulators are atomics. It is updated on every successful LLM
//! response — even when that unit's records are later discarded — so the
//! reported cost reflects what was actually spent.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Cost;

#[derive(Debug)]
pub struct CostTracker {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    usd_per_m_input: f64,
    usd_per_m_output: f64,
    usd_to_krw: f64,
}

impl CostTracker {
    pub fn new(usd_per_m_input: f64, usd_per_m_output: f64, usd_to_krw: f64) -> Self {
        Self {
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            usd_per_m_input,
            usd_per_m_output,
            usd_to_krw,
        }
    }

    /// Zero both counters (extraction start).
    pub fn reset(&self) {
        self.prompt_tokens.store(0, Ordering::SeqCst);
        self.completion_tokens.store(0, Ordering::SeqCst);
    }

    /// Record one completed LLM call. Thread-safe.
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::SeqCst);
        self.completion_tokens.fetch_add(completion, Ordering::SeqCst);
    }

    /// Snapshot the accumulated cost.
    pub fn total(&self) -> Cost {
        let prompt = self.prompt_tokens.load(Ordering::SeqCst);
        let completion = self.completion_tokens.load(Ordering::SeqCst);
        let usd = (prompt as f64) * self.usd_per_m_input / 1_000_000.0
            + (completion as f64) * self.usd_per_m_output / 1_000_000.0;
        Cost {
            prompt_tokens: prompt,
            completion_tokens: completion,
            usd,
            krw: usd * self.usd_to_krw,
        }
    }
}
