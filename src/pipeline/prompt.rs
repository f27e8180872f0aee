//! Prompt construction for the chunk and vision parsing paths.
//!
//! The schema hint serves two purposes: column-name consistency across
//! pages and chunks, and less hallucination of alternative names. Sample
//! records show the model the exact output shape.

use crate::types::{Record, Schema};

/// The output contract every parsing prompt ends with.
const OUTPUT_CONTRACT: &str = "\
Return ONLY a JSON array, with no surrounding prose or code fence. \
Each object is one transaction row; use the header names verbatim as keys. \
Strip thousands separators and currency glyphs from numeric fields. \
Omit rows that are totals, pagination, or header repetitions.";

/// Prompt for one text chunk.
pub fn chunk_prompt(chunk: &str, schema: Option<&Schema>, samples: &[Record]) -> String {
    let mut prompt = String::from(
        "The following is a fragment of a bank account statement. \
         Extract every transaction row.\n\n",
    );
    push_schema_hint(&mut prompt, schema, samples);
    prompt.push_str(OUTPUT_CONTRACT);
    prompt.push_str("\n\n--- STATEMENT TEXT ---\n");
    prompt.push_str(chunk);
    prompt
}

/// Prompt for one page image (or a standalone image document).
pub fn vision_prompt(
    schema: Option<&Schema>,
    samples: &[Record],
    language_hints: &[String],
) -> String {
    let mut prompt = String::from(
        "The attached image is a page of a bank account statement. \
         Read the transaction table and extract every transaction row.\n\n",
    );
    if !language_hints.is_empty() {
        prompt.push_str(&format!(
            "The document language is likely one of: {}.\n\n",
            language_hints.join(", ")
        ));
    }
    push_schema_hint(&mut prompt, schema, samples);
    prompt.push_str(OUTPUT_CONTRACT);
    prompt
}

fn push_schema_hint(prompt: &mut String, schema: Option<&Schema>, samples: &[Record]) {
    match schema {
        Some(columns) if !columns.is_empty() => {
            prompt.push_str(&format!(
                "Use exactly these column names as the keys of every object, \
                 in this order: {}.\n\n",
                columns.join(", ")
            ));
        }
        _ => {
            prompt.push_str(
                "Use the statement's own column headers as the keys of every \
                 object, in the order they appear.\n\n",
            );
        }
    }

    for sample in samples.iter().take(2) {
        if let Ok(json) = serde_json::to_string(sample) {
            prompt.push_str(&format!("Example row: {json}\n\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn sample() -> Record {
        let mut record = Record::new();
        record.insert("거래일시".into(), Value::Text("2024.03.01".into()));
        record.insert("입금".into(), Value::Number(1_500_000.0));
        record
    }

    #[test]
    fn chunk_prompt_carries_contract_and_text() {
        let prompt = chunk_prompt("2024.03.01 급여 0 1,500,000", None, &[]);
        assert!(prompt.contains("ONLY a JSON array"));
        assert!(prompt.contains("2024.03.01 급여"));
        assert!(prompt.contains("totals, pagination"));
    }

    #[test]
    fn schema_hint_lists_columns_in_order() {
        let schema = vec!["거래일시".to_string(), "적요".to_string(), "잔액".to_string()];
        let prompt = chunk_prompt("text", Some(&schema), &[]);
        assert!(prompt.contains("거래일시, 적요, 잔액"));
        assert!(!prompt.contains("own column headers"));
    }

    #[test]
    fn without_schema_headers_are_discovered() {
        let prompt = chunk_prompt("text", None, &[]);
        assert!(prompt.contains("own column headers"));
    }

    #[test]
    fn samples_capped_at_two() {
        let samples = vec![sample(), sample(), sample(), sample()];
        let prompt = chunk_prompt("text", None, &samples);
        assert_eq!(prompt.matches("Example row:").count(), 2);
    }

    #[test]
    fn vision_prompt_carries_language_hints() {
        let hints = vec!["ko-KR".to_string(), "en-US".to_string()];
        let prompt = vision_prompt(None, &[], &hints);
        assert!(prompt.contains("ko-KR, en-US"));
        assert!(prompt.contains("ONLY a JSON array"));
    }

    #[test]
    fn vision_prompt_without_hints_omits_language_line() {
        let prompt = vision_prompt(None, &[], &[]);
        assert!(!prompt.contains("language is likely"));
    }
}
