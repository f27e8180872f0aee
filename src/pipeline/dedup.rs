//! Record de-duplication.
//!
//! Overlapping chunks and repeated page headers produce duplicate rows;
//! they collapse onto the first occurrence via a canonical key that is
//! independent of column order.

use std::collections::HashSet;

use crate::types::{Record, Value};

/// Canonical key: column names sorted, `name:value` pairs joined by `|`.
pub fn canonical_key(record: &Record) -> String {
    let mut pairs: Vec<String> = record
        .iter()
        .map(|(name, value)| format!("{name}:{}", format_value(value)))
        .collect();
    pairs.sort_unstable();
    pairs.join("|")
}

/// Collapse records with identical canonical keys onto the first
/// occurrence, preserving the order of first occurrences.
pub fn dedup(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(canonical_key(record)))
        .collect()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn key_is_order_independent() {
        let a = record(&[("date", text("2024.03.01")), ("amount", Value::Number(100.0))]);
        let b = record(&[("amount", Value::Number(100.0)), ("date", text("2024.03.01"))]);
        assert_eq!(canonical_key(&a), canonical_key(&b));
    }

    #[test]
    fn integral_numbers_format_without_fraction() {
        let a = record(&[("amount", Value::Number(1_500_000.0))]);
        assert_eq!(canonical_key(&a), "amount:1500000");
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let one = record(&[("date", text("2024.03.01")), ("memo", text("급여"))]);
        let two = record(&[("date", text("2024.03.02")), ("memo", text("이체"))]);
        let deduped = dedup(vec![one.clone(), two.clone(), one.clone()]);
        assert_eq!(deduped, vec![one, two]);
    }

    #[test]
    fn near_duplicates_survive() {
        let a = record(&[("date", text("2024.03.01")), ("amount", Value::Number(100.0))]);
        let b = record(&[("date", text("2024.03.01")), ("amount", Value::Number(200.0))]);
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn dedup_is_idempotent() {
        let records = vec![
            record(&[("d", text("1")), ("v", Value::Number(1.0))]),
            record(&[("d", text("1")), ("v", Value::Number(1.0))]),
            record(&[("d", text("2")), ("v", Value::Number(2.0))]),
        ];
        let once = dedup(records);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(dedup(Vec::new()).is_empty());
    }
}
