//! Column-schema discovery and record normalization.
//!
//! The first successfully parsed unit of a document fixes the column
//! order; every later unit conforms to it. The broker is the single
//! writer for that declaration — a second `declare` is an internal error,
//! not a silent overwrite. Columns a later unit invents are appended in
//! first-seen order, so the initial order is always a prefix.

use std::sync::Mutex;

use crate::error::ExtractError;
use crate::types::{Record, Schema, Value};

/// Name-substring heuristics for amount-like columns (Korean + English).
const AMOUNT_KEYWORDS: &[&str] = &[
    "금액",
    "출금",
    "입금",
    "잔액",
    "인출",
    "예입",
    "amount",
    "debit",
    "credit",
    "deposit",
    "withdrawal",
    "balance",
];

/// Name-substring heuristics for date-like columns.
const DATE_KEYWORDS: &[&str] = &["거래일", "일자", "일시", "날짜", "date"];

/// Currency glyphs stripped before numeric coercion.
const CURRENCY_GLYPHS: &[char] = &['₩', '$', '€', '¥', '£', '원'];

/// Single-writer cell holding the discovered column schema.
pub struct SchemaBroker {
    inner: Mutex<Option<Schema>>,
}

impl SchemaBroker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Fix the schema to the column order of the first record.
    ///
    /// A second declaration is an invariant violation. Declaring with no
    /// records is a no-op so an empty first unit does not poison the
    /// document.
    pub fn declare(&self, records: &[Record]) -> Result<(), ExtractError> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err(ExtractError::Internal(
                "schema redeclaration attempted".into(),
            ));
        }
        *guard = Some(first.keys().map(|k| collapse_whitespace(k)).collect());
        Ok(())
    }

    /// The schema as declared so far (plus any appended columns).
    pub fn schema(&self) -> Option<Schema> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Conform one unit's records to the schema.
    ///
    /// Column names are whitespace-collapsed, numeric-looking strings are
    /// coerced to numbers, unseen columns are appended to the schema in
    /// first-seen order, and each record is re-emitted with its columns in
    /// schema order (missing columns filled with empty text).
    pub fn normalize(&self, records: Vec<Record>) -> Vec<Record> {
        if records.is_empty() {
            return records;
        }

        let cleaned: Vec<Record> = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .map(|(name, value)| (collapse_whitespace(&name), coerce(value)))
                    .collect()
            })
            .collect();

        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let schema = guard.get_or_insert_with(Schema::new);
        for record in &cleaned {
            for name in record.keys() {
                if !schema.iter().any(|existing| existing == name) {
                    schema.push(name.clone());
                }
            }
        }

        cleaned
            .into_iter()
            .map(|record| reorder(record, schema))
            .collect()
    }
}

impl Default for SchemaBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn reorder(mut record: Record, schema: &[String]) -> Record {
    let mut ordered = Record::with_capacity(schema.len());
    for name in schema {
        let value = record
            .shift_remove(name)
            .unwrap_or_else(|| Value::Text(String::new()));
        ordered.insert(name.clone(), value);
    }
    // Anything left is not in the schema (cannot happen after the append
    // pass above, but cheap to keep well-defined).
    for (name, value) in record {
        ordered.insert(name, value);
    }
    ordered
}

/// Collapse internal whitespace runs and trim: `" 거래  일시 "` → `"거래 일시"`.
pub fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coerce a text value to a number when it looks numeric.
pub fn coerce(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(n),
        Value::Text(s) => {
            let trimmed = s.trim();
            match parse_numeric(trimmed) {
                Some(n) => Value::Number(n),
                None => Value::Text(trimmed.to_string()),
            }
        }
    }
}

/// Parse a numeric-looking string: optional sign, digits with thousand
/// separators, currency glyphs stripped. Dates (`2024.03.01`) and times
/// (`10:00`) fail the parse and stay text.
pub fn parse_numeric(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let mut cleaned = String::with_capacity(s.len());
    let mut digits = 0usize;
    for c in s.chars() {
        match c {
            '0'..='9' => {
                digits += 1;
                cleaned.push(c);
            }
            '.' | '-' | '+' => cleaned.push(c),
            ',' | ' ' => {}
            _ if CURRENCY_GLYPHS.contains(&c) => {}
            _ => return None,
        }
    }
    if digits == 0 {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whether a column name denotes an amount, by substring heuristic.
pub fn is_amount_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    AMOUNT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Whether a column name denotes a date, by substring heuristic.
pub fn is_date_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Drop records that are neither money movements nor dated rows: a record
/// survives only if some amount-like column holds a non-zero number, or
/// some date-like column holds a non-empty value.
pub fn retain_meaningful(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| {
            let has_amount = record.iter().any(|(name, value)| {
                is_amount_column(name) && value.as_number().is_some_and(|n| n != 0.0)
            });
            let has_date = record
                .iter()
                .any(|(name, value)| is_date_column(name) && !value.is_empty());
            has_amount || has_date
        })
        .collect()
}
