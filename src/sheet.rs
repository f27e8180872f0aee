//! Spreadsheet branch: direct tabular read, no LLM involvement.
//!
//! The first worksheet is scanned for a header row — the row among the
//! first twenty with the most matches against banking keywords (Korean
//! and English) and at least two. Rows below it become records whose
//! columns are the header cells verbatim.

use std::io::Cursor;

use calamine::{Data, Ods, Reader, Xls, Xlsb, Xlsx};
use thiserror::Error;
use tracing::debug;

use crate::schema::{coerce, collapse_whitespace};
use crate::types::{Record, Schema, Value};

/// Rows scanned for the header.
const HEADER_SCAN_ROWS: usize = 20;
/// Minimum keyword hits for a row to qualify as the header.
const MIN_HEADER_MATCHES: usize = 2;

/// Banking vocabulary used to spot the header row.
const HEADER_KEYWORDS: &[&str] = &[
    "날짜",
    "일자",
    "거래일",
    "일시",
    "적요",
    "내용",
    "출금",
    "입금",
    "잔액",
    "금액",
    "메모",
    "거래",
    "date",
    "amount",
    "deposit",
    "withdrawal",
    "balance",
    "memo",
    "description",
    "transaction",
];

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("failed to open workbook: {0}")]
    Open(String),

    #[error("workbook has no sheets")]
    NoSheets,

    #[error("no header row found in the first {0} rows")]
    NoHeader(usize),
}

/// Parse the first sheet of a workbook into records plus its header
/// schema.
pub fn parse_workbook(bytes: &[u8], filename: &str) -> Result<(Vec<Record>, Schema), SheetError> {
    let rows = read_first_sheet(bytes, filename)?;
    let header_idx = detect_header_row(&rows).ok_or(SheetError::NoHeader(HEADER_SCAN_ROWS))?;

    // Header cells become column names verbatim (whitespace collapsed);
    // blank header cells and their columns are skipped.
    let columns: Vec<(usize, String)> = rows[header_idx]
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| {
            let name = collapse_whitespace(&display_cell(cell));
            (!name.is_empty()).then_some((i, name))
        })
        .collect();

    let schema: Schema = columns.iter().map(|(_, name)| name.clone()).collect();

    let mut records = Vec::new();
    for row in rows.iter().skip(header_idx + 1) {
        let record: Record = columns
            .iter()
            .map(|(i, name)| {
                let value = row.get(*i).map_or(Value::Text(String::new()), cell_value);
                (name.clone(), value)
            })
            .collect();

        if record.values().all(Value::is_empty) {
            continue;
        }
        records.push(record);
    }

    debug!(
        header_row = header_idx,
        columns = schema.len(),
        records = records.len(),
        "Parsed workbook"
    );

    Ok((records, schema))
}

fn read_first_sheet(bytes: &[u8], filename: &str) -> Result<Vec<Vec<Data>>, SheetError> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let range = match ext.as_str() {
        "xls" => {
            let mut workbook = Xls::new(Cursor::new(bytes))
                .map_err(|e| SheetError::Open(e.to_string()))?;
            first_range(&mut workbook)?
        }
        "xlsb" => {
            let mut workbook = Xlsb::new(Cursor::new(bytes))
                .map_err(|e| SheetError::Open(e.to_string()))?;
            first_range(&mut workbook)?
        }
        "ods" => {
            let mut workbook = Ods::new(Cursor::new(bytes))
                .map_err(|e| SheetError::Open(e.to_string()))?;
            first_range(&mut workbook)?
        }
        // xlsx, xlsm, and anything else that made it past triage
        _ => {
            let mut workbook = Xlsx::new(Cursor::new(bytes))
                .map_err(|e| SheetError::Open(e.to_string()))?;
            first_range(&mut workbook)?
        }
    };

    Ok(range.rows().map(<[Data]>::to_vec).collect())
}

fn first_range<RS, R>(workbook: &mut R) -> Result<calamine::Range<Data>, SheetError>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(SheetError::NoSheets)?;
    workbook
        .worksheet_range(&name)
        .map_err(|e| SheetError::Open(e.to_string()))
}

fn detect_header_row(rows: &[Vec<Data>]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None; // (row index, score)
    for (i, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let score = row
            .iter()
            .filter(|cell| {
                let text = display_cell(cell).to_lowercase();
                !text.is_empty() && HEADER_KEYWORDS.iter().any(|kw| text.contains(kw))
            })
            .count();
        if score >= MIN_HEADER_MATCHES && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

fn display_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::String(s) => coerce(Value::Text(s.clone())),
        other => Value::Text(display_cell(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<Data> {
        cells.iter().map(|c| Data::String(c.to_string())).collect()
    }

    // ── header detection ──

    #[test]
    fn header_row_found_by_keywords() {
        let rows = vec![
            text_row(&["OO은행 거래내역서"]),
            text_row(&["조회기간: 2024.03.01 ~ 2024.03.31"]),
            text_row(&["거래일시", "적요", "출금", "입금", "잔액"]),
            text_row(&["2024.03.01", "급여", "0", "1,500,000", "1,500,000"]),
        ];
        assert_eq!(detect_header_row(&rows), Some(2));
    }

    #[test]
    fn single_keyword_row_not_a_header() {
        let rows = vec![
            text_row(&["거래내역 조회 결과"]),
            text_row(&["some", "cells", "here"]),
        ];
        assert_eq!(detect_header_row(&rows), None);
    }

    #[test]
    fn best_scoring_row_wins() {
        let rows = vec![
            text_row(&["date", "value"]),
            text_row(&["date", "amount", "deposit", "balance", "memo"]),
        ];
        assert_eq!(detect_header_row(&rows), Some(1));
    }

    #[test]
    fn english_headers_recognized() {
        let rows = vec![text_row(&["Date", "Description", "Withdrawal", "Deposit", "Balance"])];
        assert_eq!(detect_header_row(&rows), Some(0));
    }

    #[test]
    fn header_scan_stops_after_limit() {
        let mut rows: Vec<Vec<Data>> = (0..25).map(|_| text_row(&["noise"])).collect();
        rows.push(text_row(&["거래일시", "출금", "입금"]));
        assert_eq!(detect_header_row(&rows), None);
    }

    // ── cell conversion ──

    #[test]
    fn numeric_cells_stay_numbers() {
        assert_eq!(cell_value(&Data::Float(1500000.0)), Value::Number(1_500_000.0));
        assert_eq!(cell_value(&Data::Int(42)), Value::Number(42.0));
    }

    #[test]
    fn numeric_strings_coerced() {
        assert_eq!(
            cell_value(&Data::String("1,500,000".into())),
            Value::Number(1_500_000.0)
        );
        assert_eq!(
            cell_value(&Data::String("급여".into())),
            Value::Text("급여".into())
        );
    }

    #[test]
    fn empty_and_error_cells_become_empty_text() {
        assert_eq!(cell_value(&Data::Empty), Value::Text(String::new()));
        assert!(display_cell(&Data::Empty).is_empty());
    }

    #[test]
    fn integral_floats_display_without_fraction() {
        assert_eq!(display_cell(&Data::Float(1500000.0)), "1500000");
        assert_eq!(display_cell(&Data::Float(12.5)), "12.5");
    }
}
