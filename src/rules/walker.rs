//! Deterministic line walker applying one issuer rule to extracted text.
//!
//! Transaction starts are found by the rule's date pattern; the declared
//! columns are then harvested from the same line (row-wise layouts) or
//! from the following lines (line-separated layouts). Numeric-role
//! columns go through the shared numeric coercion; a row whose shape
//! doesn't line up is skipped rather than guessed at.

use std::sync::OnceLock;

use regex::Regex;

use crate::schema::{coerce, parse_numeric};
use crate::types::{Record, Value};

use super::{ColumnSpec, IssuerRule, StructureHint};

/// `HH:MM` (optionally `:SS`) — merged into the date cell when it trails
/// the date token.
fn time_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$").expect("valid time regex"))
}

/// Two-or-more spaces or a tab — column gaps in tabular layouts.
fn tabular_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t|\s{2,}").expect("valid gap regex"))
}

pub fn parse(text: &str, rule: &IssuerRule) -> Vec<Record> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match rule.structure {
        StructureHint::SpaceSeparated | StructureHint::Tabular => parse_rowwise(&lines, rule),
        StructureHint::LineSeparated => parse_linewise(&lines, rule),
    }
}

fn parse_rowwise(lines: &[&str], rule: &IssuerRule) -> Vec<Record> {
    let mut records = Vec::new();
    for line in lines {
        if !rule.date_pattern.is_match(line) {
            continue;
        }
        let tokens: Vec<&str> = match rule.structure {
            StructureHint::Tabular => tabular_gap_re()
                .split(line)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect(),
            _ => line.split_whitespace().collect(),
        };
        if let Some(record) = assign_tokens(&tokens, &rule.columns) {
            records.push(record);
        }
    }
    records
}

/// Map one row's tokens onto the declared columns.
///
/// The first column takes the date token (plus a trailing time token when
/// present); trailing numeric-role columns take the last tokens; whatever
/// sits between is joined into the text column(s).
fn assign_tokens(tokens: &[&str], columns: &[ColumnSpec]) -> Option<Record> {
    let trailing_numeric = columns
        .iter()
        .rev()
        .take_while(|c| c.role.is_numeric())
        .count();

    let mut date_cell = (*tokens.first()?).to_string();
    let mut consumed = 1;
    if tokens
        .get(1)
        .is_some_and(|t| time_token_re().is_match(t))
    {
        date_cell.push(' ');
        date_cell.push_str(tokens[1]);
        consumed = 2;
    }

    if tokens.len() < consumed + trailing_numeric {
        return None;
    }

    let numeric_start = tokens.len() - trailing_numeric;
    let middle = &tokens[consumed..numeric_start];
    let middle_columns = &columns[1..columns.len() - trailing_numeric];

    let mut record = Record::with_capacity(columns.len());
    record.insert(columns[0].name.clone(), Value::Text(date_cell));

    match middle_columns.len() {
        0 => {
            if !middle.is_empty() {
                // Tokens with nowhere to go — shape mismatch.
                return None;
            }
        }
        1 => {
            record.insert(
                middle_columns[0].name.clone(),
                Value::Text(middle.join(" ")),
            );
        }
        n => {
            // One token per column; the last column absorbs the overflow.
            for (i, column) in middle_columns.iter().enumerate() {
                let cell = if i + 1 == n {
                    middle.get(i..).map(|rest| rest.join(" ")).unwrap_or_default()
                } else {
                    middle.get(i).map(|t| (*t).to_string()).unwrap_or_default()
                };
                record.insert(column.name.clone(), Value::Text(cell));
            }
        }
    }

    for (token, column) in tokens[numeric_start..]
        .iter()
        .zip(&columns[columns.len() - trailing_numeric..])
    {
        let value = match parse_numeric(token) {
            Some(n) => Value::Number(n),
            // A non-numeric token in a numeric slot means the row is not
            // a transaction after all.
            None => return None,
        };
        record.insert(column.name.clone(), value);
    }

    Some(record)
}

fn parse_linewise(lines: &[&str], rule: &IssuerRule) -> Vec<Record> {
    let mut records = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !rule.date_pattern.is_match(lines[i]) {
            i += 1;
            continue;
        }

        let mut cells: Vec<&str> = vec![lines[i]];
        let mut j = i + 1;
        while j < lines.len()
            && cells.len() < rule.columns.len()
            && !rule.date_pattern.is_match(lines[j])
        {
            cells.push(lines[j]);
            j += 1;
        }

        if cells.len() == rule.columns.len() {
            let record: Record = rule
                .columns
                .iter()
                .zip(&cells)
                .map(|(column, cell)| {
                    let value = if column.role.is_numeric() {
                        coerce(Value::Text((*cell).to_string()))
                    } else {
                        Value::Text((*cell).to_string())
                    };
                    (column.name.clone(), value)
                })
                .collect();
            records.push(record);
        }

        i = j.max(i + 1);
    }
    records
}
