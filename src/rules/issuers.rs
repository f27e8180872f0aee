//! Built-in issuer rules for common Korean retail-bank statement layouts.

use regex::Regex;

use super::{ColumnRole, ColumnSpec, IssuerRule, StructureHint};

fn columns(specs: &[(&str, ColumnRole)]) -> Vec<ColumnSpec> {
    specs
        .iter()
        .map(|(name, role)| ColumnSpec {
            name: (*name).to_string(),
            role: *role,
        })
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn date(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid issuer date pattern")
}

pub fn builtin_rules() -> Vec<IssuerRule> {
    vec![
        IssuerRule {
            id: "kookmin".into(),
            aliases: strings(&["KB국민은행", "국민은행", "KB은행", "Kookmin"]),
            columns: columns(&[
                ("거래일시", ColumnRole::Date),
                ("적요", ColumnRole::Text),
                ("출금", ColumnRole::AmountOut),
                ("입금", ColumnRole::AmountIn),
                ("잔액", ColumnRole::Balance),
            ]),
            structure: StructureHint::SpaceSeparated,
            signature_keywords: strings(&["KB국민은행"]),
            header_keywords: strings(&["거래일시", "적요", "출금", "입금", "잔액"]),
            date_pattern: date(r"^\d{4}\.\d{2}\.\d{2}"),
        },
        IssuerRule {
            id: "shinhan".into(),
            aliases: strings(&["신한은행", "Shinhan"]),
            columns: columns(&[
                ("거래일자", ColumnRole::Date),
                ("내용", ColumnRole::Text),
                ("출금액", ColumnRole::AmountOut),
                ("입금액", ColumnRole::AmountIn),
                ("잔액", ColumnRole::Balance),
            ]),
            structure: StructureHint::SpaceSeparated,
            signature_keywords: strings(&["신한은행 거래내역"]),
            header_keywords: strings(&["거래일자", "내용", "출금액", "입금액", "잔액"]),
            date_pattern: date(r"^\d{4}-\d{2}-\d{2}"),
        },
        IssuerRule {
            id: "woori".into(),
            aliases: strings(&["우리은행", "Woori"]),
            columns: columns(&[
                ("거래일시", ColumnRole::Date),
                ("기재내용", ColumnRole::Text),
                ("지급금액", ColumnRole::AmountOut),
                ("입금금액", ColumnRole::AmountIn),
                ("거래후잔액", ColumnRole::Balance),
            ]),
            structure: StructureHint::Tabular,
            signature_keywords: strings(&["우리은행 거래내역"]),
            header_keywords: strings(&["거래일시", "기재내용", "지급금액", "입금금액", "거래후잔액"]),
            date_pattern: date(r"^\d{4}[.\-]\d{2}[.\-]\d{2}"),
        },
        IssuerRule {
            id: "kakaobank".into(),
            aliases: strings(&["카카오뱅크", "KakaoBank"]),
            columns: columns(&[
                ("거래일시", ColumnRole::Date),
                ("내용", ColumnRole::Text),
                ("거래금액", ColumnRole::AmountIn),
                ("거래후잔액", ColumnRole::Balance),
            ]),
            structure: StructureHint::LineSeparated,
            signature_keywords: strings(&["카카오뱅크"]),
            header_keywords: strings(&["거래일시", "내용", "거래금액", "거래후잔액"]),
            date_pattern: date(r"^\d{4}\.\d{2}\.\d{2}"),
        },
    ]
}
