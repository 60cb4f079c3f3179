//! Turns raw cells into typed field values.
//!
//! Number parsing never fails: dirty input (currency symbols, Brazilian thousand
//! separators, placeholders such as `N/A` or `-`) degrades to `None`.

use crate::core::mapping::{FieldKind, FieldSpec, ResolvedMapping};
use crate::core::reporter::{FailureKind, RecordFailure};
use crate::domain::model::{
    Cell, DependentValue, Field, FieldValue, NaturalKey, NormalizedRecord, SourceRecord,
};

const FLAG_TRUE: &[&str] = &["sim", "s", "yes", "y", "true", "1"];
const FLAG_FALSE: &[&str] = &["não", "nao", "n", "no", "false", "0"];

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Ready(NormalizedRecord),
    /// Natural key missing or blank.
    Skipped { row: usize },
    Invalid(RecordFailure),
}

pub fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => n.is_finite().then_some(*n),
        Cell::Text(s) => parse_number_str(s),
    }
}

/// `"R$ 1.234,56"` → `1234.56`; `"N/A"` → `None`.
pub fn parse_number_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let kept: Vec<char> = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    // A '.' followed later by another separator is a thousands separator.
    let mut cleaned = String::with_capacity(kept.len());
    for (i, c) in kept.iter().enumerate() {
        if *c == '.' && kept[i + 1..].iter().any(|n| matches!(n, '.' | ',')) {
            continue;
        }
        cleaned.push(*c);
    }
    let cleaned = cleaned.replacen(',', ".", 1);

    leading_float(&cleaned).filter(|n| n.is_finite())
}

/// Longest `-?digits[.digits]` prefix, parsed. Trailing garbage is ignored.
fn leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
            digits += 1;
        }
        end = frac;
    }
    if digits == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

fn round_to_scale(value: f64, scale: u32) -> Option<f64> {
    let factor = 10f64.powi(scale as i32);
    let rounded = (value * factor).round() / factor;
    rounded.is_finite().then_some(rounded)
}

/// Trims, maps blank to `None` and caps at `max_length` characters.
/// Whitespace exposed by the cut is trimmed again.
pub fn normalize_text(cell: &Cell, max_length: Option<usize>) -> Option<String> {
    let rendered = cell.render()?;
    let trimmed = rendered.trim();
    let capped = match max_length {
        Some(max) => {
            let cut: String = trimmed.chars().take(max).collect();
            cut.trim_end().to_string()
        }
        None => trimmed.to_string(),
    };
    (!capped.is_empty()).then_some(capped)
}

fn normalize_flag(cell: &Cell, spec: &FieldSpec) -> Option<String> {
    let text = normalize_text(cell, None)?.to_lowercase();
    if FLAG_TRUE.contains(&text.as_str()) {
        Some(spec.true_value.clone().unwrap_or_else(|| "S".to_string()))
    } else if FLAG_FALSE.contains(&text.as_str()) {
        Some(spec.false_value.clone().unwrap_or_else(|| "N".to_string()))
    } else {
        None
    }
}

pub fn normalize_field(cell: &Cell, spec: &FieldSpec) -> FieldValue {
    match spec.kind {
        FieldKind::Text => FieldValue::Text(normalize_text(cell, spec.max_length)),
        FieldKind::Number => {
            let parsed = parse_number(cell);
            FieldValue::Number(match spec.scale {
                Some(scale) => parsed.and_then(|n| round_to_scale(n, scale)),
                None => parsed,
            })
        }
        FieldKind::Flag => FieldValue::Text(
            normalize_flag(cell, spec).map(|v| match spec.max_length {
                Some(max) => v.chars().take(max).collect(),
                None => v,
            }),
        ),
    }
}

pub struct Normalizer {
    mapping: ResolvedMapping,
}

impl Normalizer {
    pub fn new(mapping: ResolvedMapping) -> Self {
        Self { mapping }
    }

    pub fn normalize(&self, record: &SourceRecord) -> Normalized {
        let key_field = self.mapping.key_field();
        let key = normalize_text(record.cell(key_field.column_index), key_field.spec.max_length)
            .and_then(|raw| NaturalKey::parse(&raw));
        let Some(key) = key else {
            return Normalized::Skipped { row: record.row };
        };

        let mut fields = Vec::with_capacity(self.mapping.fields.len());
        let mut empty_required = Vec::new();
        for resolved in &self.mapping.fields {
            let value = normalize_field(record.cell(resolved.column_index), &resolved.spec);
            if resolved.spec.required && value.is_null() {
                empty_required.push(resolved.spec.field.as_str());
            }
            fields.push(Field {
                name: resolved.spec.field.clone(),
                value,
            });
        }

        if !empty_required.is_empty() {
            return Normalized::Invalid(RecordFailure {
                file: record.file.clone(),
                row: Some(record.row),
                key: Some(key.to_string()),
                batch: None,
                kind: FailureKind::InvalidRecord,
                message: format!(
                    "required field(s) empty or not a valid value: {}",
                    empty_required.join(", ")
                ),
            });
        }

        let max_length = self.mapping.dependents.as_ref().and_then(|d| d.max_length);
        let dependents = self
            .mapping
            .dependent_columns
            .iter()
            .filter_map(|index| normalize_text(record.cell(*index), max_length))
            .enumerate()
            .map(|(i, value)| DependentValue {
                position: i + 1,
                value,
            })
            .collect();

        Normalized::Ready(NormalizedRecord {
            file: record.file.clone(),
            row: record.row,
            key,
            fields,
            dependents,
        })
    }
}
