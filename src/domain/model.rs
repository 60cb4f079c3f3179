use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw spreadsheet cell, tagged at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text rendering used for string fields and keys. Integral numbers drop the fraction.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Cell::Number(n) => Some(n.to_string()),
            Cell::Empty => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// A data row positionally aligned with `SourceTable::headers`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Workbook the row came from, set when several are merged.
    pub file: Option<String>,
    /// 1-based row number in the sheet, for error reports.
    pub row: usize,
    pub cells: Vec<Cell>,
}

impl SourceRecord {
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub records: Vec<SourceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(Option<String>),
    Number(Option<f64>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Text(None) | FieldValue::Number(None))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => v.as_deref(),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => *v,
            FieldValue::Text(_) => None,
        }
    }
}

/// Non-empty, trimmed natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Auxiliary value for the one-to-many dependents table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentValue {
    /// 1-based ordinal.
    pub position: usize,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub row: usize,
    pub key: NaturalKey,
    /// In mapping order; the natural key field is included.
    pub fields: Vec<Field>,
    pub dependents: Vec<DependentValue>,
}

impl NormalizedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based.
    pub number: usize,
    pub records: Vec<NormalizedRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What a successful upsert wrote besides the parent row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub dependents_written: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_render_drops_integral_fraction() {
        assert_eq!(Cell::Number(42.0).render().as_deref(), Some("42"));
        assert_eq!(Cell::Number(7.5).render().as_deref(), Some("7.5"));
        assert_eq!(Cell::Empty.render(), None);
    }

    #[test]
    fn test_natural_key_rejects_blank() {
        assert!(NaturalKey::parse("   ").is_none());
        assert_eq!(NaturalKey::parse(" MLB123 ").unwrap().as_str(), "MLB123");
    }
}
