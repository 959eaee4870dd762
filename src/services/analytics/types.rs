use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A single spreadsheet value after normalization.
///
/// Serialized untagged, so a row reads as plain JSON: `[12, "LA", null]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

pub(crate) static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// Normalizes a raw text value: the empty string is an empty cell.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The finite number this cell holds or spells out, if any.
    ///
    /// Text is trimmed before parsing; `"inf"` and `"NaN"` are not numbers.
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value).filter(|v| v.is_finite()),
            Cell::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite()),
            Cell::Empty => None,
        }
    }

    /// String form used for ordinal comparison in text columns.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Cell::Number(value) => Cow::Owned(value.to_string()),
            Cell::Text(text) => Cow::Borrowed(text.as_str()),
            Cell::Empty => Cow::Borrowed(""),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::text(value)
    }
}

/// Header row plus data rows of one decoded sheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpreadsheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SpreadsheetTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Cell at `(row, column)`; positions past the end of a short row are empty.
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Number,
    Text,
}

/// Kind-specific statistics, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnSummary {
    Number {
        #[serde(deserialize_with = "nullable_f64")]
        average: f64,
        #[serde(deserialize_with = "nullable_f64")]
        sum: f64,
        min: f64,
        max: f64,
    },
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<String>,
    },
}

/// Reads back an aggregate that overflowed: JSON writes non-finite floats as `null`.
fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStat {
    pub name: String,
    #[serde(rename = "nonEmpty")]
    pub non_empty_count: usize,
    #[serde(rename = "unique")]
    pub unique_count: usize,
    #[serde(flatten)]
    pub summary: ColumnSummary,
}

impl ColumnStat {
    pub fn kind(&self) -> ColumnKind {
        match self.summary {
            ColumnSummary::Number { .. } => ColumnKind::Number,
            ColumnSummary::Text { .. } => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub non_empty_cells: usize,
    pub empty_cells: usize,
    pub column_stats: Vec<ColumnStat>,
}
