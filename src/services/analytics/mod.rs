pub mod engine;
pub mod types;

pub use engine::{classify_column, compute_analytics};
pub use types::{AnalyticsSummary, Cell, ColumnKind, ColumnStat, ColumnSummary, SpreadsheetTable};
