use std::path::Path;
use calamine::Data;
use uuid::Uuid;
use crate::services::analytics::Cell;
use super::types::{SPREADSHEET_EXTENSIONS, SPREADSHEET_MIMETYPES};

/// Converts a calamine value into an analytics cell.
///
/// Dates keep their Excel serial number so they aggregate like numbers.
pub fn cell_from_data(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::DateTime(d) => Cell::Number(d.as_f64()),
        Data::String(s) => Cell::text(s.as_str()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// Header label for column `idx`; blank headers get a positional name.
pub fn header_name(value: &Data, idx: usize) -> String {
    let name = match value {
        Data::Empty => String::new(),
        other => cell_from_data(other).render().trim().to_string(),
    };

    if name.is_empty() {
        format!("Column {}", idx + 1)
    } else {
        name
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Accepts uploads that either claim a spreadsheet mimetype or carry an Excel extension.
pub fn is_spreadsheet_upload(original_name: &str, mimetype: &str) -> bool {
    SPREADSHEET_MIMETYPES.contains(&mimetype)
        || extension(original_name)
            .map_or(false, |ext| SPREADSHEET_EXTENSIONS.contains(&ext.as_str()))
}

/// Unique on-disk name for an upload, keeping the original extension.
pub fn stored_filename(original_name: &str) -> String {
    let suffix = format!("{}-{}", chrono::Utc::now().timestamp_millis(), Uuid::new_v4().simple());
    match extension(original_name) {
        Some(ext) => format!("file-{}.{}", suffix, ext),
        None => format!("file-{}", suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_calamine_values() {
        assert_eq!(cell_from_data(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(cell_from_data(&Data::Float(2.5)), Cell::Number(2.5));
        assert_eq!(cell_from_data(&Data::String(String::new())), Cell::Empty);
        assert_eq!(cell_from_data(&Data::String("LA".into())), Cell::Text("LA".into()));
        assert_eq!(cell_from_data(&Data::Bool(true)), Cell::Text("true".into()));
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
    }

    #[test]
    fn blank_headers_are_named_by_position() {
        assert_eq!(header_name(&Data::String("  City ".into()), 0), "City");
        assert_eq!(header_name(&Data::Empty, 2), "Column 3");
        assert_eq!(header_name(&Data::String("   ".into()), 0), "Column 1");
        assert_eq!(header_name(&Data::Int(2024), 1), "2024");
    }

    #[test]
    fn accepts_excel_uploads_only() {
        assert!(is_spreadsheet_upload("report.XLSX", "application/octet-stream"));
        assert!(is_spreadsheet_upload("legacy.xls", ""));
        assert!(is_spreadsheet_upload("blob", SPREADSHEET_MIMETYPES[0]));
        assert!(!is_spreadsheet_upload("notes.csv", "text/csv"));
    }

    #[test]
    fn stored_names_are_unique_and_keep_extension() {
        let a = stored_filename("Sales Q1.xlsx");
        let b = stored_filename("Sales Q1.xlsx");
        assert!(a.starts_with("file-") && a.ends_with(".xlsx"));
        assert_ne!(a, b);
        assert!(!stored_filename("noext").contains('.'));
    }
}
