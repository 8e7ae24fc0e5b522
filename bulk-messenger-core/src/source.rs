//! Contact sheet loading
//!
//! Reads the first worksheet of a spreadsheet (`.xlsx`, `.xlsm`, `.xlsb`,
//! `.xls`, `.ods`) or a `.csv` file. The first non-blank row is the header and
//! must contain a `Number` column; every later row with a non-empty value in
//! that column becomes one [`Contact`], in sheet order.
//!
//! Numbers are kept as written. Numeric cells are rendered without a
//! fractional part, so `9876543210.0` becomes `9876543210`.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::contact::{Contact, ContactList};
use crate::error::SourceReadError;

/// Header of the column holding phone numbers
pub const NUMBER_COLUMN: &str = "Number";

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Load contacts from a spreadsheet or CSV file
///
/// A file with no rows yields an empty list; starting a run with it is
/// rejected later.
pub fn load(path: impl AsRef<Path>) -> Result<ContactList, SourceReadError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SourceReadError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = if extension == "csv" {
        read_csv(path)?
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        read_workbook(path)?
    } else {
        return Err(SourceReadError::UnsupportedFormat(extension));
    };

    let contacts = contacts_from_rows(rows)?;
    info!(
        "Loaded {} contacts from {}",
        contacts.len(),
        path.display()
    );
    Ok(contacts)
}

fn unreadable(path: &Path, reason: impl ToString) -> SourceReadError {
    SourceReadError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, SourceReadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SourceReadError::NoWorksheet)?
        .map_err(|e| unreadable(path, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, SourceReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| unreadable(path, e))?;

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(|field| field.trim().to_string()).collect())
                .map_err(|e| unreadable(path, e))
        })
        .collect()
}

/// Text of a cell as an operator would read it
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

fn contacts_from_rows(rows: Vec<Vec<String>>) -> Result<ContactList, SourceReadError> {
    let mut rows = rows
        .into_iter()
        .enumerate()
        .skip_while(|(_, row)| row.iter().all(|cell| cell.trim().is_empty()));

    let Some((_, header)) = rows.next() else {
        return Ok(ContactList::default());
    };

    let column = header
        .iter()
        .position(|h| h.trim() == NUMBER_COLUMN)
        .or_else(|| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(NUMBER_COLUMN))
        })
        .ok_or_else(|| SourceReadError::MissingColumn(NUMBER_COLUMN.to_string()))?;

    let mut contacts = ContactList::default();
    for (line, row) in rows {
        match row.get(column).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            Some(number) => contacts.push(number),
            None => debug!("Skipping row {} without a {}", line + 1, NUMBER_COLUMN),
        }
    }
    Ok(contacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_number_column_anywhere() {
        let list = contacts_from_rows(rows(&[
            &["Name", "Number"],
            &["Asha", "9876543210"],
            &["Ravi", "+91 91234 56789"],
        ]))
        .unwrap();
        let numbers: Vec<_> = list.iter().map(Contact::raw_number).collect();
        assert_eq!(numbers, vec!["9876543210", "+91 91234 56789"]);
    }

    #[test]
    fn test_blank_numbers_skipped() {
        let list = contacts_from_rows(rows(&[
            &["Number"],
            &["111"],
            &[""],
            &["  "],
            &["222"],
        ]))
        .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_short_rows_skipped() {
        let list = contacts_from_rows(rows(&[&["Name", "Number"], &["only name"], &["x", "333"]]))
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).map(Contact::raw_number), Some("333"));
    }

    #[test]
    fn test_leading_blank_rows() {
        let list = contacts_from_rows(rows(&[&["", ""], &["number"], &["444"]])).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_missing_column() {
        let result = contacts_from_rows(rows(&[&["Name", "Phone"], &["a", "1"]]));
        assert!(matches!(result, Err(SourceReadError::MissingColumn(c)) if c == "Number"));
    }

    #[test]
    fn test_empty_sheet() {
        assert!(contacts_from_rows(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(9876543210.0)), "9876543210");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::String(" 98765 ".into())), "98765");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.txt");
        std::fs::write(&path, "Number\n1\n").unwrap();
        assert!(matches!(
            load(&path),
            Err(SourceReadError::UnsupportedFormat(ext)) if ext == "txt"
        ));
    }

    #[test]
    fn test_not_found() {
        assert!(matches!(
            load("/nonexistent/contacts.xlsx"),
            Err(SourceReadError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.xlsx");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(matches!(load(&path), Err(SourceReadError::Unreadable { .. })));
    }
}
