// Spreadsheet reading (xlsx, xls) into raw rows.
//
// Only the first worksheet is read. The first non-blank row is the header;
// blank data rows are skipped. Cell values are flattened to text here so the
// transformer works on one representation regardless of how Excel typed them.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Days, NaiveDate};

use crate::error::IngestError;
use crate::model::{RawRow, RowSet};
use crate::normalize::header_key;

/// Parse an uploaded workbook. Fails with `MalformedFile` when the bytes are
/// not a readable workbook or the first sheet has no data rows.
pub fn read_rows(bytes: &[u8]) -> Result<RowSet, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::MalformedFile(format!("cannot open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::MalformedFile("workbook contains no sheets".into()))?
        .map_err(|e| IngestError::MalformedFile(format!("cannot read first sheet: {e}")))?;

    // Range start offset (data may not begin at A1)
    let first_line = range.start().map(|(r, _)| r as usize + 1).unwrap_or(1);

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (idx, cells) in range.rows().enumerate() {
        let line = first_line + idx;
        let values: Vec<String> = cells.iter().map(cell_text).collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        match headers {
            None => headers = Some(values.iter().map(|h| header_key(h)).collect()),
            Some(ref names) => {
                let fields = names
                    .iter()
                    .zip(values)
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, value)| (name.clone(), value))
                    .collect();
                rows.push(RawRow::new(line, fields));
            }
        }
    }

    let headers: Vec<String> = headers
        .ok_or_else(|| IngestError::MalformedFile("first sheet is empty".into()))?
        .into_iter()
        .filter(|h| !h.is_empty())
        .collect();

    if rows.is_empty() {
        return Err(IngestError::MalformedFile(
            "first sheet has a header row but no data rows".into(),
        ));
    }

    log::debug!("read {} data rows, {} columns", rows.len(), headers.len());
    Ok(RowSet { headers, rows })
}

/// Flatten one cell to text.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(n) => {
            // Integers without decimals: document numbers and grades
            // arrive as floats from most exports.
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => serial_to_iso(dt.as_f64()).unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.get(..10).unwrap_or(s).to_string(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Excel 1900-system serial -> `YYYY-MM-DD`.
fn serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // Day 0 is 1899-12-30 once Excel's phantom 1900-02-29 is accounted for.
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_days(Days::new(serial.floor() as u64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_cells_lose_trailing_zero_decimals() {
        assert_eq!(cell_text(&Data::Float(1_112_233_445.0)), "1112233445");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
    }

    #[test]
    fn excel_serial_dates() {
        assert_eq!(serial_to_iso(45_292.0).as_deref(), Some("2024-01-01"));
        assert_eq!(serial_to_iso(39_448.75).as_deref(), Some("2008-01-01"));
        assert_eq!(serial_to_iso(0.0), None);
        assert_eq!(serial_to_iso(f64::NAN), None);
    }

    #[test]
    fn iso_datetime_cells_keep_the_date_part() {
        assert_eq!(cell_text(&Data::DateTimeIso("2015-03-09T00:00:00".into())), "2015-03-09");
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = read_rows(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, IngestError::MalformedFile(_)));
    }
}
