// XLSX export of cleaned rows and per-site statistics

use std::path::Path;

use rust_xlsxwriter::{Format, FormatBorder, Workbook, Worksheet};

use roster_ingest::model::{CleanedRow, EducationLevel, SiteStatistics};

const ROWS_SHEET: &str = "Rows";
const STATISTICS_SHEET: &str = "Statistics";

const ROW_HEADERS: &[&str] = &[
    "Line",
    "ETC",
    "Municipality",
    "Institution",
    "Site",
    "Site code",
    "Document type",
    "Document",
    "First name",
    "Second name",
    "First surname",
    "Second surname",
    "Birth date",
    "Age",
    "Gender",
    "Grade",
    "Level",
    "Shift",
    "AM",
    "PM",
    "Lunch",
    "Reinforcement",
    "Focalization",
];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportResult {
    pub rows_exported: usize,
    pub sites_exported: usize,
}

/// Write `rows` to a "Rows" sheet and, when given, `statistics` to a
/// "Statistics" sheet with one column per education level.
pub fn export(
    rows: &[CleanedRow],
    statistics: &[SiteStatistics],
    path: &Path,
) -> Result<ExportResult, String> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold().set_border_bottom(FormatBorder::Thin);
    let mut result = ExportResult::default();

    {
        let sheet = workbook
            .add_worksheet()
            .set_name(ROWS_SHEET)
            .map_err(|e| format!("Failed to create sheet '{}': {}", ROWS_SHEET, e))?;
        write_header(sheet, ROW_HEADERS, &header)?;
        for (i, row) in rows.iter().enumerate() {
            write_row(sheet, i as u32 + 1, row)?;
        }
        sheet
            .set_freeze_panes(1, 0)
            .map_err(|e| format!("Failed to freeze header: {}", e))?;
        result.rows_exported = rows.len();
    }

    if !statistics.is_empty() {
        let mut headers = vec!["Site", "Canonical site", "Total"];
        headers.extend(EducationLevel::ALL.iter().map(|l| l.label()));

        let sheet = workbook
            .add_worksheet()
            .set_name(STATISTICS_SHEET)
            .map_err(|e| format!("Failed to create sheet '{}': {}", STATISTICS_SHEET, e))?;
        write_header(sheet, &headers, &header)?;
        for (i, stats) in statistics.iter().enumerate() {
            let r = i as u32 + 1;
            sheet.write_string(r, 0, &stats.site).map_err(cell_err)?;
            sheet
                .write_string(r, 1, stats.canonical_name.as_deref().unwrap_or(""))
                .map_err(cell_err)?;
            sheet.write_number(r, 2, stats.total as f64).map_err(cell_err)?;
            for (j, level) in EducationLevel::ALL.iter().enumerate() {
                let count = stats.by_level.get(level).copied().unwrap_or(0);
                sheet.write_number(r, 3 + j as u16, count as f64).map_err(cell_err)?;
            }
        }
        result.sites_exported = statistics.len();
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;

    log::info!(
        "exported {} rows and {} sites to {}",
        result.rows_exported,
        result.sites_exported,
        path.display()
    );
    Ok(result)
}

fn cell_err(e: rust_xlsxwriter::XlsxError) -> String {
    format!("Failed to write cell: {}", e)
}

fn write_header(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<(), String> {
    for (col, title) in headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, format)
            .map_err(cell_err)?;
    }
    Ok(())
}

fn write_row(sheet: &mut Worksheet, r: u32, row: &CleanedRow) -> Result<(), String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let flag = |b: bool| if b { "X" } else { "" }.to_string();

    let text = [
        row.etc_code.clone(),
        opt(&row.municipality),
        row.institution.clone(),
        row.site.clone(),
        opt(&row.site_code),
        opt(&row.document_type),
        row.document_number.clone(),
        row.first_name.clone(),
        opt(&row.second_name),
        row.first_surname.clone(),
        opt(&row.second_surname),
        opt(&row.birth_date),
        opt(&row.age),
        opt(&row.gender),
        row.grade_group.clone(),
        row.education_level.label().to_string(),
        opt(&row.shift),
        flag(row.flags.am),
        flag(row.flags.pm),
        flag(row.flags.lunch),
        flag(row.flags.reinforcement),
        row.focalization.clone(),
    ];

    sheet.write_number(r, 0, row.line as f64).map_err(cell_err)?;
    for (i, value) in text.iter().enumerate() {
        // Document numbers stay text so leading zeros survive
        sheet.write_string(r, i as u16 + 1, value).map_err(cell_err)?;
    }
    Ok(())
}
