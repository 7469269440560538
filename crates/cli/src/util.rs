use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Widest column allowed when rendering tables to the terminal.
pub(crate) const MAX_COLUMN_WIDTH: usize = 40;

/// Fit a table cell to exactly `width` display columns. Long site names are
/// clipped with a ".." marker when there is room for one; short cells are
/// padded with spaces.
pub(crate) fn fit_cell(cell: &str, width: usize) -> String {
    let full = UnicodeWidthStr::width(cell);
    if full <= width {
        return format!("{cell}{}", " ".repeat(width - full));
    }

    let marker = if width >= 3 { ".." } else { "" };
    let budget = width - marker.len();
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in cell.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            break;
        }
        out.push(ch);
        used += cw;
    }
    out.push_str(marker);
    used += marker.len();
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

/// Render rows as an aligned text table with a header rule.
pub(crate) fn format_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> =
        columns.iter().map(|c| UnicodeWidthStr::width(c.as_str())).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(UnicodeWidthStr::width(cell.as_str()));
            }
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_COLUMN_WIDTH);
    }

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| fit_cell(cell, *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = render(columns);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&render(row));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_cell_pads_accented_names_by_display_width() {
        assert_eq!(fit_cell("MAÑANA", 8), "MAÑANA  ");
        assert_eq!(UnicodeWidthStr::width(fit_cell("MAÑANA", 8).as_str()), 8);
    }

    #[test]
    fn test_fit_cell_clips_long_site_names() {
        assert_eq!(fit_cell("INSTITUCION EDUCATIVA", 10), "INSTITUC..");
        assert_eq!(fit_cell("SEDE", 4), "SEDE");
        assert_eq!(fit_cell("SEDE", 2), "SE");
        assert_eq!(fit_cell("SEDE", 0), "");
    }

    #[test]
    fn test_long_cells_are_clipped_to_the_column_cap() {
        let name = "INSTITUCION EDUCATIVA TECNICA AGROPECUARIA SAN JOSE SEDE A";
        let table = format_table(&["site".to_string()], &[vec![name.to_string()]]);
        let row = table.lines().nth(2).unwrap();
        assert_eq!(UnicodeWidthStr::width(row), MAX_COLUMN_WIDTH);
        assert!(row.ends_with(".."), "{row}");
    }

    #[test]
    fn test_format_table_aligns_columns() {
        let columns = vec!["code".to_string(), "site".to_string()];
        let rows = vec![
            vec!["Y1".to_string(), "SEDE NORTE".to_string()],
            vec!["Y22".to_string(), "PEÑAS".to_string()],
        ];
        let table = format_table(&columns, &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "code  site");
        assert_eq!(lines[1], "----  ----------");
        assert_eq!(lines[2], "Y1    SEDE NORTE");
        assert_eq!(lines[3], "Y22   PEÑAS");
    }
}
