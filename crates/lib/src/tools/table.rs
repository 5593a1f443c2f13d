//! Pipe-table text to spreadsheet rows.
//!
//! Agents often pass a whole markdown table as one cell to `append_to_sheet`.
//! That shape is split into a header row and one row per table line; the
//! Driver and Points columns are cleaned up for standings tables.

use once_cell::sync::Lazy;
use regex::Regex;

/// A standalone three-letter uppercase token ("VER").
static DRIVER_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3}\b").unwrap());

/// Reformat `values` when it is a single cell of pipe-table text; otherwise return it unchanged.
pub fn normalize_rows(values: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let cell = match values.as_slice() {
        [row] => match row.as_slice() {
            [cell] if cell.contains('|') => cell.clone(),
            _ => return values,
        },
        _ => return values,
    };

    let mut lines = cell
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_separator(l))
        .map(split_cells);
    let Some(header) = lines.next() else {
        return values;
    };
    let driver_col = column(&header, "driver");
    let points_col = column(&header, "points");

    let mut rows = vec![header];
    for mut row in lines {
        if let Some(cell) = driver_col.and_then(|i| row.get_mut(i)) {
            *cell = strip_driver_code(cell);
        }
        if let Some(cell) = points_col.and_then(|i| row.get_mut(i)) {
            *cell = points_digits(cell);
        }
        rows.push(row);
    }
    rows
}

/// `|---|:---:|` style markdown separator.
fn is_separator(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| matches!(c, '-' | '|' | ':' | ' '))
}

fn split_cells(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

fn column(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn strip_driver_code(cell: &str) -> String {
    let cell = DRIVER_CODE.replace_all(cell, "");
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn points_digits(cell: &str) -> String {
    cell.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect()
}
