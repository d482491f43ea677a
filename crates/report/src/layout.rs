use crate::{Cell, Column, RenderError, Table};
use rust_xlsxwriter::column_number_to_name;
use std::collections::HashSet;

/// Name of the sheet holding rows from every instance.
pub const GLOBAL_SHEET_NAME: &str = "AllInstances";
/// Longest sheet name a workbook accepts, in characters.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

const WIDTH_PADDING: usize = 2;
const MAX_MEASURED_WIDTH: usize = 100;
const MAX_COLUMN_WIDTH: f64 = 60.0;
const MIN_WRAPPED_WIDTH: f64 = 80.0;

/// Maps a free-text instance label onto a valid sheet name: truncated to
/// `MAX_SHEET_NAME_CHARS`, with characters a sheet name may not contain
/// replaced by `_`.
pub fn sanitize_sheet_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .take(MAX_SHEET_NAME_CHARS)
        .map(|c| match c {
            '/' | '\\' | ':' | '[' | ']' | '*' | '?' => '_',
            c => c,
        })
        .collect();

    // Apostrophes may appear inside a sheet name, but not at either end.
    if name.starts_with('\'') {
        name.replace_range(..1, "_");
    }
    if name.ends_with('\'') {
        name.replace_range(name.len() - 1.., "_");
    }

    if name.trim().is_empty() {
        "Instance".to_string()
    } else if name.eq_ignore_ascii_case("history") {
        // Reserved by Excel.
        format!("{name}_")
    } else {
        name
    }
}

/// Hands out unique sheet names for a single workbook.
/// Sheet names compare case-insensitively, so collisions are resolved
/// ignoring case by appending ` (2)`, ` (3)`, ... within the length limit.
#[derive(Debug, Default)]
pub struct SheetNames {
    taken: HashSet<String>,
}

impl SheetNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, label: &str) -> String {
        let base = sanitize_sheet_name(label);
        let mut candidate = base.clone();
        let mut attempt = 1;

        while self.taken.contains(&candidate.to_lowercase()) {
            attempt += 1;
            let suffix = format!(" ({attempt})");
            let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
            candidate = base.chars().take(keep).collect::<String>() + &suffix;
        }
        self.taken.insert(candidate.to_lowercase());
        candidate
    }
}

/// Width of a column: the longest of its header and displayed values, plus
/// padding. Ordinary columns are capped at 60; wrapped columns are at least 80.
pub fn column_width<'a>(column: &Column, cells: impl IntoIterator<Item = &'a Cell>) -> f64 {
    let longest = cells
        .into_iter()
        .map(|cell| cell.display().chars().count())
        .chain(std::iter::once(column.name.chars().count()))
        .max()
        .unwrap_or_default();

    let measured = (longest + WIDTH_PADDING).min(MAX_MEASURED_WIDTH) as f64;
    if column.wrap {
        measured.max(MIN_WRAPPED_WIDTH)
    } else {
        measured.min(MAX_COLUMN_WIDTH)
    }
}

/// Rows whose status column holds exactly `failure_literal` are highlighted.
///
/// The comparison is case-sensitive in both `matches` and the workbook rule.
/// Should upstream status labels change casing, rows silently stop being
/// highlighted.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub status_column: String,
    pub failure_literal: String,
}

impl Highlight {
    pub fn new(status_column: impl Into<String>, failure_literal: impl Into<String>) -> Self {
        Self {
            status_column: status_column.into(),
            failure_literal: failure_literal.into(),
        }
    }

    pub fn matches(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Text(text) => *text == self.failure_literal,
            _ => false,
        }
    }

    /// Conditional rule anchored at the first data row, for a status column
    /// at `status_index`. `EXACT` keeps the workbook's comparison as
    /// case-sensitive as `matches`.
    pub fn formula(&self, status_index: usize) -> String {
        format!(
            r#"=EXACT(${}2,"{}")"#,
            column_number_to_name(status_index as u16),
            self.failure_literal.replace('"', r#""""#)
        )
    }
}

/// Everything about a sheet's presentation that doesn't require a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub name: String,
    pub widths: Vec<f64>,
    pub status_index: usize,
    /// Conditional highlighting rule over the data range.
    pub formula: String,
    /// Zero-based indices of data rows the rule highlights.
    pub highlighted: Vec<usize>,
}

impl SheetLayout {
    pub fn plan(name: String, table: &Table, highlight: &Highlight) -> Result<Self, RenderError> {
        let status_index = table.column_index(&highlight.status_column).ok_or_else(|| {
            RenderError::MissingStatusColumn {
                column: highlight.status_column.clone(),
                sheet: name.clone(),
            }
        })?;

        let widths = table
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| column_width(column, table.rows.iter().map(|row| &row[index])))
            .collect();

        let highlighted = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| highlight.matches(&row[status_index]))
            .map(|(index, _)| index)
            .collect();

        Ok(Self {
            formula: highlight.formula(status_index),
            name,
            widths,
            status_index,
            highlighted,
        })
    }
}
