//! Tabular report model and its rendering into a multi-sheet workbook:
//! one sheet for all instances and one per instance, with failing rows
//! highlighted by a conditional rule on a status column.
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

mod layout;
mod xlsx;

pub use layout::{
    column_width, sanitize_sheet_name, Highlight, SheetLayout, SheetNames, GLOBAL_SHEET_NAME,
    MAX_SHEET_NAME_CHARS,
};
pub use xlsx::{render_workbook, RenderSummary, DATETIME_FORMAT, DATE_FORMAT};

/// Header of the leading column naming the instance each row came from.
pub const INSTANCE_COLUMN: &str = "Instance";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot render a report with no rows")]
    EmptyReport,
    #[error("status column {column:?} is not a column of sheet {sheet:?}")]
    MissingStatusColumn { column: String, sheet: String },
    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// A single display-ready value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Text as the value is shown in the rendered sheet.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Integer(i) => i.to_string(),
            Cell::Number(n) if n.is_finite() => n.to_string(),
            Cell::Number(_) => String::new(),
            Cell::Date(date) => date.format("%Y-%m-%d").to_string(),
            Cell::DateTime(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Integer(value.into())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Integer(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::DateTime(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Empty, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: &'static str,
    /// Long free text: rendered wide and wrapped rather than clamped.
    pub wrap: bool,
}

impl Column {
    pub fn new(name: &'static str) -> Self {
        Self { name, wrap: false }
    }

    pub fn wrapped(name: &'static str) -> Self {
        Self { name, wrap: true }
    }
}

/// A record type which can be flattened into a report row.
pub trait ReportRow {
    /// Column headers, in display order. The `Instance` column is not included.
    fn columns() -> Vec<Column>;
    /// Cells of this row, one per column of `columns()`.
    fn cells(&self) -> Vec<Cell>;
}

/// A row tagged with the label of the instance it was collected from.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<R> {
    pub instance: String,
    pub row: R,
}

/// Plain rows and columns, ready to be written as one sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn from_rows<'a, R: ReportRow + 'a>(rows: impl IntoIterator<Item = &'a Tagged<R>>) -> Self {
        let columns = std::iter::once(Column::new(INSTANCE_COLUMN))
            .chain(R::columns())
            .collect();

        let rows = rows
            .into_iter()
            .map(|tagged| {
                let mut cells = vec![Cell::Text(tagged.instance.clone())];
                cells.extend(tagged.row.cells());
                cells
            })
            .collect();

        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ordered report rows from all instances.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable<R> {
    rows: Vec<Tagged<R>>,
}

impl<R> Default for ReportTable<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: ReportRow> ReportTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Tagged<R>) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Tagged<R>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in collection order.
    pub fn global(&self) -> Table {
        Table::from_rows(&self.rows)
    }

    /// Rows partitioned by instance label, in order of each label's first row.
    /// Rows of instances sharing a label are kept together in one table.
    pub fn by_instance(&self) -> IndexMap<String, Table> {
        let mut partitions: IndexMap<&str, Vec<&Tagged<R>>> = IndexMap::new();
        for row in &self.rows {
            partitions.entry(row.instance.as_str()).or_default().push(row);
        }
        partitions
            .into_iter()
            .map(|(label, rows)| (label.to_string(), Table::from_rows(rows)))
            .collect()
    }
}

impl<R> FromIterator<Tagged<R>> for ReportTable<R> {
    fn from_iter<I: IntoIterator<Item = Tagged<R>>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
