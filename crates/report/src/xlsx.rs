use crate::{
    Cell, Column, Highlight, RenderError, SheetLayout, SheetNames, Table, GLOBAL_SHEET_NAME,
};
use indexmap::IndexMap;
use rust_xlsxwriter::{
    Color, ConditionalFormatFormula, Format, FormatAlign, FormatBorder, Workbook, Worksheet,
    XlsxError,
};
use std::path::Path;

pub const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
pub const DATE_FORMAT: &str = "yyyy-mm-dd";

/// Outcome of rendering a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    /// Sheet names, in workbook order.
    pub sheets: Vec<String>,
    /// Data rows of the global sheet.
    pub rows: usize,
    /// Highlighted rows of the global sheet.
    pub highlighted: usize,
}

struct Formats {
    header: Format,
    text: Format,
    wrapped: Format,
    date: Format,
    datetime: Format,
    failure: Format,
}

impl Formats {
    fn new() -> Self {
        let border = Format::new().set_border(FormatBorder::Thin);
        Self {
            header: border.clone().set_bold(),
            wrapped: border.clone().set_text_wrap().set_align(FormatAlign::Top),
            date: border.clone().set_num_format(DATE_FORMAT),
            datetime: border.clone().set_num_format(DATETIME_FORMAT),
            failure: border
                .clone()
                .set_background_color(Color::RGB(0xFFC7CE))
                .set_font_color(Color::RGB(0x9C0006)),
            text: border,
        }
    }
}

/// Writes `global` as the `AllInstances` sheet followed by one sheet per
/// entry of `instances`, and saves the workbook to `path`.
///
/// Every sheet gets bordered cells, fitted column widths and a conditional
/// rule highlighting rows whose status column equals the failure literal.
/// `global` must not be empty.
pub fn render_workbook(
    path: &Path,
    global: &Table,
    instances: &IndexMap<String, Table>,
    highlight: &Highlight,
) -> Result<RenderSummary, RenderError> {
    if global.is_empty() {
        return Err(RenderError::EmptyReport);
    }

    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let mut names = SheetNames::new();

    let layout = SheetLayout::plan(names.claim(GLOBAL_SHEET_NAME), global, highlight)?;
    let mut summary = RenderSummary {
        sheets: vec![layout.name.clone()],
        rows: global.rows.len(),
        highlighted: layout.highlighted.len(),
    };
    write_sheet(workbook.add_worksheet(), &layout, global, &formats)?;

    for (label, table) in instances {
        let layout = SheetLayout::plan(names.claim(label), table, highlight)?;
        tracing::debug!(%label, sheet = %layout.name, rows = table.rows.len(), "writing instance sheet");
        write_sheet(workbook.add_worksheet(), &layout, table, &formats)?;
        summary.sheets.push(layout.name);
    }

    workbook.save(path)?;
    Ok(summary)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    layout: &SheetLayout,
    table: &Table,
    formats: &Formats,
) -> Result<(), XlsxError> {
    worksheet.set_name(&layout.name)?;

    for (col, (column, width)) in table.columns.iter().zip(&layout.widths).enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, *width)?;
        worksheet.write_string_with_format(0, col, column.name, &formats.header)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (index, row) in table.rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, (cell, column)) in row.iter().zip(&table.columns).enumerate() {
            write_cell(worksheet, row_num, col as u16, cell, column, formats)?;
        }
    }

    if !table.rows.is_empty() {
        let last_row = table.rows.len() as u32;
        let last_col = table.columns.len().saturating_sub(1) as u16;
        let rule = ConditionalFormatFormula::new()
            .set_rule(layout.formula.as_str())
            .set_format(&formats.failure);
        worksheet.add_conditional_format(1, 0, last_row, last_col, &rule)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    column: &Column,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let text = if column.wrap {
        &formats.wrapped
    } else {
        &formats.text
    };

    match cell {
        Cell::Text(value) => worksheet.write_string_with_format(row, col, value, text)?,
        Cell::Integer(value) => worksheet.write_number_with_format(row, col, *value as f64, text)?,
        Cell::Number(value) if value.is_finite() => {
            worksheet.write_number_with_format(row, col, *value, text)?
        }
        Cell::Date(value) => worksheet.write_datetime_with_format(row, col, value, &formats.date)?,
        Cell::DateTime(value) => {
            worksheet.write_datetime_with_format(row, col, value, &formats.datetime)?
        }
        Cell::Empty | Cell::Number(_) => worksheet.write_blank(row, col, text)?,
    };
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn table(rows: &[(&str, &str)]) -> Table {
        let finished = NaiveDate::from_ymd_opt(2024, 3, 20)
            .unwrap()
            .and_hms_opt(1, 2, 3)
            .unwrap();
        Table {
            columns: vec![
                Column::new("Instance"),
                Column::new("backup_status"),
                Column::new("backup_finish_date"),
                Column::new("backup_size_mb"),
                Column::wrapped("physical_device_name"),
            ],
            rows: rows
                .iter()
                .map(|(instance, status)| {
                    vec![
                        Cell::from(*instance),
                        Cell::from(*status),
                        Cell::from(finished),
                        Cell::from(f64::NAN),
                        Cell::Empty,
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn renders_global_and_instance_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        let global = table(&[("A", "SUCCESS"), ("A", "FAILED"), ("B/1", "FAILED")]);
        let instances = IndexMap::from([
            ("A".to_string(), table(&[("A", "SUCCESS"), ("A", "FAILED")])),
            ("B/1".to_string(), table(&[("B/1", "FAILED")])),
        ]);

        let summary = render_workbook(
            &path,
            &global,
            &instances,
            &Highlight::new("backup_status", "FAILED"),
        )
        .unwrap();

        assert_eq!(
            summary,
            RenderSummary {
                sheets: vec!["AllInstances".to_string(), "A".to_string(), "B_1".to_string()],
                rows: 3,
                highlighted: 2,
            }
        );
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    fn read_part(path: &Path, part: &str) -> String {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name(part)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn workbook_carries_rule_formats_and_sheet_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        let global = table(&[("A", "SUCCESS"), ("A", "FAILED"), ("B/1", "FAILED")]);
        let instances = IndexMap::from([
            ("A".to_string(), table(&[("A", "SUCCESS"), ("A", "FAILED")])),
            ("B/1".to_string(), table(&[("B/1", "FAILED")])),
        ]);
        render_workbook(
            &path,
            &global,
            &instances,
            &Highlight::new("backup_status", "FAILED"),
        )
        .unwrap();

        let workbook = read_part(&path, "xl/workbook.xml");
        for name in ["AllInstances", "A", "B_1"] {
            assert!(
                workbook.contains(&format!(r#"<sheet name="{name}""#)),
                "missing sheet {name} in {workbook}"
            );
        }

        // The rule spans every data row and column of each sheet.
        for (part, range) in [
            ("xl/worksheets/sheet1.xml", "A2:E4"),
            ("xl/worksheets/sheet2.xml", "A2:E3"),
            ("xl/worksheets/sheet3.xml", "A2:E2"),
        ] {
            let sheet = read_part(&path, part);
            assert!(
                sheet.contains(&format!(r#"<conditionalFormatting sqref="{range}">"#)),
                "missing rule over {range} in {part}"
            );
            assert!(sheet.contains(r#"<formula>EXACT($B2,"FAILED")</formula>"#));
        }

        let styles = read_part(&path, "xl/styles.xml");
        assert!(styles.contains(r#"formatCode="yyyy-mm-dd hh:mm:ss""#));
        assert!(styles.contains(r#"<left style="thin">"#));
    }

    #[test]
    fn labels_colliding_after_sanitizing_still_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        let global = table(&[("x:1", "FAILED"), ("x/1", "SUCCESS")]);
        let instances = IndexMap::from([
            ("x:1".to_string(), table(&[("x:1", "FAILED")])),
            ("x/1".to_string(), table(&[("x/1", "SUCCESS")])),
            ("allinstances".to_string(), table(&[("allinstances", "SUCCESS")])),
        ]);

        let summary = render_workbook(
            &path,
            &global,
            &instances,
            &Highlight::new("backup_status", "FAILED"),
        )
        .unwrap();

        assert_eq!(
            summary.sheets,
            vec!["AllInstances", "x_1", "x_1 (2)", "allinstances (2)"]
        );
    }

    #[test]
    fn empty_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        let result = render_workbook(
            &path,
            &table(&[]),
            &IndexMap::new(),
            &Highlight::new("backup_status", "FAILED"),
        );
        assert!(matches!(result, Err(RenderError::EmptyReport)));
        assert!(!path.exists());
    }

    #[test]
    fn unknown_status_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");

        let result = render_workbook(
            &path,
            &table(&[("A", "FAILED")]),
            &IndexMap::new(),
            &Highlight::new("RunStatus", "Failed"),
        );
        assert!(matches!(result, Err(RenderError::MissingStatusColumn { .. })));
        assert!(!path.exists());
    }
}
