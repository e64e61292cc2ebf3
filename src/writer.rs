use crate::cell::CellValue;
use crate::error::Result;
use crate::table::{Table, Workbook, normalize_name};
use chrono::{DateTime, TimeZone};
use rust_xlsxwriter::{Format, FormatAlign, Workbook as XlsxWorkbook, Worksheet};
use std::path::Path;

/// Column widths of the case sheet, left to right.
pub const CASE_SHEET_WIDTHS: [f64; 12] = [
    23.0, 11.0, 12.0, 14.0, 9.0, 14.0, 18.0, 20.0, 20.0, 20.0, 10.0, 13.0,
];

/// Column widths of the bookkeeping sheet.
pub const INDEX_SHEET_WIDTHS: [f64; 2] = [15.0, 15.0];

const MIN_DERIVED_WIDTH: f64 = 8.0;
const MAX_DERIVED_WIDTH: f64 = 60.0;

/// Which sheets get the fixed width tables.
#[derive(Clone, Debug)]
pub struct SheetLayout {
    pub case_sheet: String,
    pub index_sheet: String,
}

impl SheetLayout {
    pub fn new(case_sheet: impl Into<String>, index_sheet: impl Into<String>) -> Self {
        SheetLayout {
            case_sheet: case_sheet.into(),
            index_sheet: index_sheet.into(),
        }
    }

    fn fixed_widths(&self, sheet: &str) -> &'static [f64] {
        let key = normalize_name(sheet);
        if key == normalize_name(&self.case_sheet) {
            &CASE_SHEET_WIDTHS
        } else if key == normalize_name(&self.index_sheet) {
            &INDEX_SHEET_WIDTHS
        } else {
            &[]
        }
    }
}

/// Width for a column without a fixed entry, derived from its header.
pub fn derived_width(header: &str) -> f64 {
    (header.chars().count() as f64 + 2.0).clamp(MIN_DERIVED_WIDTH, MAX_DERIVED_WIDTH)
}

/// Serialize a workbook to XLSX bytes
///
/// Every sheet is written as a header row plus data rows, in the workbook's
/// order, starting at the sheet row it was read from. Columns get the fixed
/// widths from `layout` where defined and a header-derived width otherwise;
/// every written cell is left aligned and dates keep a date number format.
///
/// # Arguments
/// * `workbook` - Sheets to write
/// * `layout` - Names of the case and bookkeeping sheets
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content
///
/// # Examples
/// ```
/// use adjudicator::table::{Table, Workbook};
/// use adjudicator::writer::{SheetLayout, write_workbook};
///
/// let mut table = Table::new(&["Accession", "Completed"]);
/// table.push_row(vec!["ACC1".into(), "no".into()]);
/// let book = Workbook { sheets: vec![("Case Data".into(), table)] };
///
/// let bytes = write_workbook(&book, &SheetLayout::new("Case Data", "index")).unwrap();
/// assert!(bytes.starts_with(b"PK"));
/// ```
pub fn write_workbook(workbook: &Workbook, layout: &SheetLayout) -> Result<Vec<u8>> {
    let mut xlsx = XlsxWorkbook::new();
    let formats = CellFormats::new();

    for (name, table) in &workbook.sheets {
        let worksheet = xlsx.add_worksheet();
        worksheet.set_name(name.as_str())?;
        write_table(worksheet, table, &formats)?;
        apply_widths(worksheet, table, layout.fixed_widths(name))?;
    }

    Ok(xlsx.save_to_buffer()?)
}

/// Left-aligned formats, with number formats for date-like cells.
struct CellFormats {
    left: Format,
    date: Format,
    datetime: Format,
    duration: Format,
}

impl CellFormats {
    fn new() -> Self {
        let left = Format::new().set_align(FormatAlign::Left);
        CellFormats {
            date: left.clone().set_num_format("yyyy-mm-dd"),
            datetime: left.clone().set_num_format("yyyy-mm-dd hh:mm:ss"),
            duration: left.clone().set_num_format("[h]:mm:ss"),
            left,
        }
    }
}

fn write_table(worksheet: &mut Worksheet, table: &Table, formats: &CellFormats) -> Result<()> {
    let top = table.header_row;
    for (c, column) in table.columns.iter().enumerate() {
        // Blank header cells stay blank
        if !column.header.is_empty() {
            let header = column.header.as_str();
            worksheet.write_string_with_format(top, c as u16, header, &formats.left)?;
        }
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = top + 1 + r as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                CellValue::Empty => {}
                CellValue::Text(s) => {
                    worksheet.write_string_with_format(r, c, s.as_str(), &formats.left)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number_with_format(r, c, *n, &formats.left)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean_with_format(r, c, *b, &formats.left)?;
                }
                CellValue::DateTime(serial) => {
                    let format = if serial.fract() == 0.0 {
                        &formats.date
                    } else {
                        &formats.datetime
                    };
                    worksheet.write_number_with_format(r, c, *serial, format)?;
                }
                CellValue::Duration(days) => {
                    worksheet.write_number_with_format(r, c, *days, &formats.duration)?;
                }
            }
        }
    }
    Ok(())
}

fn apply_widths(worksheet: &mut Worksheet, table: &Table, fixed: &[f64]) -> Result<()> {
    for (c, column) in table.columns.iter().enumerate() {
        let width = fixed
            .get(c)
            .copied()
            .unwrap_or_else(|| derived_width(&column.header));
        worksheet.set_column_width(c as u16, width)?;
    }
    Ok(())
}

/// Name of the downloadable copy: `{stem}-updated-{YYYYmmdd-HHMMSS}.xlsx`.
///
/// ```
/// use adjudicator::writer::updated_file_name;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
/// assert_eq!(
///     updated_file_name("cases/Review_Batch.xlsx", &at),
///     "Review_Batch-updated-20240309-140500.xlsx"
/// );
/// ```
pub fn updated_file_name<Tz: TimeZone>(original: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("workbook");
    format!("{}-updated-{}.xlsx", stem, at.format("%Y%m%d-%H%M%S"))
}
