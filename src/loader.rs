use crate::cell::CellValue;
use crate::error::{Result, ReviewError};
use crate::table::{Column, Table, Workbook, columns, normalize_name};
use calamine::{Data, DataType, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};
use log::{error, info, warn};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

/// A parsed review workbook together with the name of its case sheet.
///
/// The case sheet is checked at construction and nothing exposed here can
/// remove it, so `case_table` always succeeds.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedWorkbook {
    /// Name of the case sheet exactly as it appears in the file.
    case_sheet: String,
    workbook: Workbook,
}

impl LoadedWorkbook {
    /// Wraps parsed sheets, locating the case sheet (case/whitespace-insensitive)
    /// and backfilling its `completed` column.
    ///
    /// # Errors
    /// * `ReviewError::Format` if no sheet matches `case_sheet`
    pub fn from_workbook(mut workbook: Workbook, case_sheet: &str) -> Result<Self> {
        let idx = workbook.find(case_sheet).ok_or_else(|| {
            error!(
                "Workbook has no '{}' sheet (found: {:?})",
                case_sheet,
                workbook.sheet_names()
            );
            ReviewError::Format(format!("no sheet named '{}'", case_sheet))
        })?;

        normalize_completed(&mut workbook.sheets[idx].1);

        Ok(LoadedWorkbook {
            case_sheet: workbook.sheets[idx].0.clone(),
            workbook,
        })
    }

    pub fn case_sheet(&self) -> &str {
        &self.case_sheet
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn into_workbook(self) -> Workbook {
        self.workbook
    }

    pub fn case_table(&self) -> &Table {
        self.workbook
            .sheet(&self.case_sheet)
            .expect("case sheet present after load")
    }

    pub fn case_table_mut(&mut self) -> &mut Table {
        self.workbook
            .sheet_mut(&self.case_sheet)
            .expect("case sheet present after load")
    }

    /// Records `last_index` in the bookkeeping sheet. Refuses (returning
    /// `false`) when `index_sheet` names the case sheet.
    pub fn record_index(&mut self, index_sheet: &str, last_index: usize) -> bool {
        if normalize_name(index_sheet) == normalize_name(&self.case_sheet) {
            warn!(
                "Bookkeeping sheet '{}' is the case sheet; not recording",
                index_sheet
            );
            return false;
        }
        crate::resume::record_index(&mut self.workbook, index_sheet, &self.case_sheet, last_index);
        true
    }
}

/// Load a review workbook from raw bytes
///
/// Parses every sheet, normalizes column names, locates the case sheet
/// (case/whitespace-insensitive), and guarantees its `completed` column.
///
/// # Arguments
/// * `bytes` - The uploaded file content (xlsx, xls, xlsb or ods)
/// * `case_sheet` - Name of the case sheet, e.g. `"Case Data"`
///
/// # Errors
/// * `ReviewError::Format` if the bytes are not a workbook or the case sheet is missing
pub fn load_from_bytes(bytes: &[u8], case_sheet: &str) -> Result<LoadedWorkbook> {
    let sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        error!("Failed to read Excel file: {}", e);
        ReviewError::Format(format!("not a readable spreadsheet ({})", e))
    })?;
    LoadedWorkbook::from_workbook(read_sheets(sheets)?, case_sheet)
}

/// Load a review workbook from a file on disk
///
/// Same contract as [`load_from_bytes`]; used for workbooks picked from the
/// workflow directory.
pub fn load_from_path(path: impl AsRef<Path>, case_sheet: &str) -> Result<LoadedWorkbook> {
    let path = path.as_ref();
    let sheets = open_workbook_auto(path).map_err(|e| {
        error!("Failed to read Excel file {}: {}", path.display(), e);
        ReviewError::Format(format!("cannot open {} ({})", path.display(), e))
    })?;
    let loaded = LoadedWorkbook::from_workbook(read_sheets(sheets)?, case_sheet)?;
    info!(
        "Loaded {} ({} cases)",
        path.display(),
        loaded.case_table().len()
    );
    Ok(loaded)
}

/// Backfill missing/blank `completed` values with "no"; trim and lowercase the rest.
pub fn normalize_completed(table: &mut Table) {
    let col = table.ensure_column(columns::COMPLETED, CellValue::text("no"));
    for row in &mut table.rows {
        let cell = &mut row[col];
        *cell = if cell.is_empty() {
            CellValue::text("no")
        } else {
            CellValue::text(cell.to_string().trim().to_lowercase())
        };
    }
}

fn read_sheets<RS: Read + Seek>(mut workbook: Sheets<RS>) -> Result<Workbook> {
    let mut book = Workbook::default();

    for sheet_name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
            error!("Failed to read sheet '{}': {}", sheet_name, e);
            ReviewError::Format(format!("cannot read sheet '{}' ({})", sheet_name, e))
        })?;

        // Ranges begin at the first used cell; keep the blank rows and
        // columns before it so the sheet is written back in place
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let first_col = first_col as usize;
        let mut rows = range.rows();
        let mut table = Table::default();

        if let Some(header) = rows.next() {
            table.header_row = first_row;
            table.columns = (0..first_col)
                .map(Column::unnamed)
                .chain(header.iter().enumerate().map(|(i, cell)| {
                    match to_cell_value(cell) {
                        CellValue::Empty => Column::unnamed(first_col + i),
                        value => Column::from_header(value.to_string()),
                    }
                }))
                .collect();
        }

        for row in rows {
            let mut cells = vec![CellValue::Empty; first_col];
            cells.extend(row.iter().map(to_cell_value));
            table.push_row(cells);
        }

        book.sheets.push((sheet_name, table));
    }

    Ok(book)
}

fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => CellValue::Duration(dt.as_f64()),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(CellValue::from_datetime)
            .unwrap_or_else(|| CellValue::text(cell.to_string())),
        Data::DurationIso(_) => cell
            .as_duration()
            .map(CellValue::from_duration)
            .unwrap_or_else(|| CellValue::text(cell.to_string())),
        // Error cells are kept as their display text
        other => CellValue::text(other.to_string()),
    }
}
