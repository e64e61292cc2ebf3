use crate::cell::CellValue;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalized column keys of the case sheet.
pub mod columns {
    pub const ACCESSION: &str = "accession";
    pub const STUDIO_LINK: &str = "studio_link";
    pub const COMPLETED: &str = "completed";
    pub const REVIEW: &str = "review_(tp/fp)";
    pub const SECOND_OPINION: &str = "2nd_opinion_(y/n)";
    pub const REQUEST_REPORT: &str = "request_report_(y/n)";
    pub const LOCATION_TYPE: &str = "location/type";
    pub const COMMENTS: &str = "comments";

    /// Bookkeeping sheet columns.
    pub const SHEET: &str = "sheet";
    pub const LAST_INDEX: &str = "last_index";
}

/// Header text written for a column the crate had to create itself.
pub fn canonical_header(name: &str) -> String {
    match name {
        columns::ACCESSION => "Accession",
        columns::STUDIO_LINK => "Studio Link",
        columns::COMPLETED => "Completed",
        columns::REVIEW => "Review (TP/FP)",
        columns::SECOND_OPINION => "2nd Opinion (Y/N)",
        columns::REQUEST_REPORT => "Request Report (Y/N)",
        columns::LOCATION_TYPE => "Location/Type",
        columns::COMMENTS => "Comments",
        columns::SHEET => "Sheet",
        columns::LAST_INDEX => "Last_Index",
        other => return other.to_string(),
    }
    .to_string()
}

/// Trim, collapse internal whitespace runs to `_`, lowercase.
///
/// ```
/// use adjudicator::table::normalize_name;
///
/// assert_eq!(normalize_name("  Review (TP/FP) "), "review_(tp/fp)");
/// assert_eq!(normalize_name("Case \t Data"), "case_data");
/// ```
pub fn normalize_name(raw: &str) -> String {
    WHITESPACE_RUN
        .replace_all(raw.trim(), "_")
        .to_lowercase()
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Column {
    /// Normalized key used for lookups.
    pub name: String,
    /// Header text as found on disk (or the canonical header for new columns);
    /// empty for a blank header cell.
    pub header: String,
}

impl Column {
    pub fn from_header(header: impl Into<String>) -> Self {
        let header = header.into();
        Column {
            name: normalize_name(&header),
            header,
        }
    }

    /// A column whose header cell is blank, keyed `unnamed:_{position}`.
    pub fn unnamed(position: usize) -> Self {
        Column {
            name: normalize_name(&format!("Unnamed: {}", position)),
            header: String::new(),
        }
    }
}

/// A rectangular sheet: one header row plus positionally indexed data rows.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    /// Sheet row holding the header; data follows directly below.
    #[serde(default)]
    pub header_row: u32,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Table {
            columns: headers.iter().map(|h| Column::from_header(*h)).collect(),
            rows: Vec::new(),
            header_row: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Returns the index of `name`, appending it (with its canonical header
    /// and `fill` in every row) when absent.
    pub fn ensure_column(&mut self, name: &str, fill: CellValue) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(Column {
            name: name.to_string(),
            header: canonical_header(name),
        });
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        self.columns.len() - 1
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }

    /// Trimmed display text of a cell; `""` when the row, column, or value is missing.
    pub fn text(&self, row: usize, column: &str) -> String {
        self.get(row, column)
            .map(|v| v.to_string().trim().to_string())
            .unwrap_or_default()
    }

    /// Writes a value, creating the column when needed. Returns `false` if the
    /// row does not exist.
    pub fn set(&mut self, row: usize, column: &str, value: CellValue) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        let col = self.ensure_column(column, CellValue::Empty);
        self.rows[row][col] = value;
        true
    }
}

/// All sheets of a workbook in their on-disk order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Workbook {
    pub sheets: Vec<(String, Table)>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Finds a sheet by name, ignoring case and whitespace differences.
    pub fn find(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name);
        self.sheets
            .iter()
            .position(|(sheet, _)| normalize_name(sheet) == wanted)
    }

    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.find(name).map(|idx| &self.sheets[idx].1)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Table> {
        let idx = self.find(name)?;
        Some(&mut self.sheets[idx].1)
    }

    /// Replaces a sheet in place, or appends it when no sheet matches.
    pub fn upsert(&mut self, name: &str, table: Table) {
        match self.find(name) {
            Some(idx) => self.sheets[idx].1 = table,
            None => self.sheets.push((name.to_string(), table)),
        }
    }
}
