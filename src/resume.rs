use crate::cell::CellValue;
use crate::loader::LoadedWorkbook;
use crate::navigator::{CaseCursor, NavigatorPolicy};
use crate::table::{Table, Workbook, columns, normalize_name};
use serde::{Deserialize, Serialize};

/// Where a freshly loaded workbook starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResumeFrom {
    /// First row whose `completed` is "no".
    #[default]
    FirstUnreviewed,
    /// The recorded bookkeeping row while it is still unreviewed, else the
    /// first unreviewed row after it, else the first unreviewed row overall.
    Bookkeeping,
}

/// Smallest row index greater than `after` (or from the top when `None`)
/// whose `completed` value is "no".
pub fn first_unreviewed(table: &Table, after: Option<usize>) -> Option<usize> {
    let start = after.map_or(0, |i| i + 1);
    (start..table.len()).find(|&i| table.text(i, columns::COMPLETED) == "no")
}

/// Reads the last recorded row index for `case_sheet` from the bookkeeping sheet.
pub fn recorded_index(workbook: &Workbook, index_sheet: &str, case_sheet: &str) -> Option<usize> {
    let index = workbook.sheet(index_sheet)?;
    let wanted = normalize_name(case_sheet);
    (0..index.len())
        .find(|&row| normalize_name(&index.text(row, columns::SHEET)) == wanted)
        .and_then(|row| index.get(row, columns::LAST_INDEX))
        .and_then(CellValue::as_index)
}

/// Writes `{case_sheet: last_index}` into the bookkeeping sheet, creating the
/// sheet (or replacing one without the expected columns) when necessary.
pub fn record_index(workbook: &mut Workbook, index_sheet: &str, case_sheet: &str, last_index: usize) {
    let usable = workbook
        .sheet(index_sheet)
        .is_some_and(|t| t.has_column(columns::SHEET) && t.has_column(columns::LAST_INDEX));
    if !usable {
        workbook.upsert(index_sheet, Table::new(&["Sheet", "Last_Index"]));
    }

    let Some(table) = workbook.sheet_mut(index_sheet) else {
        return;
    };
    let wanted = normalize_name(case_sheet);
    match (0..table.len()).find(|&row| normalize_name(&table.text(row, columns::SHEET)) == wanted) {
        Some(row) => {
            table.set(row, columns::LAST_INDEX, last_index.into());
        }
        None => {
            table.push_row(Vec::new());
            let row = table.len() - 1;
            table.set(row, columns::SHEET, case_sheet.into());
            table.set(row, columns::LAST_INDEX, last_index.into());
        }
    }
}

/// Determines the initial cursor for a loaded workbook.
pub fn resume_cursor(loaded: &LoadedWorkbook, index_sheet: &str, policy: &NavigatorPolicy) -> CaseCursor {
    let table = loaded.case_table();

    let recorded = match policy.resume_from {
        ResumeFrom::Bookkeeping => {
            recorded_index(loaded.workbook(), index_sheet, loaded.case_sheet())
                .filter(|&idx| idx < table.len())
        }
        ResumeFrom::FirstUnreviewed => None,
    };

    let resume = match recorded {
        Some(idx) if table.text(idx, columns::COMPLETED) == "no" => Some(idx),
        Some(idx) => first_unreviewed(table, Some(idx)).or_else(|| first_unreviewed(table, None)),
        None => first_unreviewed(table, None),
    };

    match resume {
        Some(idx) => CaseCursor::Active(idx),
        None => policy.on_all_complete.cursor_for(table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::OnAllComplete;

    fn loaded(completed: &[&str]) -> LoadedWorkbook {
        let mut table = Table::new(&["Accession", "Completed"]);
        for (i, c) in completed.iter().enumerate() {
            table.push_row(vec![format!("A{}", i).into(), (*c).into()]);
        }
        let workbook = Workbook {
            sheets: vec![("Case Data".into(), table)],
        };
        LoadedWorkbook::from_workbook(workbook, "Case Data").unwrap()
    }

    fn bookkeeping() -> NavigatorPolicy {
        NavigatorPolicy {
            resume_from: ResumeFrom::Bookkeeping,
            ..NavigatorPolicy::default()
        }
    }

    #[test]
    fn all_unreviewed_starts_at_zero() {
        let book = loaded(&["no", "no", "no"]);
        let cursor = resume_cursor(&book, "index", &NavigatorPolicy::default());
        assert_eq!(cursor, CaseCursor::Active(0));
    }

    #[test]
    fn skips_completed_prefix() {
        let book = loaded(&["yes", "yes", "no", "no"]);
        let cursor = resume_cursor(&book, "index", &NavigatorPolicy::default());
        assert_eq!(cursor, CaseCursor::Active(2));
    }

    #[test]
    fn first_unreviewed_respects_lower_bound() {
        let book = loaded(&["no", "yes", "no"]);
        assert_eq!(first_unreviewed(book.case_table(), Some(0)), Some(2));
        assert_eq!(first_unreviewed(book.case_table(), Some(2)), None);
    }

    #[test]
    fn all_complete_is_terminal_by_default() {
        let book = loaded(&["yes"]);
        let cursor = resume_cursor(&book, "index", &NavigatorPolicy::default());
        assert_eq!(cursor, CaseCursor::Complete { parked_at: None });
    }

    #[test]
    fn all_complete_can_park_on_last_row() {
        let book = loaded(&["yes", "yes"]);
        let policy = NavigatorPolicy {
            on_all_complete: OnAllComplete::StayAtLast,
            ..NavigatorPolicy::default()
        };
        assert_eq!(
            resume_cursor(&book, "index", &policy),
            CaseCursor::Complete { parked_at: Some(1) }
        );
    }

    #[test]
    fn empty_table_is_complete_without_parking() {
        let book = loaded(&[]);
        let policy = NavigatorPolicy {
            on_all_complete: OnAllComplete::StayAtLast,
            ..NavigatorPolicy::default()
        };
        assert_eq!(
            resume_cursor(&book, "index", &policy),
            CaseCursor::Complete { parked_at: None }
        );
    }

    #[test]
    fn bookkeeping_round_trip() {
        let mut book = loaded(&["yes", "no", "no"]).into_workbook();
        assert_eq!(recorded_index(&book, "index", "Case Data"), None);

        record_index(&mut book, "index", "Case Data", 0);
        record_index(&mut book, "index", "Case Data", 2);
        let index = book.sheet("index").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.columns[0].header, "Sheet");
        assert_eq!(recorded_index(&book, "INDEX", "case data"), Some(2));
    }

    #[test]
    fn bookkeeping_policy_uses_recorded_row() {
        let mut book = loaded(&["yes", "no", "no"]);
        book.record_index("index", 2);
        assert_eq!(resume_cursor(&book, "index", &bookkeeping()), CaseCursor::Active(2));

        // Stale entries fall back to the first unreviewed row
        book.record_index("index", 40);
        assert_eq!(resume_cursor(&book, "index", &bookkeeping()), CaseCursor::Active(1));
    }

    #[test]
    fn bookkeeping_skips_a_recorded_row_already_completed() {
        let mut book = loaded(&["no", "yes", "no", "no"]);
        book.record_index("index", 1);
        assert_eq!(resume_cursor(&book, "index", &bookkeeping()), CaseCursor::Active(2));

        // Nothing unreviewed after the recorded row: wrap to the top
        let mut book = loaded(&["no", "yes", "yes"]);
        book.record_index("index", 2);
        assert_eq!(resume_cursor(&book, "index", &bookkeeping()), CaseCursor::Active(0));

        let mut book = loaded(&["yes", "yes"]);
        book.record_index("index", 1);
        assert_eq!(
            resume_cursor(&book, "index", &bookkeeping()),
            CaseCursor::Complete { parked_at: None }
        );
    }

    #[test]
    fn malformed_index_sheet_is_replaced() {
        let mut book = loaded(&["no"]).into_workbook();
        book.sheets
            .push(("index".into(), Table::new(&["Something Else"])));
        record_index(&mut book, "index", "Case Data", 0);
        let index = book.sheet("index").unwrap();
        assert!(index.has_column(columns::LAST_INDEX));
        assert_eq!(book.sheets.len(), 2);
    }
}
