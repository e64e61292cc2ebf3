use crate::cell::CellValue;
use crate::error::{Result, ReviewError};
use crate::form::{FormCache, ReviewFields, cell_text, yes_no};
use crate::resume::{ResumeFrom, first_unreviewed};
use crate::table::{Table, columns};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which case is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseCursor {
    Active(usize),
    /// No unreviewed rows remain. `parked_at` holds the last row when the
    /// policy keeps it on screen.
    Complete { parked_at: Option<usize> },
}

impl CaseCursor {
    /// Row accepting navigation and submissions, if any.
    pub fn active(&self) -> Option<usize> {
        match self {
            CaseCursor::Active(i) => Some(*i),
            CaseCursor::Complete { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CaseCursor::Complete { .. })
    }
}

/// What happens to the cursor once every row is completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnAllComplete {
    #[default]
    Terminal,
    StayAtLast,
}

impl OnAllComplete {
    pub fn cursor_for(&self, table: &Table) -> CaseCursor {
        match self {
            OnAllComplete::Terminal => CaseCursor::Complete { parked_at: None },
            OnAllComplete::StayAtLast => CaseCursor::Complete {
                parked_at: table.len().checked_sub(1),
            },
        }
    }
}

/// How submitted reviews leave the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Kept in memory until the reviewer downloads the workbook.
    #[default]
    Download,
    /// The whole workbook is rewritten at its source path after each submit.
    InPlace,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorPolicy {
    pub resume_from: ResumeFrom,
    pub on_all_complete: OnAllComplete,
    pub auto_open_next_link: bool,
    pub persistence: Persistence,
}

impl Default for NavigatorPolicy {
    fn default() -> Self {
        NavigatorPolicy {
            resume_from: ResumeFrom::FirstUnreviewed,
            on_all_complete: OnAllComplete::Terminal,
            auto_open_next_link: true,
            persistence: Persistence::InPlace,
        }
    }
}

/// Non-fatal outcomes shown to the reviewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    FirstCase,
    LastCase,
    AllCasesComplete,
    EmptyDataset,
}

impl Notice {
    pub fn is_success(&self) -> bool {
        matches!(self, Notice::AllCasesComplete)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Notice::FirstCase => "You have reached the first case!",
            Notice::LastCase => "You have reached the last case!",
            Notice::AllCasesComplete => {
                "You have completed all available cases! No more cases to review."
            }
            Notice::EmptyDataset => "The case sheet contains no cases.",
        })
    }
}

/// Returns the trimmed link when it is an `http`/`https` URL.
pub fn web_link(raw: &str) -> Option<&str> {
    let link = raw.trim();
    let lower = link.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")).then_some(link)
}

/// Result of one transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub cursor: CaseCursor,
    pub notice: Option<Notice>,
    /// Studio link of the case just moved to, when it should be opened.
    pub open_link: Option<String>,
    /// Row written by a submit.
    pub submitted: Option<usize>,
}

impl Step {
    fn stay(cursor: CaseCursor, notice: Notice) -> Self {
        Step {
            cursor,
            notice: Some(notice),
            open_link: None,
            submitted: None,
        }
    }
}

/// Case navigation over one case table.
#[derive(Clone, Debug, Default)]
pub struct Navigator {
    pub policy: NavigatorPolicy,
}

impl Navigator {
    pub fn new(policy: NavigatorPolicy) -> Self {
        Navigator { policy }
    }

    /// Moves to the preceding row; stays put with `FirstCase` at the top.
    pub fn previous(&self, cursor: CaseCursor, table: &Table, forms: &mut FormCache) -> Step {
        let Some(current) = cursor.active() else {
            return Step::stay(cursor, Notice::AllCasesComplete);
        };
        match current.checked_sub(1) {
            Some(target) if target < table.len() => self.move_to(current, target, table, forms),
            _ => Step::stay(cursor, Notice::FirstCase),
        }
    }

    /// Moves to the following row; stays put with `LastCase` at the bottom.
    pub fn next(&self, cursor: CaseCursor, table: &Table, forms: &mut FormCache) -> Step {
        let Some(current) = cursor.active() else {
            return Step::stay(cursor, Notice::AllCasesComplete);
        };
        if current + 1 < table.len() {
            self.move_to(current, current + 1, table, forms)
        } else {
            Step::stay(cursor, Notice::LastCase)
        }
    }

    fn move_to(&self, from: usize, to: usize, table: &Table, forms: &mut FormCache) -> Step {
        forms.discard(from);
        forms.populate(to, table);
        Step {
            cursor: CaseCursor::Active(to),
            notice: None,
            open_link: None,
            submitted: None,
        }
    }

    /// Stores `fields` in the current row, marks it completed, and advances to
    /// the next unreviewed row after it.
    ///
    /// # Errors
    /// * `ReviewError::RowOutOfRange` if the cursor points past the table
    pub fn submit(
        &self,
        cursor: CaseCursor,
        table: &mut Table,
        forms: &mut FormCache,
        fields: &ReviewFields,
    ) -> Result<Step> {
        let Some(current) = cursor.active() else {
            return Ok(Step::stay(cursor, Notice::AllCasesComplete));
        };
        if current >= table.len() {
            return Err(ReviewError::RowOutOfRange {
                index: current,
                len: table.len(),
            });
        }

        write_review(table, current, fields);
        forms.discard(current);
        info!("Updated case {} as completed.", current);

        let step = match first_unreviewed(table, Some(current)) {
            Some(next) => {
                forms.populate(next, table);
                let link = table.text(next, columns::STUDIO_LINK);
                Step {
                    cursor: CaseCursor::Active(next),
                    notice: None,
                    open_link: web_link(&link)
                        .filter(|_| self.policy.auto_open_next_link)
                        .map(str::to_string),
                    submitted: Some(current),
                }
            }
            None => {
                info!("All cases reviewed for user.");
                Step {
                    cursor: self.policy.on_all_complete.cursor_for(table),
                    notice: Some(Notice::AllCasesComplete),
                    open_link: None,
                    submitted: Some(current),
                }
            }
        };
        Ok(step)
    }
}

fn write_review(table: &mut Table, row: usize, fields: &ReviewFields) {
    table.set(row, columns::REVIEW, fields.classification.as_str().into());
    table.set(row, columns::SECOND_OPINION, yes_no(fields.second_opinion).into());
    table.set(row, columns::REQUEST_REPORT, yes_no(fields.request_report).into());
    table.set(
        row,
        columns::LOCATION_TYPE,
        CellValue::text(cell_text("Location/Type", &fields.location_type)),
    );
    let comment = cell_text("Comments", &fields.comment);
    table.set(row, columns::COMMENTS, CellValue::text(comment));
    table.set(row, columns::COMPLETED, "yes".into());
}
