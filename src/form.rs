use crate::table::{Table, columns};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// True-Positive / False-Positive determination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Classification {
    #[default]
    TP,
    FP,
}

impl Classification {
    /// Parses "TP"/"FP" in any case; anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "TP" => Some(Classification::TP),
            "FP" => Some(Classification::FP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::TP => "TP",
            Classification::FP => "FP",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Yes"/"No" as stored in the workbook.
pub fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Longest text a single workbook cell accepts.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Trims `value` and cuts it to [`MAX_CELL_CHARS`] characters.
pub fn cell_text(field: &str, value: &str) -> String {
    let value = value.trim();
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(
                "{} is {} characters; keeping the first {}",
                field,
                value.chars().count(),
                MAX_CELL_CHARS
            );
            value[..cut].to_string()
        }
        None => value.to_string(),
    }
}

fn is_yes(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}

/// The five editable values of one case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFields {
    pub classification: Classification,
    pub second_opinion: bool,
    pub request_report: bool,
    pub location_type: String,
    pub comment: String,
}

impl Default for ReviewFields {
    /// TP, no second opinion, no report, blank text.
    fn default() -> Self {
        ReviewFields {
            classification: Classification::TP,
            second_opinion: false,
            request_report: false,
            location_type: String::new(),
            comment: String::new(),
        }
    }
}

impl ReviewFields {
    /// Reads the stored answers of a row, or the defaults when the row has
    /// not been completed (or does not exist).
    pub fn from_row(table: &Table, index: usize) -> Self {
        if index >= table.len() || table.text(index, columns::COMPLETED) != "yes" {
            return ReviewFields::default();
        }
        ReviewFields {
            classification: Classification::parse(&table.text(index, columns::REVIEW))
                .unwrap_or_default(),
            second_opinion: is_yes(&table.text(index, columns::SECOND_OPINION)),
            request_report: is_yes(&table.text(index, columns::REQUEST_REPORT)),
            location_type: table.text(index, columns::LOCATION_TYPE),
            comment: table.text(index, columns::COMMENTS),
        }
    }

    /// Coerces raw form input. Unknown classifications fall back to TP;
    /// checkbox/radio values count as set when they read "yes", "on" or "true".
    /// Text is trimmed and cut to what a cell can hold.
    pub fn coerce(
        classification: Option<&str>,
        second_opinion: Option<&str>,
        request_report: Option<&str>,
        location_type: Option<&str>,
        comment: Option<&str>,
    ) -> Self {
        let flag = |v: Option<&str>| {
            v.map(|s| {
                let s = s.trim();
                is_yes(s) || s.eq_ignore_ascii_case("on") || s.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false)
        };
        ReviewFields {
            classification: classification
                .and_then(Classification::parse)
                .unwrap_or_default(),
            second_opinion: flag(second_opinion),
            request_report: flag(request_report),
            location_type: cell_text("Location/Type", location_type.unwrap_or_default()),
            comment: cell_text("Comments", comment.unwrap_or_default()),
        }
    }
}

#[derive(Clone, Debug)]
struct FormEntry {
    fields: ReviewFields,
    /// In-progress edits win over repopulation until discarded.
    edited: bool,
}

/// Per-row form values, keyed by case index so nothing leaks between rows.
#[derive(Clone, Debug, Default)]
pub struct FormCache {
    entries: HashMap<usize, FormEntry>,
}

impl FormCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the form for `index` from the table. Repeated calls yield the
    /// same values; pending edits for `index` are left untouched.
    pub fn populate(&mut self, index: usize, table: &Table) -> &ReviewFields {
        let entry = self.entries.entry(index).or_insert_with(|| FormEntry {
            fields: ReviewFields::default(),
            edited: false,
        });
        if !entry.edited {
            entry.fields = ReviewFields::from_row(table, index);
        }
        &entry.fields
    }

    /// Records in-progress edits for `index`.
    pub fn edit(&mut self, index: usize, fields: ReviewFields) {
        self.entries.insert(
            index,
            FormEntry {
                fields,
                edited: true,
            },
        );
    }

    /// Drops whatever is held for `index`, edits included.
    pub fn discard(&mut self, index: usize) {
        self.entries.remove(&index);
    }

    pub fn get(&self, index: usize) -> Option<&ReviewFields> {
        self.entries.get(&index).map(|e| &e.fields)
    }

    pub fn has_edits(&self, index: usize) -> bool {
        self.entries.get(&index).is_some_and(|e| e.edited)
    }
}
