use crate::config::ReviewConfig;
use crate::error::{Result, ReviewError};
use crate::form::{FormCache, ReviewFields};
use crate::loader::LoadedWorkbook;
use crate::navigator::{CaseCursor, Navigator, Notice, Persistence, Step, web_link};
use crate::resume::{record_index, recorded_index, resume_cursor};
use crate::table::columns;
use crate::workflow::save_in_place;
use crate::writer::{SheetLayout, updated_file_name, write_workbook};
use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// Where the workbook of a session came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Uploaded through the browser; only downloadable.
    Upload { file_name: String },
    /// Picked from the workflow directory.
    Directory { path: PathBuf },
}

impl Source {
    pub fn display_name(&self) -> String {
        match self {
            Source::Upload { file_name } => file_name.clone(),
            Source::Directory { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Everything the review page needs about the presented case.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaseView {
    pub index: usize,
    /// 1-based position for display.
    pub number: usize,
    pub total: usize,
    pub accession: String,
    /// Empty unless the sheet holds an `http`/`https` link.
    pub studio_link: String,
    pub completed: bool,
    pub fields: ReviewFields,
}

/// A submit computed on a copy of the session and not yet applied.
///
/// Holding one does not lock the session, so the workbook can be written
/// to disk in between; [`ReviewSession::commit`] refuses it if the session
/// moved on meanwhile.
#[derive(Debug)]
pub struct PendingSubmit {
    loaded: LoadedWorkbook,
    forms: FormCache,
    step: Step,
    revision: u64,
    save: Option<(PathBuf, Vec<u8>)>,
}

impl PendingSubmit {
    pub fn step(&self) -> &Step {
        &self.step
    }

    /// Takes the source path and bytes to write when saving in place.
    pub fn take_save(&mut self) -> Option<(PathBuf, Vec<u8>)> {
        self.save.take()
    }
}

/// One reviewer's working state over one workbook.
#[derive(Debug)]
pub struct ReviewSession {
    loaded: LoadedWorkbook,
    source: Source,
    cursor: CaseCursor,
    forms: FormCache,
    navigator: Navigator,
    layout: SheetLayout,
    index_sheet: String,
    persistence: Persistence,
    notice: Option<Notice>,
    /// Bumped by every applied transition.
    revision: u64,
}

impl ReviewSession {
    /// Starts a session: resolves the resume point and fills its form.
    pub fn open(loaded: LoadedWorkbook, source: Source, config: &ReviewConfig) -> Self {
        let mut policy = config.navigator.clone();
        if matches!(source, Source::Upload { .. }) {
            policy.persistence = Persistence::Download;
        }

        let cursor = resume_cursor(&loaded, &config.index_sheet, &policy);
        let mut forms = FormCache::new();
        if let Some(idx) = cursor.active() {
            forms.populate(idx, loaded.case_table());
        }

        let notice = if loaded.case_table().is_empty() {
            warn!("{}", ReviewError::EmptyDataset(loaded.case_sheet().to_string()));
            Some(Notice::EmptyDataset)
        } else if cursor.is_complete() {
            info!("All cases reviewed for user.");
            Some(Notice::AllCasesComplete)
        } else {
            None
        };

        info!(
            "Opened session on {} at {:?} ({} cases)",
            source.display_name(),
            cursor,
            loaded.case_table().len()
        );

        ReviewSession {
            persistence: policy.persistence,
            navigator: Navigator::new(policy),
            layout: config.layout(),
            index_sheet: config.index_sheet.clone(),
            loaded,
            source,
            cursor,
            forms,
            notice,
            revision: 0,
        }
    }

    pub fn cursor(&self) -> CaseCursor {
        self.cursor
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn workbook(&self) -> &LoadedWorkbook {
        &self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.case_table().is_empty()
    }

    /// Returns and clears the notice left by the last transition.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// The pending notice, or the standing one for a finished/empty session.
    pub fn notice(&self) -> Option<Notice> {
        self.notice.or_else(|| {
            if self.is_empty() {
                Some(Notice::EmptyDataset)
            } else if self.cursor.is_complete() {
                Some(Notice::AllCasesComplete)
            } else {
                None
            }
        })
    }

    pub fn progress(&self) -> Progress {
        let table = self.loaded.case_table();
        Progress {
            completed: (0..table.len())
                .filter(|&i| table.text(i, columns::COMPLETED) == "yes")
                .count(),
            total: table.len(),
        }
    }

    /// The case on screen: the active row, or the parked row of a finished
    /// session.
    pub fn current_case(&self) -> Option<CaseView> {
        let index = match self.cursor {
            CaseCursor::Active(i) => i,
            CaseCursor::Complete { parked_at } => parked_at?,
        };
        let table = self.loaded.case_table();
        if index >= table.len() {
            return None;
        }
        let fields = self
            .forms
            .get(index)
            .cloned()
            .unwrap_or_else(|| ReviewFields::from_row(table, index));
        Some(CaseView {
            index,
            number: index + 1,
            total: table.len(),
            accession: table.text(index, columns::ACCESSION),
            studio_link: web_link(&table.text(index, columns::STUDIO_LINK))
                .unwrap_or_default()
                .to_string(),
            completed: table.text(index, columns::COMPLETED) == "yes",
            fields,
        })
    }

    pub fn previous(&mut self) -> Step {
        let step = self
            .navigator
            .previous(self.cursor, self.loaded.case_table(), &mut self.forms);
        self.apply(&step);
        step
    }

    pub fn next(&mut self) -> Step {
        let step = self
            .navigator
            .next(self.cursor, self.loaded.case_table(), &mut self.forms);
        self.apply(&step);
        step
    }

    /// Keeps unsubmitted edits for the active row.
    pub fn edit(&mut self, fields: ReviewFields) {
        if let Some(idx) = self.cursor.active() {
            self.forms.edit(idx, fields);
        }
    }

    /// Submits the active row, records it in the bookkeeping sheet, and
    /// saves in place when the session persists that way.
    ///
    /// Nothing changes unless the whole submit succeeds.
    pub fn submit(&mut self, fields: &ReviewFields) -> Result<Step> {
        let mut pending = self.prepare_submit(fields)?;
        if let Some((path, bytes)) = pending.take_save() {
            save_in_place(&path, &bytes).inspect_err(|e| {
                warn!("Submit of case {:?} not saved: {}", self.cursor, e);
            })?;
        }
        self.commit(pending)
    }

    /// Runs a submit against copies of the table and form cache. The
    /// workbook bytes are produced here when saving in place, so a write
    /// error leaves the session untouched.
    pub fn prepare_submit(&self, fields: &ReviewFields) -> Result<PendingSubmit> {
        let mut loaded = self.loaded.clone();
        let mut forms = self.forms.clone();
        let step = self
            .navigator
            .submit(self.cursor, loaded.case_table_mut(), &mut forms, fields)?;

        let mut save = None;
        if let Some(row) = step.submitted {
            loaded.record_index(&self.index_sheet, row);

            if let (Persistence::InPlace, Source::Directory { path }) =
                (self.persistence, &self.source)
            {
                save = Some((path.clone(), write_workbook(loaded.workbook(), &self.layout)?));
            }
        }

        Ok(PendingSubmit {
            loaded,
            forms,
            step,
            revision: self.revision,
            save,
        })
    }

    /// Applies a prepared submit.
    ///
    /// # Errors
    /// * `ReviewError::StaleSubmit` if another transition was applied since
    ///   `pending` was prepared
    pub fn commit(&mut self, pending: PendingSubmit) -> Result<Step> {
        if pending.revision != self.revision {
            return Err(ReviewError::StaleSubmit);
        }
        self.loaded = pending.loaded;
        self.forms = pending.forms;
        self.apply(&pending.step);
        Ok(pending.step)
    }

    fn apply(&mut self, step: &Step) {
        self.cursor = step.cursor;
        self.notice = step.notice;
        self.revision += 1;
    }

    /// XLSX bytes of the current workbook, with the bookkeeping sheet
    /// guaranteed present.
    ///
    /// # Errors
    /// * `ReviewError::EmptyDataset` when there are no cases to download
    pub fn export(&self) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Err(ReviewError::EmptyDataset(self.loaded.case_sheet().to_string()));
        }
        let mut workbook = self.loaded.workbook().clone();
        let case_sheet = self.loaded.case_sheet();
        if recorded_index(&workbook, &self.index_sheet, case_sheet).is_none() {
            let position = match self.cursor {
                CaseCursor::Active(i) => i,
                CaseCursor::Complete { parked_at } => {
                    parked_at.unwrap_or(self.loaded.case_table().len() - 1)
                }
            };
            record_index(&mut workbook, &self.index_sheet, case_sheet, position);
        }
        write_workbook(&workbook, &self.layout)
    }

    /// Attachment name for a download made now.
    pub fn download_name(&self) -> String {
        updated_file_name(&self.source.display_name(), &Local::now())
    }
}

#[cfg(feature = "web")]
pub use store::SessionStore;

#[cfg(feature = "web")]
mod store {
    use super::ReviewSession;
    use crate::error::{Result, ReviewError};
    use log::info;
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};
    use std::time::{Duration, SystemTime};
    use uuid::Uuid;

    struct Entry {
        session: ReviewSession,
        expires_at: SystemTime,
    }

    /// Live review sessions keyed by the id stored in the browser cookie.
    pub struct SessionStore {
        sessions: Mutex<HashMap<String, Entry>>,
        lifetime: Duration,
    }

    impl SessionStore {
        pub fn new(lifetime: Duration) -> Self {
            SessionStore {
                sessions: Mutex::new(HashMap::new()),
                lifetime,
            }
        }

        /// Stores a session and returns its new id.
        pub fn insert(&self, session: ReviewSession) -> String {
            let id = Uuid::new_v4().to_string();
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(
                id.clone(),
                Entry {
                    session,
                    expires_at: SystemTime::now() + self.lifetime,
                },
            );
            info!("Created review session {}", id);
            id
        }

        /// Runs `f` against a live session and extends its lifetime.
        ///
        /// # Errors
        /// * `ReviewError::SessionNotFound` for unknown or expired ids
        pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut ReviewSession) -> R) -> Result<R> {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let now = SystemTime::now();
            match sessions.get_mut(id) {
                Some(entry) if entry.expires_at > now => {
                    entry.expires_at = now + self.lifetime;
                    Ok(f(&mut entry.session))
                }
                Some(_) => {
                    sessions.remove(id);
                    info!("Review session {} expired", id);
                    Err(ReviewError::SessionNotFound)
                }
                None => Err(ReviewError::SessionNotFound),
            }
        }

        pub fn remove(&self, id: &str) -> bool {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.remove(id).is_some()
        }

        /// Drops expired sessions; returns how many were removed.
        pub fn purge_expired(&self) -> usize {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let now = SystemTime::now();
            let before = sessions.len();
            sessions.retain(|_, entry| entry.expires_at > now);
            before - sessions.len()
        }

        pub fn len(&self) -> usize {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }
}
