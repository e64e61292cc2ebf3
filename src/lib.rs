/*!
# Adjudicator

A browser-based workflow for adjudicating AI-flagged imaging cases kept in
Excel workbooks, built in Rust.

## Overview

A reviewer opens a workbook whose case sheet lists one case per row
(accession number, studio link, completion flag, review answers). The
application resumes at the first unreviewed case, records a TP/FP
determination plus follow-up flags for each case, marks it completed and
moves on. Reviewed workbooks are saved back in place or offered for
download with every other sheet preserved.

## Architecture

### Data Layer
- **cell**: Typed cell values read from and written to workbooks
- **table**: Sheets as header + rows, with normalized column names
- **loader**: Reading workbooks through calamine
- **writer**: Writing workbooks through rust_xlsxwriter, with fixed column widths

### Review Layer
- **form**: Review answers of one case and the per-case form cache
- **resume**: Picking the case to start at, and the bookkeeping sheet
- **navigator**: Previous / Next / Submit transitions
- **session**: One reviewer's state over one workbook

### Outer Layer
- **workflow**: Listing and saving workbooks in the workflow directory
- **config**: JSON configuration
- **app**: Routing, pages and session cookies (feature `web`)

## REST Endpoints

- `/` - Workbook picker and upload form
- `/review` - Current case, progress and notices
- `/review/previous`, `/review/next`, `/review/submit` - Navigation
- `/download` - Updated workbook as an attachment
- `/api/state` - Session state as JSON
*/

pub mod cell;
pub mod config;
pub mod error;
pub mod form;
pub mod loader;
pub mod navigator;
pub mod resume;
pub mod session;
pub mod table;
pub mod workflow;
pub mod writer;

#[cfg(feature = "web")]
pub mod app;

pub use cell::CellValue;
pub use config::ReviewConfig;
pub use error::{Result, ReviewError};
pub use form::{Classification, ReviewFields};
pub use loader::{LoadedWorkbook, load_from_bytes, load_from_path};
pub use navigator::{CaseCursor, Navigator, NavigatorPolicy, Notice, Step};
pub use session::{ReviewSession, Source};
pub use table::{Table, Workbook};
pub use writer::write_workbook;
