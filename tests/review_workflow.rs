use adjudicator::cell::CellValue;
use adjudicator::config::ReviewConfig;
use adjudicator::form::{Classification, ReviewFields};
use adjudicator::loader::{load_from_bytes, load_from_path};
use adjudicator::navigator::{CaseCursor, Notice, OnAllComplete};
use adjudicator::resume::{ResumeFrom, recorded_index};
use adjudicator::session::{ReviewSession, Source};
use adjudicator::table::columns;
use adjudicator::writer::{SheetLayout, write_workbook};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use std::path::Path;

/// Builds a review workbook: a case sheet with the given completion flags
/// and an unrelated sheet that must survive every write.
fn review_workbook(completed: &[&str]) -> Vec<u8> {
    let mut workbook = XlsxWorkbook::new();

    let cases = workbook.add_worksheet();
    cases.set_name("Case Data").unwrap();
    let headers = ["Accession", "Studio Link", "Completed", "Patient Age"];
    for (c, h) in headers.iter().enumerate() {
        cases.write_string(0, c as u16, *h).unwrap();
    }
    for (i, done) in completed.iter().enumerate() {
        let r = i as u32 + 1;
        cases.write_string(r, 0, format!("ACC{:03}", i)).unwrap();
        cases
            .write_string(r, 1, format!("https://studio.example/case/{}", i))
            .unwrap();
        cases.write_string(r, 2, *done).unwrap();
        cases.write_number(r, 3, 40.0 + i as f64).unwrap();
    }

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Reviewer").unwrap();
    notes.write_string(1, 0, "Dr. Example").unwrap();

    workbook.save_to_buffer().unwrap()
}

fn config() -> ReviewConfig {
    let mut config = ReviewConfig {
        log_file: None,
        ..ReviewConfig::default()
    };
    config.navigator.auto_open_next_link = false;
    config
}

fn open(bytes: &[u8], config: &ReviewConfig) -> ReviewSession {
    let loaded = load_from_bytes(bytes, &config.case_sheet).unwrap();
    ReviewSession::open(
        loaded,
        Source::Upload {
            file_name: "High_Confidence_Review_ICH_C_Spine_01.xlsx".into(),
        },
        config,
    )
}

fn answers(classification: Classification) -> ReviewFields {
    ReviewFields {
        classification,
        second_opinion: true,
        request_report: false,
        location_type: "C5 fracture".into(),
        comment: "checked".into(),
    }
}

#[test]
fn fresh_workbook_starts_at_first_case_and_advances() {
    let mut session = open(&review_workbook(&["no", "no", "no"]), &config());
    assert_eq!(session.cursor(), CaseCursor::Active(0));

    let step = session.submit(&answers(Classification::TP)).unwrap();
    assert_eq!(step.cursor, CaseCursor::Active(1));
    assert_eq!(step.submitted, Some(0));

    let table = session.workbook().case_table();
    assert_eq!(table.text(0, columns::COMPLETED), "yes");
    assert_eq!(table.text(0, columns::REVIEW), "TP");
    assert_eq!(table.text(0, columns::SECOND_OPINION), "Yes");
    assert_eq!(table.text(0, columns::REQUEST_REPORT), "No");
    assert_eq!(table.text(0, columns::LOCATION_TYPE), "C5 fracture");
    assert_eq!(table.text(1, columns::COMPLETED), "no");
}

#[test]
fn submit_skips_cases_already_reviewed() {
    let mut session = open(&review_workbook(&["no", "yes", "no"]), &config());
    assert_eq!(session.cursor(), CaseCursor::Active(0));

    let step = session.submit(&answers(Classification::FP)).unwrap();
    assert_eq!(step.cursor, CaseCursor::Active(2));
}

#[test]
fn fully_reviewed_workbook_is_complete_and_downloads_unchanged() {
    let bytes = review_workbook(&["yes"]);
    let mut session = open(&bytes, &config());

    assert!(session.cursor().is_complete());
    assert!(session.current_case().is_none());
    assert_eq!(session.take_notice(), Some(Notice::AllCasesComplete));

    let exported = load_from_bytes(&session.export().unwrap(), "Case Data").unwrap();
    let original = load_from_bytes(&bytes, "Case Data").unwrap();
    assert_eq!(exported.case_table(), original.case_table());
    assert_eq!(exported.workbook().sheet("Notes"), original.workbook().sheet("Notes"));
}

#[test]
fn reviewing_every_case_ends_complete_with_bookkeeping() {
    let mut session = open(&review_workbook(&["no", "no", "no"]), &config());
    let mut last = session.progress().completed;

    while session.cursor().active().is_some() {
        session.submit(&answers(Classification::FP)).unwrap();
        let now = session.progress().completed;
        assert!(now >= last);
        last = now;
    }

    assert_eq!(session.progress().completed, 3);
    assert_eq!(session.notice(), Some(Notice::AllCasesComplete));

    let exported = load_from_bytes(&session.export().unwrap(), "Case Data").unwrap();
    assert_eq!(recorded_index(exported.workbook(), "index", "Case Data"), Some(2));
    assert_eq!(
        exported.workbook().sheet_names(),
        vec!["Case Data", "Notes", "index"]
    );
    for row in 0..3 {
        assert_eq!(exported.case_table().text(row, columns::REVIEW), "FP");
    }
    // Untouched columns keep their values
    assert_eq!(exported.case_table().text(2, "patient_age"), "42");
}

#[test]
fn stay_at_last_keeps_the_final_case_on_screen() {
    let mut config = config();
    config.navigator.on_all_complete = OnAllComplete::StayAtLast;
    let mut session = open(&review_workbook(&["yes", "no"]), &config);

    let step = session.submit(&answers(Classification::TP)).unwrap();
    assert_eq!(step.cursor, CaseCursor::Complete { parked_at: Some(1) });
    assert_eq!(session.current_case().unwrap().accession, "ACC001");
}

#[test]
fn navigation_stops_at_the_ends() {
    let mut session = open(&review_workbook(&["no", "no"]), &config());

    let step = session.previous();
    assert_eq!(step.cursor, CaseCursor::Active(0));
    assert_eq!(step.notice, Some(Notice::FirstCase));

    session.next();
    let step = session.next();
    assert_eq!(step.cursor, CaseCursor::Active(1));
    assert_eq!(step.notice, Some(Notice::LastCase));
}

#[test]
fn written_workbook_reloads_identically() {
    let loaded = load_from_bytes(&review_workbook(&["no", "yes"]), "Case Data").unwrap();
    let layout = SheetLayout::new("Case Data", "index");

    let once = load_from_bytes(&write_workbook(loaded.workbook(), &layout).unwrap(), "Case Data")
        .unwrap();
    assert_eq!(once.workbook(), loaded.workbook());
}

#[test]
fn missing_case_sheet_is_a_format_error() {
    let err = load_from_bytes(&review_workbook(&["no"]), "Cases").unwrap_err();
    assert!(matches!(err, adjudicator::ReviewError::Format(_)));
}

/// Writes a case sheet whose data starts at B2, with a date column, and a
/// second sheet of dates.
fn offset_dated_workbook(path: &Path) {
    let mut workbook = XlsxWorkbook::new();
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let cases = workbook.add_worksheet();
    cases.set_name("Case Data").unwrap();
    for (c, h) in ["Accession", "Studio Link", "Completed", "Study Date"].iter().enumerate() {
        cases.write_string(1, c as u16 + 1, *h).unwrap();
    }
    for i in 0..2u32 {
        cases.write_string(2 + i, 1, format!("ACC{}", i)).unwrap();
        cases.write_string(2 + i, 3, "no").unwrap();
        cases
            .write_number_with_format(2 + i, 4, 45360.0 + i as f64, &date)
            .unwrap();
    }

    let schedule = workbook.add_worksheet();
    schedule.set_name("Schedule").unwrap();
    schedule.write_string(0, 0, "Read By").unwrap();
    schedule.write_number_with_format(1, 0, 45361.0, &date).unwrap();

    workbook.save(path).unwrap();
}

#[test]
fn in_place_save_keeps_dates_and_cell_positions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch_1.xlsx");
    offset_dated_workbook(&path);

    let loaded = load_from_path(&path, "Case Data").unwrap();
    assert_eq!(
        loaded.case_table().get(0, "study_date"),
        Some(&CellValue::DateTime(45360.0))
    );

    let mut session = ReviewSession::open(
        loaded,
        Source::Directory { path: path.clone() },
        &config(),
    );
    session.submit(&answers(Classification::TP)).unwrap();

    let saved = load_from_path(&path, "Case Data").unwrap();
    let table = saved.case_table();
    assert_eq!(table.header_row, 1);
    assert_eq!(table.column_index("accession"), Some(1));
    assert_eq!(table.text(0, "study_date"), "2024-03-09");
    assert_eq!(table.get(1, "study_date"), Some(&CellValue::DateTime(45361.0)));
    assert_eq!(table.text(0, "completed"), "yes");
    assert_eq!(
        saved.workbook().sheet("Schedule").unwrap().get(0, "read_by"),
        Some(&CellValue::DateTime(45361.0))
    );
}

#[test]
fn bookkeeping_resume_never_lands_on_a_reviewed_case() {
    let mut session = open(&review_workbook(&["no", "no", "no"]), &config());
    session.next();
    session.submit(&answers(Classification::TP)).unwrap();
    let exported = session.export().unwrap();

    let mut config = config();
    config.navigator.resume_from = ResumeFrom::Bookkeeping;
    let reopened = open(&exported, &config);
    assert_eq!(reopened.cursor(), CaseCursor::Active(2));
    assert!(!reopened.current_case().unwrap().completed);
}
