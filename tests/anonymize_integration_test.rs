//! End-to-end scan, anonymize and verify over synthetic slides

mod common;

use common::*;
use slidescrub::core::{AnonymizeMode, Scrubber};
use slidescrub::domain::{FormatKind, ParseError, PhiCategory, ScrubError, Stage};
use tempfile::TempDir;

fn scrubber() -> Scrubber {
    Scrubber::new().unwrap()
}

#[test]
fn test_tiff_accession_number_is_found_and_removed() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "case.tif", &dirty_tiff());
    let scrubber = scrubber();

    let scan = scrubber.scan(&path);
    assert_eq!(scan.format, Some(FormatKind::Tiff));
    assert!(!scan.is_clean());
    assert!(scan
        .findings
        .iter()
        .any(|f| f.category == PhiCategory::CaseNumber));

    let record = scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
    assert!(record.actions_applied >= 1);
    assert_eq!(record.verified, Some(true));

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), dirty_tiff().len());
    assert!(!bytes.windows(12).any(|w| w == b"AS-24-123456"));
    assert!(scrubber.verify(&path).unwrap().clean);
}

#[test]
fn test_second_pass_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "case.tif", &dirty_tiff());
    let scrubber = scrubber();

    scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
    let first = std::fs::read(&path).unwrap();

    let record = scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
    assert!(record.already_clean);
    assert_eq!(record.actions_applied, 0);
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn test_copy_mode_leaves_source_untouched() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "case.tif", &dirty_tiff());
    let dest = dir.path().join("out/clean.tif");

    let record = scrubber()
        .anonymize(&path, AnonymizeMode::Copy(dest.clone()))
        .unwrap();
    assert_eq!(record.output, dest);
    assert_eq!(std::fs::read(&path).unwrap(), dirty_tiff());
    assert!(scrubber().verify(&dest).unwrap().clean);
}

#[test]
fn test_copy_mode_refuses_existing_destination() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "case.tif", &dirty_tiff());
    let dest = write(dir.path(), "taken.tif", b"keep");

    let err = scrubber()
        .anonymize_staged(&path, &AnonymizeMode::Copy(dest.clone()))
        .unwrap_err();
    assert_eq!(err.stage, Stage::Copy);
    assert_eq!(std::fs::read(&dest).unwrap(), b"keep");
}

#[test]
fn test_mrxs_copy_renames_companion_directory() {
    let dir = TempDir::new().unwrap();
    let path = mrxs(dir.path(), "case");
    let dest = dir.path().join("out/renamed.mrxs");

    let record = scrubber()
        .anonymize(&path, AnonymizeMode::Copy(dest.clone()))
        .unwrap();
    assert!(record.actions_applied >= 1);

    let copied = std::fs::read_to_string(dir.path().join("out/renamed/Slidedat.ini")).unwrap();
    assert!(copied.starts_with('\u{feff}'));
    assert!(copied.contains("SLIDE_ID = XXXXXXXX\r\n"));
    assert!(copied.contains("OBJECTIVE_MAGNIFICATION = 20\r\n"));
    assert_eq!(copied.len(), SLIDEDAT.len());

    let original = std::fs::read_to_string(dir.path().join("case/Slidedat.ini")).unwrap();
    assert_eq!(original, SLIDEDAT);
}

#[test]
fn test_mrxs_without_companion_fails() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "lonely.mrxs", b"index");
    let err = scrubber().try_scan(&path).unwrap_err();
    assert!(matches!(err, ScrubError::CompanionMissing(_)));
}

#[test]
fn test_dicom_caret_only_name_is_clean() {
    let dir = TempDir::new().unwrap();
    let body = element(0x0010, 0x0010, b"PN", b"^^^^");
    let path = write(dir.path(), "slide.dcm", &dicom(REMAPPED_UID, &body));

    let scan = scrubber().scan(&path);
    assert_eq!(scan.format, Some(FormatKind::Dicom));
    assert!(scan.error.is_none(), "{:?}", scan.error);
    assert_eq!(scan.redactable().count(), 0);
}

#[test]
fn test_dicom_patient_name_is_emptied() {
    let dir = TempDir::new().unwrap();
    let body = element(0x0010, 0x0010, b"PN", b"Doe^Jane");
    let path = write(dir.path(), "slide.dcm", &dicom(REMAPPED_UID, &body));
    let scrubber = scrubber();

    let scan = scrubber.scan(&path);
    assert!(scan
        .findings
        .iter()
        .any(|f| f.category == PhiCategory::PersonName));

    scrubber.anonymize(&path, AnonymizeMode::InPlace).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(!bytes.windows(8).any(|w| w == b"Doe^Jane"));
    assert!(scrubber.verify(&path).unwrap().clean);
}

#[test]
fn test_cyclic_chain_is_never_clean() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "loop.tif", &cyclic_tiff());
    let scrubber = scrubber();

    assert!(matches!(
        scrubber.try_scan(&path),
        Err(ScrubError::Parse(ParseError::Cycle(_)))
    ));
    let scan = scrubber.scan(&path);
    assert!(scan.is_error());
    assert!(!scan.is_clean());
}

#[test]
fn test_truncated_file_is_never_clean() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "cut.tif", &[b'I', b'I', 42, 0, 0xF0, 0, 0, 0]);
    let scrubber = scrubber();

    let scan = scrubber.scan(&path);
    assert!(scan.is_error());
    assert!(!scan.is_clean());

    let err = scrubber
        .anonymize_staged(&path, &AnonymizeMode::InPlace)
        .unwrap_err();
    assert_eq!(err.stage, Stage::Scan);
}

#[test]
fn test_unsupported_file() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "notes.txt", b"hello");
    let scrubber = scrubber();

    assert_eq!(scrubber.detect_format(&path), None);
    assert!(matches!(
        scrubber.try_scan(&path),
        Err(ScrubError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_info_reports_clean_verdict() {
    let dir = TempDir::new().unwrap();
    let clean = write(dir.path(), "clean.tif", &clean_tiff());
    let dirty = write(dir.path(), "dirty.tif", &dirty_tiff());
    let scrubber = scrubber();

    let info = scrubber.info(&clean).unwrap();
    assert_eq!(info.format, FormatKind::Tiff);
    assert_eq!(info.page_count, 1);
    assert_eq!(info.clean, Some(true));
    assert_eq!(scrubber.info(&dirty).unwrap().clean, Some(false));
}
