//! Generic TIFF fallback
//!
//! Claims any `.tif`/`.tiff` file with a TIFF signature that no vendor
//! handler claimed. Every ASCII field is checked against the identifier
//! rules and replaced as a whole on a hit.

use std::collections::BTreeMap;
use std::path::Path;

use super::tiff_common::{self, tag_name, AuxiliaryKind, FileContainer, TiffScan, TiffVendor};
use super::{patch, FormatHandler, RedactOptions, RedactOutcome, ScanOptions};
use crate::container::{tags, Directory};
use crate::domain::{FormatInfo, FormatKind, MutationPlan, PhiFinding, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct GenericTiffHandler;

impl TiffVendor for GenericTiffHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Tiff
    }

    fn label_prefix(&self) -> &'static str {
        "TIFF"
    }

    fn scan_directory(&self, scan: &mut TiffScan<'_>, directory: &Directory) -> Result<()> {
        for field in &directory.fields {
            if !field.is_ascii() || !scan.first_visit(field) {
                continue;
            }
            let value = scan.read_text(field)?;
            if value.is_empty() {
                continue;
            }
            let hits = scan.options.scanner.scan_text(&value);
            let Some(first) = hits.first() else {
                continue;
            };
            let label = scan.label(&format!("{}:{}", tag_name(field.tag), first.label));
            scan.fixed_fill_field(directory, field, first.category, label, &value);
        }
        Ok(())
    }

    fn auxiliary_kind(
        &self,
        container: &mut FileContainer,
        directory: &Directory,
    ) -> Result<Option<AuxiliaryKind>> {
        let Some(field) = directory.field(tags::IMAGE_DESCRIPTION) else {
            return Ok(None);
        };
        let text = container.read_field_value(field)?.as_text().unwrap_or_default();
        Ok(AuxiliaryKind::from_description(&text, false))
    }
}

impl FormatHandler for GenericTiffHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Tiff
    }

    fn detect(&self, path: &Path) -> bool {
        tiff_common::detect_tiff(path, FormatKind::Tiff)
    }

    fn scan(&self, path: &Path, options: &ScanOptions) -> Result<Vec<PhiFinding>> {
        tiff_common::scan_tiff(self, path, options)
    }

    fn redact(&self, path: &Path, plan: &MutationPlan, options: &RedactOptions) -> RedactOutcome {
        patch::apply_byte_actions(path, &plan.actions, options)
    }

    fn info(&self, path: &Path) -> Result<FormatInfo> {
        tiff_common::tiff_info(self, path)
    }

    fn diagnostic_digests(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        tiff_common::tiff_digests(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::{build, build_with_images, TestField};
    use crate::domain::{Location, PhiCategory, ScanResult};
    use crate::formats::tiff_common::test_support::{options, write_temp};

    fn anonymize(path: &Path) {
        let findings = GenericTiffHandler.scan(path, &options()).unwrap();
        let plan =
            MutationPlan::from_scan(&ScanResult::new(path, FormatKind::Tiff, findings)).unwrap();
        assert!(GenericTiffHandler
            .redact(path, &plan, &RedactOptions::default())
            .is_complete());
    }

    #[test]
    fn test_case_number_in_one_field() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(vec![vec![TestField::ascii(285, "AS-24-123456")]]);
        let path = write_temp(&dir, "slide.tif", &bytes);

        let findings = GenericTiffHandler.scan(&path, &options()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PhiCategory::CaseNumber);
        assert!(matches!(
            findings[0].location,
            Location::Field { tag: 285, length: 13, .. }
        ));

        anonymize(&path);
        let after = std::fs::read(&path).unwrap();
        assert_eq!(after.len(), bytes.len());
        let text = String::from_utf8_lossy(&after);
        assert!(text.contains("XXXXXXXXXXXX\0"));
        assert!(GenericTiffHandler.scan(&path, &options()).unwrap().is_empty());
    }

    #[test]
    fn test_field_repeated_across_directories() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(vec![
            vec![TestField::ascii(285, "AS-24-123456")],
            vec![TestField::ascii(285, "AS-24-123456")],
            vec![TestField::ascii(285, "AS-24-123456")],
        ]);
        let path = write_temp(&dir, "slide.tif", &bytes);
        assert_eq!(GenericTiffHandler.scan(&path, &options()).unwrap().len(), 3);
        anonymize(&path);
        assert!(GenericTiffHandler.scan(&path, &options()).unwrap().is_empty());
    }

    #[test]
    fn test_shared_blanked_label_is_already_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut blanked = crate::container::BLANK_JPEG.to_vec();
        blanked.resize(800, 0);
        let mut bytes = build_with_images(vec![
            (vec![], Some(vec![0x42; 64])),
            (vec![TestField::ascii(270, "label")], Some(blanked)),
            (vec![TestField::ascii(270, "label")], Some(vec![0; 16])),
        ]);
        // point the third directory's strip at the second one's region
        let dirs = {
            use crate::container::Container;
            let mut c = Container::open(std::io::Cursor::new(bytes.clone())).unwrap();
            c.read_directories().unwrap()
        };
        let shared = {
            let f = dirs[1].field(tags::STRIP_OFFSETS).unwrap();
            bytes[f.value_offset as usize..f.value_offset as usize + 4].to_vec()
        };
        let third = dirs[2].field(tags::STRIP_OFFSETS).unwrap().value_offset as usize;
        bytes[third..third + 4].copy_from_slice(&shared);
        let count = dirs[2].field(tags::STRIP_BYTE_COUNTS).unwrap().value_offset as usize;
        bytes[count..count + 4].copy_from_slice(&800u32.to_le_bytes());

        let path = write_temp(&dir, "slide.tif", &bytes);
        let findings = GenericTiffHandler.scan(&path, &options()).unwrap();
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn test_date_tag_null_filled() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(vec![vec![TestField::ascii(306, "2024:03:15 10:22:01")]]);
        let path = write_temp(&dir, "slide.tif", &bytes);
        let findings = GenericTiffHandler.scan(&path, &options()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PhiCategory::Date);
        anonymize(&path);
        assert!(GenericTiffHandler.scan(&path, &options()).unwrap().is_empty());
    }
}
