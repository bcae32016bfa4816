//! Roche/Ventana BIF
//!
//! Scan metadata is an XMP packet in tag 700 whose `<iScan>` element
//! carries barcodes, scan timestamps, operator and patient attributes.

use std::collections::BTreeMap;
use std::path::Path;

use super::tiff_common::{self, attribute_spans, AuxiliaryKind, FileContainer, TiffScan, TiffVendor};
use super::{patch, FormatHandler, RedactOptions, RedactOutcome, ScanOptions};
use crate::container::{tags, Directory};
use crate::domain::{FormatInfo, FormatKind, MutationPlan, PhiCategory, PhiFinding, Result};

pub const XMP: u16 = 700;

/// Identifying `<iScan>` attributes
pub const XMP_PHI_ATTRIBUTES: [&str; 17] = [
    "BarCode1",
    "BarCode2",
    "BarCodeType1",
    "BarCodeType2",
    "ScanDate",
    "ScanTime",
    "BaseFileName",
    "UniqueID",
    "DeviceSerialNumber",
    "OperatorID",
    "PatientName",
    "CaseID",
    "SampleID",
    "LabelText",
    "Comment",
    "Description",
    "SlideAnnotation",
];

fn category(attribute: &str) -> PhiCategory {
    match attribute {
        "BarCode1" | "BarCode2" | "CaseID" => PhiCategory::CaseNumber,
        "ScanDate" | "ScanTime" => PhiCategory::Date,
        "DeviceSerialNumber" => PhiCategory::DeviceIdentifier,
        "OperatorID" | "PatientName" => PhiCategory::PersonName,
        "LabelText" | "Comment" | "Description" | "SlideAnnotation" => PhiCategory::FreeText,
        _ => PhiCategory::UniqueIdentifier,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BifHandler;

impl TiffVendor for BifHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Bif
    }

    fn label_prefix(&self) -> &'static str {
        "BIF"
    }

    fn excluded_extra_tags(&self) -> &'static [u16] {
        &[tags::IMAGE_DESCRIPTION, XMP]
    }

    fn scan_directory(&self, scan: &mut TiffScan<'_>, directory: &Directory) -> Result<()> {
        if let Some(field) = directory.field(XMP) {
            if scan.first_visit(field) {
                let raw = scan.read_raw(field)?;
                let spans = attribute_spans(&raw, &XMP_PHI_ATTRIBUTES)?;
                scan.redact_spans(directory, field, &raw, &spans, category);
                scan.scan_embedded_text(directory, field, &raw);
            }
        }
        if let Some(field) = directory.field(tags::IMAGE_DESCRIPTION) {
            if field.is_textual() && scan.first_visit(field) {
                let raw = scan.read_raw(field)?;
                scan.scan_embedded_text(directory, field, &raw);
            }
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
        Ok(AuxiliaryKind::from_description(&text, true))
    }

    fn describe(
        &self,
        container: &mut FileContainer,
        directories: &[Directory],
        details: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let has_xmp = directories.iter().any(|d| d.field(XMP).is_some());
        details.insert("xmp".to_string(), has_xmp.to_string());
        if let Some(field) = directories.iter().find_map(|d| d.field(tags::IMAGE_DESCRIPTION)) {
            let text = container.read_field_value(field)?.as_text().unwrap_or_default();
            if let Some(level) = text.split_whitespace().find(|w| w.starts_with("level=")) {
                details.insert("first_level".to_string(), level.trim_start_matches("level=").to_string());
            }
        }
        Ok(())
    }
}

impl FormatHandler for BifHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Bif
    }

    fn detect(&self, path: &Path) -> bool {
        tiff_common::detect_tiff(path, FormatKind::Bif)
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
    use crate::container::testutil::{build_with_images, TestField};
    use crate::domain::ScanResult;
    use crate::formats::tiff_common::test_support::{options, write_temp};

    const PACKET: &str = r#"<?xml version="1.0" encoding="utf-8"?><Metadata><iScan barcode1="AS-24-123456" ScanDate="2024-03-15" OperatorID="tech7" Magnification="40" LabelText=""/></Metadata>"#;

    fn slide() -> Vec<u8> {
        let mut thumb = vec![0xFF, 0xD8];
        thumb.resize(64, 0x21);
        build_with_images(vec![
            (vec![TestField::ascii(700, PACKET)], None),
            (vec![TestField::ascii(270, "level=0 mag=40 quality=90")], Some(vec![0x10; 64])),
            (vec![TestField::ascii(270, "Thumbnail")], Some(thumb)),
        ])
    }

    #[test]
    fn test_xmp_attributes_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.bif", &slide());
        let findings = BifHandler.scan(&path, &options()).unwrap();
        let labels: Vec<_> = findings.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["BIF:BarCode1", "BIF:ScanDate", "BIF:OperatorID", "BIF:thumbnail image"]
        );
        assert_eq!(findings[0].category, PhiCategory::CaseNumber);
    }

    #[test]
    fn test_redaction_preserves_packet_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.bif", &slide());
        let findings = BifHandler.scan(&path, &options()).unwrap();
        let plan =
            MutationPlan::from_scan(&ScanResult::new(&path, FormatKind::Bif, findings)).unwrap();
        assert!(BifHandler
            .redact(&path, &plan, &RedactOptions::default())
            .is_complete());

        let text = String::from_utf8_lossy(&std::fs::read(&path).unwrap()).into_owned();
        assert!(text.contains(r#"barcode1="XXXXXXXXXXXX" ScanDate="XXXXXXXXXX" OperatorID="XXXXX" Magnification="40""#));
        assert!(BifHandler.scan(&path, &options()).unwrap().is_empty());
    }
}
