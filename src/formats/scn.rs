//! Leica SCN
//!
//! Slide metadata is an XML document in the ImageDescription of the first
//! directory. Identifying values appear both as element text
//! (`<barcode>...</barcode>`) and as attributes (`<device model="...">`).

use std::collections::BTreeMap;
use std::path::Path;

use super::tiff_common::{
    self, attribute_spans, element_spans, AuxiliaryKind, FileContainer, TiffScan, TiffVendor,
};
use super::{patch, FormatHandler, RedactOptions, RedactOutcome, ScanOptions};
use crate::container::{tags, Directory};
use crate::domain::{FormatInfo, FormatKind, MutationPlan, PhiCategory, PhiFinding, Result};

/// Identifying element and attribute names
pub const SCN_PHI_ELEMENTS: [&str; 14] = [
    "barcode",
    "creationDate",
    "device",
    "model",
    "version",
    "slideName",
    "description",
    "user",
    "operator",
    "institution",
    "uniqueID",
    "serialNumber",
    "acquisitionDate",
    "acquisitionTime",
];

fn category(name: &str) -> PhiCategory {
    match name {
        "barcode" => PhiCategory::CaseNumber,
        "creationDate" | "acquisitionDate" | "acquisitionTime" => PhiCategory::Date,
        "device" | "model" | "version" | "serialNumber" => PhiCategory::DeviceIdentifier,
        "user" | "operator" => PhiCategory::PersonName,
        "institution" => PhiCategory::Institution,
        "description" => PhiCategory::FreeText,
        _ => PhiCategory::UniqueIdentifier,
    }
}

fn is_xml(raw: &[u8]) -> bool {
    raw.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScnHandler;

impl TiffVendor for ScnHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Scn
    }

    fn label_prefix(&self) -> &'static str {
        "SCN"
    }

    fn excluded_extra_tags(&self) -> &'static [u16] {
        &[tags::IMAGE_DESCRIPTION]
    }

    fn scan_directory(&self, scan: &mut TiffScan<'_>, directory: &Directory) -> Result<()> {
        let Some(field) = directory.field(tags::IMAGE_DESCRIPTION) else {
            return Ok(());
        };
        if !field.is_textual() || !scan.first_visit(field) {
            return Ok(());
        }
        let raw = scan.read_raw(field)?;
        if is_xml(&raw) {
            let mut spans = element_spans(&raw, &SCN_PHI_ELEMENTS)?;
            spans.extend(attribute_spans(&raw, &SCN_PHI_ELEMENTS)?);
            spans.sort_by_key(|s| s.start);
            spans.dedup_by_key(|s| s.start);
            scan.redact_spans(directory, field, &raw, &spans, category);
        }
        scan.scan_embedded_text(directory, field, &raw);
        Ok(())
    }

    /// Plain-text descriptions naming a label or macro; the XML document is
    /// never an auxiliary marker even when it mentions one
    fn auxiliary_kind(
        &self,
        container: &mut FileContainer,
        directory: &Directory,
    ) -> Result<Option<AuxiliaryKind>> {
        let Some(field) = directory.field(tags::IMAGE_DESCRIPTION) else {
            return Ok(None);
        };
        let raw = container.read_field_bytes(field)?;
        if is_xml(&raw) {
            return Ok(None);
        }
        Ok(AuxiliaryKind::from_description(
            &String::from_utf8_lossy(&raw),
            false,
        ))
    }

    fn describe(
        &self,
        container: &mut FileContainer,
        directories: &[Directory],
        details: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let Some(field) = directories
            .first()
            .and_then(|d| d.field(tags::IMAGE_DESCRIPTION))
        else {
            return Ok(());
        };
        let raw = container.read_field_bytes(field)?;
        details.insert("xml_metadata".to_string(), is_xml(&raw).to_string());
        let images = String::from_utf8_lossy(&raw).matches("<image").count();
        details.insert("images".to_string(), images.to_string());
        Ok(())
    }
}

impl FormatHandler for ScnHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Scn
    }

    fn detect(&self, path: &Path) -> bool {
        tiff_common::detect_tiff(path, FormatKind::Scn)
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
