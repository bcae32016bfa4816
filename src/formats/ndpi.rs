//! Hamamatsu NDPI
//!
//! Barcode and reference strings live in private tags 65468 and 65427.
//! Auxiliary images are told apart by NDPI_SOURCELENS (65421): -1 is the
//! macro photograph and -2 the barcode/label map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::tiff_common::{
    self, is_blank_value, tag_name, AuxiliaryKind, FileContainer, TiffScan, TiffVendor,
};
use super::{patch, FormatHandler, RedactOptions, RedactOutcome, ScanOptions};
use crate::container::Directory;
use crate::domain::{FormatInfo, FormatKind, MutationPlan, PhiCategory, PhiFinding, Result};

pub const NDPI_SOURCELENS: u16 = 65421;
pub const NDPI_REFERENCE: u16 = 65427;
pub const NDPI_BARCODE: u16 = 65468;

/// Vendor identifier tags and their categories
const IDENTIFIER_TAGS: [(u16, PhiCategory); 2] = [
    (NDPI_BARCODE, PhiCategory::CaseNumber),
    (NDPI_REFERENCE, PhiCategory::UniqueIdentifier),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct NdpiHandler;

impl NdpiHandler {
    fn source_lens(container: &mut FileContainer, directory: &Directory) -> Result<Option<f64>> {
        match directory.field(NDPI_SOURCELENS) {
            Some(field) => Ok(container.read_field_value(field)?.first_float()),
            None => Ok(None),
        }
    }
}

impl TiffVendor for NdpiHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Ndpi
    }

    fn label_prefix(&self) -> &'static str {
        "NDPI"
    }

    fn scan_directory(&self, scan: &mut TiffScan<'_>, directory: &Directory) -> Result<()> {
        for (tag, category) in IDENTIFIER_TAGS {
            let Some(field) = directory.field(tag) else {
                continue;
            };
            if field.byte_len == 0 || scan.was_visited(field) {
                continue;
            }
            let raw = scan.read_raw(field)?;
            if is_blank_value(&raw) {
                continue;
            }
            scan.first_visit(field);
            let value = scan.read_text(field)?;
            let label = scan.label(&tag_name(tag));
            scan.fixed_fill_field(directory, field, category, label, &value);
        }
        Ok(())
    }

    fn auxiliary_kind(
        &self,
        container: &mut FileContainer,
        directory: &Directory,
    ) -> Result<Option<AuxiliaryKind>> {
        Ok(match Self::source_lens(container, directory)? {
            Some(lens) if lens == -1.0 => Some(AuxiliaryKind::Macro),
            Some(lens) if lens == -2.0 => Some(AuxiliaryKind::Label),
            _ => None,
        })
    }

    /// `slide.ndpi.ndpa` annotation files
    fn sidecars(&self, path: &Path) -> Vec<PathBuf> {
        let mut name = path.as_os_str().to_os_string();
        name.push(".ndpa");
        vec![PathBuf::from(name)]
    }

    fn describe(
        &self,
        container: &mut FileContainer,
        directories: &[Directory],
        details: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let mut levels = 0;
        for directory in directories {
            match Self::source_lens(container, directory)? {
                Some(lens) if lens > 0.0 => {
                    if levels == 0 {
                        details.insert("objective_magnification".to_string(), format!("{lens}"));
                    }
                    levels += 1;
                }
                _ => {}
            }
        }
        details.insert("pyramid_levels".to_string(), levels.to_string());
        Ok(())
    }
}

impl FormatHandler for NdpiHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Ndpi
    }

    fn detect(&self, path: &Path) -> bool {
        tiff_common::detect_tiff(path, FormatKind::Ndpi)
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
