//! Aperio SVS
//!
//! The ImageDescription of every directory carries the Aperio header: a
//! free-form first line followed by `|key = value` pairs, for example
//! `Aperio Image Library v10\r\n46000x32914 ...|AppMag = 20|ScanScope ID = SS1234|Date = 12/29/09`.
//! Only the identifying values are replaced, each in place and padded to
//! its original length, so the rest of the header stays readable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::tiff_common::{self, AuxiliaryKind, FileContainer, TiffScan, TiffVendor};
use super::{
    fit_sentinel, is_replaced, patch, FormatHandler, RedactOptions, RedactOutcome, ScanOptions,
};
use crate::container::{tags, Directory};
use crate::domain::{
    FormatInfo, FormatKind, MutationPlan, PhiCategory, PhiFinding, RedactionPolicy, Result,
};

/// Replacement for `Date` values
pub const DATE_SENTINEL: &str = "01/01/00";
/// Replacement for `Time` values
pub const TIME_SENTINEL: &str = "00:00:00";

/// One `key = value` pair of the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubField {
    pub key: String,
    pub value: String,
    /// Offset of the trimmed value within the description bytes
    pub offset: usize,
}

/// Split an Aperio description into its `key = value` pairs
///
/// The first `|`-separated segment is the header line and has no pairs.
/// Segments without `=` are skipped.
pub fn parse_description(raw: &[u8]) -> Vec<SubField> {
    let mut fields = Vec::new();
    let mut start = 0;
    for (i, segment) in raw.split(|b| *b == b'|').enumerate() {
        let segment_start = start;
        start += segment.len() + 1;
        if i == 0 {
            continue;
        }
        let Some(eq) = segment.iter().position(|b| *b == b'=') else {
            continue;
        };
        let key = String::from_utf8_lossy(&segment[..eq]).trim().to_string();
        let after = &segment[eq + 1..];
        let lead = after
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        let body = &after[lead..];
        let end = body
            .iter()
            .rposition(|b| !b.is_ascii_whitespace() && *b != 0)
            .map_or(0, |p| p + 1);
        fields.push(SubField {
            key,
            value: String::from_utf8_lossy(&body[..end]).into_owned(),
            offset: segment_start + eq + 1 + lead,
        });
    }
    fields
}

/// Identifying keys, their categories and replacement sentinels
fn classify(key: &str) -> Option<(PhiCategory, Option<&'static str>)> {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "scanscope id" => Some((PhiCategory::DeviceIdentifier, None)),
        "filename" => Some((PhiCategory::UniqueIdentifier, None)),
        "date" => Some((PhiCategory::Date, Some(DATE_SENTINEL))),
        "time" => Some((PhiCategory::Date, Some(TIME_SENTINEL))),
        "user" => Some((PhiCategory::PersonName, None)),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SvsHandler;

impl TiffVendor for SvsHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Svs
    }

    fn label_prefix(&self) -> &'static str {
        "SVS"
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

        for sub in parse_description(&raw) {
            let Some((category, sentinel)) = classify(&sub.key) else {
                continue;
            };
            if is_replaced(&sub.value, sentinel) {
                continue;
            }
            let len = sub.value.len();
            let (replacement, policy) = match sentinel {
                Some(s) => (fit_sentinel(s, len), RedactionPolicy::SentinelDate),
                None => (vec![b'X'; len], RedactionPolicy::SubFieldReplace),
            };
            let label = scan.label(&sub.key);
            scan.replace_span(
                directory,
                field.tag,
                field.value_offset + sub.offset as u64,
                replacement,
                policy,
                category,
                label,
                &sub.value,
            );
        }

        // identifiers under any other key
        scan.scan_embedded_text(directory, field, &raw);
        Ok(())
    }

    fn auxiliary_kind(
        &self,
        container: &mut FileContainer,
        directory: &Directory,
    ) -> Result<Option<AuxiliaryKind>> {
        if directory.index == 0 {
            return Ok(None);
        }
        let Some(field) = directory.field(tags::IMAGE_DESCRIPTION) else {
            return Ok(None);
        };
        let text = container.read_field_value(field)?.as_text().unwrap_or_default();
        let header_line = text.split('|').next().unwrap_or_default();
        Ok(AuxiliaryKind::from_description(header_line, false))
    }

    /// ImageScope annotations: `slide.xml` next to `slide.svs`
    fn sidecars(&self, path: &Path) -> Vec<PathBuf> {
        vec![path.with_extension("xml")]
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
        for sub in parse_description(&raw) {
            match sub.key.as_str() {
                "AppMag" => {
                    details.insert("app_mag".to_string(), sub.value);
                }
                "MPP" => {
                    details.insert("mpp".to_string(), sub.value);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl FormatHandler for SvsHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Svs
    }

    fn detect(&self, path: &Path) -> bool {
        tiff_common::detect_tiff(path, FormatKind::Svs)
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

    const HEADER: &str = "Aperio Image Library v10.0.50\r\n2220x2967 [0,100 2220x2967] (240x240) JPEG/RGB Q=70|AppMag = 20|ScanScope ID = SS1234|Filename = AS-24-123456|Date = 12/29/09|Time = 09:59:15|User = jsmith|MPP = 0.4990";

    fn slide() -> Vec<u8> {
        let mut label = vec![0xFF, 0xD8];
        label.resize(700, 0x33);
        build_with_images(vec![
            (
                vec![TestField::ascii(270, HEADER)],
                Some(vec![0x44; 256]),
            ),
            (
                vec![TestField::ascii(270, "Aperio Image Library v10.0.50\r\nlabel 415x422")],
                Some(label),
            ),
        ])
    }

    #[test]
    fn test_parse_description_offsets() {
        let raw = b"head|AppMag = 20|User =  bob  |Broken";
        let fields = parse_description(raw);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].key, "User");
        assert_eq!(fields[1].value, "bob");
        assert_eq!(&raw[fields[1].offset..fields[1].offset + 3], b"bob");
    }

    #[test]
    fn test_scan_finds_sub_fields_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.svs", &slide());
        let findings = SvsHandler.scan(&path, &options()).unwrap();
        let labels: Vec<_> = findings.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "SVS:ScanScope ID",
                "SVS:Filename",
                "SVS:Date",
                "SVS:Time",
                "SVS:User",
                "SVS:label image",
            ]
        );
    }

    #[test]
    fn test_redaction_keeps_header_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.svs", &slide());
        let findings = SvsHandler.scan(&path, &options()).unwrap();
        let plan =
            MutationPlan::from_scan(&ScanResult::new(&path, FormatKind::Svs, findings)).unwrap();
        assert!(SvsHandler
            .redact(&path, &plan, &RedactOptions::default())
            .is_complete());

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("|AppMag = 20|ScanScope ID = XXXXXX|Filename = XXXXXXXXXXXX|Date = 01/01/00|Time = 00:00:00|User = XXXXXX|MPP = 0.4990"));
        assert!(SvsHandler.scan(&path, &options()).unwrap().is_empty());

        let info = SvsHandler.info(&path).unwrap();
        assert_eq!(info.details.get("mpp").map(String::as_str), Some("0.4990"));
        assert!(info.auxiliary_images.is_empty());
    }
}
