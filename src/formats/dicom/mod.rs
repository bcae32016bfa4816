//! DICOM whole-slide images
//!
//! Unlike the TIFF family, DICOM redaction edits the element tree: values
//! change length and elements disappear, so the file is rewritten in full
//! through a temporary file and an atomic rename.

pub mod codec;
pub mod dictionary;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use self::codec::{DicomFile, Element, ElementPath, Tag, Value, Vr};
use super::{has_extension, read_prefix, FormatHandler, RedactOptions, RedactOutcome, ScanOptions};
use crate::domain::{
    ElementOp, FormatInfo, FormatKind, Location, MutationPlan, PhiCategory, PhiFinding, Redaction,
    Result, ScrubError,
};

/// Remap a UID under the slidescrub root with a keyed one-way hash
///
/// The first 16 bytes of HMAC-SHA256(salt, uid) are appended as a decimal
/// number; the result is cut to the 64 character UID limit.
pub fn remap_uid(uid: &str, salt: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(salt)
        .map_err(|e| ScrubError::Configuration(format!("invalid uid salt: {e}")))?;
    mac.update(uid.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    let mut remapped = format!("{}{}", dictionary::UID_ROOT, u128::from_be_bytes(head));
    remapped.truncate(64);
    Ok(remapped)
}

/// What the scan does with one element
enum Visit {
    Redact {
        op: ElementOp,
        category: PhiCategory,
        label: String,
    },
    Descend,
    Skip,
}

fn is_cleared(element: &Element) -> bool {
    match element.as_text() {
        Some(text) => dictionary::is_anonymized(&text, element.vr),
        None => element.is_empty(),
    }
}

fn free_text_vr(vr: Vr) -> bool {
    matches!(vr, Vr::LO | Vr::SH | Vr::LT | Vr::ST) || vr.0 == *b"UT"
}

fn visit(element: &Element, depth: usize, options: &ScanOptions) -> Visit {
    let tag = element.tag;
    let label = |name: &str| {
        if depth == 0 {
            format!("DICOM:{name}")
        } else {
            format!("DICOM:SQ:{name}")
        }
    };
    let redact = |op, category, label| Visit::Redact {
        op,
        category,
        label,
    };

    if tag.is_private() {
        return redact(
            ElementOp::Delete,
            PhiCategory::PrivateData,
            label(&format!("Private{tag}")),
        );
    }

    let keyword = dictionary::keyword(tag);
    if depth == 0 {
        if dictionary::is_delete(tag) {
            if element.is_empty() {
                return Visit::Skip;
            }
            return redact(
                ElementOp::Delete,
                dictionary::category(tag, element.vr),
                label(&keyword),
            );
        }
        if dictionary::is_remap(tag) {
            let uid = element.as_text().unwrap_or_default();
            if uid.is_empty() || uid.starts_with(dictionary::UID_ROOT) {
                return Visit::Skip;
            }
            return redact(ElementOp::Remap, PhiCategory::UniqueIdentifier, label(&keyword));
        }
        if dictionary::is_blank(tag) {
            if is_cleared(element) {
                return Visit::Skip;
            }
            return redact(
                ElementOp::Blank,
                dictionary::category(tag, element.vr),
                label(&keyword),
            );
        }
    } else if dictionary::NESTED_BLANK.contains(&tag) || element.vr == Vr::PN {
        if is_cleared(element) {
            return Visit::Skip;
        }
        return redact(
            ElementOp::Blank,
            dictionary::category(tag, element.vr),
            label(&keyword),
        );
    }

    if let Value::Sequence(_) = element.value {
        return Visit::Descend;
    }

    if free_text_vr(element.vr) && tag != dictionary::DEIDENTIFICATION_METHOD {
        let text = element.as_text().unwrap_or_default();
        if let Some(hit) = options.scanner.scan_text(&text).first() {
            return redact(
                ElementOp::Blank,
                hit.category,
                label(&format!("{keyword}:{}", hit.label)),
            );
        }
    }
    Visit::Skip
}

/// Findings in document order, file meta first
fn scan_file(file: &DicomFile, options: &ScanOptions) -> Vec<PhiFinding> {
    let mut findings = Vec::new();
    let mut stack: Vec<(&Element, Vec<(Tag, usize)>)> = file
        .meta
        .iter()
        .chain(file.dataset.iter())
        .rev()
        .map(|e| (e, Vec::new()))
        .collect();

    while let Some((element, parents)) = stack.pop() {
        match visit(element, parents.len(), options) {
            Visit::Redact {
                op,
                category,
                label,
            } => {
                let path = ElementPath {
                    parents: parents.clone(),
                    tag: element.tag,
                }
                .to_string();
                let finding = match element.as_text() {
                    Some(value) => PhiFinding::new(
                        category,
                        label,
                        Location::Element { path: path.clone() },
                        &value,
                    ),
                    None => PhiFinding::new(
                        category,
                        label,
                        Location::Element { path: path.clone() },
                        "",
                    )
                    .with_summary(format!("{} ({} bytes or items)", element.vr, element.value_len())),
                };
                findings.push(finding.with_redaction(Redaction::Element { path, op }));
            }
            Visit::Descend => {
                if let Value::Sequence(sequence) = &element.value {
                    for (index, item) in sequence.items.iter().enumerate().rev() {
                        for child in item.elements.iter().rev() {
                            let mut path = parents.clone();
                            path.push((element.tag, index));
                            stack.push((child, path));
                        }
                    }
                }
            }
            Visit::Skip => {}
        }
    }
    findings
}

fn apply_action(file: &mut DicomFile, action: &Redaction, salt: &[u8]) -> Result<()> {
    let Redaction::Element { path, op } = action else {
        return Err(ScrubError::Redaction(
            "byte-level redaction planned for a DICOM file".to_string(),
        ));
    };
    let parsed: ElementPath = path.parse()?;
    let missing = || ScrubError::Redaction(format!("element {path} not found"));
    match op {
        ElementOp::Delete => {
            if !file.remove(&parsed) {
                return Err(missing());
            }
        }
        ElementOp::Blank => {
            let element = file.find_mut(&parsed).ok_or_else(missing)?;
            let vr = element.vr;
            if let Value::Sequence(sequence) = &mut element.value {
                sequence.items.clear();
            } else {
                element.set_text(dictionary::blank_value(vr));
            }
        }
        ElementOp::Remap => {
            let element = file.find_mut(&parsed).ok_or_else(missing)?;
            let uid = element.as_text().unwrap_or_default();
            let remapped = remap_uid(&uid, salt)?;
            element.set_text(&remapped);
        }
    }
    Ok(())
}

/// Keep the file meta instance UID equal to the dataset's
fn sync_media_storage_uid(file: &mut DicomFile) {
    let Some(sop) = file.text(dictionary::SOP_INSTANCE_UID) else {
        return;
    };
    if let Some(meta) = file
        .meta
        .iter_mut()
        .find(|e| e.tag == dictionary::MEDIA_STORAGE_SOP_INSTANCE_UID)
    {
        meta.set_text(&sop);
    }
}

fn mark_deidentified(file: &mut DicomFile) {
    file.put(Element::text(
        dictionary::PATIENT_IDENTITY_REMOVED,
        Vr::CS,
        "YES",
    ));
    file.put(Element::text(
        dictionary::DEIDENTIFICATION_METHOD,
        Vr::LO,
        dictionary::DEIDENTIFICATION_METHOD_TEXT,
    ));
}

/// Replace a file through a sibling temporary file and a rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));

    let written = (|| -> Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::set_permissions(&temp, fs::metadata(path)?.permissions())?;
        fs::rename(&temp, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&temp);
    }
    written
}

fn load(path: &Path) -> Result<DicomFile> {
    DicomFile::parse(&fs::read(path)?)
}

fn read_u16(element: Option<&Element>) -> Option<u16> {
    match &element?.value {
        Value::Bytes(b) if b.len() >= 2 => Some(u16::from_le_bytes([b[0], b[1]])),
        _ => None,
    }
}

/// Element count over the whole tree, and how many are private
fn count_elements(elements: &[Element]) -> (usize, usize) {
    let mut total = 0;
    let mut private = 0;
    let mut stack: Vec<&Element> = elements.iter().collect();
    while let Some(element) = stack.pop() {
        total += 1;
        if element.tag.is_private() {
            private += 1;
        }
        if let Value::Sequence(sequence) = &element.value {
            stack.extend(sequence.items.iter().flat_map(|i| i.elements.iter()));
        }
    }
    (total, private)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DicomHandler;

impl DicomHandler {
    fn rewrite(
        &self,
        path: &Path,
        plan: &MutationPlan,
        options: &RedactOptions,
        outcome: &mut RedactOutcome,
    ) -> Result<()> {
        let mut file = load(path)?;
        let salt = options.uid_salt.expose_secret().as_ref().as_bytes();

        let mut applied = 0;
        let mut failure = None;
        for action in &plan.actions {
            match apply_action(&mut file, action, salt) {
                Ok(()) => applied += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        let failure = match failure {
            Some(e) if applied == 0 => return Err(e),
            other => other,
        };
        if failure.is_none() {
            sync_media_storage_uid(&mut file);
            mark_deidentified(&mut file);
        }

        let bytes = file.to_bytes()?;
        write_atomic(path, &bytes)?;
        outcome.applied = applied;
        outcome.bytes_written = bytes.len() as u64;
        debug!(
            path = %path.display(),
            applied,
            bytes = bytes.len(),
            "Rewrote DICOM dataset"
        );
        failure.map_or(Ok(()), Err)
    }
}

impl FormatHandler for DicomHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Dicom
    }

    fn detect(&self, path: &Path) -> bool {
        has_extension(path, FormatKind::Dicom)
            && read_prefix(path, codec::PREAMBLE_LEN + 4).is_some_and(|head| DicomFile::sniff(&head))
    }

    fn scan(&self, path: &Path, options: &ScanOptions) -> Result<Vec<PhiFinding>> {
        let file = load(path)?;
        Ok(scan_file(&file, options))
    }

    fn redact(&self, path: &Path, plan: &MutationPlan, options: &RedactOptions) -> RedactOutcome {
        let mut outcome = RedactOutcome::default();
        if let Err(e) = self.rewrite(path, plan, options, &mut outcome) {
            debug!(path = %path.display(), error = %e, "Redaction stopped");
            outcome.error = Some(e);
        }
        outcome
    }

    fn info(&self, path: &Path) -> Result<FormatInfo> {
        let size = fs::metadata(path)?.len();
        let file = load(path)?;
        let mut info = FormatInfo::new(path, FormatKind::Dicom, size);
        info.byte_order = Some("little-endian".to_string());
        info.page_count = file.dataset.len();

        let details = &mut info.details;
        details.insert("transfer_syntax".to_string(), file.transfer_syntax.clone());
        details.insert(
            "explicit_vr".to_string(),
            file.explicit_vr.to_string(),
        );
        let sop_class = file.text(dictionary::SOP_CLASS_UID).unwrap_or_default();
        details.insert(
            "is_wsi".to_string(),
            (sop_class == dictionary::WSI_SOP_CLASS_UID).to_string(),
        );
        details.insert("sop_class_uid".to_string(), sop_class);
        for (key, tag) in [
            ("modality", dictionary::MODALITY),
            ("manufacturer", dictionary::MANUFACTURER),
            ("frames", dictionary::NUMBER_OF_FRAMES),
        ] {
            if let Some(value) = file.text(tag).filter(|v| !v.is_empty()) {
                details.insert(key.to_string(), value);
            }
        }
        if let (Some(columns), Some(rows)) = (
            read_u16(file.element(dictionary::COLUMNS)),
            read_u16(file.element(dictionary::ROWS)),
        ) {
            details.insert("image_size".to_string(), format!("{columns}x{rows}"));
        }
        let (total, private) = count_elements(&file.dataset);
        details.insert("tag_count".to_string(), total.to_string());
        details.insert("private_tag_count".to_string(), private.to_string());
        Ok(info)
    }

    fn diagnostic_digests(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let file = load(path)?;
        let mut digests = BTreeMap::new();
        if let Some(pixels) = file.element(dictionary::PIXEL_DATA) {
            let raw = match &pixels.value {
                Value::Bytes(b) | Value::Encapsulated(b) => b.as_slice(),
                Value::Sequence(_) => &[],
            };
            digests.insert("pixel_data".to_string(), hex::encode(Sha256::digest(raw)));
        }
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::codec::testutil::{encapsulated, explicit, implicit, part10, sequence};
    use super::codec::{EXPLICIT_VR_LE, IMPLICIT_VR_LE};
    use super::*;
    use crate::config::SecretValue;
    use crate::domain::{ParseError, ScanResult};
    use crate::formats::tiff_common::test_support::{options, write_temp};
    use secrecy::Secret;

    const CLEAN_UID: &str = "1.2.826.0.1.3680043.10.1118.1";
    const FRAGMENT: &[u8] = b"\xFF\xD8\xFF\xE0slide-tile\xFF\xD9";

    fn redact_options() -> RedactOptions {
        RedactOptions::new(Secret::new(SecretValue::from("site-salt".to_string())))
    }

    fn slide() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(explicit(dictionary::SOP_CLASS_UID, Vr::UI, dictionary::WSI_SOP_CLASS_UID.as_bytes()));
        body.extend(explicit(dictionary::SOP_INSTANCE_UID, Vr::UI, b"1.2.3.4\0"));
        body.extend(explicit(Tag(0x0008, 0x0020), Vr::DA, b"20240315"));
        body.extend(explicit(Tag(0x0008, 0x0050), Vr::SH, b"AS-24-123456"));
        body.extend(explicit(Tag(0x0009, 0x0010), Vr::LO, b"ACME"));
        body.extend(explicit(Tag(0x0009, 0x1001), Vr::LO, b"secret"));
        body.extend(explicit(Tag(0x0010, 0x0010), Vr::PN, b"Doe^Jane"));
        body.extend(explicit(Tag(0x0010, 0x1040), Vr::LO, b"1 Main St "));
        body.extend(explicit(dictionary::STUDY_INSTANCE_UID, Vr::UI, b"1.2.3.5\0"));
        let item = explicit(Tag(0x0010, 0x0010), Vr::PN, b"Roe^Rick");
        body.extend(sequence(Tag(0x0040, 0x0560), &[item], true));
        body.extend(encapsulated(&[FRAGMENT]));
        part10(EXPLICIT_VR_LE, "1.2.3.4", &body)
    }

    fn anonymize(path: &Path) -> RedactOutcome {
        let findings = DicomHandler.scan(path, &options()).unwrap();
        let plan =
            MutationPlan::from_scan(&ScanResult::new(path, FormatKind::Dicom, findings)).unwrap();
        DicomHandler.redact(path, &plan, &redact_options())
    }

    #[test]
    fn test_detect_needs_magic() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_temp(&dir, "slide.dcm", &slide());
        assert!(DicomHandler.detect(&good));
        let bad = write_temp(&dir, "other.dcm", &[0u8; 200]);
        assert!(!DicomHandler.detect(&bad));
        let wrong_ext = write_temp(&dir, "slide.bin", &slide());
        assert!(!DicomHandler.detect(&wrong_ext));
    }

    #[test]
    fn test_scan_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.dcm", &slide());
        let findings = DicomHandler.scan(&path, &options()).unwrap();
        let labels: Vec<_> = findings.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "DICOM:MediaStorageSOPInstanceUID",
                "DICOM:SOPInstanceUID",
                "DICOM:StudyDate",
                "DICOM:AccessionNumber",
                "DICOM:Private(0009,0010)",
                "DICOM:Private(0009,1001)",
                "DICOM:PatientName",
                "DICOM:PatientAddress",
                "DICOM:StudyInstanceUID",
                "DICOM:SQ:PatientName",
            ]
        );
        assert_eq!(
            findings[9].location,
            Location::Element {
                path: "(0040,0560)[0]/(0010,0010)".to_string()
            }
        );
        assert_eq!(findings[4].category, PhiCategory::PrivateData);
        assert!(findings.iter().all(|f| !f.preview.contains("Doe")));
    }

    #[test]
    fn test_caret_only_name_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let body = explicit(Tag(0x0010, 0x0010), Vr::PN, b"^^^^");
        let path = write_temp(&dir, "slide.dcm", &part10(EXPLICIT_VR_LE, CLEAN_UID, &body));
        assert!(DicomHandler.scan(&path, &options()).unwrap().is_empty());
    }

    #[test]
    fn test_anonymize_rewrites_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.dcm", &slide());
        let before = DicomHandler.diagnostic_digests(&path).unwrap();

        let outcome = anonymize(&path);
        assert!(outcome.is_complete(), "{:?}", outcome.error);
        assert_eq!(outcome.applied, 10);

        let bytes = std::fs::read(&path).unwrap();
        let file = DicomFile::parse(&bytes).unwrap();
        let sop = file.text(dictionary::SOP_INSTANCE_UID).unwrap();
        assert!(sop.starts_with(dictionary::UID_ROOT));
        assert!(sop.len() <= 64);
        assert_eq!(
            file.text(dictionary::MEDIA_STORAGE_SOP_INSTANCE_UID),
            Some(sop)
        );
        assert_eq!(file.text(Tag(0x0008, 0x0020)).as_deref(), Some("19000101"));
        assert_eq!(file.text(Tag(0x0010, 0x0010)).as_deref(), Some(""));
        assert!(file.element(Tag(0x0010, 0x1040)).is_none());
        assert!(file.dataset.iter().all(|e| !e.tag.is_private()));
        assert_eq!(
            file.text(dictionary::PATIENT_IDENTITY_REMOVED).as_deref(),
            Some("YES")
        );
        assert_eq!(
            file.text(dictionary::DEIDENTIFICATION_METHOD).as_deref(),
            Some(dictionary::DEIDENTIFICATION_METHOD_TEXT)
        );

        assert!(bytes.windows(FRAGMENT.len()).any(|w| w == FRAGMENT));
        assert_eq!(DicomHandler.diagnostic_digests(&path).unwrap(), before);
        assert!(DicomHandler.scan(&path, &options()).unwrap().is_empty());
    }

    #[test]
    fn test_remap_is_keyed_and_stable() {
        let a = remap_uid("1.2.3.4", b"salt").unwrap();
        assert_eq!(a, remap_uid("1.2.3.4", b"salt").unwrap());
        assert_ne!(a, remap_uid("1.2.3.4", b"pepper").unwrap());
        assert_ne!(a, remap_uid("1.2.3.5", b"salt").unwrap());
        assert!(a.starts_with(dictionary::UID_ROOT));
        assert!(a.len() <= 64);
        assert!(a.bytes().all(|b| b.is_ascii_digit() || b == b'.'));
    }

    #[test]
    fn test_implicit_vr_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let body = implicit(Tag(0x0010, 0x0010), b"Doe^Jane");
        let path = write_temp(&dir, "slide.dcm", &part10(IMPLICIT_VR_LE, CLEAN_UID, &body));
        let findings = DicomHandler.scan(&path, &options()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, PhiCategory::PersonName);

        assert!(anonymize(&path).is_complete());
        assert!(DicomHandler.scan(&path, &options()).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_file_fails_scan() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = slide();
        let path = write_temp(&dir, "slide.dcm", &bytes[..bytes.len() - 20]);
        assert!(matches!(
            DicomHandler.scan(&path, &options()),
            Err(ScrubError::Parse(ParseError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_info_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "slide.dcm", &slide());
        let info = DicomHandler.info(&path).unwrap();
        assert_eq!(info.details["is_wsi"], "true");
        assert_eq!(info.details["transfer_syntax"], EXPLICIT_VR_LE);
        assert_eq!(info.details["private_tag_count"], "2");
        assert_eq!(info.details["tag_count"], "12");
    }
}
