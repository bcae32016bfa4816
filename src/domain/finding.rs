//! PHI finding and scan result models

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::errors::ScrubError;

/// PHI categories reported by scanners
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhiCategory {
    /// Pathology case / accession numbers (AS-24-123456)
    CaseNumber,
    /// Medical record numbers
    MedicalRecordNumber,
    /// National identifiers such as SSNs
    NationalId,
    /// Dates of birth
    DateOfBirth,
    /// Acquisition, study and other dates or times
    Date,
    /// Patient, operator or physician names
    PersonName,
    /// Institution names, addresses and host names
    Institution,
    /// Scanner serial numbers and device fingerprints
    DeviceIdentifier,
    /// Barcodes, slide identifiers and instance UIDs
    UniqueIdentifier,
    /// Free-text descriptions and comments
    FreeText,
    /// GPS and other location data
    Location,
    /// Label, macro, barcode or thumbnail photographs
    AuxiliaryImage,
    /// Vendor private data elements
    PrivateData,
    /// Sidecar files that need external handling
    CompanionFile,
}

impl PhiCategory {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            PhiCategory::CaseNumber => "Case number",
            PhiCategory::MedicalRecordNumber => "Medical record number",
            PhiCategory::NationalId => "National ID",
            PhiCategory::DateOfBirth => "Date of birth",
            PhiCategory::Date => "Date",
            PhiCategory::PersonName => "Person name",
            PhiCategory::Institution => "Institution",
            PhiCategory::DeviceIdentifier => "Device identifier",
            PhiCategory::UniqueIdentifier => "Unique identifier",
            PhiCategory::FreeText => "Free text",
            PhiCategory::Location => "Location",
            PhiCategory::AuxiliaryImage => "Auxiliary image",
            PhiCategory::PrivateData => "Private data",
            PhiCategory::CompanionFile => "Companion file",
        }
    }

    /// Parse a category name as written in pattern libraries
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "CASE_NUMBER" | "ACCESSION" => Some(PhiCategory::CaseNumber),
            "MEDICAL_RECORD_NUMBER" | "MRN" => Some(PhiCategory::MedicalRecordNumber),
            "NATIONAL_ID" | "SSN" => Some(PhiCategory::NationalId),
            "DATE_OF_BIRTH" | "DOB" => Some(PhiCategory::DateOfBirth),
            "DATE" => Some(PhiCategory::Date),
            "PERSON_NAME" | "NAME" => Some(PhiCategory::PersonName),
            "INSTITUTION" => Some(PhiCategory::Institution),
            "DEVICE_IDENTIFIER" | "DEVICE" => Some(PhiCategory::DeviceIdentifier),
            "UNIQUE_IDENTIFIER" | "IDENTIFIER" => Some(PhiCategory::UniqueIdentifier),
            "FREE_TEXT" | "TEXT" => Some(PhiCategory::FreeText),
            "LOCATION" => Some(PhiCategory::Location),
            "AUXILIARY_IMAGE" => Some(PhiCategory::AuxiliaryImage),
            "PRIVATE_DATA" => Some(PhiCategory::PrivateData),
            "COMPANION_FILE" => Some(PhiCategory::CompanionFile),
            _ => None,
        }
    }
}

impl fmt::Display for PhiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supported slide formats, in handler priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Ndpi,
    Svs,
    Bif,
    Scn,
    Mrxs,
    Dicom,
    Tiff,
}

impl FormatKind {
    /// All formats in handler priority order
    pub const ALL: [FormatKind; 7] = [
        FormatKind::Ndpi,
        FormatKind::Svs,
        FormatKind::Bif,
        FormatKind::Scn,
        FormatKind::Mrxs,
        FormatKind::Dicom,
        FormatKind::Tiff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Ndpi => "ndpi",
            FormatKind::Svs => "svs",
            FormatKind::Bif => "bif",
            FormatKind::Scn => "scn",
            FormatKind::Mrxs => "mrxs",
            FormatKind::Dicom => "dicom",
            FormatKind::Tiff => "tiff",
        }
    }

    /// Lowercase file extensions (without dot) claimed by this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FormatKind::Ndpi => &["ndpi"],
            FormatKind::Svs => &["svs"],
            FormatKind::Bif => &["bif"],
            FormatKind::Scn => &["scn"],
            FormatKind::Mrxs => &["mrxs"],
            FormatKind::Dicom => &["dcm", "dicom"],
            FormatKind::Tiff => &["tif", "tiff"],
        }
    }

    /// Whether the format is stored in a TIFF container
    pub fn is_tiff_family(&self) -> bool {
        !matches!(self, FormatKind::Mrxs | FormatKind::Dicom)
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        FormatKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == lower || kind.extensions().contains(&lower.as_str()))
            .ok_or_else(|| ScrubError::UnsupportedFormat(format!("unknown format '{s}'")))
    }
}

/// A contiguous byte range within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Field table a TIFF field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldBlock {
    Primary,
    Exif,
    Gps,
}

/// Where a finding lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// A TIFF field value
    Field {
        directory: usize,
        block: FieldBlock,
        tag: u16,
        offset: u64,
        length: u64,
    },
    /// A raw byte range found by the safety sweep
    Bytes { offset: u64, length: u64 },
    /// Auxiliary image data referenced by a directory
    Image {
        directory: usize,
        directory_offset: u64,
        bytes: u64,
    },
    /// A key in a configuration document
    ConfigKey { section: String, key: String },
    /// A region inside a companion data file
    CompanionData {
        file: PathBuf,
        offset: u64,
        length: u64,
    },
    /// An element in an element tree, e.g. `(0040,0275)[0]/(0010,0010)`
    Element { path: String },
    /// The file name itself
    Filename,
    /// A sidecar file next to the slide
    Sidecar { path: PathBuf },
}

impl Location {
    /// Primary-file byte range covered by this location, if any
    pub fn byte_range(&self) -> Option<ByteRange> {
        match self {
            Location::Field { offset, length, .. } | Location::Bytes { offset, length } => {
                Some(ByteRange::new(*offset, *length))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Field {
                directory,
                block,
                tag,
                offset,
                ..
            } => match block {
                FieldBlock::Primary => write!(f, "ifd{directory}/tag{tag}@{offset}"),
                FieldBlock::Exif => write!(f, "ifd{directory}/exif/tag{tag}@{offset}"),
                FieldBlock::Gps => write!(f, "ifd{directory}/gps/tag{tag}@{offset}"),
            },
            Location::Bytes { offset, length } => write!(f, "bytes@{offset}+{length}"),
            Location::Image {
                directory, bytes, ..
            } => write!(f, "ifd{directory}/image ({bytes} bytes)"),
            Location::ConfigKey { section, key } => write!(f, "[{section}] {key}"),
            Location::CompanionData {
                file,
                offset,
                length,
            } => write!(f, "{}@{offset}+{length}", file.display()),
            Location::Element { path } => f.write_str(path),
            Location::Filename => f.write_str("filename"),
            Location::Sidecar { path } => write!(f, "sidecar {}", path.display()),
        }
    }
}

/// Redaction policy applied to a located field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionPolicy {
    /// Repeated 'X' sentinel plus NUL terminator
    FixedFill,
    /// NUL bytes over the whole footprint
    NullFill,
    /// Zero bytes over a data range
    ZeroFill,
    /// Fixed epoch sentinel for timestamps
    SentinelDate,
    /// Only identifying sub-values of a packed field replaced
    SubFieldReplace,
    /// Blank JPEG payload plus zero padding
    BlankImage,
    /// Element removed from the tree
    Delete,
    /// Element kept with an empty or sentinel value
    Blank,
    /// Identifier replaced by a keyed one-way remap
    Remap,
    /// De-identification marker written after redaction
    Marker,
}

/// File targeted by a byte-level redaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The scanned file itself
    Primary,
    /// A companion file, relative to the scanned file's parent directory
    Companion(PathBuf),
}

/// Element-tree operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementOp {
    Blank,
    Delete,
    Remap,
}

/// A concrete, located redaction produced by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redaction {
    /// Overwrite bytes in place with a same-length replacement
    Overwrite {
        target: Target,
        offset: u64,
        bytes: Vec<u8>,
        policy: RedactionPolicy,
    },
    /// Zero a data range in place
    ZeroFill {
        target: Target,
        offset: u64,
        length: u64,
    },
    /// Blank auxiliary image data referenced by a TIFF directory
    BlankImage {
        directory_offset: u64,
        regions: Vec<ByteRange>,
    },
    /// Element-tree edit applied by the owning handler
    Element { path: String, op: ElementOp },
}

impl Redaction {
    /// Key used to collapse identical actions produced by several findings
    pub fn dedup_key(&self) -> String {
        match self {
            Redaction::Overwrite { target, offset, .. } => format!("w:{target:?}:{offset}"),
            Redaction::ZeroFill { target, offset, .. } => format!("z:{target:?}:{offset}"),
            Redaction::BlankImage {
                directory_offset, ..
            } => format!("i:{directory_offset}"),
            Redaction::Element { path, op } => format!("e:{path}:{op:?}"),
        }
    }

    pub fn policy(&self) -> RedactionPolicy {
        match self {
            Redaction::Overwrite { policy, .. } => *policy,
            Redaction::ZeroFill { .. } => RedactionPolicy::ZeroFill,
            Redaction::BlankImage { .. } => RedactionPolicy::BlankImage,
            Redaction::Element { op, .. } => match op {
                ElementOp::Blank => RedactionPolicy::Blank,
                ElementOp::Delete => RedactionPolicy::Delete,
                ElementOp::Remap => RedactionPolicy::Remap,
            },
        }
    }
}

/// What must happen for a finding to go away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingAction {
    /// The engine can remove it
    Redact(Redaction),
    /// Only an outside collaborator can act (renaming, sidecar removal)
    External,
}

/// A single piece of PHI found in a file
///
/// Findings never hold the plaintext value: only a masked preview and a
/// SHA-256 digest for the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct PhiFinding {
    /// PHI category
    pub category: PhiCategory,

    /// Human label, e.g. `SVS:ScanScope ID` or `EXIF:DateTimeOriginal`
    pub label: String,

    /// Where the value lives
    pub location: Location,

    /// Masked preview of the value
    pub preview: String,

    /// SHA-256 of the original value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_digest: Option<String>,

    /// How the finding is removed
    #[serde(skip)]
    pub action: FindingAction,
}

impl PhiFinding {
    /// Create a finding that requires external handling
    pub fn new(
        category: PhiCategory,
        label: impl Into<String>,
        location: Location,
        value: &str,
    ) -> Self {
        let digest = if value.is_empty() {
            None
        } else {
            let mut hasher = Sha256::new();
            hasher.update(value.as_bytes());
            Some(format!("{:x}", hasher.finalize()))
        };
        Self {
            category,
            label: label.into(),
            location,
            preview: mask_preview(value),
            value_digest: digest,
            action: FindingAction::External,
        }
    }

    /// Attach the redaction that removes this finding
    pub fn with_redaction(mut self, redaction: Redaction) -> Self {
        self.action = FindingAction::Redact(redaction);
        self
    }

    /// Replace the preview with a descriptive (non-PHI) summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.preview = summary.into();
        self
    }

    pub fn redaction(&self) -> Option<&Redaction> {
        match &self.action {
            FindingAction::Redact(r) => Some(r),
            FindingAction::External => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.action, FindingAction::External)
    }
}

/// Mask a value for safe display: keep two characters on each side
pub fn mask_preview(value: &str) -> String {
    let chars: Vec<char> = value.chars().take(50).collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
}

/// Result of scanning a single file
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Scanned file
    pub path: PathBuf,

    /// Detected format (None when no handler claimed the file)
    pub format: Option<FormatKind>,

    /// Findings in discovery order
    pub findings: Vec<PhiFinding>,

    /// Error message when the scan failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error kind when the scan failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// File size in bytes
    pub file_size: u64,

    /// Scan duration in milliseconds
    pub scan_time_ms: u64,
}

impl ScanResult {
    /// Create a successful scan result
    pub fn new(path: impl Into<PathBuf>, format: FormatKind, findings: Vec<PhiFinding>) -> Self {
        Self {
            path: path.into(),
            format: Some(format),
            findings,
            error: None,
            error_kind: None,
            file_size: 0,
            scan_time_ms: 0,
        }
    }

    /// Create a failed scan result; never clean
    pub fn failed(path: impl Into<PathBuf>, format: Option<FormatKind>, error: &ScrubError) -> Self {
        Self {
            path: path.into(),
            format,
            findings: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            file_size: 0,
            scan_time_ms: 0,
        }
    }

    /// Clean means the scan succeeded and found nothing
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.findings.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Findings that the engine can redact
    pub fn redactable(&self) -> impl Iterator<Item = &PhiFinding> {
        self.findings.iter().filter(|f| !f.is_external())
    }

    /// Findings that need an outside collaborator
    pub fn external(&self) -> impl Iterator<Item = &PhiFinding> {
        self.findings.iter().filter(|f| f.is_external())
    }

    /// Count findings per category
    pub fn counts_by_category(&self) -> BTreeMap<PhiCategory, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.category).or_insert(0) += 1;
        }
        counts
    }
}

/// Structural metadata snapshot of a file
#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    pub path: PathBuf,
    pub format: FormatKind,
    pub file_size: u64,

    /// "little-endian" / "big-endian" for container formats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bigtiff: Option<bool>,

    /// Directories (pages) for TIFF formats, elements for DICOM, sections for MRXS
    pub page_count: usize,

    /// Auxiliary images present, e.g. `label (ifd 3)`
    pub auxiliary_images: Vec<String>,

    /// Format-specific key/value details
    pub details: BTreeMap<String, String>,

    /// Whether a scan of the file came back clean
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
}

impl FormatInfo {
    pub fn new(path: impl Into<PathBuf>, format: FormatKind, file_size: u64) -> Self {
        Self {
            path: path.into(),
            format,
            file_size,
            byte_order: None,
            bigtiff: None,
            page_count: 0,
            auxiliary_images: Vec::new(),
            details: BTreeMap::new(),
            clean: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preview() {
        assert_eq!(mask_preview("AB"), "**");
        assert_eq!(mask_preview("AS-24-123456"), "AS********56");
        assert_eq!(mask_preview(""), "");
    }

    #[test]
    fn test_finding_never_keeps_plaintext() {
        let finding = PhiFinding::new(
            PhiCategory::CaseNumber,
            "regex:Accession_AS",
            Location::Bytes {
                offset: 10,
                length: 12,
            },
            "AS-24-123456",
        );
        let json = serde_json::to_string(&finding).unwrap();
        assert!(!json.contains("AS-24-123456"));
        assert!(finding.value_digest.is_some());
        assert!(finding.is_external());
    }

    #[test]
    fn test_scan_result_clean_and_failed() {
        let clean = ScanResult::new("a.svs", FormatKind::Svs, Vec::new());
        assert!(clean.is_clean());

        let failed = ScanResult::failed(
            "a.svs",
            Some(FormatKind::Svs),
            &ScrubError::Parse(crate::domain::ParseError::Cycle(8)),
        );
        assert!(!failed.is_clean());
        assert_eq!(failed.error_kind.as_deref(), Some("parse_error"));
    }

    #[test]
    fn test_format_kind_from_str() {
        assert_eq!("NDPI".parse::<FormatKind>().unwrap(), FormatKind::Ndpi);
        assert_eq!("dcm".parse::<FormatKind>().unwrap(), FormatKind::Dicom);
        assert_eq!("tif".parse::<FormatKind>().unwrap(), FormatKind::Tiff);
        assert!("jpeg".parse::<FormatKind>().is_err());
    }

    #[test]
    fn test_byte_range_overlap() {
        let a = ByteRange::new(10, 10);
        assert!(a.overlaps(&ByteRange::new(19, 5)));
        assert!(!a.overlaps(&ByteRange::new(20, 5)));
        assert!(!a.overlaps(&ByteRange::new(0, 10)));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(PhiCategory::parse("mrn"), Some(PhiCategory::MedicalRecordNumber));
        assert_eq!(PhiCategory::parse("case-number"), Some(PhiCategory::CaseNumber));
        assert_eq!(PhiCategory::parse("nope"), None);
    }
}
