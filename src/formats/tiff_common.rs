//! Scanning shared by the TIFF-family handlers
//!
//! Vendor handlers only describe what is special about their format: which
//! fields they interpret, how they recognise auxiliary images and which
//! sidecar files travel with a slide. Everything else (date tags, extra
//! metadata, EXIF and GPS blocks, auxiliary blanking, the raw-byte sweep and
//! diagnostic fingerprints) is done here the same way for every vendor.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use regex::bytes::Regex as BytesRegex;
use tracing::debug;

use super::{has_extension, read_prefix, ScanOptions};
use crate::container::{Container, Directory, Field, Header};
use crate::detector::is_date_anonymized;
use crate::domain::{
    ByteRange, FieldBlock, FormatInfo, FormatKind, Location, PhiCategory, PhiFinding, Redaction,
    RedactionPolicy, Result, ScrubError, Target,
};

pub(crate) type FileContainer = Container<BufReader<File>>;

/// Primary-directory date and time tags
pub const DATE_TAGS: [u16; 3] = [306, 36867, 36868];

/// Free-form metadata tags null-filled whenever they carry content
pub const EXTRA_METADATA_TAGS: [u16; 10] =
    [270, 305, 315, 316, 700, 33432, 33723, 34675, 37510, 42016];

/// Identifying tags inside the EXIF sub-directory
pub const EXIF_PHI_TAGS: [u16; 7] = [36867, 36868, 37510, 37520, 37521, 37522, 42016];

/// Auxiliary photograph kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxiliaryKind {
    Label,
    Macro,
    Thumbnail,
}

impl AuxiliaryKind {
    /// Classify by keyword in a description, e.g. `Aperio Image|label 415x422`
    pub fn from_description(text: &str, allow_thumbnail: bool) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("label") {
            Some(AuxiliaryKind::Label)
        } else if lower.contains("macro") {
            Some(AuxiliaryKind::Macro)
        } else if allow_thumbnail && lower.contains("thumbnail") {
            Some(AuxiliaryKind::Thumbnail)
        } else {
            None
        }
    }
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuxiliaryKind::Label => "label",
            AuxiliaryKind::Macro => "macro",
            AuxiliaryKind::Thumbnail => "thumbnail",
        })
    }
}

/// Name of a well-known tag, for finding labels
pub fn tag_name(tag: u16) -> String {
    let name = match tag {
        270 => "ImageDescription",
        285 => "PageName",
        305 => "Software",
        306 => "DateTime",
        315 => "Artist",
        316 => "HostComputer",
        700 => "XMP",
        33432 => "Copyright",
        33723 => "IPTC",
        34675 => "ICCProfile",
        36867 => "DateTimeOriginal",
        36868 => "DateTimeDigitized",
        37510 => "UserComment",
        37520 => "SubSecTime",
        37521 => "SubSecTimeOriginal",
        37522 => "SubSecTimeDigitized",
        42016 => "ImageUniqueID",
        65427 => "NDPI_REFERENCE",
        65468 => "NDPI_BARCODE",
        _ => return format!("Tag{tag}"),
    };
    name.to_string()
}

fn extra_metadata_category(tag: u16) -> PhiCategory {
    match tag {
        305 | 34675 => PhiCategory::DeviceIdentifier,
        315 => PhiCategory::PersonName,
        316 | 33432 => PhiCategory::Institution,
        42016 => PhiCategory::UniqueIdentifier,
        _ => PhiCategory::FreeText,
    }
}

fn exif_category(tag: u16) -> PhiCategory {
    match tag {
        37510 => PhiCategory::FreeText,
        42016 => PhiCategory::UniqueIdentifier,
        _ => PhiCategory::Date,
    }
}

/// Bytes with no content left: all NUL, or 'X' fill plus NUL padding
pub fn is_blank_value(raw: &[u8]) -> bool {
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    let body = &raw[..end];
    body.is_empty() || body.iter().all(|b| *b == b'X')
}

/// `'X' × (len - 1) + NUL`
pub fn fixed_fill(len: u64) -> Vec<u8> {
    let mut bytes = vec![b'X'; len.saturating_sub(1) as usize];
    if len > 0 {
        bytes.push(0);
    }
    bytes
}

/// What a TIFF-family vendor adds on top of the shared scan
pub(crate) trait TiffVendor: Send + Sync {
    fn kind(&self) -> FormatKind;

    /// Prefix for finding labels, e.g. `SVS`
    fn label_prefix(&self) -> &'static str;

    /// Extra metadata tags the vendor interprets itself
    fn excluded_extra_tags(&self) -> &'static [u16] {
        &[]
    }

    /// Vendor-specific fields of one directory
    fn scan_directory(&self, scan: &mut TiffScan<'_>, directory: &Directory) -> Result<()>;

    /// Auxiliary image kind of a directory, if it is one
    fn auxiliary_kind(
        &self,
        container: &mut FileContainer,
        directory: &Directory,
    ) -> Result<Option<AuxiliaryKind>>;

    /// Annotation files that travel with the slide
    fn sidecars(&self, _path: &Path) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Non-identifying details for `info`
    fn describe(
        &self,
        _container: &mut FileContainer,
        _directories: &[Directory],
        _details: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        Ok(())
    }
}

/// State of one scan over a TIFF-family file
pub(crate) struct TiffScan<'a> {
    pub container: FileContainer,
    pub options: &'a ScanOptions,
    prefix: &'static str,
    findings: Vec<PhiFinding>,
    claimed: Vec<ByteRange>,
    handled: HashSet<u64>,
}

impl<'a> TiffScan<'a> {
    fn new(container: FileContainer, options: &'a ScanOptions, prefix: &'static str) -> Self {
        Self {
            container,
            options,
            prefix,
            findings: Vec::new(),
            claimed: Vec::new(),
            handled: HashSet::new(),
        }
    }

    /// Label in the `PREFIX:name` style
    pub fn label(&self, name: &str) -> String {
        format!("{}:{name}", self.prefix)
    }

    /// Record a finding and claim the primary-file bytes it rewrites
    pub fn push(&mut self, finding: PhiFinding) {
        match finding.redaction() {
            Some(Redaction::Overwrite {
                target: Target::Primary,
                offset,
                bytes,
                ..
            }) => self.claimed.push(ByteRange::new(*offset, bytes.len() as u64)),
            Some(Redaction::ZeroFill {
                target: Target::Primary,
                offset,
                length,
            }) => self.claimed.push(ByteRange::new(*offset, *length)),
            _ => {}
        }
        self.findings.push(finding);
    }

    pub fn is_claimed(&self, range: ByteRange) -> bool {
        self.claimed.iter().any(|r| r.overlaps(&range))
    }

    /// Mark a field value as interpreted; false when it was seen before
    /// (fields shared by several directories point at one value)
    pub fn first_visit(&mut self, field: &Field) -> bool {
        self.handled.insert(field.value_offset)
    }

    pub fn was_visited(&self, field: &Field) -> bool {
        self.handled.contains(&field.value_offset)
    }

    pub fn read_raw(&mut self, field: &Field) -> Result<Vec<u8>> {
        self.container.read_field_bytes(field)
    }

    /// Field value as text, trailing NULs removed
    pub fn read_text(&mut self, field: &Field) -> Result<String> {
        let raw = self.read_raw(field)?;
        let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    fn location(directory: &Directory, block: FieldBlock, tag: u16, range: ByteRange) -> Location {
        Location::Field {
            directory: directory.index,
            block,
            tag,
            offset: range.offset,
            length: range.length,
        }
    }

    /// Whole-field 'X' fill finding
    pub fn fixed_fill_field(
        &mut self,
        directory: &Directory,
        field: &Field,
        category: PhiCategory,
        label: String,
        value: &str,
    ) {
        if field.byte_len == 0 {
            return;
        }
        let location = Self::location(directory, FieldBlock::Primary, field.tag, field.range());
        self.push(
            PhiFinding::new(category, label, location, value).with_redaction(
                Redaction::Overwrite {
                    target: Target::Primary,
                    offset: field.value_offset,
                    bytes: fixed_fill(field.byte_len),
                    policy: RedactionPolicy::FixedFill,
                },
            ),
        );
    }

    /// Whole-field NUL fill finding
    pub fn null_fill_field(
        &mut self,
        directory: &Directory,
        block: FieldBlock,
        field: &Field,
        category: PhiCategory,
        label: String,
        value: &str,
    ) {
        if field.byte_len == 0 {
            return;
        }
        let location = Self::location(directory, block, field.tag, field.range());
        self.push(
            PhiFinding::new(category, label, location, value).with_redaction(
                Redaction::Overwrite {
                    target: Target::Primary,
                    offset: field.value_offset,
                    bytes: vec![0u8; field.byte_len as usize],
                    policy: RedactionPolicy::NullFill,
                },
            ),
        );
    }

    /// Replace a span inside a field value with same-length bytes
    #[allow(clippy::too_many_arguments)]
    pub fn replace_span(
        &mut self,
        directory: &Directory,
        tag: u16,
        offset: u64,
        replacement: Vec<u8>,
        policy: RedactionPolicy,
        category: PhiCategory,
        label: String,
        value: &str,
    ) {
        if replacement.is_empty() {
            return;
        }
        let range = ByteRange::new(offset, replacement.len() as u64);
        let location = Self::location(directory, FieldBlock::Primary, tag, range);
        self.push(
            PhiFinding::new(category, label, location, value).with_redaction(
                Redaction::Overwrite {
                    target: Target::Primary,
                    offset,
                    bytes: replacement,
                    policy,
                },
            ),
        );
    }

    /// Identifier rules over text embedded in a field; each hit outside the
    /// already-claimed bytes is 'X' filled over exactly the match
    pub fn scan_embedded_text(&mut self, directory: &Directory, field: &Field, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        if text.len() != raw.len() {
            // offsets only line up for valid UTF-8; the sweep covers the rest
            return;
        }
        for hit in self.options.scanner.scan_text(&text) {
            let offset = field.value_offset + hit.start;
            let range = ByteRange::new(offset, hit.len());
            if self.is_claimed(range) {
                continue;
            }
            let label = self.label(&format!("{}:{}", tag_name(field.tag), hit.label));
            self.replace_span(
                directory,
                field.tag,
                offset,
                vec![b'X'; hit.len() as usize],
                RedactionPolicy::FixedFill,
                hit.category,
                label,
                &hit.text,
            );
        }
    }

    /// 'X' fill the value of every listed span that still has content
    pub fn redact_spans(
        &mut self,
        directory: &Directory,
        field: &Field,
        raw: &[u8],
        spans: &[XmlSpan],
        category: impl Fn(&str) -> PhiCategory,
    ) {
        for span in spans {
            let value = &raw[span.start..span.end];
            if value.is_empty() || value.iter().all(|b| *b == b'X') {
                continue;
            }
            let text = String::from_utf8_lossy(value).into_owned();
            let label = self.label(span.name);
            self.replace_span(
                directory,
                field.tag,
                field.value_offset + span.start as u64,
                vec![b'X'; value.len()],
                RedactionPolicy::SubFieldReplace,
                category(span.name),
                label,
                &text,
            );
        }
    }

    /// Date tags in the primary field table
    fn scan_dates(&mut self, directory: &Directory) -> Result<()> {
        for field in &directory.fields {
            if !DATE_TAGS.contains(&field.tag) || !field.is_ascii() || self.is_claimed(field.range())
            {
                continue;
            }
            let value = self.read_text(field)?;
            if is_date_anonymized(&value) {
                continue;
            }
            let label = self.label(&tag_name(field.tag));
            self.null_fill_field(directory, FieldBlock::Primary, field, PhiCategory::Date, label, &value);
        }
        Ok(())
    }

    /// Free-form metadata tags the vendor does not interpret itself
    fn scan_extra_metadata(&mut self, directory: &Directory, excluded: &[u16]) -> Result<()> {
        for field in &directory.fields {
            if !EXTRA_METADATA_TAGS.contains(&field.tag)
                || excluded.contains(&field.tag)
                || !field.is_textual()
                || self.was_visited(field)
            {
                continue;
            }
            let raw = self.read_raw(field)?;
            if is_blank_value(&raw) {
                continue;
            }
            let value: String = String::from_utf8_lossy(&raw)
                .trim_end_matches('\0')
                .chars()
                .take(200)
                .collect();
            if value.trim().is_empty() {
                continue;
            }
            self.first_visit(field);
            let label = self.label(&tag_name(field.tag));
            let category = extra_metadata_category(field.tag);
            self.null_fill_field(directory, FieldBlock::Primary, field, category, label, &value);
        }
        Ok(())
    }

    /// Identifying EXIF tags and every GPS tag
    fn scan_sub_directories(&mut self, directory: &Directory) -> Result<()> {
        if let Some(exif) = &directory.exif {
            for field in &exif.fields {
                if !EXIF_PHI_TAGS.contains(&field.tag) || self.was_visited(field) {
                    continue;
                }
                let raw = self.read_raw(field)?;
                if is_blank_value(&raw) {
                    continue;
                }
                self.first_visit(field);
                let value = String::from_utf8_lossy(&raw).trim_end_matches('\0').to_string();
                let label = format!("EXIF:{}", tag_name(field.tag));
                let category = exif_category(field.tag);
                self.null_fill_field(directory, FieldBlock::Exif, field, category, label, &value);
            }
        }
        if let Some(gps) = &directory.gps {
            for field in &gps.fields {
                if self.was_visited(field) {
                    continue;
                }
                let raw = self.read_raw(field)?;
                if raw.iter().all(|b| *b == 0) {
                    continue;
                }
                self.first_visit(field);
                let label = format!("GPS:Tag{}", field.tag);
                let category = PhiCategory::Location;
                self.null_fill_field(directory, FieldBlock::Gps, field, category, label, "");
            }
        }
        Ok(())
    }
}

/// Value span of a named XML attribute or element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSpan {
    /// Name as listed by the caller
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
}

/// Byte ranges of processing instructions such as `<?xml version="1.0"?>`
fn processing_instructions(raw: &[u8]) -> Result<Vec<(usize, usize)>> {
    let re = BytesRegex::new(r"(?s)<\?.*?\?>").map_err(|e| ScrubError::Pattern(e.to_string()))?;
    Ok(re.find_iter(raw).map(|m| (m.start(), m.end())).collect())
}

/// Values of `name="..."` attributes, case-insensitive, outside processing
/// instructions
pub fn attribute_spans(raw: &[u8], names: &[&'static str]) -> Result<Vec<XmlSpan>> {
    let skip = processing_instructions(raw)?;
    let mut spans = Vec::new();
    for name in names {
        let pattern = format!(r#"(?i)\b{}\s*=\s*"([^"]*)""#, regex::escape(name));
        let re = BytesRegex::new(&pattern).map_err(|e| ScrubError::Pattern(e.to_string()))?;
        for caps in re.captures_iter(raw) {
            let (Some(all), Some(value)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if skip.iter().any(|(s, e)| all.start() >= *s && all.start() < *e) {
                continue;
            }
            spans.push(XmlSpan {
                name,
                start: value.start(),
                end: value.end(),
            });
        }
    }
    spans.sort_by_key(|s| s.start);
    Ok(spans)
}

/// Text content of `<name ...>value</name>` elements, case-insensitive
pub fn element_spans(raw: &[u8], names: &[&'static str]) -> Result<Vec<XmlSpan>> {
    let mut spans = Vec::new();
    for name in names {
        let escaped = regex::escape(name);
        let pattern = format!(r"(?i)<{escaped}(?:\s[^>]*)?>([^<]+)</{escaped}>");
        let re = BytesRegex::new(&pattern).map_err(|e| ScrubError::Pattern(e.to_string()))?;
        for caps in re.captures_iter(raw) {
            if let Some(value) = caps.get(1) {
                spans.push(XmlSpan {
                    name,
                    start: value.start(),
                    end: value.end(),
                });
            }
        }
    }
    spans.sort_by_key(|s| s.start);
    Ok(spans)
}

/// Open a file as a container
pub(crate) fn open_container(path: &Path) -> Result<FileContainer> {
    let file = File::open(path)?;
    Container::open(BufReader::new(file))
}

/// Extension plus TIFF signature
pub(crate) fn detect_tiff(path: &Path, kind: FormatKind) -> bool {
    has_extension(path, kind) && read_prefix(path, 16).is_some_and(|head| Header::sniff(&head))
}

/// Full scan of a TIFF-family file
///
/// Every directory of the chain is inspected; any parse error aborts the
/// scan so the file is never reported clean.
pub(crate) fn scan_tiff(
    vendor: &dyn TiffVendor,
    path: &Path,
    options: &ScanOptions,
) -> Result<Vec<PhiFinding>> {
    let mut container = open_container(path)?;
    let directories = container.read_directories()?;
    let mut scan = TiffScan::new(container, options, vendor.label_prefix());

    for directory in &directories {
        vendor.scan_directory(&mut scan, directory)?;
        scan.scan_dates(directory)?;
        scan.scan_extra_metadata(directory, vendor.excluded_extra_tags())?;
        scan.scan_sub_directories(directory)?;
    }

    let mut image_data = Vec::new();
    for directory in &directories {
        let regions = scan.container.locate_image_regions(directory)?;
        if regions.is_empty() {
            continue;
        }
        if let Some(kind) = vendor.auxiliary_kind(&mut scan.container, directory)? {
            if scan.container.is_range_blanked(regions[0])? {
                debug!(directory = directory.index, %kind, "Auxiliary image already blanked");
            } else {
                let bytes = regions.iter().map(|r| r.length).sum();
                let label = scan.label(&format!("{kind} image"));
                scan.push(
                    PhiFinding::new(
                        PhiCategory::AuxiliaryImage,
                        label,
                        Location::Image {
                            directory: directory.index,
                            directory_offset: directory.offset,
                            bytes,
                        },
                        "",
                    )
                    .with_summary(format!("{kind} image, {bytes} bytes"))
                    .with_redaction(Redaction::BlankImage {
                        directory_offset: directory.offset,
                        regions: regions.clone(),
                    }),
                );
            }
        }
        image_data.extend(regions);
    }

    sweep(&mut scan, &image_data)?;

    let mut findings = scan.findings;
    for sidecar in vendor.sidecars(path) {
        if sidecar.is_file() {
            findings.push(
                PhiFinding::new(
                    PhiCategory::CompanionFile,
                    format!("{}:sidecar", vendor.label_prefix()),
                    Location::Sidecar { path: sidecar.clone() },
                    "",
                )
                .with_summary(format!("annotation file {}", sidecar.display())),
            );
        }
    }
    Ok(findings)
}

/// Raw-byte safety sweep over the start of the file
fn sweep(scan: &mut TiffScan<'_>, image_data: &[ByteRange]) -> Result<()> {
    let window = scan.options.sweep_window.min(scan.container.file_len());
    let data = scan.container.read_at(0, window)?;
    let mut excluded = scan.claimed.clone();
    excluded.extend_from_slice(image_data);

    for hit in scan.options.scanner.sweep(&data, 0, &excluded) {
        let label = format!("regex:{}", hit.label);
        scan.push(
            PhiFinding::new(
                hit.category,
                label,
                Location::Bytes {
                    offset: hit.start,
                    length: hit.len(),
                },
                &hit.text,
            )
            .with_redaction(Redaction::Overwrite {
                target: Target::Primary,
                offset: hit.start,
                bytes: vec![b'X'; hit.len() as usize],
                policy: RedactionPolicy::FixedFill,
            }),
        );
    }
    Ok(())
}

/// Structural snapshot of a TIFF-family file
pub(crate) fn tiff_info(vendor: &dyn TiffVendor, path: &Path) -> Result<FormatInfo> {
    let mut container = open_container(path)?;
    let directories = container.read_directories()?;
    let mut info = FormatInfo::new(path, vendor.kind(), container.file_len());
    info.byte_order = Some(container.header().byte_order.name().to_string());
    info.bigtiff = Some(container.header().bigtiff);
    info.page_count = directories.len();

    for directory in &directories {
        if let Some(kind) = vendor.auxiliary_kind(&mut container, directory)? {
            let blanked = container.is_image_blanked(directory)?;
            info.auxiliary_images.push(if blanked {
                format!("{kind} (ifd {}, blanked)", directory.index)
            } else {
                format!("{kind} (ifd {})", directory.index)
            });
        }
    }

    if let Some(first) = directories.first() {
        for (tag, key) in [(256u16, "image_width"), (257, "image_length")] {
            if let Some(field) = first.field(tag) {
                if let Some(v) = container.read_field_value(field)?.first_unsigned() {
                    info.details.insert(key.to_string(), v.to_string());
                }
            }
        }
        let tiled = first.field(crate::container::tags::TILE_OFFSETS).is_some();
        info.details.insert("tiled".to_string(), tiled.to_string());
    }
    vendor.describe(&mut container, &directories, &mut info.details)?;
    Ok(info)
}

/// SHA-256 per diagnostic directory, keyed by directory offset
///
/// Auxiliary directories are left out, so the keys survive unlinking and
/// blanking. Every other directory carrying strip or tile data is hashed.
pub(crate) fn tiff_digests(vendor: &dyn TiffVendor, path: &Path) -> Result<BTreeMap<String, String>> {
    let mut container = open_container(path)?;
    let directories = container.read_directories()?;
    let mut digests = BTreeMap::new();
    for directory in &directories {
        if !directory.has_image_data() {
            continue;
        }
        if vendor.auxiliary_kind(&mut container, directory)?.is_some() {
            continue;
        }
        let regions = container.locate_image_regions(directory)?;
        if regions.is_empty() {
            continue;
        }
        let digest = container.hash_regions(&regions)?;
        digests.insert(format!("ifd@{}", directory.offset), digest);
    }
    Ok(digests)
}
