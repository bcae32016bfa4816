//! 3DHISTECH MIRAX (MRXS)
//!
//! `slide.mrxs` is a small index file. Slide metadata lives in
//! `slide/Slidedat.ini` next to it, and tiles plus the label, macro and
//! thumbnail images live in `slide/Data*.dat` files referenced from the ini.
//! All redactions are same-length byte patches on those companion files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::tiff_common::AuxiliaryKind;
use super::{
    fit_sentinel, has_extension, is_replaced, patch, read_prefix, FormatHandler, RedactOptions,
    RedactOutcome, ScanOptions,
};
use crate::domain::{
    ByteRange, FormatInfo, FormatKind, Location, MutationPlan, PhiCategory, PhiFinding, Redaction,
    RedactionPolicy, Result, ScrubError, Target,
};

pub const SLIDEDAT: &str = "Slidedat.ini";

/// Replacement for keys holding a date or time
pub const DATE_SENTINEL: &str = "19000101000000";

/// Identifying keys of `[GENERAL]`
const GENERAL_KEYS: [&str; 7] = [
    "SLIDE_ID",
    "SLIDE_NAME",
    "SLIDE_BARCODE",
    "SLIDE_CREATIONDATETIME",
    "SLIDE_QUALITY",
    "PROJECT_NAME",
    "SLIDE_LABEL",
];

/// Identifying keys in any section
const ANY_SECTION_KEYS: [&str; 10] = [
    "SLIDE_DESCRIPTION",
    "SLIDE_CREATOR",
    "SLIDE_COMMENT",
    "PATIENT_ID",
    "PATIENT_NAME",
    "CASE_ID",
    "CASE_NUMBER",
    "ACCESSION_NUMBER",
    "PHYSICIAN_NAME",
    "OPERATOR",
];

const LABEL_LAYERS: [&str; 3] = [
    "ScanDataLayer_SlideBarcode",
    "ScanDataLayer_SlideLabel",
    "ScanDataLayer_SlideBarcodeImage",
];
const MACRO_LAYERS: [&str; 3] = [
    "ScanDataLayer_SlidePreview",
    "ScanDataLayer_SlideMacro",
    "ScanDataLayer_SlideOverview",
];
const THUMBNAIL_LAYERS: [&str; 1] = ["ScanDataLayer_SlideThumbnail"];

const OFFSET_KEYS: [&str; 3] = ["FILE_OFFSET", "FILEOFFSET", "OFFSET"];
const SIZE_KEYS: [&str; 4] = ["FILE_SIZE", "FILESIZE", "SIZE", "BYTECOUNT"];

/// One `key = value` line of Slidedat.ini
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniEntry {
    pub section: String,
    pub key: String,
    pub value: String,
    /// Byte offset of the trimmed value in the file
    pub offset: u64,
    /// Byte length of the trimmed value
    pub length: u64,
}

/// Parsed Slidedat.ini that remembers where every value sits
#[derive(Debug, Clone, Default)]
pub struct SlideDat {
    pub entries: Vec<IniEntry>,
}

impl SlideDat {
    /// Parse ini bytes; a UTF-8 BOM, CRLF endings and `;`/`#` comments are
    /// accepted, lines that are neither sections nor pairs are ignored
    pub fn parse(raw: &[u8]) -> Self {
        let mut entries = Vec::new();
        let mut section = String::new();
        let mut at = if raw.starts_with(&[0xEF, 0xBB, 0xBF]) { 3 } else { 0 };

        for line in raw[at..].split(|b| *b == b'\n') {
            let line_start = at;
            at += line.len() + 1;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() || trimmed[0] == b';' || trimmed[0] == b'#' {
                continue;
            }
            if trimmed[0] == b'[' {
                if let Some(close) = trimmed.iter().position(|b| *b == b']') {
                    section = String::from_utf8_lossy(&trimmed[1..close]).trim().to_string();
                }
                continue;
            }
            let Some(eq) = line.iter().position(|b| *b == b'=') else {
                continue;
            };
            let after = &line[eq + 1..];
            let lead = after.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let value = after[lead..].trim_ascii_end();
            entries.push(IniEntry {
                section: section.clone(),
                key: String::from_utf8_lossy(&line[..eq]).trim().to_string(),
                value: String::from_utf8_lossy(value).into_owned(),
                offset: (line_start + eq + 1 + lead) as u64,
                length: value.len() as u64,
            });
        }
        Self { entries }
    }

    /// Case-insensitive lookup
    pub fn get(&self, section: &str, key: &str) -> Option<&IniEntry> {
        self.entries.iter().find(|e| {
            e.section.eq_ignore_ascii_case(section) && e.key.eq_ignore_ascii_case(key)
        })
    }

    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).map(|e| e.value.as_str())
    }

    fn number(&self, section: &str, keys: &[&str]) -> Option<u64> {
        keys.iter()
            .find_map(|key| self.value(section, key))
            .and_then(|v| v.parse().ok())
    }

    /// Section names in file order
    pub fn sections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&entry.section)) {
                names.push(&entry.section);
            }
        }
        names
    }
}

/// Category of an identifying key, `None` for everything else
fn identifying(section: &str, key: &str) -> Option<PhiCategory> {
    let key = key.to_ascii_uppercase();
    let listed = (section.eq_ignore_ascii_case("GENERAL") && GENERAL_KEYS.contains(&key.as_str()))
        || ANY_SECTION_KEYS.contains(&key.as_str());
    if !listed {
        return None;
    }
    Some(match key.as_str() {
        _ if is_date_key(&key) => PhiCategory::Date,
        "SLIDE_ID" => PhiCategory::UniqueIdentifier,
        "SLIDE_NAME" | "SLIDE_BARCODE" | "CASE_ID" | "CASE_NUMBER" | "ACCESSION_NUMBER" => {
            PhiCategory::CaseNumber
        }
        "PATIENT_ID" => PhiCategory::MedicalRecordNumber,
        "PATIENT_NAME" | "PHYSICIAN_NAME" | "SLIDE_CREATOR" | "OPERATOR" => PhiCategory::PersonName,
        _ => PhiCategory::FreeText,
    })
}

fn is_date_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("DATE") || key.contains("TIME")
}

/// An associated image stored in a data file
#[derive(Debug, Clone)]
struct AuxiliaryData {
    kind: AuxiliaryKind,
    layer: String,
    /// Data file name inside the companion directory
    file: String,
    range: ByteRange,
    blanked: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MrxsHandler;

impl MrxsHandler {
    /// `slide/` beside `slide.mrxs`
    fn data_dir(path: &Path) -> Result<PathBuf> {
        let stem = path
            .file_stem()
            .ok_or_else(|| ScrubError::CompanionMissing(path.display().to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).join(stem);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ScrubError::CompanionMissing(dir.display().to_string()))
        }
    }

    fn load(path: &Path) -> Result<(PathBuf, SlideDat)> {
        let dir = Self::data_dir(path)?;
        let ini = dir.join(SLIDEDAT);
        if !ini.is_file() {
            return Err(ScrubError::CompanionMissing(ini.display().to_string()));
        }
        let raw = std::fs::read(&ini)?;
        Ok((dir, SlideDat::parse(&raw)))
    }

    /// Companion path relative to the slide's parent directory
    fn companion(dir: &Path, name: &str) -> PathBuf {
        match dir.file_name() {
            Some(dir_name) => PathBuf::from(dir_name).join(name),
            None => PathBuf::from(name),
        }
    }

    /// Resolve a FILE reference: a plain data file name, or a `[DATAFILE]` key
    fn resolve_data_file(ini: &SlideDat, dir: &Path, reference: &str) -> Option<String> {
        let candidates = [Some(reference), ini.value("DATAFILE", reference)];
        candidates.into_iter().flatten().find_map(|name| {
            let name = name.trim();
            // data files never leave the companion directory
            let plain = Path::new(name).file_name().is_some_and(|f| f == name);
            (plain && dir.join(name).is_file()).then(|| name.to_string())
        })
    }

    /// Associated images declared through `[HIERARCHICAL]` NONHIER layers
    fn auxiliary_images(ini: &SlideDat, dir: &Path) -> Result<Vec<AuxiliaryData>> {
        let mut images = Vec::new();
        let layers = ini.number("HIERARCHICAL", &["NONHIER_COUNT"]).unwrap_or(0);
        for layer in 0..layers {
            let values = ini
                .number("HIERARCHICAL", &[&format!("NONHIER_{layer}_COUNT")])
                .unwrap_or(0);
            for value in 0..values {
                let Some(name) = ini.value("HIERARCHICAL", &format!("NONHIER_{layer}_VAL_{value}"))
                else {
                    continue;
                };
                let kind = if LABEL_LAYERS.contains(&name) {
                    AuxiliaryKind::Label
                } else if MACRO_LAYERS.contains(&name) {
                    AuxiliaryKind::Macro
                } else if THUMBNAIL_LAYERS.contains(&name) {
                    AuxiliaryKind::Thumbnail
                } else {
                    continue;
                };

                let section = ini
                    .value("HIERARCHICAL", &format!("NONHIER_{layer}_VAL_{value}_SECTION"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("NONHIER_{layer}_LEVEL_{value}"));
                let reference = ini
                    .value(&section, "FILE")
                    .or_else(|| ini.value(&section, "IMAGEFILE"));
                let Some(file) = reference.and_then(|r| Self::resolve_data_file(ini, dir, r))
                else {
                    warn!(layer = name, section = %section, "Associated image data file not found");
                    continue;
                };

                let data_path = dir.join(&file);
                let file_len = std::fs::metadata(&data_path)?.len();
                let offset = ini.number(&section, &OFFSET_KEYS).unwrap_or(0);
                let length = match ini.number(&section, &SIZE_KEYS) {
                    Some(size) if size > 0 => size,
                    _ => file_len.saturating_sub(offset),
                };
                if length == 0 || offset.saturating_add(length) > file_len {
                    warn!(layer = name, file = %file, offset, length, "Associated image range is outside its data file");
                    continue;
                }

                let range = ByteRange::new(offset, length);
                let blanked = is_zero_head(&data_path, range)?;
                images.push(AuxiliaryData {
                    kind,
                    layer: name.to_string(),
                    file,
                    range,
                    blanked,
                });
            }
        }
        Ok(images)
    }

    /// Data files listed in `[DATAFILE]`, in declaration order
    fn data_files(ini: &SlideDat, dir: &Path) -> Vec<String> {
        let count = ini.number("DATAFILE", &["FILE_COUNT"]).unwrap_or(0);
        (0..count)
            .filter_map(|i| Self::resolve_data_file(ini, dir, &format!("FILE_{i}")))
            .collect()
    }
}

/// An image is already blank when its first 8 bytes are zero
fn is_zero_head(path: &Path, range: ByteRange) -> Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(range.offset))?;
    let mut head = Vec::new();
    file.take(range.length.min(8)).read_to_end(&mut head)?;
    Ok(head.iter().all(|b| *b == 0))
}

/// SHA-256 of a file with some ranges left out
fn hash_excluding(path: &Path, excluded: &[ByteRange]) -> Result<String> {
    const CHUNK: usize = 64 * 1024;
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut hasher = Sha256::new();
    let mut skip: Vec<ByteRange> = excluded.to_vec();
    skip.sort_by_key(|r| r.offset);

    skip.push(ByteRange::new(len, 0));

    let mut at = 0u64;
    let mut buf = vec![0u8; CHUNK];
    for range in &skip {
        let until = range.offset.min(len);
        if until > at {
            file.seek(SeekFrom::Start(at))?;
            let mut remaining = until - at;
            while remaining > 0 {
                let take = remaining.min(CHUNK as u64) as usize;
                file.read_exact(&mut buf[..take])?;
                hasher.update(&buf[..take]);
                remaining -= take as u64;
            }
        }
        at = at.max(range.end().min(len));
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl FormatHandler for MrxsHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Mrxs
    }

    fn detect(&self, path: &Path) -> bool {
        has_extension(path, FormatKind::Mrxs) && path.is_file()
    }

    fn scan(&self, path: &Path, options: &ScanOptions) -> Result<Vec<PhiFinding>> {
        let (dir, ini) = Self::load(path)?;
        let ini_target = Target::Companion(Self::companion(&dir, SLIDEDAT));
        let mut findings = Vec::new();

        for entry in &ini.entries {
            let location = Location::ConfigKey {
                section: entry.section.clone(),
                key: entry.key.clone(),
            };

            if let Some(category) = identifying(&entry.section, &entry.key) {
                let date = is_date_key(&entry.key);
                let sentinel = date.then_some(DATE_SENTINEL);
                if is_replaced(&entry.value, sentinel) {
                    continue;
                }
                let (bytes, policy) = match sentinel {
                    Some(s) => (fit_sentinel(s, entry.length as usize), RedactionPolicy::SentinelDate),
                    None => (vec![b'X'; entry.length as usize], RedactionPolicy::FixedFill),
                };
                findings.push(
                    PhiFinding::new(
                        category,
                        format!("MRXS:{}:{}", entry.section, entry.key),
                        location,
                        &entry.value,
                    )
                    .with_redaction(Redaction::Overwrite {
                        target: ini_target.clone(),
                        offset: entry.offset,
                        bytes,
                        policy,
                    }),
                );
                continue;
            }

            // offsets only line up when the value decoded without loss
            if entry.value.len() as u64 != entry.length {
                continue;
            }
            for hit in options.scanner.scan_text(&entry.value) {
                findings.push(
                    PhiFinding::new(
                        hit.category,
                        format!("MRXS:{}:{}", entry.key, hit.label),
                        location.clone(),
                        &hit.text,
                    )
                    .with_redaction(Redaction::Overwrite {
                        target: ini_target.clone(),
                        offset: entry.offset + hit.start,
                        bytes: vec![b'X'; hit.len() as usize],
                        policy: RedactionPolicy::FixedFill,
                    }),
                );
            }
        }

        for image in Self::auxiliary_images(&ini, &dir)? {
            if image.blanked {
                debug!(layer = %image.layer, file = %image.file, "Associated image already blanked");
                continue;
            }
            let file = Self::companion(&dir, &image.file);
            findings.push(
                PhiFinding::new(
                    PhiCategory::AuxiliaryImage,
                    format!("MRXS:{} image", image.kind),
                    Location::CompanionData {
                        file: file.clone(),
                        offset: image.range.offset,
                        length: image.range.length,
                    },
                    "",
                )
                .with_summary(format!(
                    "{} image, {} bytes in {}",
                    image.kind, image.range.length, image.file
                ))
                .with_redaction(Redaction::ZeroFill {
                    target: Target::Companion(file),
                    offset: image.range.offset,
                    length: image.range.length,
                }),
            );
        }

        // the index file itself
        let index = read_prefix(path, options.sweep_window as usize).unwrap_or_default();
        for hit in options.scanner.sweep(&index, 0, &[]) {
            findings.push(
                PhiFinding::new(
                    hit.category,
                    format!("regex:{}", hit.label),
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
        Ok(findings)
    }

    fn redact(&self, path: &Path, plan: &MutationPlan, options: &RedactOptions) -> RedactOutcome {
        patch::apply_byte_actions(path, &plan.actions, options)
    }

    fn info(&self, path: &Path) -> Result<FormatInfo> {
        let file_size = std::fs::metadata(path)?.len();
        let (dir, ini) = Self::load(path)?;
        let mut info = FormatInfo::new(path, FormatKind::Mrxs, file_size);
        info.page_count = ini.sections().len();

        for key in [
            "SLIDE_VERSION",
            "SLIDE_TYPE",
            "IMAGENUMBER_X",
            "IMAGENUMBER_Y",
            "OBJECTIVE_MAGNIFICATION",
        ] {
            if let Some(value) = ini.value("GENERAL", key) {
                info.details.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }

        let files = Self::data_files(&ini, &dir);
        let mut total = 0;
        for file in &files {
            total += std::fs::metadata(dir.join(file))?.len();
        }
        info.details.insert("data_directory".to_string(), dir.display().to_string());
        info.details.insert("data_file_count".to_string(), files.len().to_string());
        info.details.insert("total_data_size".to_string(), total.to_string());

        for image in Self::auxiliary_images(&ini, &dir)? {
            info.auxiliary_images.push(if image.blanked {
                format!("{} ({}, blanked)", image.kind, image.layer)
            } else {
                format!("{} ({})", image.kind, image.layer)
            });
        }
        Ok(info)
    }

    /// One digest per data file with associated image ranges left out
    fn diagnostic_digests(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let (dir, ini) = Self::load(path)?;
        let images = Self::auxiliary_images(&ini, &dir)?;
        let mut digests = BTreeMap::new();
        for file in Self::data_files(&ini, &dir) {
            let excluded: Vec<ByteRange> = images
                .iter()
                .filter(|i| i.file == file)
                .map(|i| i.range)
                .collect();
            let digest = hash_excluding(&dir.join(&file), &excluded)?;
            digests.insert(format!("data@{file}"), digest);
        }
        Ok(digests)
    }

    fn companion_dir(&self, path: &Path) -> Option<PathBuf> {
        Self::data_dir(path).ok()
    }
}
