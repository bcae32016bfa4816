//! Synthetic slide fixtures shared by the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// One classic little-endian field
pub struct Field {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub data: Vec<u8>,
}

impl Field {
    pub fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            field_type: 2,
            count: data.len() as u32,
            data,
        }
    }

    pub fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: 4,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }
}

/// Classic little-endian TIFF with the given directories chained in order
pub fn tiff(directories: Vec<Vec<Field>>) -> Vec<u8> {
    let mut out = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
    let count = directories.len();
    for (i, mut fields) in directories.into_iter().enumerate() {
        fields.sort_by_key(|f| f.tag);
        let table_len = 2 + fields.len() * 12 + 4;
        let data_start = out.len() + table_len;
        let mut data_area = Vec::new();

        out.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for field in &fields {
            out.extend_from_slice(&field.tag.to_le_bytes());
            out.extend_from_slice(&field.field_type.to_le_bytes());
            out.extend_from_slice(&field.count.to_le_bytes());
            if field.data.len() <= 4 {
                let mut slot = field.data.clone();
                slot.resize(4, 0);
                out.extend_from_slice(&slot);
            } else {
                let at = (data_start + data_area.len()) as u32;
                out.extend_from_slice(&at.to_le_bytes());
                data_area.extend_from_slice(&field.data);
                if data_area.len() % 2 == 1 {
                    data_area.push(0);
                }
            }
        }
        let next = if i + 1 < count {
            (data_start + data_area.len()) as u32
        } else {
            0
        };
        out.extend_from_slice(&next.to_le_bytes());
        out.extend_from_slice(&data_area);
    }
    out
}

/// One page whose PageName carries an accession number
pub fn dirty_tiff() -> Vec<u8> {
    tiff(vec![vec![
        Field::long(256, 512),
        Field::ascii(285, "AS-24-123456"),
    ]])
}

pub fn clean_tiff() -> Vec<u8> {
    tiff(vec![vec![Field::long(256, 512)]])
}

/// A single directory whose next pointer leads back to itself
pub fn cyclic_tiff() -> Vec<u8> {
    let mut bytes = tiff(vec![vec![Field::long(256, 512)]]);
    // header(8) + count(2) + one entry(12)
    bytes[22..26].copy_from_slice(&8u32.to_le_bytes());
    bytes
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

pub const SLIDEDAT: &str = "\u{feff}[GENERAL]\r\n\
SLIDE_VERSION = 01.02\r\n\
SLIDE_ID = 4F1A2B3C\r\n\
OBJECTIVE_MAGNIFICATION = 20\r\n\
\r\n\
[DATAFILE]\r\n\
FILE_COUNT = 1\r\n\
FILE_0 = Data0000.dat\r\n";

/// `<name>.mrxs` with its companion directory
pub fn mrxs(dir: &Path, name: &str) -> PathBuf {
    let path = write(dir, &format!("{name}.mrxs"), b"[GENERAL]\nSLIDE_VERSION=01.02\n");
    write(dir, &format!("{name}/Slidedat.ini"), SLIDEDAT.as_bytes());
    write(dir, &format!("{name}/Data0000.dat"), &[0x11; 96]);
    path
}

const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const WSI_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.77.1.6";
/// Instance UID already under the remapping root
pub const REMAPPED_UID: &str = "1.2.826.0.1.3680043.10.1118.1";

fn padded(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

/// Explicit VR little endian element with a short (16-bit) length
pub fn element(group: u16, number: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&number.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    out
}

/// Part 10 file: preamble, magic, meta group, then `body`
pub fn dicom(sop_instance: &str, body: &[u8]) -> Vec<u8> {
    let mut meta = Vec::new();
    // (0002,0001) OB uses the long header form
    meta.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, b'O', b'B', 0, 0]);
    meta.extend_from_slice(&2u32.to_le_bytes());
    meta.extend_from_slice(&[0, 1]);
    meta.extend(element(0x0002, 0x0002, b"UI", &padded(WSI_SOP_CLASS)));
    meta.extend(element(0x0002, 0x0003, b"UI", &padded(sop_instance)));
    meta.extend(element(0x0002, 0x0010, b"UI", &padded(EXPLICIT_VR_LE)));

    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    out.extend(element(0x0002, 0x0000, b"UL", &(meta.len() as u32).to_le_bytes()));
    out.extend(meta);
    out.extend_from_slice(body);
    out
}
