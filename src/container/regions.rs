//! Image data regions and auxiliary image blanking

use sha2::{Digest, Sha256};
use std::io::{Read, Seek};

use super::ifd::{tags, Directory};
use super::Container;
use crate::domain::{ByteRange, ParseError, Result};

/// Marker carried in the COM segment of [`BLANK_JPEG`]
pub const BLANK_MARKER: &[u8] = b"SCRUBBED";

/// Minimal valid 1x1 JPEG written over auxiliary images, followed by zero
/// padding up to the region length. The COM segment at offset 24 holds
/// [`BLANK_MARKER`].
pub const BLANK_JPEG: [u8; 642] = [
    0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xff, 0xfe, 0x00, 0x0a, 0x53, 0x43, 0x52, 0x55, 0x42, 0x42, 0x45, 0x44,
    0xff, 0xdb, 0x00, 0x43, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xdb, 0x00, 0x43, 0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc0, 0x00, 0x11, 0x08, 0x00,
    0x01, 0x00, 0x01, 0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01, 0xff, 0xc4, 0x00,
    0x1f, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0xff, 0xc4,
    0x00, 0xb5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05, 0x04, 0x04, 0x00,
    0x00, 0x01, 0x7d, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13,
    0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15,
    0x52, 0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46,
    0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66,
    0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86,
    0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4,
    0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2,
    0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9,
    0xda, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5,
    0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xff, 0xc4, 0x00, 0x1f, 0x01, 0x00, 0x03, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
    0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0xff, 0xc4, 0x00, 0xb5, 0x11, 0x00, 0x02, 0x01, 0x02, 0x04,
    0x04, 0x03, 0x04, 0x07, 0x05, 0x04, 0x04, 0x00, 0x01, 0x02, 0x77, 0x00, 0x01, 0x02, 0x03, 0x11,
    0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71, 0x13, 0x22, 0x32, 0x81, 0x08,
    0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0, 0x15, 0x62, 0x72, 0xd1, 0x0a,
    0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x35,
    0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55,
    0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75,
    0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93,
    0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa,
    0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8,
    0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6,
    0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xff, 0xda, 0x00,
    0x0c, 0x03, 0x01, 0x00, 0x02, 0x11, 0x03, 0x11, 0x00, 0x3f, 0x00, 0x92, 0x8a, 0x28, 0xa0, 0x0f,
    0xff, 0xd9,
];

/// Older redaction payload: SOI immediately followed by EOI
const LEGACY_BLANK: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

/// Decide whether a region's leading bytes look already blanked
///
/// `head` is up to 32 bytes from the start of the first strip or tile,
/// `region_len` its declared length and `after_payload` the 8 bytes that
/// follow a [`BLANK_JPEG`]-sized prefix, when the region is long enough.
pub fn looks_blanked(head: &[u8], region_len: u64, after_payload: Option<&[u8]>) -> bool {
    if region_len < 8 || head.is_empty() {
        return false;
    }
    if head.iter().all(|b| *b == 0) {
        return true;
    }
    if !head.starts_with(&[0xFF, 0xD8]) {
        return false;
    }
    if head.windows(BLANK_MARKER.len()).any(|w| w == BLANK_MARKER) {
        return true;
    }
    if head.len() >= 8 && head.starts_with(LEGACY_BLANK) && head[4..8].iter().all(|b| *b == 0) {
        return true;
    }
    matches!(after_payload, Some(trail) if !trail.is_empty() && trail.iter().all(|b| *b == 0))
}

impl<R: Read + Seek> Container<R> {
    /// Strip or tile byte ranges of a directory, zero-length entries skipped
    ///
    /// Tiles win when both layouts are declared. Offsets and counts of
    /// different lengths, or ranges past end of file, are parse errors.
    pub fn locate_image_regions(&mut self, directory: &Directory) -> Result<Vec<ByteRange>> {
        let pair = match (
            directory.field(tags::TILE_OFFSETS),
            directory.field(tags::TILE_BYTE_COUNTS),
        ) {
            (Some(o), Some(c)) => Some((o.clone(), c.clone())),
            _ => match (
                directory.field(tags::STRIP_OFFSETS),
                directory.field(tags::STRIP_BYTE_COUNTS),
            ) {
                (Some(o), Some(c)) => Some((o.clone(), c.clone())),
                _ => None,
            },
        };
        let Some((offsets_field, counts_field)) = pair else {
            return Ok(Vec::new());
        };

        let offsets = self.read_field_value(&offsets_field)?;
        let counts = self.read_field_value(&counts_field)?;
        let (Some(offsets), Some(counts)) = (offsets.unsigned_values(), counts.unsigned_values())
        else {
            return Err(ParseError::MalformedField {
                tag: offsets_field.tag,
                reason: "image offsets or byte counts are not integers".to_string(),
            }
            .into());
        };
        if offsets.len() != counts.len() {
            return Err(ParseError::MalformedField {
                tag: offsets_field.tag,
                reason: format!(
                    "{} offsets but {} byte counts",
                    offsets.len(),
                    counts.len()
                ),
            }
            .into());
        }

        let mut regions = Vec::with_capacity(offsets.len());
        for (&offset, &length) in offsets.iter().zip(counts) {
            if length == 0 {
                continue;
            }
            if offset.checked_add(length).map_or(true, |end| end > self.file_len()) {
                return Err(ParseError::Truncated {
                    offset,
                    wanted: length,
                }
                .into());
            }
            regions.push(ByteRange::new(offset, length));
        }
        Ok(regions)
    }

    /// Whether the directory's image data already carries a blank payload
    pub fn is_image_blanked(&mut self, directory: &Directory) -> Result<bool> {
        let regions = self.locate_image_regions(directory)?;
        let Some(first) = regions.first().copied() else {
            return Ok(false);
        };
        self.is_range_blanked(first)
    }

    /// Blank-payload check for a single data range
    pub fn is_range_blanked(&mut self, range: ByteRange) -> Result<bool> {
        if range.length < 8 {
            return Ok(false);
        }
        let head = self.read_at(range.offset, range.length.min(32))?;
        let payload = BLANK_JPEG.len() as u64;
        let trail = if range.length > payload + 8 {
            Some(self.read_at(range.offset + payload, 8)?)
        } else {
            None
        };
        Ok(looks_blanked(&head, range.length, trail.as_deref()))
    }

    /// SHA-256 over the bytes of all ranges, streamed in 64 KiB chunks
    pub fn hash_regions(&mut self, regions: &[ByteRange]) -> Result<String> {
        const CHUNK: u64 = 64 * 1024;
        let mut hasher = Sha256::new();
        for range in regions {
            let mut done = 0;
            while done < range.length {
                let take = CHUNK.min(range.length - done);
                hasher.update(self.read_at(range.offset + done, take)?);
                done += take;
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}
