//! Directory and field entry model

use super::header::Header;
use crate::domain::{ByteRange, ParseError};

/// Maximum entries accepted in a single directory
pub const MAX_DIRECTORY_ENTRIES: u64 = 1000;

/// Tag numbers the container layer itself interprets
pub mod tags {
    pub const IMAGE_DESCRIPTION: u16 = 270;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const EXIF_IFD: u16 = 34665;
    pub const GPS_IFD: u16 = 34853;
}

/// Field type codes
pub mod types {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const IFD: u16 = 13;
    pub const LONG8: u16 = 16;
    pub const SLONG8: u16 = 17;
    pub const IFD8: u16 = 18;
}

/// Byte size of one value of the given type; unknown types count as 1
pub fn type_size(field_type: u16) -> u64 {
    match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 | 13 => 4,
        5 | 10 | 12 | 16 | 17 | 18 => 8,
        _ => 1,
    }
}

/// One field entry with its value location resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    /// File offset of the entry record
    pub entry_offset: u64,
    /// File offset of the value bytes (inside the entry when inline)
    pub value_offset: u64,
    /// `type_size × count`
    pub byte_len: u64,
    pub inline: bool,
}

impl Field {
    pub fn is_ascii(&self) -> bool {
        self.field_type == types::ASCII
    }

    /// ASCII or UNDEFINED: the types that can carry free text
    pub fn is_textual(&self) -> bool {
        matches!(self.field_type, types::ASCII | types::UNDEFINED)
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.value_offset, self.byte_len)
    }
}

/// Decode one entry record located at `entry_offset`
pub(crate) fn parse_entry(
    header: &Header,
    raw: &[u8],
    entry_offset: u64,
) -> Result<Field, ParseError> {
    let order = header.byte_order;
    let tag = order.u16(&raw[0..2]);
    let field_type = order.u16(&raw[2..4]);
    let (count, slot_at) = if header.bigtiff {
        (order.u64(&raw[4..12]), 12usize)
    } else {
        (u64::from(order.u32(&raw[4..8])), 8usize)
    };

    let byte_len = type_size(field_type)
        .checked_mul(count)
        .ok_or_else(|| ParseError::MalformedField {
            tag,
            reason: format!("count {count} overflows the value size"),
        })?;

    let inline = byte_len <= header.offset_size();
    let value_offset = if inline {
        entry_offset + slot_at as u64
    } else {
        header.read_offset(&raw[slot_at..])
    };

    Ok(Field {
        tag,
        field_type,
        count,
        entry_offset,
        value_offset,
        byte_len,
        inline,
    })
}

/// A sub-directory (EXIF or GPS) reached through a pointer field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDirectory {
    pub offset: u64,
    pub fields: Vec<Field>,
}

/// One directory (page) of the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Position in the chain, starting at 0
    pub index: usize,
    pub offset: u64,
    pub fields: Vec<Field>,
    /// Next directory offset, 0 when terminal
    pub next_offset: u64,
    /// File offset of the next-directory pointer
    pub next_pointer_offset: u64,
    pub exif: Option<SubDirectory>,
    pub gps: Option<SubDirectory>,
}

impl Directory {
    pub fn field(&self, tag: u16) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn has_image_data(&self) -> bool {
        (self.field(tags::STRIP_OFFSETS).is_some() && self.field(tags::STRIP_BYTE_COUNTS).is_some())
            || (self.field(tags::TILE_OFFSETS).is_some()
                && self.field(tags::TILE_BYTE_COUNTS).is_some())
    }
}

/// Decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Ascii(Vec<u8>),
    Bytes(Vec<u8>),
    Unsigned(Vec<u64>),
    Signed(Vec<i64>),
    Float(Vec<f64>),
}

impl FieldValue {
    /// Text with trailing NULs removed (lossy for non-UTF-8 bytes)
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Ascii(b) | FieldValue::Bytes(b) => {
                let end = b.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
                Some(String::from_utf8_lossy(&b[..end]).into_owned())
            }
            _ => None,
        }
    }

    pub fn first_unsigned(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => v.first().copied(),
            FieldValue::Signed(v) => v.first().and_then(|x| u64::try_from(*x).ok()),
            _ => None,
        }
    }

    pub fn first_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => v.first().copied(),
            FieldValue::Unsigned(v) => v.first().map(|x| *x as f64),
            FieldValue::Signed(v) => v.first().map(|x| *x as f64),
            _ => None,
        }
    }

    pub fn unsigned_values(&self) -> Option<&[u64]> {
        match self {
            FieldValue::Unsigned(v) => Some(v),
            _ => None,
        }
    }
}

/// Decode raw value bytes according to the field type
pub(crate) fn decode_value(header: &Header, field: &Field, raw: &[u8]) -> FieldValue {
    let order = header.byte_order;
    let size = type_size(field.field_type) as usize;
    let chunks = raw.chunks_exact(size.max(1));
    match field.field_type {
        types::ASCII => FieldValue::Ascii(raw.to_vec()),
        types::BYTE => FieldValue::Unsigned(raw.iter().map(|b| u64::from(*b)).collect()),
        types::SBYTE => FieldValue::Signed(raw.iter().map(|b| i64::from(*b as i8)).collect()),
        types::SHORT => FieldValue::Unsigned(chunks.map(|c| u64::from(order.u16(c))).collect()),
        types::SSHORT => {
            FieldValue::Signed(chunks.map(|c| i64::from(order.u16(c) as i16)).collect())
        }
        types::LONG | types::IFD => {
            FieldValue::Unsigned(chunks.map(|c| u64::from(order.u32(c))).collect())
        }
        types::SLONG => FieldValue::Signed(chunks.map(|c| i64::from(order.u32(c) as i32)).collect()),
        types::LONG8 | types::IFD8 => FieldValue::Unsigned(chunks.map(|c| order.u64(c)).collect()),
        types::SLONG8 => FieldValue::Signed(chunks.map(|c| order.u64(c) as i64).collect()),
        types::FLOAT => FieldValue::Float(
            chunks
                .map(|c| f64::from(f32::from_bits(order.u32(c))))
                .collect(),
        ),
        types::DOUBLE => FieldValue::Float(chunks.map(|c| f64::from_bits(order.u64(c))).collect()),
        types::RATIONAL => FieldValue::Float(
            chunks
                .map(|c| {
                    let den = order.u32(&c[4..8]);
                    if den == 0 {
                        0.0
                    } else {
                        f64::from(order.u32(&c[0..4])) / f64::from(den)
                    }
                })
                .collect(),
        ),
        types::SRATIONAL => FieldValue::Float(
            chunks
                .map(|c| {
                    let den = order.u32(&c[4..8]) as i32;
                    if den == 0 {
                        0.0
                    } else {
                        f64::from(order.u32(&c[0..4]) as i32) / f64::from(den)
                    }
                })
                .collect(),
        ),
        _ => FieldValue::Bytes(raw.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::{ByteOrder, Header};

    fn classic() -> Header {
        Header {
            byte_order: ByteOrder::Little,
            bigtiff: false,
            first_directory: 8,
        }
    }

    #[test]
    fn test_type_sizes() {
        assert_eq!(type_size(types::ASCII), 1);
        assert_eq!(type_size(types::SHORT), 2);
        assert_eq!(type_size(types::FLOAT), 4);
        assert_eq!(type_size(types::RATIONAL), 8);
        assert_eq!(type_size(types::IFD8), 8);
        assert_eq!(type_size(999), 1);
    }

    #[test]
    fn test_inline_entry() {
        // tag 285, ASCII, count 4, inline "abc\0"
        let raw = [0x1d, 0x01, 2, 0, 4, 0, 0, 0, b'a', b'b', b'c', 0];
        let field = parse_entry(&classic(), &raw, 10).unwrap();
        assert_eq!(field.tag, 285);
        assert!(field.inline);
        assert_eq!(field.value_offset, 18);
        assert_eq!(field.byte_len, 4);
    }

    #[test]
    fn test_offset_entry() {
        // tag 270, ASCII, count 20, at offset 200
        let raw = [0x0e, 0x01, 2, 0, 20, 0, 0, 0, 200, 0, 0, 0];
        let field = parse_entry(&classic(), &raw, 10).unwrap();
        assert!(!field.inline);
        assert_eq!(field.value_offset, 200);
    }

    #[test]
    fn test_overflowing_count() {
        let header = Header {
            byte_order: ByteOrder::Little,
            bigtiff: true,
            first_directory: 16,
        };
        let mut raw = [0u8; 20];
        raw[0] = 1;
        raw[2] = types::DOUBLE as u8;
        raw[4..12].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            parse_entry(&header, &raw, 16),
            Err(ParseError::MalformedField { tag: 1, .. })
        ));
    }

    #[test]
    fn test_decode_float_and_text() {
        let header = classic();
        let field = Field {
            tag: 65421,
            field_type: types::FLOAT,
            count: 1,
            entry_offset: 0,
            value_offset: 0,
            byte_len: 4,
            inline: true,
        };
        let value = decode_value(&header, &field, &(-1.0f32).to_bits().to_le_bytes());
        assert_eq!(value.first_float(), Some(-1.0));

        let text = FieldValue::Ascii(b"Aperio\0\0".to_vec());
        assert_eq!(text.as_text().as_deref(), Some("Aperio"));
    }
}
