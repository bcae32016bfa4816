//! Container header and byte-order helpers

use crate::domain::ParseError;

/// Byte order declared by the first two header bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `II`
    Little,
    /// `MM`
    Big,
}

impl ByteOrder {
    pub fn name(&self) -> &'static str {
        match self {
            ByteOrder::Little => "little-endian",
            ByteOrder::Big => "big-endian",
        }
    }

    pub fn u16(&self, b: &[u8]) -> u16 {
        let raw = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        }
    }

    pub fn u32(&self, b: &[u8]) -> u32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        }
    }

    pub fn u64(&self, b: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(raw),
            ByteOrder::Big => u64::from_be_bytes(raw),
        }
    }

    pub fn u16_bytes(&self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(&self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u64_bytes(&self, v: u64) -> [u8; 8] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Parsed container header
///
/// Addressing width is fixed for the whole file: it decides entry size,
/// count width, offset width and inline slot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub byte_order: ByteOrder,
    pub bigtiff: bool,
    pub first_directory: u64,
}

/// Magic for classic 32-bit containers
pub const CLASSIC_MAGIC: u16 = 42;
/// Magic for 64-bit (BigTIFF) containers
pub const BIGTIFF_MAGIC: u16 = 43;

impl Header {
    /// Parse the header from the first bytes of a file
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 8 {
            return Err(ParseError::MalformedHeader(format!(
                "need at least 8 bytes, got {}",
                bytes.len()
            )));
        }
        let byte_order = match &bytes[0..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            other => {
                return Err(ParseError::UnsupportedMagic(u16::from_le_bytes([
                    other[0], other[1],
                ])))
            }
        };

        match byte_order.u16(&bytes[2..4]) {
            CLASSIC_MAGIC => Ok(Self {
                byte_order,
                bigtiff: false,
                first_directory: u64::from(byte_order.u32(&bytes[4..8])),
            }),
            BIGTIFF_MAGIC => {
                if bytes.len() < 16 {
                    return Err(ParseError::MalformedHeader(
                        "BigTIFF header shorter than 16 bytes".to_string(),
                    ));
                }
                let bytesize = byte_order.u16(&bytes[4..6]);
                if bytesize != 8 {
                    return Err(ParseError::MalformedHeader(format!(
                        "BigTIFF offset size must be 8, got {bytesize}"
                    )));
                }
                Ok(Self {
                    byte_order,
                    bigtiff: true,
                    first_directory: byte_order.u64(&bytes[8..16]),
                })
            }
            other => Err(ParseError::UnsupportedMagic(other)),
        }
    }

    /// Cheap signature check used by format detection
    pub fn sniff(bytes: &[u8]) -> bool {
        if bytes.len() < 4 {
            return false;
        }
        matches!(
            &bytes[0..4],
            [b'I', b'I', 42, 0] | [b'I', b'I', 43, 0] | [b'M', b'M', 0, 42] | [b'M', b'M', 0, 43]
        )
    }

    /// Size of a directory entry record
    pub fn entry_size(&self) -> u64 {
        if self.bigtiff {
            20
        } else {
            12
        }
    }

    /// Width of the entry-count and next-pointer fields
    pub fn count_size(&self) -> u64 {
        if self.bigtiff {
            8
        } else {
            2
        }
    }

    /// Width of offsets and of the inline value slot
    pub fn offset_size(&self) -> u64 {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    /// File offset of the first-directory pointer
    pub fn first_pointer_offset(&self) -> u64 {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    /// Decode an offset-width value
    pub fn read_offset(&self, b: &[u8]) -> u64 {
        if self.bigtiff {
            self.byte_order.u64(b)
        } else {
            u64::from(self.byte_order.u32(b))
        }
    }

    /// Encode an offset-width value; classic offsets must fit in 32 bits
    pub fn offset_bytes(&self, value: u64) -> Result<Vec<u8>, ParseError> {
        if self.bigtiff {
            Ok(self.byte_order.u64_bytes(value).to_vec())
        } else {
            let narrow = u32::try_from(value).map_err(|_| {
                ParseError::MalformedHeader(format!("offset {value} exceeds 32-bit addressing"))
            })?;
            Ok(self.byte_order.u32_bytes(narrow).to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_little_endian() {
        let header = Header::parse(&[b'I', b'I', 42, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.byte_order, ByteOrder::Little);
        assert!(!header.bigtiff);
        assert_eq!(header.first_directory, 8);
        assert_eq!(header.entry_size(), 12);
    }

    #[test]
    fn test_classic_big_endian() {
        let header = Header::parse(&[b'M', b'M', 0, 42, 0, 0, 1, 0]).unwrap();
        assert_eq!(header.byte_order, ByteOrder::Big);
        assert_eq!(header.first_directory, 256);
    }

    #[test]
    fn test_bigtiff() {
        let bytes = [b'I', b'I', 43, 0, 8, 0, 0, 0, 16, 0, 0, 0, 0, 0, 0, 0];
        let header = Header::parse(&bytes).unwrap();
        assert!(header.bigtiff);
        assert_eq!(header.first_directory, 16);
        assert_eq!(header.entry_size(), 20);
    }

    #[test]
    fn test_bigtiff_bad_bytesize() {
        let bytes = [b'I', b'I', 43, 0, 4, 0, 0, 0, 16, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Header::parse(&bytes),
            Err(ParseError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            Header::parse(&[b'I', b'I', 44, 0, 8, 0, 0, 0]),
            Err(ParseError::UnsupportedMagic(44))
        ));
        assert!(matches!(
            Header::parse(b"GIF89a\0\0"),
            Err(ParseError::UnsupportedMagic(_))
        ));
        assert!(Header::parse(b"II*").is_err());
    }

    #[test]
    fn test_sniff() {
        assert!(Header::sniff(&[b'I', b'I', 42, 0]));
        assert!(Header::sniff(&[b'M', b'M', 0, 43]));
        assert!(!Header::sniff(b"DICM"));
    }
}
