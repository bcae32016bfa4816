//! Tagged image container reader and writer
//!
//! Reads and writes classic TIFF and BigTIFF files in either byte order,
//! independent of any vendor semantics. The reader is generic over
//! `Read + Seek` so tests can run against in-memory buffers; mutation needs
//! `Write` as well.
//!
//! Parsing never trusts the input: entry counts, chain length, value sizes
//! and every offset are bounds-checked, and directory chains are walked with
//! cycle detection.
//!
//! ```rust
//! use slidescrub::container::Container;
//! use std::io::Cursor;
//!
//! // Minimal classic little-endian file with one empty directory
//! let bytes = vec![b'I', b'I', 42, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
//! let mut container = Container::open(Cursor::new(bytes)).unwrap();
//! assert_eq!(container.read_directories().unwrap().len(), 1);
//! ```

pub mod header;
pub mod ifd;
pub mod regions;
pub mod subifd;
pub mod writer;

pub use header::{ByteOrder, Header};
pub use ifd::{tags, types, Directory, Field, FieldValue, SubDirectory, MAX_DIRECTORY_ENTRIES};
pub use regions::{BLANK_JPEG, BLANK_MARKER};

use std::collections::HashSet;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::domain::{ParseError, Result, ScrubError};

/// Maximum directories followed in one chain
pub const MAX_CHAIN_LENGTH: usize = 500;

/// An opened container
#[derive(Debug)]
pub struct Container<R> {
    inner: R,
    header: Header,
    file_len: u64,
}

impl<R: Read + Seek> Container<R> {
    /// Parse the header and prepare for traversal
    pub fn open(mut inner: R) -> Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        let mut head = vec![0u8; file_len.min(16) as usize];
        inner.read_exact(&mut head)?;
        let header = Header::parse(&head)?;
        Ok(Self {
            inner,
            header,
            file_len,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read `len` bytes at `offset`, failing with `Truncated` past end of file
    pub fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > self.file_len) {
            return Err(ParseError::Truncated {
                offset,
                wanted: len,
            }
            .into());
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ScrubError::Parse(ParseError::Truncated {
                    offset,
                    wanted: len,
                })
            } else {
                ScrubError::from(e)
            }
        })?;
        Ok(buf)
    }

    /// Lazy iterator over the directory chain, starting from the header
    ///
    /// Every call starts a fresh traversal. The iterator stops after the
    /// first error.
    pub fn directories(&mut self) -> Directories<'_, R> {
        let next = self.header.first_directory;
        Directories {
            container: self,
            next,
            index: 0,
            visited: HashSet::new(),
            done: false,
        }
    }

    /// Collect the whole chain, failing on the first bad directory
    pub fn read_directories(&mut self) -> Result<Vec<Directory>> {
        self.directories().collect()
    }

    /// Raw value bytes of a field
    pub fn read_field_bytes(&mut self, field: &Field) -> Result<Vec<u8>> {
        self.read_at(field.value_offset, field.byte_len)
    }

    /// Decoded value of a field
    pub fn read_field_value(&mut self, field: &Field) -> Result<FieldValue> {
        let raw = self.read_field_bytes(field)?;
        Ok(ifd::decode_value(&self.header, field, &raw))
    }

    /// Parse the field table at `offset` without following the chain
    fn read_entries(&mut self, offset: u64) -> Result<(Vec<Field>, u64)> {
        let count_size = self.header.count_size();
        let raw_count = self.read_at(offset, count_size)?;
        let count = if self.header.bigtiff {
            self.header.byte_order.u64(&raw_count)
        } else {
            u64::from(self.header.byte_order.u16(&raw_count))
        };
        if count > MAX_DIRECTORY_ENTRIES {
            return Err(ParseError::TooManyEntries { offset, count }.into());
        }

        let entry_size = self.header.entry_size();
        let table_start = offset + count_size;
        let table = self.read_at(table_start, count * entry_size)?;
        let mut fields = Vec::with_capacity(count as usize);
        for (i, raw) in table.chunks_exact(entry_size as usize).enumerate() {
            let entry_offset = table_start + i as u64 * entry_size;
            fields.push(ifd::parse_entry(&self.header, raw, entry_offset)?);
        }
        Ok((fields, table_start + count * entry_size))
    }

    fn read_directory(
        &mut self,
        offset: u64,
        index: usize,
        visited: &mut HashSet<u64>,
    ) -> Result<Directory> {
        let (fields, next_pointer_offset) = self.read_entries(offset)?;
        let raw_next = self.read_at(next_pointer_offset, self.header.offset_size())?;
        let next_offset = self.header.read_offset(&raw_next);

        let mut directory = Directory {
            index,
            offset,
            fields,
            next_offset,
            next_pointer_offset,
            exif: None,
            gps: None,
        };
        directory.exif = self.read_sub_directory(&directory, tags::EXIF_IFD, visited)?;
        directory.gps = self.read_sub_directory(&directory, tags::GPS_IFD, visited)?;
        Ok(directory)
    }
}

/// Lazy, finite directory chain iterator
pub struct Directories<'a, R> {
    container: &'a mut Container<R>,
    next: u64,
    index: usize,
    visited: HashSet<u64>,
    done: bool,
}

impl<R: Read + Seek> Iterator for Directories<'_, R> {
    type Item = Result<Directory>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next == 0 {
            self.done = true;
            return None;
        }
        if self.index >= MAX_CHAIN_LENGTH {
            self.done = true;
            return Some(Err(ParseError::ChainTooLong(MAX_CHAIN_LENGTH).into()));
        }
        if !self.visited.insert(self.next) {
            self.done = true;
            return Some(Err(ParseError::Cycle(self.next).into()));
        }

        match self
            .container
            .read_directory(self.next, self.index, &mut self.visited)
        {
            Ok(directory) => {
                self.next = directory.next_offset;
                self.index += 1;
                Some(Ok(directory))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Little builder for synthetic classic little-endian files

    /// Field to place in a synthetic directory
    pub struct TestField {
        pub tag: u16,
        pub field_type: u16,
        pub count: u32,
        pub data: Vec<u8>,
    }

    impl TestField {
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

        pub fn long(tag: u16, values: &[u32]) -> Self {
            Self {
                tag,
                field_type: 4,
                count: values.len() as u32,
                data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            }
        }
    }

    /// Build a file whose directories are chained in order. Field data that
    /// does not fit inline is appended after each directory.
    pub fn build(directories: Vec<Vec<TestField>>) -> Vec<u8> {
        let mut out = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
        let count = directories.len();
        for (i, mut fields) in directories.into_iter().enumerate() {
            fields.sort_by_key(|f| f.tag);
            let start = out.len();
            let table_len = 2 + fields.len() * 12 + 4;
            let mut data_area: Vec<u8> = Vec::new();
            let data_start = start + table_len;
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

    /// Build a chain where some directories own one strip of image data.
    /// Strip data is appended after all directories.
    pub fn build_with_images(directories: Vec<(Vec<TestField>, Option<Vec<u8>>)>) -> Vec<u8> {
        use super::{tags, Container};
        use std::io::Cursor;

        let mut strips = Vec::new();
        let mut plain = Vec::new();
        for (mut fields, image) in directories {
            if let Some(data) = &image {
                fields.push(TestField::long(tags::STRIP_OFFSETS, &[0]));
                fields.push(TestField::long(tags::STRIP_BYTE_COUNTS, &[data.len() as u32]));
            }
            strips.push(image);
            plain.push(fields);
        }
        let mut out = build(plain);
        let dirs = Container::open(Cursor::new(out.clone()))
            .and_then(|mut c| c.read_directories())
            .unwrap();
        for (dir, image) in dirs.iter().zip(strips) {
            let Some(data) = image else { continue };
            let at = out.len() as u32;
            let slot = dir.field(tags::STRIP_OFFSETS).unwrap().value_offset as usize;
            out[slot..slot + 4].copy_from_slice(&at.to_le_bytes());
            out.extend_from_slice(&data);
        }
        out
    }

    /// Append an EXIF sub-directory holding `exif` to a one-directory file
    pub fn build_with_exif(mut main: Vec<TestField>, exif: Vec<TestField>) -> Vec<u8> {
        use super::tags;

        main.push(TestField::long(tags::EXIF_IFD, &[0]));
        main.sort_by_key(|f| f.tag);
        let position = main.iter().position(|f| f.tag == tags::EXIF_IFD).unwrap();
        let mut out = build(vec![main]);

        // lay the sub-directory out as a standalone table at the end
        let sub_at = out.len();
        let sub = build(vec![exif]);
        let shift = sub_at as u32 - 8;
        let count = u16::from_le_bytes([sub[8], sub[9]]) as usize;
        let mut table = sub[8..].to_vec();
        for i in 0..count {
            let entry = 2 + 12 * i;
            let field_type = u16::from_le_bytes([table[entry + 2], table[entry + 3]]);
            let n = u32::from_le_bytes(table[entry + 4..entry + 8].try_into().unwrap());
            let size = crate::container::ifd::type_size(field_type) as u32 * n;
            if size > 4 {
                let old = u32::from_le_bytes(table[entry + 8..entry + 12].try_into().unwrap());
                table[entry + 8..entry + 12].copy_from_slice(&(old + shift).to_le_bytes());
            }
        }
        out.extend_from_slice(&table);

        let slot = 8 + 2 + 12 * position + 8;
        out[slot..slot + 4].copy_from_slice(&(sub_at as u32).to_le_bytes());
        out
    }
}
