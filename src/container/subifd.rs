//! EXIF and GPS sub-directories

use std::collections::HashSet;
use std::io::{Read, Seek};

use super::ifd::{Directory, SubDirectory};
use super::Container;
use crate::domain::{ParseError, Result};

impl<R: Read + Seek> Container<R> {
    /// Follow a sub-directory pointer field, if the directory has one
    ///
    /// A pointer that cannot be followed is an error rather than a skipped
    /// sub-directory: fields we cannot see are fields we cannot clean.
    /// `visited` holds every table offset read so far, main chain included.
    pub(crate) fn read_sub_directory(
        &mut self,
        directory: &Directory,
        pointer_tag: u16,
        visited: &mut HashSet<u64>,
    ) -> Result<Option<SubDirectory>> {
        let Some(field) = directory.field(pointer_tag) else {
            return Ok(None);
        };
        let offset = self
            .read_field_value(field)?
            .first_unsigned()
            .ok_or_else(|| ParseError::MalformedField {
                tag: pointer_tag,
                reason: "sub-directory pointer is not an integer".to_string(),
            })?;
        if offset == 0 {
            return Ok(None);
        }
        if !visited.insert(offset) {
            return Err(ParseError::Cycle(offset).into());
        }

        let (fields, _) = self.read_entries(offset)?;
        Ok(Some(SubDirectory { offset, fields }))
    }
}

#[cfg(test)]
mod tests {
    use crate::container::testutil::{build, TestField};
    use crate::container::{tags, Container};
    use crate::domain::{ParseError, ScrubError};
    use std::io::Cursor;

    /// One directory with an EXIF pointer to a sub-directory holding
    /// DateTimeOriginal
    fn with_exif() -> Vec<u8> {
        let mut bytes = build(vec![vec![TestField::long(tags::EXIF_IFD, &[0])]]);
        let sub_at = bytes.len() as u32;
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&36867u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        let data_at = sub_at + 2 + 12 + 4;
        bytes.extend_from_slice(&data_at.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"2024:03:15 10:22:01\0");
        // patch the pointer slot of the only entry
        bytes[18..22].copy_from_slice(&sub_at.to_le_bytes());
        bytes
    }

    #[test]
    fn test_exif_fields_are_visible() {
        let mut container = Container::open(Cursor::new(with_exif())).unwrap();
        let dirs = container.read_directories().unwrap();
        let exif = dirs[0].exif.as_ref().unwrap();
        assert_eq!(exif.fields.len(), 1);
        let field = exif.fields[0].clone();
        let value = container.read_field_value(&field).unwrap();
        assert_eq!(value.as_text().as_deref(), Some("2024:03:15 10:22:01"));
        assert!(dirs[0].gps.is_none());
    }

    #[test]
    fn test_exif_pointer_into_main_chain_is_a_cycle() {
        let bytes = build(vec![
            vec![TestField::long(256, &[512])],
            vec![TestField::long(tags::EXIF_IFD, &[8])],
        ]);
        let mut container = Container::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            container.read_directories(),
            Err(ScrubError::Parse(ParseError::Cycle(8)))
        ));
    }

    #[test]
    fn test_exif_pointer_to_itself_is_a_cycle() {
        let mut bytes = with_exif();
        bytes[18..22].copy_from_slice(&8u32.to_le_bytes());
        let mut container = Container::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            container.read_directories(),
            Err(ScrubError::Parse(ParseError::Cycle(8)))
        ));
    }

    #[test]
    fn test_bad_exif_pointer_fails_closed() {
        let mut bytes = with_exif();
        bytes[18..22].copy_from_slice(&9_999u32.to_le_bytes());
        let mut container = Container::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            container.read_directories(),
            Err(ScrubError::Parse(ParseError::Truncated { .. }))
        ));
    }
}
