//! Footprint-preserving writes
//!
//! Every write lands inside bytes the file already has: values keep their
//! size, image regions keep their length and directory unlinking only
//! rewrites one pointer. The file never grows or shrinks.

use std::io::{Read, Seek, SeekFrom, Write};

use super::ifd::Field;
use super::regions::BLANK_JPEG;
use super::Container;
use crate::domain::{ByteRange, Result, ScrubError};

impl<R: Read + Write + Seek> Container<R> {
    /// Overwrite bytes that already exist in the file
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset.checked_add(bytes.len() as u64);
        if end.map_or(true, |end| end > self.file_len) {
            return Err(ScrubError::Redaction(format!(
                "write of {} bytes at offset {offset} runs past end of file ({})",
                bytes.len(),
                self.file_len
            )));
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Replace a field value with bytes of exactly the same footprint
    pub fn write_field_bytes(&mut self, field: &Field, bytes: &[u8]) -> Result<u64> {
        if bytes.len() as u64 != field.byte_len {
            return Err(ScrubError::Redaction(format!(
                "replacement for tag {} is {} bytes, field holds {}",
                field.tag,
                bytes.len(),
                field.byte_len
            )));
        }
        self.write_at(field.value_offset, bytes)?;
        Ok(field.byte_len)
    }

    /// Zero-fill a range
    pub fn zero_range(&mut self, range: ByteRange) -> Result<u64> {
        const CHUNK: u64 = 64 * 1024;
        let zeros = vec![0u8; CHUNK.min(range.length) as usize];
        let mut done = 0;
        while done < range.length {
            let take = CHUNK.min(range.length - done);
            self.write_at(range.offset + done, &zeros[..take as usize])?;
            done += take;
        }
        Ok(range.length)
    }

    /// Overwrite image data with the blank payload plus zero padding
    ///
    /// Ranges too short for the payload are zero-filled.
    pub fn blank_image_region(&mut self, regions: &[ByteRange]) -> Result<u64> {
        let payload = BLANK_JPEG.len() as u64;
        let mut total = 0;
        for range in regions {
            if range.length >= payload {
                self.write_at(range.offset, &BLANK_JPEG)?;
                self.zero_range(ByteRange::new(range.offset + payload, range.length - payload))?;
            } else {
                self.zero_range(*range)?;
            }
            total += range.length;
        }
        Ok(total)
    }

    /// Remove a directory from the chain by rewriting its predecessor's
    /// pointer (or the header's first-directory pointer)
    ///
    /// Returns `false` when the directory is not in the chain, which is the
    /// case after an earlier unlink.
    pub fn unlink_directory(&mut self, target: u64) -> Result<bool> {
        let chain = self.read_directories()?;
        let Some(victim) = chain.iter().find(|d| d.offset == target) else {
            return Ok(false);
        };
        let successor = self.header.offset_bytes(victim.next_offset)?;

        if self.header.first_directory == target {
            let at = self.header.first_pointer_offset();
            self.write_at(at, &successor)?;
            self.header.first_directory = victim.next_offset;
            return Ok(true);
        }

        match chain.iter().find(|d| d.next_offset == target) {
            Some(predecessor) => {
                self.write_at(predecessor.next_pointer_offset, &successor)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
