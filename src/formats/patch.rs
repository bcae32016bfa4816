//! Byte-level plan application shared by the TIFF family and MRXS

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{RedactOptions, RedactOutcome};
use crate::container::Container;
use crate::domain::{Redaction, Result, ScrubError, Target};

/// A file opened for in-place patching
struct PatchFile {
    file: File,
    len: u64,
    path: PathBuf,
}

impl PatchFile {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            path: path.to_path_buf(),
        })
    }

    fn check(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ScrubError::Redaction(format!(
                "{length} bytes at offset {offset} lie outside {} ({} bytes)",
                self.path.display(),
                self.len
            ))),
        }
    }

    fn overwrite(&mut self, offset: u64, bytes: &[u8]) -> Result<u64> {
        self.check(offset, bytes.len() as u64)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }

    fn zero(&mut self, offset: u64, length: u64) -> Result<u64> {
        const CHUNK: u64 = 64 * 1024;
        self.check(offset, length)?;
        let zeros = vec![0u8; CHUNK.min(length) as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < length {
            let take = CHUNK.min(length - done);
            self.file.write_all(&zeros[..take as usize])?;
            done += take;
        }
        Ok(length)
    }
}

/// Resolve a redaction target to a path on disk
fn resolve(primary: &Path, target: &Target) -> Result<PathBuf> {
    match target {
        Target::Primary => Ok(primary.to_path_buf()),
        Target::Companion(relative) => {
            let base = primary.parent().unwrap_or_else(|| Path::new("."));
            let path = base.join(relative);
            if path.is_file() {
                Ok(path)
            } else {
                Err(ScrubError::CompanionMissing(path.display().to_string()))
            }
        }
    }
}

/// Apply byte-level actions in plan order, stopping at the first failure
///
/// Files are opened on first use and synced once at the end. Element-tree
/// actions are rejected: their owning handler applies them.
pub fn apply_byte_actions(
    path: &Path,
    actions: &[Redaction],
    options: &RedactOptions,
) -> RedactOutcome {
    let mut outcome = RedactOutcome::default();
    let mut files: HashMap<Target, PatchFile> = HashMap::new();

    for action in actions {
        match apply_one(path, action, options, &mut files) {
            Ok(written) => {
                outcome.applied += 1;
                outcome.bytes_written += written;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Redaction stopped");
                outcome.error = Some(e);
                break;
            }
        }
    }

    for (_, mut patched) in files {
        let synced = patched.file.flush().and_then(|_| patched.file.sync_all());
        if let Err(e) = synced {
            if outcome.error.is_none() {
                outcome.error = Some(e.into());
            }
        }
    }
    outcome
}

fn apply_one(
    path: &Path,
    action: &Redaction,
    options: &RedactOptions,
    files: &mut HashMap<Target, PatchFile>,
) -> Result<u64> {
    let target = match action {
        Redaction::Overwrite { target, .. } | Redaction::ZeroFill { target, .. } => target.clone(),
        Redaction::BlankImage { .. } => Target::Primary,
        Redaction::Element { path: element, .. } => {
            return Err(ScrubError::Redaction(format!(
                "element action {element} cannot be applied as a byte patch"
            )))
        }
    };
    if !files.contains_key(&target) {
        let opened = PatchFile::open(&resolve(path, &target)?)?;
        files.insert(target.clone(), opened);
    }
    let Some(patched) = files.get_mut(&target) else {
        return Err(ScrubError::Other(format!("{target:?} was not opened")));
    };

    match action {
        Redaction::Overwrite { offset, bytes, .. } => patched.overwrite(*offset, bytes),
        Redaction::ZeroFill { offset, length, .. } => patched.zero(*offset, *length),
        Redaction::BlankImage {
            directory_offset,
            regions,
        } => {
            let mut container = Container::open(&mut patched.file)?;
            let written = container.blank_image_region(regions)?;
            if options.unlink_auxiliary {
                let unlinked = container.unlink_directory(*directory_offset)?;
                debug!(directory_offset, unlinked, "Auxiliary directory unlinked");
            }
            Ok(written)
        }
        Redaction::Element { .. } => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementOp, RedactionPolicy};

    fn overwrite(offset: u64, bytes: &[u8]) -> Redaction {
        Redaction::Overwrite {
            target: Target::Primary,
            offset,
            bytes: bytes.to_vec(),
            policy: RedactionPolicy::FixedFill,
        }
    }

    #[test]
    fn test_actions_apply_in_order_and_stop_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let actions = vec![
            overwrite(0, b"XX"),
            Redaction::ZeroFill {
                target: Target::Primary,
                offset: 4,
                length: 2,
            },
            overwrite(9, b"XXX"),
            overwrite(2, b"XX"),
        ];
        let outcome = apply_byte_actions(&path, &actions, &RedactOptions::default());
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.bytes_written, 4);
        assert!(matches!(outcome.error, Some(ScrubError::Redaction(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"XX23\0\06789");
    }

    #[test]
    fn test_companion_target_and_missing_companion() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("slide.mrxs");
        std::fs::write(&primary, b"").unwrap();
        std::fs::create_dir(dir.path().join("slide")).unwrap();
        std::fs::write(dir.path().join("slide/Data0000.dat"), [7u8; 16]).unwrap();

        let zero = Redaction::ZeroFill {
            target: Target::Companion(PathBuf::from("slide/Data0000.dat")),
            offset: 0,
            length: 8,
        };
        let outcome = apply_byte_actions(&primary, &[zero], &RedactOptions::default());
        assert!(outcome.is_complete());
        let data = std::fs::read(dir.path().join("slide/Data0000.dat")).unwrap();
        assert_eq!(&data[..8], &[0u8; 8]);
        assert_eq!(&data[8..], &[7u8; 8]);

        let missing = Redaction::ZeroFill {
            target: Target::Companion(PathBuf::from("slide/Data0001.dat")),
            offset: 0,
            length: 8,
        };
        let outcome = apply_byte_actions(&primary, &[missing], &RedactOptions::default());
        assert_eq!(outcome.applied, 0);
        assert!(matches!(outcome.error, Some(ScrubError::CompanionMissing(_))));
    }

    #[test]
    fn test_element_actions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();
        let action = Redaction::Element {
            path: "(0010,0010)".to_string(),
            op: ElementOp::Blank,
        };
        let outcome = apply_byte_actions(&path, &[action], &RedactOptions::default());
        assert!(!outcome.is_complete());
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }
}
