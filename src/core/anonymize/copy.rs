//! Copy primitive for copy-then-mutate runs
//!
//! The slide file is copied first, then its companion directory (MRXS data
//! directory) next to the destination under the destination's stem. The
//! source is only ever read.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::{Result, ScrubError};

/// Files produced by [`copy_slide`]
#[derive(Debug, Clone)]
pub struct CopiedSlide {
    /// Copied slide file
    pub file: PathBuf,

    /// Copied companion directory
    pub companion: Option<PathBuf>,

    /// Bytes copied in total
    pub bytes: u64,
}

impl CopiedSlide {
    /// Remove everything that was copied
    ///
    /// Failures are logged, not returned: this runs on error paths.
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.file) {
            tracing::warn!(path = %self.file.display(), error = %e, "Failed to remove partial output");
        }
        if let Some(dir) = &self.companion {
            if let Err(e) = fs::remove_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove copied companion directory");
            }
        }
    }
}

/// Where the companion directory of `dest` lives: `<parent>/<stem>`
pub fn companion_destination(dest: &Path) -> Option<PathBuf> {
    let stem = dest.file_stem()?;
    Some(dest.parent().unwrap_or_else(|| Path::new(".")).join(stem))
}

/// Copy a slide and, when given, its companion directory
///
/// Refuses to overwrite anything: the destination file and companion
/// directory must not exist yet. On a companion copy failure the copied
/// file is removed again.
pub fn copy_slide(source: &Path, dest: &Path, companion: Option<&Path>) -> Result<CopiedSlide> {
    if same_file(source, dest) {
        return Err(ScrubError::Io(format!(
            "destination {} is the source file",
            dest.display()
        )));
    }
    if dest.exists() {
        return Err(ScrubError::Io(format!(
            "destination {} already exists",
            dest.display()
        )));
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut bytes = fs::copy(source, dest)?;
    let mut copied = CopiedSlide {
        file: dest.to_path_buf(),
        companion: None,
        bytes,
    };

    let Some(companion) = companion else {
        tracing::debug!(source = %source.display(), dest = %dest.display(), bytes, "Copied slide");
        return Ok(copied);
    };

    let target = match companion_destination(dest) {
        Some(target) if !target.exists() => target,
        Some(target) => {
            copied.remove();
            return Err(ScrubError::Io(format!(
                "companion destination {} already exists",
                target.display()
            )));
        }
        None => {
            copied.remove();
            return Err(ScrubError::CompanionMissing(dest.display().to_string()));
        }
    };

    match copy_dir(companion, &target) {
        Ok(n) => bytes += n,
        Err(e) => {
            copied.companion = Some(target);
            copied.remove();
            return Err(e.into());
        }
    }
    copied.companion = Some(target);
    copied.bytes = bytes;

    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        bytes,
        "Copied slide with companion directory"
    );
    Ok(copied)
}

/// Recursive directory copy; symbolic links are skipped
fn copy_dir(from: &Path, to: &Path) -> io::Result<u64> {
    fs::create_dir_all(to)?;
    let mut total = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());
        if file_type.is_dir() {
            total += copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            total += fs::copy(entry.path(), &target)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(total)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.svs");
        fs::write(&source, b"slide bytes").unwrap();
        let dest = dir.path().join("out/nested/a.svs");

        let copied = copy_slide(&source, &dest, None).unwrap();
        assert_eq!(copied.bytes, 11);
        assert!(copied.companion.is_none());
        assert_eq!(fs::read(&dest).unwrap(), b"slide bytes");
    }

    #[test]
    fn test_copy_with_companion_uses_destination_stem() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("case.mrxs");
        fs::write(&source, b"").unwrap();
        let data = dir.path().join("case");
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("Slidedat.ini"), b"[GENERAL]").unwrap();
        fs::write(data.join("sub/extra.bin"), b"12").unwrap();

        let dest = dir.path().join("out/renamed.mrxs");
        let copied = copy_slide(&source, &dest, Some(&data)).unwrap();
        let companion = copied.companion.clone().unwrap();
        assert_eq!(companion, dir.path().join("out/renamed"));
        assert!(companion.join("Slidedat.ini").is_file());
        assert!(companion.join("sub/extra.bin").is_file());
        assert_eq!(copied.bytes, 11);

        copied.remove();
        assert!(!dest.exists());
        assert!(!companion.exists());
        assert!(data.join("Slidedat.ini").is_file());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.tif");
        fs::write(&source, b"x").unwrap();
        assert!(copy_slide(&source, &source, None).is_err());

        let dest = dir.path().join("b.tif");
        fs::write(&dest, b"existing").unwrap();
        assert!(copy_slide(&source, &dest, None).is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"existing");
    }
}
