//! Discovery of slide files

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{FormatKind, Result, ScrubError};
use crate::formats::FormatRegistry;

/// Supported files at `root`, sorted by path
///
/// `root` may be a single file. Hidden entries and symbolic links are
/// skipped. An empty `formats` filter accepts every format.
pub fn discover_files(
    root: &Path,
    recursive: bool,
    formats: &[FormatKind],
    registry: &FormatRegistry,
) -> Result<Vec<PathBuf>> {
    let accept = |path: &Path| {
        registry
            .detect_format(path)
            .is_some_and(|kind| formats.is_empty() || formats.contains(&kind))
    };

    if root.is_file() {
        return Ok(if accept(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }
    if !root.is_dir() {
        return Err(ScrubError::Io(format!("{} does not exist", root.display())));
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if file_type.is_file() && accept(&path) {
                found.push(path);
            }
        }
    }
    found.sort();

    tracing::info!(
        root = %root.display(),
        recursive,
        files = found.len(),
        "Discovered slide files"
    );
    Ok(found)
}
