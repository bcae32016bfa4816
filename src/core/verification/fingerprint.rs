//! Diagnostic region fingerprints

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::FormatKind;

/// SHA-256 per diagnostic region, keyed by a stable region name
///
/// Region names come from the format handler (`ifd0`, `pixel_data`,
/// `data@Data0001.dat`, ...) and do not depend on the file's location, so a
/// source and its copy can be compared directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub path: PathBuf,
    pub format: FormatKind,
    pub regions: BTreeMap<String, String>,
}

impl Fingerprint {
    pub fn new(path: impl Into<PathBuf>, format: FormatKind, regions: BTreeMap<String, String>) -> Self {
        Self {
            path: path.into(),
            format,
            regions,
        }
    }

    /// Region names whose digest differs, or that exist on one side only
    pub fn mismatches(&self, other: &Fingerprint) -> Vec<String> {
        let mut changed: Vec<String> = self
            .regions
            .iter()
            .filter(|(name, digest)| other.regions.get(*name) != Some(*digest))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            other
                .regions
                .keys()
                .filter(|name| !self.regions.contains_key(*name))
                .cloned(),
        );
        changed
    }

    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.mismatches(other).is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(regions: &[(&str, &str)]) -> Fingerprint {
        Fingerprint::new(
            "a.svs",
            FormatKind::Svs,
            regions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_identical_fingerprints_match() {
        let a = fingerprint(&[("ifd0", "aa"), ("ifd1", "bb")]);
        let b = fingerprint(&[("ifd0", "aa"), ("ifd1", "bb")]);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_mismatches_name_changed_and_missing_regions() {
        let a = fingerprint(&[("ifd0", "aa"), ("ifd1", "bb")]);
        let b = fingerprint(&[("ifd0", "aa"), ("ifd1", "cc"), ("ifd2", "dd")]);
        assert_eq!(a.mismatches(&b), vec!["ifd1", "ifd2"]);

        let c = fingerprint(&[("ifd0", "aa")]);
        assert_eq!(a.mismatches(&c), vec!["ifd1"]);
    }
}
