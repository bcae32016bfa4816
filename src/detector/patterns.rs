//! Pattern library for PHI detection

use crate::domain::{PhiCategory, Result, ScrubError};
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Character class used by match guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Upper,
    Digit,
    Alpha,
    Alnum,
}

impl CharClass {
    pub fn contains(&self, b: u8) -> bool {
        match self {
            CharClass::Upper => b.is_ascii_uppercase(),
            CharClass::Digit => b.is_ascii_digit(),
            CharClass::Alpha => b.is_ascii_alphabetic(),
            CharClass::Alnum => b.is_ascii_alphanumeric(),
        }
    }
}

/// Pattern definition from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDefinition {
    /// Report label, e.g. `Accession_AS`
    pub label: String,
    /// PHI category name
    pub category: String,
    /// Regex patterns sharing the label
    pub patterns: Vec<String>,
    /// Reject a match whose preceding byte is in this class
    #[serde(default)]
    pub not_preceded_by: Option<CharClass>,
    /// Reject a match whose following byte is in this class
    #[serde(default)]
    pub not_followed_by: Option<CharClass>,
    /// Date rule: anonymized sentinels are never reported
    #[serde(default)]
    pub date: bool,
    /// Apply to the raw-byte safety sweep
    #[serde(default = "default_sweep")]
    pub sweep: bool,
}

fn default_sweep() -> bool {
    true
}

/// Compiled rule with metadata
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub label: String,
    pub category: PhiCategory,
    pub text: Regex,
    pub bytes: BytesRegex,
    pub not_preceded_by: Option<CharClass>,
    pub not_followed_by: Option<CharClass>,
    pub date: bool,
    pub sweep: bool,
}

impl CompiledPattern {
    /// Check the guards around `haystack[start..end]`
    pub fn guards_pass(&self, haystack: &[u8], start: usize, end: usize) -> bool {
        if let Some(class) = self.not_preceded_by {
            if start > 0 && class.contains(haystack[start - 1]) {
                return false;
            }
        }
        if let Some(class) = self.not_followed_by {
            if end < haystack.len() && class.contains(haystack[end]) {
                return false;
            }
        }
        true
    }
}

/// Pattern library container
#[derive(Debug, Deserialize)]
struct PatternLibrary {
    patterns: BTreeMap<String, PatternDefinition>,
}

/// Pattern registry for PHI detection
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<CompiledPattern>,
}

impl PatternRegistry {
    /// Create a new pattern registry from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScrubError::Pattern(format!(
                "Failed to read pattern library {}: {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Create a pattern registry from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let library: PatternLibrary = toml::from_str(content)
            .map_err(|e| ScrubError::Pattern(format!("Failed to parse pattern library: {e}")))?;

        let mut patterns = Vec::new();
        for (name, def) in library.patterns {
            let category = PhiCategory::parse(&def.category).ok_or_else(|| {
                ScrubError::Pattern(format!(
                    "Invalid category in pattern '{name}': {}",
                    def.category
                ))
            })?;
            if def.patterns.is_empty() {
                return Err(ScrubError::Pattern(format!(
                    "Pattern '{name}' has no regex"
                )));
            }

            for pattern_str in &def.patterns {
                let invalid = |e: regex::Error| {
                    ScrubError::Pattern(format!("Invalid regex in pattern '{name}': {e}"))
                };
                patterns.push(CompiledPattern {
                    label: def.label.clone(),
                    category,
                    text: Regex::new(pattern_str).map_err(invalid)?,
                    bytes: BytesRegex::new(pattern_str).map_err(invalid)?,
                    not_preceded_by: def.not_preceded_by,
                    not_followed_by: def.not_followed_by,
                    date: def.date,
                    sweep: def.sweep,
                });
            }
        }

        Ok(Self { patterns })
    }

    /// Create a default pattern registry with built-in patterns
    pub fn default_patterns() -> Result<Self> {
        let default_toml = include_str!("../../patterns/phi_patterns.toml");
        Self::from_toml(default_toml)
    }

    /// Built-in patterns extended with a user library
    pub fn with_user_library<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut registry = Self::default_patterns()?;
        registry.merge(Self::from_file(path)?);
        Ok(registry)
    }

    /// Append another registry's rules after this one's
    pub fn merge(&mut self, other: PatternRegistry) {
        self.patterns.extend(other.patterns);
    }

    /// Get all patterns
    pub fn all_patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Patterns for a specific category
    pub fn patterns_for_category(&self, category: PhiCategory) -> Vec<&CompiledPattern> {
        self.patterns
            .iter()
            .filter(|p| p.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_patterns() {
        let registry = PatternRegistry::default_patterns().unwrap();
        assert!(!registry.is_empty());
        assert!(!registry
            .patterns_for_category(PhiCategory::CaseNumber)
            .is_empty());
        assert!(registry
            .all_patterns()
            .iter()
            .filter(|p| p.date)
            .all(|p| !p.sweep));
    }

    #[test]
    fn test_custom_pattern_toml() {
        let toml = r#"
            [patterns.local_case]
            label = "Local_Case"
            category = "CASE_NUMBER"
            patterns = ['QX\d{6}']
        "#;
        let registry = PatternRegistry::from_toml(toml).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.all_patterns()[0].sweep);
    }

    #[test]
    fn test_invalid_category() {
        let toml = r#"
            [patterns.bad]
            label = "Bad"
            category = "NOT_A_CATEGORY"
            patterns = ['x']
        "#;
        assert!(matches!(
            PatternRegistry::from_toml(toml),
            Err(ScrubError::Pattern(_))
        ));
    }

    #[test]
    fn test_invalid_regex() {
        let toml = r#"
            [patterns.bad]
            label = "Bad"
            category = "CASE_NUMBER"
            patterns = ['(unclosed']
        "#;
        assert!(PatternRegistry::from_toml(toml).is_err());
    }

    #[test]
    fn test_guards() {
        let toml = r#"
            [patterns.s]
            label = "S"
            category = "CASE_NUMBER"
            patterns = ['S-\d\d']
            not_preceded_by = "upper"
        "#;
        let registry = PatternRegistry::from_toml(toml).unwrap();
        let rule = &registry.all_patterns()[0];
        assert!(!rule.guards_pass(b"AS-24", 1, 5));
        assert!(rule.guards_pass(b" S-24", 1, 5));
        assert!(rule.guards_pass(b"S-24", 0, 4));
    }
}
