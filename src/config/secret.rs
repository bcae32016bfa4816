//! Secret handling for the UID remap key
//!
//! The salt keys the DICOM UID remap. Anyone holding it can test guesses
//! against remapped identifiers, so it lives in a `secrecy` container that
//! zeroes memory on drop and prints as `[REDACTED]`.
//!
//! # Example
//!
//! ```rust
//! use slidescrub::config::{SecretString, SecretValue};
//! use secrecy::{ExposeSecret, Secret};
//!
//! let salt: SecretString = Secret::new(SecretValue::from("5f2c9a".to_string()));
//! assert_eq!(salt.expose_secret().as_ref(), "5f2c9a");
//! assert!(!format!("{salt:?}").contains("5f2c9a"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Check if the secret value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// A string that is zeroed on drop, redacted in Debug output and only
/// readable through `expose_secret()`
pub type SecretString = Secret<SecretValue>;

/// Wrap a String as a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("salt-value".to_string());
        assert_eq!(secret.expose_secret().as_ref(), "salt-value");
        assert_eq!(secret.expose_secret().len(), 10);
        assert!(!secret.expose_secret().is_empty());
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sensitive-salt".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive-salt"));
        assert!(debug_output.contains("REDACTED"));
    }

    #[test]
    fn test_secret_serde() {
        #[derive(Serialize, Deserialize)]
        struct Section {
            uid_salt: SecretString,
        }

        let section = Section {
            uid_salt: secret_string("abc123".to_string()),
        };
        let text = toml::to_string(&section).unwrap();
        assert!(text.contains("abc123"));

        let parsed: Section = toml::from_str(&text).unwrap();
        assert_eq!(parsed.uid_salt.expose_secret().as_ref(), "abc123");
    }
}
