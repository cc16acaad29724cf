//! Validated text primitives shared by the lab workflow crates.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded the maximum permitted length
    #[error("Text exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    /// The input contained characters outside the permitted set
    #[error("Text contains invalid characters (only alphanumeric, '.', '-', '_', '/', ':' allowed)")]
    InvalidCharacters,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a record owned by an external system.
///
/// Lab test orders, institutions and health professionals live outside the workflow core
/// and are referenced only by identifier. An `ExternalRef` is trimmed, non-empty, at most
/// [`ExternalRef::MAX_LEN`] characters, and restricted to ASCII alphanumerics plus
/// `.`, `-`, `_`, `/` and `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalRef(String);

impl ExternalRef {
    /// Maximum accepted length of a reference.
    pub const MAX_LEN: usize = 128;

    /// Validates and wraps an external identifier.
    ///
    /// # Errors
    ///
    /// - [`TextError::Empty`] for empty or whitespace-only input,
    /// - [`TextError::TooLong`] above [`ExternalRef::MAX_LEN`],
    /// - [`TextError::InvalidCharacters`] for anything outside the permitted set.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }
        let ok = trimmed.bytes().all(|b| {
            matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_' | b'/' | b':')
        });
        if !ok {
            return Err(TextError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExternalRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ExternalRef {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExternalRef::new(s)
    }
}

impl serde::Serialize for ExternalRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ExternalRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ExternalRef::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Qiagen DNeasy  ").unwrap();
        assert_eq!(text.as_str(), "Qiagen DNeasy");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   \n\t"), Err(TextError::Empty));
    }

    #[test]
    fn external_ref_accepts_typical_identifiers() {
        for ok in ["ORD-2024/0001", "hp:42", "institution.lab_1"] {
            assert!(ExternalRef::new(ok).is_ok(), "{ok} should be accepted");
        }
    }

    #[test]
    fn external_ref_rejects_bad_input() {
        assert_eq!(ExternalRef::new(""), Err(TextError::Empty));
        assert_eq!(
            ExternalRef::new("order 12"),
            Err(TextError::InvalidCharacters)
        );
        assert_eq!(
            ExternalRef::new("a".repeat(ExternalRef::MAX_LEN + 1)),
            Err(TextError::TooLong {
                max: ExternalRef::MAX_LEN
            })
        );
    }

    #[test]
    fn external_ref_deserialize_validates() {
        let ok: ExternalRef = serde_json::from_str("\"ORD-7\"").unwrap();
        assert_eq!(ok.as_str(), "ORD-7");

        let bad: Result<ExternalRef, _> = serde_json::from_str("\"ORD 7\"");
        assert!(bad.is_err());
    }
}
