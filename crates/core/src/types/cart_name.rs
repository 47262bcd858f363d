//! Cart name type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CartName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartNameError {
    /// The input is empty after trimming.
    #[error("cart name cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("cart name must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// A user-chosen cart label.
///
/// ## Constraints
///
/// - Leading and trailing whitespace is trimmed
/// - Length: 1-40 characters (counted in `char`s, not bytes)
///
/// ## Examples
///
/// ```
/// use buylist_core::CartName;
///
/// assert!(CartName::parse("Trade binder").is_ok());
/// assert!(CartName::parse("   ").is_err());
/// assert!(CartName::parse(&"x".repeat(41)).is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CartName(String);

impl CartName {
    /// Maximum length of a cart name.
    pub const MAX_LENGTH: usize = 40;

    /// Parse a `CartName` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty or longer than
    /// 40 characters.
    pub fn parse(s: &str) -> Result<Self, CartNameError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CartNameError::Empty);
        }

        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(CartNameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `CartName` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CartName {
    type Err = CartNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CartName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let name = CartName::parse("  Commander staples ").unwrap();
        assert_eq!(name.as_str(), "Commander staples");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(CartName::parse(""), Err(CartNameError::Empty));
        assert_eq!(CartName::parse(" \t "), Err(CartNameError::Empty));
    }

    #[test]
    fn test_parse_length_limit() {
        assert!(CartName::parse(&"a".repeat(40)).is_ok());
        assert_eq!(
            CartName::parse(&"a".repeat(41)),
            Err(CartNameError::TooLong { max: 40 })
        );
    }

    #[test]
    fn test_length_counts_chars() {
        // 40 two-byte characters is still within the limit
        assert!(CartName::parse(&"é".repeat(40)).is_ok());
    }
}
