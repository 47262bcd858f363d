//! Newtype identifiers for type-safe entity references.
//!
//! Use the `define_id!` macro to create ID wrappers that prevent
//! accidentally mixing IDs from different entity types.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i32` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_i32()`
/// - `From<i32>`, `Into<i32>` and `FromStr` implementations
///
/// # Example
///
/// ```rust
/// # use buylist_core::define_id;
/// define_id!(CartId);
/// define_id!(ListingId);
///
/// let cart_id = CartId::new(1);
/// let listing_id = ListingId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: CartId = listing_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create a new ID from an i32 value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the underlying i32 value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i32>().map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(CartId);

/// Vendor slug, the stable key a vendor is known by across every backend.
///
/// Slugs are compared case-sensitively; the backend is the authority on
/// their spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorSlug(String);

impl VendorSlug {
    /// Create a new vendor slug.
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VendorSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VendorSlug {
    fn from(slug: &str) -> Self {
        Self(slug.to_owned())
    }
}

impl From<String> for VendorSlug {
    fn from(slug: String) -> Self {
        Self(slug)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_id_parse_and_display() {
        let id: CartId = " 42 ".parse().unwrap();
        assert_eq!(id, CartId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("forty-two".parse::<CartId>().is_err());
    }

    #[test]
    fn test_cart_id_serde_transparent() {
        let json = serde_json::to_string(&CartId::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_vendor_slug_serde_transparent() {
        let slug: VendorSlug = serde_json::from_str("\"card-kingdom\"").unwrap();
        assert_eq!(slug.as_str(), "card-kingdom");
        assert_eq!(serde_json::to_string(&slug).unwrap(), "\"card-kingdom\"");
    }
}
