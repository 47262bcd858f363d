//! Vendor directory: display names and icons keyed by vendor slug.
//!
//! One directory is built at startup and shared by everything that renders
//! vendors. Unknown slugs still get a readable name derived from the slug.

use std::collections::HashMap;
use std::path::Path;

use buylist_core::VendorSlug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors loading a vendor directory file.
#[derive(Debug, Error)]
pub enum VendorDirectoryError {
    #[error("Failed to read vendor directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid vendor directory: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Display data for one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorInfo {
    pub slug: VendorSlug,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

const BUILTIN: &[(&str, &str, &str)] = &[
    ("abu-games", "ABU Games", "icons/vendors/abu-games.svg"),
    ("card-kingdom", "Card Kingdom", "icons/vendors/card-kingdom.svg"),
    ("channel-fireball", "ChannelFireball", "icons/vendors/channel-fireball.svg"),
    ("coolstuffinc", "CoolStuffInc", "icons/vendors/coolstuffinc.svg"),
    ("star-city-games", "Star City Games", "icons/vendors/star-city-games.svg"),
    ("troll-and-toad", "Troll and Toad", "icons/vendors/troll-and-toad.svg"),
];

/// Slug to display data lookup.
#[derive(Debug, Clone, Default)]
pub struct VendorDirectory {
    vendors: HashMap<VendorSlug, VendorInfo>,
}

impl VendorDirectory {
    /// The directory shipped with the client.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.iter().map(|(slug, name, icon)| VendorInfo {
            slug: VendorSlug::new(*slug),
            name: (*name).to_string(),
            icon: Some((*icon).to_string()),
        }))
    }

    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = VendorInfo>) -> Self {
        Self {
            vendors: entries
                .into_iter()
                .map(|info| (info.slug.clone(), info))
                .collect(),
        }
    }

    /// Parse a JSON array of `{slug, name, icon}` objects.
    ///
    /// # Errors
    ///
    /// Returns `VendorDirectoryError::Parse` on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, VendorDirectoryError> {
        let entries: Vec<VendorInfo> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// Load a directory file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, VendorDirectoryError> {
        let json = std::fs::read_to_string(path).map_err(|source| VendorDirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let directory = Self::from_json(&json)?;
        debug!(vendors = directory.len(), "Loaded vendor directory");
        Ok(directory)
    }

    /// The directory file at `path`, or the built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is set but cannot be loaded.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, VendorDirectoryError> {
        path.map_or_else(|| Ok(Self::builtin()), Self::load)
    }

    #[must_use]
    pub fn get(&self, slug: &VendorSlug) -> Option<&VendorInfo> {
        self.vendors.get(slug)
    }

    /// Display name of `slug`, derived from the slug when unknown.
    #[must_use]
    pub fn name(&self, slug: &VendorSlug) -> String {
        self.get(slug)
            .map_or_else(|| fallback_name(slug.as_str()), |info| info.name.clone())
    }

    #[must_use]
    pub fn icon(&self, slug: &VendorSlug) -> Option<&str> {
        self.get(slug).and_then(|info| info.icon.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

/// `"some-vendor_name"` -> `"Some Vendor Name"`
fn fallback_name(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
