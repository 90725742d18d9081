//! Index format versions.
//!
//! | Version | Adds |
//! |---------|------|
//! | 1 | initial blob format |
//! | 2 | crc32c blob trailers, ann iterators, disk-resident backend |
//! | 3 | `range_filter` config key |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialized-format / feature generation an index was built or loaded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(i32);

impl Version {
    const MINIMAL: i32 = 1;
    const DEFAULT: i32 = 2;
    const CURRENT: i32 = 3;

    pub const fn new(number: i32) -> Self {
        Self(number)
    }

    /// Oldest version still understood by this build.
    pub const fn minimal() -> Self {
        Self(Self::MINIMAL)
    }

    /// Version used when callers do not ask for one.
    pub const fn default_version() -> Self {
        Self(Self::DEFAULT)
    }

    /// Newest version this build can write.
    pub const fn current() -> Self {
        Self(Self::CURRENT)
    }

    pub const fn number(&self) -> i32 {
        self.0
    }

    /// Whether this build knows the version at all.
    pub fn is_valid(&self) -> bool {
        (Self::MINIMAL..=Self::CURRENT).contains(&self.0)
    }

    /// Blobs written at this version carry a checksum trailer.
    pub fn has_checksums(&self) -> bool {
        self.0 >= 2
    }

    /// Indexes at this version may hand out [`crate::AnnIterator`]s.
    pub fn supports_iterators(&self) -> bool {
        self.0 >= 2
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::default_version()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Inclusive range of versions an index type can be constructed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
}

impl VersionRange {
    pub const fn new(min: Version, max: Version) -> Self {
        Self { min, max }
    }

    /// From `min` through the newest known version.
    pub const fn since(min: Version) -> Self {
        Self::new(min, Version::current())
    }

    pub fn contains(&self, version: Version) -> bool {
        self.min <= version && version <= self.max
    }
}
