use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A Linkbot firmware (or Linkbot Labs application) version.
///
/// Displays as `1.2.3`; firmware files on disk are named after
/// [`FirmwareVersion::file_stem`], which carries a leading `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a bare `major.minor.patch` triple with no prefix.
    ///
    /// # Errors
    /// Returns an error unless the input is exactly three dot-separated runs of
    /// ASCII digits that each fit in a `u32`.
    pub fn parse_triple(s: &str) -> Result<Self, VersionParseError> {
        let invalid = || VersionParseError::InvalidFormat {
            input: s.to_string(),
        };

        let mut parts = s.split('.');
        let major_str = parts.next().ok_or_else(invalid)?;
        let minor_str = parts.next().ok_or_else(invalid)?;
        let patch_str = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::new(
            parse_component(major_str, VersionComponent::Major)?,
            parse_component(minor_str, VersionComponent::Minor)?,
            parse_component(patch_str, VersionComponent::Patch)?,
        ))
    }

    /// File name stem used for the firmware pair of this version, e.g. `v4.5.1`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("v{self}")
    }

    #[must_use]
    pub fn hex_file_name(&self) -> String {
        format!("{}.hex", self.file_stem())
    }

    #[must_use]
    pub fn eeprom_file_name(&self) -> String {
        format!("{}.eeprom", self.file_stem())
    }
}

fn parse_component(value: &str, component: VersionComponent) -> Result<u32, VersionParseError> {
    // `u32::from_str` accepts a leading `+`, which is not a valid component.
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        });
    }
    value
        .parse()
        .map_err(|_| VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        })
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z format, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}

impl FromStr for FirmwareVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::parse_triple(s.strip_prefix(['v', 'V']).unwrap_or(s))
    }
}

/// A request for the host to fetch one firmware file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareDownload {
    pub url: String,
    pub md5sum: String,
}
