//! Version identity and release metadata
//!
//! Version ids are derived from the version string alone, so the same image
//! discovered twice always maps to the same id. Release and manifest files use
//! a line-oriented `KEY=VALUE` format.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::error::{UpdaterError, UpdaterResult};

/// Primary version key in a release file.
pub const VERSION_ID_KEY: &str = "VERSION_ID";

/// Fallback version key in a release file.
pub const VERSION_FALLBACK_KEY: &str = "version";

/// Manifest key carrying the extended version string.
pub const EXTENDED_VERSION_KEY: &str = "extended_version";

/// Number of digest bytes kept in a version id.
const ID_DIGEST_BYTES: usize = 4;

/// Fully-qualified prefix of a purpose value on the bus.
const PURPOSE_PREFIX: &str = "xyz.openbmc_project.Software.Version.VersionPurpose.";

/// Derive the version id for a version string.
///
/// The id is the first four bytes of the SHA-512 digest rendered as eight
/// lowercase hex characters. Returns `None` for an empty version.
pub fn version_id(version: &str) -> Option<String> {
    if version.is_empty() {
        error!("Cannot derive a version id from an empty version");
        return None;
    }

    let digest = Sha512::digest(version.as_bytes());
    digest.get(..ID_DIGEST_BYTES).map(hex::encode)
}

/// Extract the value part of a release line, honouring optional double quotes.
///
/// The value runs from just after the first quote to just before the last
/// one; an unquoted value is returned whole.
fn unquote(value: &str) -> &str {
    let start = value.find('"').map_or(0, |pos| pos + 1);
    match value.rfind('"') {
        Some(end) if end >= start => value.get(start..end).unwrap_or_default(),
        _ => value.get(start..).unwrap_or_default(),
    }
}

/// Read the version string from a release-info file.
///
/// The first line starting with `VERSION_ID=` or `version=` wins.
///
/// # Errors
///
/// Returns [`UpdaterError::Io`] if the file cannot be read and
/// [`UpdaterError::EmptyVersion`] if no non-empty version was found.
pub fn cpld_version(release_file: &Path) -> UpdaterResult<String> {
    let content = std::fs::read_to_string(release_file)?;
    parse_cpld_version(&content)
        .map(str::to_string)
        .ok_or_else(|| UpdaterError::EmptyVersion(release_file.to_path_buf()))
}

/// Parse the version string out of release-info text.
pub fn parse_cpld_version(content: &str) -> Option<&str> {
    let primary = format!("{VERSION_ID_KEY}=");
    let fallback = format!("{VERSION_FALLBACK_KEY}=");

    content
        .lines()
        .find_map(|line| {
            line.strip_prefix(primary.as_str())
                .or_else(|| line.strip_prefix(fallback.as_str()))
        })
        .map(unquote)
        .filter(|version| !version.is_empty())
}

/// Read `keys` from a `KEY=VALUE` file.
///
/// Every requested key is present in the result; keys not found in the file,
/// or all keys if the file cannot be read, map to an empty string. A later
/// line for the same key overrides an earlier one.
///
/// # Errors
///
/// Returns [`UpdaterError::InvalidArgument`] if `file_path` is empty.
pub fn read_values(file_path: &Path, keys: &[&str]) -> UpdaterResult<BTreeMap<String, String>> {
    if file_path.as_os_str().is_empty() {
        error!("Cannot read values: file path is empty");
        return Err(UpdaterError::InvalidArgument {
            name: "FilePath",
            value: String::new(),
        });
    }

    let mut values: BTreeMap<String, String> = keys
        .iter()
        .map(|key| ((*key).to_string(), String::new()))
        .collect();

    let content = match std::fs::read_to_string(file_path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = ?file_path, error = %e, "Error reading key/value file");
            return Ok(values);
        }
    };

    for line in content.lines() {
        for (key, value) in values.iter_mut() {
            if let Some(rest) = line
                .strip_prefix(key.as_str())
                .and_then(|rest| rest.strip_prefix('='))
            {
                *value = rest.to_string();
                break;
            }
        }
    }

    Ok(values)
}

/// Purpose of a firmware image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VersionPurpose {
    /// Purpose could not be determined
    #[default]
    Unknown,
    /// Image for an unlisted component
    Other,
    /// Whole-system image
    System,
    /// Service processor image
    Bmc,
    /// Host firmware image
    Host,
    /// Power supply image
    Psu,
    /// Programmable logic image
    Cpld,
    /// Voltage regulator image
    Vr,
    /// SAS controller image
    Sas,
    /// BIOS image
    Bios,
}

impl VersionPurpose {
    /// Parse a purpose from its short name or its fully-qualified bus form.
    pub fn parse(value: &str) -> Self {
        let name = value.strip_prefix(PURPOSE_PREFIX).unwrap_or(value);
        match name {
            "Other" => Self::Other,
            "System" => Self::System,
            "BMC" => Self::Bmc,
            "Host" => Self::Host,
            "PSU" => Self::Psu,
            "CPLD" => Self::Cpld,
            "VR" => Self::Vr,
            "SAS" => Self::Sas,
            "BIOS" => Self::Bios,
            _ => Self::Unknown,
        }
    }

    /// Short name of the purpose.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Other => "Other",
            Self::System => "System",
            Self::Bmc => "BMC",
            Self::Host => "Host",
            Self::Psu => "PSU",
            Self::Cpld => "CPLD",
            Self::Vr => "VR",
            Self::Sas => "SAS",
            Self::Bios => "BIOS",
        }
    }
}

impl std::fmt::Display for VersionPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PURPOSE_PREFIX}{}", self.as_str())
    }
}

/// One discovered firmware image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Version id derived from `version`
    pub id: String,

    /// Version string read from the image's release info
    pub version: String,

    /// Image purpose
    pub purpose: VersionPurpose,

    /// Object path of the published version
    pub path: String,

    /// Location of the uploaded payload; empty for installed images
    pub file_path: PathBuf,

    /// Extended version from the payload manifest
    pub extended_version: String,

    /// Whether the delete action is currently published
    pub deletable: bool,
}
