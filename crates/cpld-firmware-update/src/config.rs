//! Configuration for the CPLD version manager.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UpdaterError, UpdaterResult};

/// Placeholder substituted with the version id in [`UpdaterConfig::flash_unit_template`].
pub const UNIT_ID_PLACEHOLDER: &str = "{}";

/// Platform layout and policy for the version manager.
///
/// Every field has a default matching the stock BMC image layout, so a
/// configuration file only needs to name what differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Root directory scanned for installed images at startup.
    pub media_dir: PathBuf,

    /// Directory-name prefix of an installed image (`<media_dir>/<prefix><id>`).
    pub image_prefix: String,

    /// Release-info file inside each image directory.
    pub release_file_name: String,

    /// Release-info file describing the image currently running.
    pub system_release_file: PathBuf,

    /// Manifest file inside a newly uploaded image payload.
    pub manifest_file_name: String,

    /// Directory holding persisted priorities and the running-image link.
    pub persist_dir: PathBuf,

    /// Name of the symlink inside `persist_dir` that points at the running image.
    pub active_link_name: String,

    /// Object path under which version objects are published.
    pub software_object_path: String,

    /// Inventory object every activation is associated with.
    pub inventory_path: String,

    /// Flashing unit name; `{}` is replaced by the version id.
    pub flash_unit_template: String,

    /// Maximum number of Active or Failed versions kept resident.
    pub max_active_versions: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("/media"),
            image_prefix: "cpld-".to_string(),
            release_file_name: "cpld-release".to_string(),
            system_release_file: PathBuf::from("/etc/cpld-release"),
            manifest_file_name: "MANIFEST".to_string(),
            persist_dir: PathBuf::from("/var/lib/cpld-code-mgmt"),
            active_link_name: "cpld".to_string(),
            software_object_path: "/xyz/openbmc_project/software".to_string(),
            inventory_path: "/xyz/openbmc_project/inventory/system/chassis/motherboard/cpld"
                .to_string(),
            flash_unit_template: "obmc-cpld-update-fw@{}.service".to_string(),
            max_active_versions: 2,
        }
    }
}

impl UpdaterConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> UpdaterConfigBuilder {
        UpdaterConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`UpdaterConfig::validate`].
    pub fn from_file(path: &Path) -> UpdaterResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> UpdaterResult<()> {
        if self.max_active_versions == 0 {
            return Err(UpdaterError::invalid_configuration(
                "max_active_versions must be at least 1",
            ));
        }
        if self.image_prefix.is_empty() {
            return Err(UpdaterError::invalid_configuration(
                "image_prefix must not be empty",
            ));
        }
        if self.release_file_name.is_empty() || self.manifest_file_name.is_empty() {
            return Err(UpdaterError::invalid_configuration(
                "release and manifest file names must not be empty",
            ));
        }
        if self.active_link_name.is_empty() {
            return Err(UpdaterError::invalid_configuration(
                "active_link_name must not be empty",
            ));
        }
        if self.flash_unit_template.matches(UNIT_ID_PLACEHOLDER).count() != 1 {
            return Err(UpdaterError::invalid_configuration(
                "flash_unit_template must contain exactly one '{}'",
            ));
        }
        Ok(())
    }

    /// Directory an installed image with `id` lives in.
    #[must_use]
    pub fn image_dir(&self, id: &str) -> PathBuf {
        self.media_dir.join(format!("{}{id}", self.image_prefix))
    }

    /// Path of the running-image symlink.
    #[must_use]
    pub fn active_link(&self) -> PathBuf {
        self.persist_dir.join(&self.active_link_name)
    }

    /// Object path of the version with `id`.
    #[must_use]
    pub fn object_path(&self, id: &str) -> String {
        format!("{}/{id}", self.software_object_path)
    }

    /// Flashing unit for the version with `id`.
    #[must_use]
    pub fn flash_unit(&self, id: &str) -> String {
        self.flash_unit_template.replacen(UNIT_ID_PLACEHOLDER, id, 1)
    }
}

/// Builder for [`UpdaterConfig`].
#[derive(Debug, Default)]
pub struct UpdaterConfigBuilder {
    config: UpdaterConfig,
}

impl UpdaterConfigBuilder {
    /// Set the media directory.
    #[must_use]
    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.media_dir = dir.into();
        self
    }

    /// Set the persistence directory.
    #[must_use]
    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_dir = dir.into();
        self
    }

    /// Set the running image's release file.
    #[must_use]
    pub fn system_release_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.system_release_file = path.into();
        self
    }

    /// Set the image directory prefix.
    #[must_use]
    pub fn image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.image_prefix = prefix.into();
        self
    }

    /// Set the capacity bound.
    #[must_use]
    pub fn max_active_versions(mut self, max: usize) -> Self {
        self.config.max_active_versions = max;
        self
    }

    /// Set the flashing unit template.
    #[must_use]
    pub fn flash_unit_template(mut self, template: impl Into<String>) -> Self {
        self.config.flash_unit_template = template.into();
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> UpdaterResult<UpdaterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
