//! Version repository
//!
//! Owns every discovered version together with its activation record and the
//! manager-wide association list. All mutation goes through this type, which
//! is driven from a single event-processing context; nothing here locks.
//!
//! The activation state machine lives in [`crate::activation`] and priority
//! resolution in [`crate::priority`]; both are further `impl` blocks on
//! [`VersionRepository`] so that they can reach sibling records.

use std::collections::{BTreeMap, BinaryHeap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::activation::{Activation, ActivationState};
use crate::association::{Association, AssociationList, FUNCTIONAL_FWD_ASSOCIATION};
use crate::bus::{
    BusEvent, BusPublisher, FILEPATH_INTERFACE, InterfacesAdded, RunningImage, UnitManager,
    VERSION_INTERFACE, VersionEraser,
};
use crate::config::UpdaterConfig;
use crate::error::UpdaterResult;
use crate::persistence::PriorityStore;
use crate::version::{
    EXTENDED_VERSION_KEY, Version, VersionPurpose, cpld_version, read_values, version_id,
};

/// Eviction rank of Failed versions and Active versions without a priority.
///
/// Worse than any real priority, so these go first.
pub const EVICTION_SENTINEL_RANK: u16 = 999;

/// Priority given to non-functional images found at startup without a
/// persisted priority.
pub const LOWEST_PRIORITY: u8 = u8::MAX;

/// Chassis power state in which the running image may be deleted.
pub const CHASSIS_STATE_OFF: &str = "xyz.openbmc_project.State.Chassis.PowerState.Off";

/// Collection of CPLD firmware versions and their activations
pub struct VersionRepository {
    pub(crate) config: UpdaterConfig,
    pub(crate) bus: Box<dyn BusPublisher>,
    pub(crate) units: Box<dyn UnitManager>,
    running: Box<dyn RunningImage>,
    pub(crate) store: PriorityStore,
    pub(crate) activations: BTreeMap<String, Activation>,
    versions: BTreeMap<String, Version>,
    associations: AssociationList,
}

impl std::fmt::Debug for VersionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRepository")
            .field("config", &self.config)
            .field("activations", &self.activations)
            .field("versions", &self.versions)
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl VersionRepository {
    /// Create an empty repository.
    ///
    /// Call [`VersionRepository::discover_at_startup`] to populate it from the
    /// media directory.
    pub fn new(
        config: UpdaterConfig,
        bus: Box<dyn BusPublisher>,
        units: Box<dyn UnitManager>,
        running: Box<dyn RunningImage>,
    ) -> Self {
        let store = PriorityStore::new(&config);
        Self {
            config,
            bus,
            units,
            running,
            store,
            activations: BTreeMap::new(),
            versions: BTreeMap::new(),
            associations: AssociationList::new(),
        }
    }

    pub(crate) fn publish(&self, event: BusEvent) {
        self.bus.publish(event);
    }

    /// The active configuration.
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Activation record of `id`.
    pub fn activation(&self, id: &str) -> Option<&Activation> {
        self.activations.get(id)
    }

    /// Version record of `id`.
    pub fn version(&self, id: &str) -> Option<&Version> {
        self.versions.get(id)
    }

    /// Ids of every known version, in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.activations.keys().map(String::as_str)
    }

    /// Number of known versions.
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Whether no versions are known.
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// The manager-wide association list.
    pub fn associations(&self) -> &AssociationList {
        &self.associations
    }

    /// Whether `id` is the image currently running on the device.
    pub fn is_version_functional(&self, id: &str) -> bool {
        self.running.running_id().as_deref() == Some(id)
    }

    fn insert(&mut self, activation: Activation, version: Version) {
        self.publish(BusEvent::VersionAdded {
            id: version.id.clone(),
            path: version.path.clone(),
            version: version.version.clone(),
            purpose: version.purpose,
            extended_version: version.extended_version.clone(),
        });
        self.publish(BusEvent::Activation {
            id: activation.id().to_string(),
            state: activation.state(),
        });
        self.publish(BusEvent::Deletable {
            id: version.id.clone(),
            present: version.deletable,
        });
        self.activations
            .insert(activation.id().to_string(), activation);
        self.versions.insert(version.id.clone(), version);
    }

    /// Populate the repository from the images installed under the media
    /// directory.
    ///
    /// Entries without a readable release file are treated as corrupt and
    /// deleted. Every valid entry becomes an Active version; the one matching
    /// the running release becomes functional with priority 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the media directory cannot be created or listed.
    pub fn discover_at_startup(&mut self) -> UpdaterResult<()> {
        let media_dir = self.config.media_dir.clone();
        if !media_dir.is_dir() {
            fs::create_dir_all(&media_dir)?;
        }

        let functional_version = match cpld_version(&self.config.system_release_file) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(
                    path = ?self.config.system_release_file,
                    error = %e,
                    "Unable to read the running CPLD version"
                );
                None
            }
        };

        let mut entries: Vec<_> = fs::read_dir(&media_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        let mut functional = None;
        for entry in entries {
            let Some(dir_id) = entry
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(self.config.image_prefix.as_str()))
                .map(str::to_string)
            else {
                continue;
            };

            if let Some(id) =
                self.discover_installed(&entry, &dir_id, functional_version.as_deref())
            {
                functional = Some(id);
            }
        }

        // Restored priorities may collide with 0, so the running image claims
        // it last and bumps them instead.
        if let Some(id) = functional {
            debug!(version_id = %id, "Running image takes priority 0");
            if let Err(e) = self.set_priority(&id, 0) {
                warn!(version_id = %id, error = %e, "Failed to set priority");
            }
        }

        if let Some(id) = self.running.running_id() {
            self.update_functional_association(&id);
        }

        info!(count = self.activations.len(), "Startup discovery complete");
        Ok(())
    }

    /// Register one installed image. Returns its id if it is the running one.
    fn discover_installed(
        &mut self,
        dir: &Path,
        dir_id: &str,
        functional_version: Option<&str>,
    ) -> Option<String> {
        let release_file = dir.join(&self.config.release_file_name);
        if !release_file.is_file() {
            warn!(path = ?release_file, "Missing release file, removing corrupt image");
            self.erase(dir_id);
            return None;
        }

        let version = match cpld_version(&release_file) {
            Ok(version) => version,
            Err(e) => {
                warn!(path = ?release_file, error = %e, "Unreadable release file, removing corrupt image");
                self.erase(dir_id);
                return None;
            }
        };

        let id = version_id(&version)?;
        if self.activations.contains_key(&id) {
            debug!(version_id = %id, path = ?dir, "Duplicate installed image ignored");
            return None;
        }

        let path = self.config.object_path(&id);
        let is_functional = functional_version == Some(version.as_str());
        if is_functional {
            self.update_functional_association(&id);
        }
        self.create_active_association(&path);
        self.create_updateable_association(&path);

        let activation = Activation::new(
            &id,
            &path,
            ActivationState::Active,
            vec![Association::inventory(&self.config.inventory_path)],
            None,
        );
        let record = Version {
            id: id.clone(),
            version,
            purpose: VersionPurpose::Cpld,
            path,
            file_path: Default::default(),
            extended_version: String::new(),
            deletable: !is_functional,
        };
        info!(version_id = %id, version = %record.version, is_functional, "Found installed CPLD image");
        self.insert(activation, record);

        if is_functional {
            return Some(id);
        }

        let priority = if let Some(priority) = self.store.restore(&id) {
            debug!(version_id = %id, priority, "Restored priority");
            priority
        } else {
            warn!(version_id = %id, "Unable to restore priority from file");
            LOWEST_PRIORITY
        };
        if let Err(e) = self.set_priority(&id, priority) {
            warn!(version_id = %id, error = %e, "Failed to set priority");
        }
        None
    }

    /// Handle an image announced by the image service.
    ///
    /// Only CPLD images carrying a payload path and a version are accepted;
    /// an image already known is ignored. Returns the id of the version
    /// created, if any.
    pub fn process_new_image(&mut self, msg: &InterfacesAdded) -> Option<String> {
        let purpose = msg
            .property(VERSION_INTERFACE, "Purpose")
            .map(VersionPurpose::parse)
            .unwrap_or_default();
        if purpose != VersionPurpose::Cpld {
            debug!(path = %msg.object_path, %purpose, "Ignoring image with foreign purpose");
            return None;
        }

        let file_path = msg
            .property(FILEPATH_INTERFACE, "Path")
            .filter(|path| !path.is_empty())?;
        let version = msg.property(VERSION_INTERFACE, "Version").unwrap_or_default();
        let id = version_id(version)?;

        if self.activations.contains_key(&id) {
            debug!(version_id = %id, "Image already known");
            return None;
        }

        let manifest = Path::new(file_path).join(&self.config.manifest_file_name);
        let extended_version = match read_values(&manifest, &[EXTENDED_VERSION_KEY]) {
            Ok(mut values) => values.remove(EXTENDED_VERSION_KEY).unwrap_or_default(),
            Err(e) => {
                warn!(path = ?manifest, error = %e, "Unable to read manifest");
                String::new()
            }
        };

        let path = self.config.object_path(&id);
        let activation = Activation::new(
            &id,
            &path,
            ActivationState::Ready,
            vec![Association::inventory(&self.config.inventory_path)],
            Some(msg.object_path.clone()),
        );
        let record = Version {
            id: id.clone(),
            version: version.to_string(),
            purpose,
            path,
            file_path: file_path.into(),
            extended_version,
            deletable: true,
        };
        info!(version_id = %id, version = %version, "New CPLD image ready");
        self.insert(activation, record);
        Some(id)
    }

    /// Delete the version with `id`.
    ///
    /// Fails, leaving everything untouched, if `id` is the running image or
    /// is unknown. Otherwise removes both records, every association
    /// targeting the version and its persisted priority.
    pub fn erase(&mut self, id: &str) -> bool {
        if self.is_version_functional(id) {
            warn!(version_id = %id, "Version is currently running, unable to remove");
            return false;
        }
        if !self.versions.contains_key(id) || !self.activations.contains_key(id) {
            warn!(version_id = %id, "Version not found, unable to remove");
            return false;
        }

        self.versions.remove(id);
        let path = self
            .activations
            .remove(id)
            .map(|activation| activation.path().to_string())
            .unwrap_or_else(|| self.config.object_path(id));
        self.remove_association(&path);
        if let Err(e) = self.store.remove(id) {
            warn!(version_id = %id, error = %e, "Failed to remove persisted priority");
        }

        self.publish(BusEvent::VersionRemoved {
            id: id.to_string(),
            path,
        });
        info!(version_id = %id, "Version removed");
        true
    }

    /// Delete every version that is not running.
    pub fn delete_all(&mut self) {
        let ids: Vec<String> = self.activations.keys().cloned().collect();
        for id in ids {
            if !self.is_version_functional(&id) {
                self.erase(&id);
            }
        }
    }

    /// Evict versions until a new activation fits within the capacity bound.
    ///
    /// Returns whether anything was evicted. With a capacity of 1 the running
    /// image is a candidate, but [`VersionRepository::erase`] still refuses
    /// it, so the pass ends without room.
    pub fn free_space(&mut self) -> bool {
        self.free_space_excluding(None)
    }

    /// Eviction pass that never picks `exclude` as a candidate.
    ///
    /// Failed versions and Active versions without a priority rank worst;
    /// the rest rank by priority, larger evicted first. The running image is
    /// protected unless the capacity is 1.
    pub(crate) fn free_space_excluding(&mut self, exclude: Option<&str>) -> bool {
        let capacity = self.config.max_active_versions;
        let running = self.running.running_id();

        let mut count = 0usize;
        let mut candidates = BinaryHeap::new();
        for activation in self.activations.values() {
            let state = activation.state();
            if !matches!(state, ActivationState::Active | ActivationState::Failed) {
                continue;
            }
            count = count.saturating_add(1);

            if exclude == Some(activation.id()) {
                continue;
            }
            if capacity > 1 && running.as_deref() == Some(activation.id()) {
                continue;
            }

            let rank = match (state, activation.priority()) {
                (ActivationState::Active, Some(priority)) => u16::from(priority),
                _ => EVICTION_SENTINEL_RANK,
            };
            candidates.push((rank, activation.id().to_string()));
        }

        let mut freed = false;
        while count >= capacity {
            let Some((rank, id)) = candidates.pop() else {
                break;
            };
            info!(version_id = %id, rank, "Evicting version to free space");
            freed |= self.erase(&id);
            count = count.saturating_sub(1);
        }
        freed
    }

    fn publish_associations(&self) {
        self.publish(BusEvent::Associations(
            self.associations.as_slice().to_vec(),
        ));
    }

    /// Mark `path` as an active version.
    pub fn create_active_association(&mut self, path: &str) {
        self.associations.push(Association::active(path));
        self.publish_associations();
    }

    /// Mark `path` as an updateable version.
    pub fn create_updateable_association(&mut self, path: &str) {
        self.associations.push(Association::updateable(path));
        self.publish_associations();
    }

    fn create_functional_association(&mut self, path: &str) {
        self.associations.push(Association::functional(path));
        self.publish_associations();
    }

    /// Point the functional association at the version with `id`.
    ///
    /// Any previous functional association is removed first.
    pub fn update_functional_association(&mut self, id: &str) {
        let path = self.config.object_path(id);
        self.associations.remove_forward(FUNCTIONAL_FWD_ASSOCIATION);
        self.create_functional_association(&path);
        debug!(version_id = %id, "Functional association updated");
    }

    /// Remove every association targeting `path`.
    pub fn remove_association(&mut self, path: &str) {
        if self.associations.remove_path(path) {
            self.publish_associations();
        }
    }

    /// Handle a change of the running image reported by the watcher.
    pub fn on_functional_changed(&mut self, id: Option<&str>) {
        match id {
            Some(id) => {
                info!(version_id = %id, "Running CPLD image changed");
                self.update_functional_association(id);
            }
            None => debug!("Running CPLD image link does not resolve to an image"),
        }
    }

    /// Withdraw or republish delete actions after a chassis power change.
    ///
    /// The running image may only be deleted while the chassis is off.
    pub fn update_delete_interface(&mut self, power_state: &str) {
        if power_state.is_empty() {
            return;
        }
        let powered_off = power_state == CHASSIS_STATE_OFF || power_state == "Off";
        let running = self.running.running_id();

        for version in self.versions.values_mut() {
            let present = powered_off || running.as_deref() != Some(version.id.as_str());
            if version.deletable != present {
                version.deletable = present;
                self.bus.publish(BusEvent::Deletable {
                    id: version.id.clone(),
                    present,
                });
            }
        }
    }

    /// Wipe the contents of every known image's media directory.
    ///
    /// Best effort: failures are logged and the sweep continues.
    pub fn factory_reset(&mut self) {
        for id in self.activations.keys() {
            let dir = self.config.image_dir(id);
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                if let Err(e) = result {
                    warn!(path = ?path, error = %e, "Factory reset failed to remove entry");
                }
            }
        }
        info!("Factory reset complete");
    }
}

impl VersionEraser for VersionRepository {
    fn erase(&mut self, id: &str) -> bool {
        VersionRepository::erase(self, id)
    }
}
