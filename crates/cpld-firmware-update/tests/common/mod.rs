//! Shared test doubles for the version manager

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::Result;
use cpld_firmware_update::prelude::*;
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Bus double recording every published event
#[derive(Clone, Default)]
pub struct RecordingBus {
    pub events: Arc<Mutex<Vec<BusEvent>>>,
    pub deleted_images: Arc<Mutex<Vec<String>>>,
}

impl BusPublisher for RecordingBus {
    fn publish(&self, event: BusEvent) {
        self.events.lock().push(event);
    }

    fn delete_pending_image(&self, object_path: &str) -> UpdaterResult<()> {
        self.deleted_images.lock().push(object_path.to_string());
        Ok(())
    }
}

impl RecordingBus {
    /// Progress values published for `id`, in order.
    pub fn progress_of(&self, id: &str) -> Vec<Option<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Progress { id: event_id, progress } if event_id == id => {
                    Some(*progress)
                }
                _ => None,
            })
            .collect()
    }

    /// Ids of every removed version, in order.
    pub fn removed(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::VersionRemoved { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Unit manager double recording started units
#[derive(Clone, Default)]
pub struct MockUnits {
    pub started: Arc<Mutex<Vec<String>>>,
    pub subscriptions: Arc<Mutex<i32>>,
    pub fail_start: Arc<Mutex<bool>>,
}

impl UnitManager for MockUnits {
    fn subscribe(&self) -> UpdaterResult<()> {
        *self.subscriptions.lock() += 1;
        Ok(())
    }

    fn unsubscribe(&self) -> UpdaterResult<()> {
        *self.subscriptions.lock() -= 1;
        Ok(())
    }

    fn start_unit(&self, unit: &str) -> UpdaterResult<()> {
        if *self.fail_start.lock() {
            return Err(UpdaterError::unit_manager(format!("{unit} rejected")));
        }
        self.started.lock().push(unit.to_string());
        Ok(())
    }
}

/// Running-image double settable from the test
#[derive(Clone, Default)]
pub struct SharedRunning(pub Arc<Mutex<Option<String>>>);

impl SharedRunning {
    pub fn set(&self, id: Option<&str>) {
        *self.0.lock() = id.map(str::to_string);
    }
}

impl RunningImage for SharedRunning {
    fn running_id(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

/// A repository wired to test doubles inside a temporary directory
pub struct Harness {
    pub dir: TempDir,
    pub repo: VersionRepository,
    pub bus: RecordingBus,
    pub units: MockUnits,
    pub running: SharedRunning,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_capacity(2)
    }

    pub fn with_capacity(max_active_versions: usize) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = UpdaterConfig::builder()
            .media_dir(dir.path().join("media"))
            .persist_dir(dir.path().join("state"))
            .system_release_file(dir.path().join("etc-cpld-release"))
            .max_active_versions(max_active_versions)
            .build()?;

        let bus = RecordingBus::default();
        let units = MockUnits::default();
        let running = SharedRunning::default();
        let repo = VersionRepository::new(
            config,
            Box::new(bus.clone()),
            Box::new(units.clone()),
            Box::new(running.clone()),
        );

        Ok(Self {
            dir,
            repo,
            bus,
            units,
            running,
        })
    }

    pub fn config(&self) -> &UpdaterConfig {
        self.repo.config()
    }

    /// Write the release file of the image the device is running.
    pub fn set_system_version(&self, version: &str) -> Result<()> {
        fs::write(
            &self.config().system_release_file,
            format!("VERSION_ID=\"{version}\"\n"),
        )?;
        Ok(())
    }

    /// Lay out an installed image for `version`; returns its id.
    pub fn install(&self, version: &str) -> Result<String> {
        let id = version_id(version).ok_or_else(|| anyhow::anyhow!("empty version"))?;
        let dir = self.config().image_dir(&id);
        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join(&self.config().release_file_name),
            format!("VERSION_ID=\"{version}\"\n"),
        )?;
        Ok(id)
    }

    /// Persist a priority for `id` the way a previous run would have.
    pub fn persist_priority(&self, id: &str, priority: u8) -> Result<()> {
        PriorityStore::new(self.config()).store(id, priority)?;
        Ok(())
    }

    /// Announce an uploaded CPLD image; returns its id.
    pub fn upload(&mut self, version: &str) -> Result<String> {
        let payload = self.payload_dir(version);
        fs::create_dir_all(&payload)?;
        fs::write(
            payload.join(&self.config().manifest_file_name),
            format!("purpose=CPLD\nversion={version}\nextended_version=ext-{version}\n"),
        )?;
        let msg = InterfacesAdded::image(
            format!("/xyz/openbmc_project/software/upload_{version}"),
            "xyz.openbmc_project.Software.Version.VersionPurpose.CPLD",
            version,
            &payload.to_string_lossy(),
        );
        self.repo
            .process_new_image(&msg)
            .ok_or_else(|| anyhow::anyhow!("image {version} was not accepted"))
    }

    pub fn payload_dir(&self, version: &str) -> PathBuf {
        self.dir.path().join("images").join(version)
    }

    /// Report the flashing unit of `id` finished with `result`.
    pub fn finish_unit(&mut self, id: &str, result: &str) {
        let unit = self.config().flash_unit(id);
        self.repo
            .unit_state_changed(&UnitStateChange::new(unit, result));
    }

    /// Create the media directory the flashing service leaves behind.
    pub fn flash_artifact(&self, id: &str) -> Result<()> {
        fs::create_dir_all(self.config().image_dir(id))?;
        Ok(())
    }

    /// Run a full successful activation of `id`.
    pub fn activate(&mut self, id: &str) -> Result<()> {
        self.repo
            .request_activation(id, RequestedActivation::Active)?;
        self.flash_artifact(id)?;
        self.finish_unit(id, "done");
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<ActivationState> {
        self.repo.activation(id).map(Activation::state)
    }

    pub fn priority(&self, id: &str) -> Option<u8> {
        self.repo.activation(id).and_then(Activation::priority)
    }
}
