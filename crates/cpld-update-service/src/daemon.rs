//! Event loop driving the version repository

use cpld_firmware_update::{UpdaterResult, VersionEraser, VersionRepository};
use std::future::Future;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::event::ServiceEvent;

/// Owns the repository and applies queued events to it one at a time
pub struct UpdaterDaemon {
    repo: VersionRepository,
    events: UnboundedReceiver<ServiceEvent>,
}

impl UpdaterDaemon {
    /// Create a daemon draining `events` into `repo`.
    pub fn new(repo: VersionRepository, events: UnboundedReceiver<ServiceEvent>) -> Self {
        Self { repo, events }
    }

    /// The repository.
    pub fn repository(&self) -> &VersionRepository {
        &self.repo
    }

    /// Populate the repository from the installed images.
    ///
    /// # Errors
    ///
    /// Returns an error if the media directory cannot be scanned.
    pub fn discover(&mut self) -> UpdaterResult<()> {
        self.repo.discover_at_startup()
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::ImageAdded(msg) => {
                if let Some(id) = self.repo.process_new_image(&msg) {
                    debug!(version_id = %id, "Image added");
                }
            }
            ServiceEvent::RequestActivation { id, requested } => {
                if let Err(e) = self.repo.request_activation(&id, requested) {
                    warn!(version_id = %id, error = %e, "Activation request rejected");
                }
            }
            ServiceEvent::Delete { id } => {
                let eraser: &mut dyn VersionEraser = &mut self.repo;
                if !eraser.erase(&id) {
                    warn!(version_id = %id, "Delete request refused");
                }
            }
            ServiceEvent::DeleteAll => self.repo.delete_all(),
            ServiceEvent::FactoryReset => self.repo.factory_reset(),
            ServiceEvent::PowerState { state } => self.repo.update_delete_interface(&state),
            ServiceEvent::UnitStateChanged(change) => self.repo.unit_state_changed(&change),
            ServiceEvent::FunctionalChanged { id } => {
                self.repo.on_functional_changed(id.as_deref());
            }
        }
    }

    /// Process events until `shutdown` resolves or every sender is gone.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(versions = self.repo.len(), "CPLD update service running");

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("All event sources closed");
                        break;
                    }
                },
            }
        }
    }
}
