//! Bus publisher that reports property changes through `tracing`

use cpld_firmware_update::{BusEvent, BusPublisher, UpdaterResult};
use tracing::{debug, info};

/// Logs every published property change
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBusPublisher;

impl BusPublisher for TracingBusPublisher {
    fn publish(&self, event: BusEvent) {
        match event {
            BusEvent::VersionAdded {
                id,
                path,
                version,
                purpose,
                extended_version,
            } => info!(
                version_id = %id,
                %path,
                %version,
                %purpose,
                %extended_version,
                "Version object added"
            ),
            BusEvent::VersionRemoved { id, path } => {
                info!(version_id = %id, %path, "Version object removed");
            }
            BusEvent::Activation { id, state } => {
                info!(version_id = %id, ?state, "Activation changed");
            }
            BusEvent::RequestedActivation { id, requested } => {
                debug!(version_id = %id, ?requested, "RequestedActivation changed");
            }
            BusEvent::Priority { id, priority } => {
                debug!(version_id = %id, ?priority, "Priority changed");
            }
            BusEvent::Progress { id, progress } => {
                debug!(version_id = %id, ?progress, "Activation progress changed");
            }
            BusEvent::BlocksTransition { id, present } => {
                debug!(version_id = %id, present, "ActivationBlocksTransition changed");
            }
            BusEvent::Deletable { id, present } => {
                debug!(version_id = %id, present, "Delete action changed");
            }
            BusEvent::Associations(associations) => {
                debug!(count = associations.len(), "Associations changed");
            }
        }
    }

    fn delete_pending_image(&self, object_path: &str) -> UpdaterResult<()> {
        info!(path = %object_path, "Deleting pending image object");
        Ok(())
    }
}
