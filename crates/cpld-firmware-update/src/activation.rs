//! Activation state machine
//!
//! Each version carries an [`Activation`] record. Requesting activation of a
//! Ready or Failed version frees space, starts the flashing unit and parks the
//! record in Activating until the unit manager reports the unit finished.
//! A successful unit is then finalized into Active; anything else ends in
//! Failed.
//!
//! ```text
//!  Ready/Failed --request Active--> Activating --unit done + image present--> Active
//!                                       |
//!                                       +--unit failed/dependency, image missing--> Failed
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::association::Association;
use crate::bus::{BusEvent, UnitResult, UnitStateChange};
use crate::error::{UpdaterError, UpdaterResult};
use crate::repository::VersionRepository;

/// Progress published once the flashing unit has been started.
pub const PROGRESS_STARTED: u8 = 10;
/// Progress published when the flashing unit reports success.
pub const PROGRESS_FLASHED: u8 = 80;
/// Progress published when finalization begins.
pub const PROGRESS_FINALIZING: u8 = 90;
/// Progress published when finalization is complete.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Activation state of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ActivationState {
    /// The version cannot be activated
    #[default]
    Invalid,
    /// The version can be activated
    Ready,
    /// A flash is in progress
    Activating,
    /// The version is installed
    Active,
    /// The last activation failed
    Failed,
}

impl ActivationState {
    /// Check if an activation can be started from this state
    pub fn can_activate(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Check if a priority may be held in this state
    pub fn holds_priority(self) -> bool {
        matches!(self, Self::Active | Self::Activating)
    }
}

/// Activation state requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RequestedActivation {
    /// No activation requested
    #[default]
    None,
    /// Activation requested
    Active,
}

/// Activation record of one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    id: String,
    path: String,
    state: ActivationState,
    requested: RequestedActivation,
    progress: Option<u8>,
    priority: Option<u8>,
    blocks_transition: bool,
    flash_triggered: bool,
    associations: Vec<Association>,
    pending_image: Option<String>,
}

impl Activation {
    /// Create an activation record.
    ///
    /// `pending_image` is the object the image service published for an
    /// upload; it is deleted once the upload has been flashed.
    pub fn new(
        id: &str,
        path: &str,
        state: ActivationState,
        associations: Vec<Association>,
        pending_image: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            state,
            requested: RequestedActivation::None,
            progress: None,
            priority: None,
            blocks_transition: false,
            flash_triggered: false,
            associations,
            pending_image,
        }
    }

    /// Version id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Object path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current state
    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Last requested state
    pub fn requested(&self) -> RequestedActivation {
        self.requested
    }

    /// Flash progress, present only while activating
    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    /// Redundancy priority, 0 being the preferred image
    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    /// Whether power-state transitions must be blocked
    pub fn blocks_transition(&self) -> bool {
        self.blocks_transition
    }

    /// Whether the flashing unit has reported success
    pub fn flash_triggered(&self) -> bool {
        self.flash_triggered
    }

    /// Associations published on the activation itself
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Pending image object awaiting deletion
    pub fn pending_image(&self) -> Option<&str> {
        self.pending_image.as_deref()
    }
}

impl VersionRepository {
    fn record_mut(&mut self, id: &str) -> UpdaterResult<&mut Activation> {
        self.activations
            .get_mut(id)
            .ok_or_else(|| UpdaterError::VersionNotFound(id.to_string()))
    }

    fn set_state(&mut self, id: &str, state: ActivationState) {
        if let Some(record) = self.activations.get_mut(id) {
            if record.state != state {
                record.state = state;
                self.bus.publish(BusEvent::Activation {
                    id: id.to_string(),
                    state,
                });
            }
        }
    }

    fn set_progress(&mut self, id: &str, progress: Option<u8>) {
        if let Some(record) = self.activations.get_mut(id) {
            if record.progress != progress {
                record.progress = progress;
                self.bus.publish(BusEvent::Progress {
                    id: id.to_string(),
                    progress,
                });
            }
        }
    }

    fn set_blocks_transition(&mut self, id: &str, present: bool) {
        if let Some(record) = self.activations.get_mut(id) {
            if record.blocks_transition != present {
                record.blocks_transition = present;
                self.bus.publish(BusEvent::BlocksTransition {
                    id: id.to_string(),
                    present,
                });
            }
        }
    }

    pub(crate) fn set_priority_value(&mut self, id: &str, priority: Option<u8>) {
        if let Some(record) = self.activations.get_mut(id) {
            if record.priority != priority {
                record.priority = priority;
                self.bus.publish(BusEvent::Priority {
                    id: id.to_string(),
                    priority,
                });
            }
        }
    }

    fn clear_activation_markers(&mut self, id: &str) {
        self.set_blocks_transition(id, false);
        self.set_progress(id, None);
    }

    /// Record a client's requested activation.
    ///
    /// Requesting `Active` on a Ready or Failed version starts an activation;
    /// on an Active or Activating version it changes nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::VersionNotFound`] if `id` is unknown.
    pub fn request_activation(
        &mut self,
        id: &str,
        requested: RequestedActivation,
    ) -> UpdaterResult<()> {
        let record = self.record_mut(id)?;
        let state = record.state;
        if record.requested != requested {
            record.requested = requested;
            self.publish(BusEvent::RequestedActivation {
                id: id.to_string(),
                requested,
            });
        }

        if requested != RequestedActivation::Active {
            return Ok(());
        }
        if !state.can_activate() {
            debug!(version_id = %id, ?state, "Activation already in place");
            return Ok(());
        }

        self.record_mut(id)?.flash_triggered = false;
        self.set_activation(id, ActivationState::Activating)
    }

    /// Drive the activation of `id` to `state`.
    ///
    /// Leaving Active/Activating drops the held priority. Entering
    /// Activating either starts the flashing unit or, once the unit has
    /// reported success, finalizes into Active or fails.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::VersionNotFound`] if `id` is unknown, and
    /// [`UpdaterError::InvalidTransition`] when asked to enter Activating
    /// from any state other than Ready or Failed.
    pub fn set_activation(&mut self, id: &str, state: ActivationState) -> UpdaterResult<()> {
        let current = self.record_mut(id)?.state;
        if state == ActivationState::Activating && !current.can_activate() {
            return Err(UpdaterError::InvalidTransition {
                id: id.to_string(),
                from: current,
            });
        }

        if !state.holds_priority() {
            self.set_priority_value(id, None);
        }

        if state == ActivationState::Activating {
            self.enter_activating(id);
        } else {
            self.clear_activation_markers(id);
            self.set_state(id, state);
        }
        Ok(())
    }

    fn enter_activating(&mut self, id: &str) {
        self.free_space_excluding(Some(id));
        self.set_priority_value(id, None);
        self.set_state(id, ActivationState::Activating);

        let flash_triggered = self
            .activations
            .get(id)
            .is_some_and(|record| record.flash_triggered);

        if !flash_triggered {
            self.start_activation(id);
            return;
        }

        if self.config.image_dir(id).is_dir() {
            self.finish_activation(id);
            self.set_state(id, ActivationState::Active);
        } else {
            warn!(
                version_id = %id,
                path = ?self.config.image_dir(id),
                "Flashed image directory missing, activation failed"
            );
            if let Some(record) = self.activations.get_mut(id) {
                record.flash_triggered = false;
            }
            self.clear_activation_markers(id);
            self.set_state(id, ActivationState::Failed);
        }
    }

    fn fail_activation(&mut self, id: &str) {
        self.set_priority_value(id, None);
        self.clear_activation_markers(id);
        self.set_state(id, ActivationState::Failed);
    }

    fn start_activation(&mut self, id: &str) {
        self.set_progress(id, Some(0));
        self.set_blocks_transition(id, true);

        if let Err(e) = self.units.subscribe() {
            error!(version_id = %id, error = %e, "Error subscribing to unit signals");
            self.fail_activation(id);
            return;
        }

        let unit = self.config.flash_unit(id);
        if let Err(e) = self.units.start_unit(&unit) {
            error!(version_id = %id, unit = %unit, error = %e, "Error starting CPLD flash");
            self.fail_activation(id);
            return;
        }

        self.set_progress(id, Some(PROGRESS_STARTED));
        info!(version_id = %id, unit = %unit, "CPLD flash started");
    }

    fn finish_activation(&mut self, id: &str) {
        self.set_progress(id, Some(PROGRESS_FINALIZING));

        let has_priority = self
            .activations
            .get(id)
            .is_some_and(|record| record.priority.is_some());
        if !has_priority {
            if let Err(e) = self.set_priority(id, 0) {
                warn!(version_id = %id, error = %e, "Failed to assign priority");
            }
        }

        self.set_progress(id, Some(PROGRESS_COMPLETE));
        self.clear_activation_markers(id);

        let (path, pending_image) = match self.activations.get_mut(id) {
            Some(record) => {
                record.flash_triggered = false;
                (record.path.clone(), record.pending_image.take())
            }
            None => return,
        };

        if let Err(e) = self.units.unsubscribe() {
            debug!(error = %e, "Unsubscribe from unit signals failed");
        }

        if let Some(pending_image) = pending_image {
            if let Err(e) = self.bus.delete_pending_image(&pending_image) {
                warn!(path = %pending_image, error = %e, "Error deleting pending image object");
            }
        }

        self.create_active_association(&path);
        self.create_updateable_association(&path);
        self.update_functional_association(id);
        info!(version_id = %id, "CPLD firmware update complete");
    }

    /// Handle a finished unit reported by the unit manager.
    ///
    /// Only the flashing unit of a version that is currently Activating is
    /// considered; every other signal is ignored.
    pub fn unit_state_changed(&mut self, change: &UnitStateChange) {
        let target = self
            .activations
            .values()
            .find(|record| {
                record.state == ActivationState::Activating
                    && self.config.flash_unit(&record.id) == change.unit
            })
            .map(|record| record.id.clone());

        let Some(id) = target else {
            debug!(unit = %change.unit, "Ignoring unit signal");
            return;
        };

        match &change.result {
            UnitResult::Done => {
                if let Some(record) = self.activations.get_mut(&id) {
                    record.flash_triggered = true;
                }
                self.set_progress(&id, Some(PROGRESS_FLASHED));
            }
            result if result.is_failure() => {
                warn!(version_id = %id, ?result, "CPLD flash unit failed");
                self.fail_activation(&id);
            }
            result => {
                debug!(version_id = %id, ?result, "Ignoring unit result");
            }
        }

        let flash_triggered = self
            .activations
            .get(&id)
            .is_some_and(|record| record.flash_triggered);
        if flash_triggered {
            self.enter_activating(&id);
        }
    }
}
