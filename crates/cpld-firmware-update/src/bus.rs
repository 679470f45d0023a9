//! Interfaces to the collaborators around the version manager
//!
//! The object bus, the unit manager that runs the flashing service and the
//! running-image indicator are all external. The repository talks to them
//! only through the traits in this module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::activation::{ActivationState, RequestedActivation};
use crate::association::Association;
use crate::error::UpdaterResult;
use crate::version::VersionPurpose;

/// Interface carrying `Purpose` and `Version` of an announced image.
pub const VERSION_INTERFACE: &str = "xyz.openbmc_project.Software.Version";

/// Interface carrying the `Path` of an announced image's payload.
pub const FILEPATH_INTERFACE: &str = "xyz.openbmc_project.Common.FilePath";

/// A property change published to the object bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusEvent {
    /// A version object appeared
    VersionAdded {
        /// Version id
        id: String,
        /// Object path
        path: String,
        /// Version string
        version: String,
        /// Image purpose
        purpose: VersionPurpose,
        /// Extended version string
        extended_version: String,
    },

    /// A version object was removed
    VersionRemoved {
        /// Version id
        id: String,
        /// Object path
        path: String,
    },

    /// `Activation` changed
    Activation {
        /// Version id
        id: String,
        /// New state
        state: ActivationState,
    },

    /// `RequestedActivation` changed
    RequestedActivation {
        /// Version id
        id: String,
        /// New request
        requested: RequestedActivation,
    },

    /// `Priority` appeared, changed or vanished
    Priority {
        /// Version id
        id: String,
        /// Priority, `None` when withdrawn
        priority: Option<u8>,
    },

    /// `ActivationProgress` appeared, changed or vanished
    Progress {
        /// Version id
        id: String,
        /// Progress percentage, `None` when withdrawn
        progress: Option<u8>,
    },

    /// `ActivationBlocksTransition` marker added or removed
    BlocksTransition {
        /// Version id
        id: String,
        /// Whether the marker is present
        present: bool,
    },

    /// `DeleteObject` action added or removed
    Deletable {
        /// Version id
        id: String,
        /// Whether the action is present
        present: bool,
    },

    /// The manager's association list changed
    Associations(Vec<Association>),
}

/// Publishes version state to the object bus
pub trait BusPublisher: Send {
    /// Publish a property change.
    fn publish(&self, event: BusEvent);

    /// Delete the pending image object the image service created for an upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the image service could not be reached.
    fn delete_pending_image(&self, object_path: &str) -> UpdaterResult<()>;
}

/// Starts flashing units and delivers their completion signals
pub trait UnitManager: Send {
    /// Start receiving unit completion signals.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription was rejected.
    fn subscribe(&self) -> UpdaterResult<()>;

    /// Stop receiving unit completion signals.
    ///
    /// # Errors
    ///
    /// Returns an error if the unsubscribe call failed.
    fn unsubscribe(&self) -> UpdaterResult<()>;

    /// Request that `unit` be started.
    ///
    /// # Errors
    ///
    /// Returns an error if the start request was rejected.
    fn start_unit(&self, unit: &str) -> UpdaterResult<()>;
}

/// Reports which image is running on the device
pub trait RunningImage: Send {
    /// Id of the running image, if one can be determined.
    fn running_id(&self) -> Option<String>;
}

/// The only capability handed to callers that delete versions
pub trait VersionEraser {
    /// Delete the version with `id`.
    ///
    /// Returns `false` if the version is running or unknown.
    fn erase(&mut self, id: &str) -> bool;
}

/// Outcome reported by the unit manager for a finished unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitResult {
    /// The unit completed successfully
    Done,
    /// The unit failed
    Failed,
    /// A dependency of the unit failed
    Dependency,
    /// Any other result string
    Other(String),
}

impl UnitResult {
    /// Parse a unit manager result string.
    pub fn parse(result: &str) -> Self {
        match result {
            "done" => Self::Done,
            "failed" => Self::Failed,
            "dependency" => Self::Dependency,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this result ends an activation as failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Dependency)
    }
}

/// A unit finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStateChange {
    /// Unit name
    pub unit: String,
    /// Result of the job
    pub result: UnitResult,
}

impl UnitStateChange {
    /// Create a unit state change from a raw result string.
    pub fn new(unit: impl Into<String>, result: &str) -> Self {
        Self {
            unit: unit.into(),
            result: UnitResult::parse(result),
        }
    }
}

/// Interfaces added to a new object: interface → property → value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacesAdded {
    /// Object path of the new object
    pub object_path: String,
    /// Properties grouped by interface
    pub interfaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl InterfacesAdded {
    /// Describe a newly uploaded image.
    pub fn image(
        object_path: impl Into<String>,
        purpose: &str,
        version: &str,
        file_path: &str,
    ) -> Self {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            VERSION_INTERFACE.to_string(),
            BTreeMap::from([
                ("Purpose".to_string(), purpose.to_string()),
                ("Version".to_string(), version.to_string()),
            ]),
        );
        interfaces.insert(
            FILEPATH_INTERFACE.to_string(),
            BTreeMap::from([("Path".to_string(), file_path.to_string())]),
        );
        Self {
            object_path: object_path.into(),
            interfaces,
        }
    }

    /// Look up a property value.
    pub fn property(&self, interface: &str, property: &str) -> Option<&str> {
        self.interfaces
            .get(interface)
            .and_then(|props| props.get(property))
            .map(String::as_str)
    }
}
