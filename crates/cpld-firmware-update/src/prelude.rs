//! Convenience re-exports for common version manager types

pub use crate::activation::{
    Activation, ActivationState, PROGRESS_COMPLETE, PROGRESS_FINALIZING, PROGRESS_FLASHED,
    PROGRESS_STARTED, RequestedActivation,
};
pub use crate::association::{Association, AssociationList};
pub use crate::bus::{
    BusEvent, BusPublisher, InterfacesAdded, RunningImage, UnitManager, UnitResult,
    UnitStateChange, VersionEraser,
};
pub use crate::config::{UpdaterConfig, UpdaterConfigBuilder};
pub use crate::error::{UpdaterError, UpdaterResult};
pub use crate::persistence::PriorityStore;
pub use crate::repository::{CHASSIS_STATE_OFF, LOWEST_PRIORITY, VersionRepository};
pub use crate::version::{Version, VersionPurpose, cpld_version, version_id};
pub use crate::watch::{ActiveImageWatch, ActiveLink};
