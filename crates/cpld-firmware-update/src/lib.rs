//! CPLD firmware version and activation lifecycle management
//!
//! This crate tracks every CPLD firmware image known to a BMC and drives its
//! activation:
//! - Discovery of installed images at startup and of new uploads at runtime
//! - An activation state machine that runs a flashing unit per version
//! - Capacity-bounded eviction of installed versions
//! - Redundancy priorities with persistence and conflict resolution
//! - Active, updateable and functional associations
//!
//! # Architecture
//!
//! - [`repository`]: Collection of versions and the operations on it
//! - [`activation`]: Activation records and the state machine
//! - [`priority`]: Priority assignment and conflict resolution
//! - [`version`]: Version ids and release-file parsing
//! - [`association`]: Association triples
//! - [`bus`]: Traits for the object bus, unit manager and running image
//! - [`persistence`]: Persisted priorities
//! - [`watch`]: Running-image link resolution and change watch
//! - [`config`]: Platform layout and policy
//! - [`error`]: Error types
//!
//! The repository is owned by a single event-processing context. Collaborators
//! are passed in as trait objects so the whole lifecycle can run against
//! in-memory doubles.
//!
//! # Example
//!
//! ```ignore
//! use cpld_firmware_update::prelude::*;
//!
//! let config = UpdaterConfig::default();
//! let running = ActiveLink::new(&config);
//! let mut repo = VersionRepository::new(config, bus, units, Box::new(running));
//! repo.discover_at_startup()?;
//!
//! if let Some(id) = repo.process_new_image(&msg) {
//!     repo.request_activation(&id, RequestedActivation::Active)?;
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod activation;
pub mod association;
pub mod bus;
pub mod config;
pub mod error;
pub mod persistence;
pub mod prelude;
pub mod priority;
pub mod repository;
pub mod version;
pub mod watch;

pub use activation::{Activation, ActivationState, RequestedActivation};
pub use association::{Association, AssociationList};
pub use bus::{
    BusEvent, BusPublisher, InterfacesAdded, RunningImage, UnitManager, UnitResult,
    UnitStateChange, VersionEraser,
};
pub use config::{UpdaterConfig, UpdaterConfigBuilder};
pub use error::{UpdaterError, UpdaterResult};
pub use persistence::PriorityStore;
pub use repository::VersionRepository;
pub use version::{Version, VersionPurpose, version_id};
pub use watch::{ActiveImageWatch, ActiveLink};
