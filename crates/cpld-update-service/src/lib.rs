//! CPLD update service
//!
//! Hosts a [`cpld_firmware_update::VersionRepository`] behind a single event
//! queue. Unit completion, running-image changes and JSON control requests
//! are all turned into [`ServiceEvent`]s and applied in order by
//! [`UpdaterDaemon`].

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod control;
pub mod daemon;
pub mod event;
pub mod publisher;
pub mod systemd;

pub use control::forward_control_lines;
pub use daemon::UpdaterDaemon;
pub use event::ServiceEvent;
pub use publisher::TracingBusPublisher;
pub use systemd::SystemctlUnitManager;

/// Log filter used when neither `--log-filter` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "cpld_firmware_update=info,cpld_update_service=info";
