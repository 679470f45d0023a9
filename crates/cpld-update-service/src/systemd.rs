//! Unit manager backed by `systemctl`

use cpld_firmware_update::{UnitManager, UnitStateChange, UpdaterError, UpdaterResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::event::ServiceEvent;

/// Unit manager result string for a unit that completed.
const RESULT_DONE: &str = "done";
/// Unit manager result string for a unit that failed.
const RESULT_FAILED: &str = "failed";

/// Starts units with `systemctl start` and reports their completion
///
/// `systemctl start` waits for the start job, so the exit status is the job
/// result. Completion is posted to the event queue only while subscribed.
pub struct SystemctlUnitManager {
    runtime: Handle,
    events: UnboundedSender<ServiceEvent>,
    subscribed: Arc<AtomicBool>,
    program: String,
}

impl SystemctlUnitManager {
    /// Create a manager spawning its jobs on `runtime`.
    pub fn new(runtime: Handle, events: UnboundedSender<ServiceEvent>) -> Self {
        Self {
            runtime,
            events,
            subscribed: Arc::new(AtomicBool::new(false)),
            program: "systemctl".to_string(),
        }
    }

    /// Use `program` instead of `systemctl`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Whether completion signals are currently delivered.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }
}

impl UnitManager for SystemctlUnitManager {
    fn subscribe(&self) -> UpdaterResult<()> {
        self.subscribed.store(true, Ordering::SeqCst);
        debug!("Subscribed to unit signals");
        Ok(())
    }

    fn unsubscribe(&self) -> UpdaterResult<()> {
        self.subscribed.store(false, Ordering::SeqCst);
        debug!("Unsubscribed from unit signals");
        Ok(())
    }

    fn start_unit(&self, unit: &str) -> UpdaterResult<()> {
        if unit.is_empty() {
            return Err(UpdaterError::unit_manager("empty unit name"));
        }

        let _runtime = self.runtime.enter();
        let mut command = Command::new(&self.program);
        command.arg("start").arg(unit);
        let child = command
            .spawn()
            .map_err(|e| UpdaterError::unit_manager(format!("{unit}: {e}")))?;

        let job_unit = unit.to_string();
        let events = self.events.clone();
        let subscribed = Arc::clone(&self.subscribed);
        self.runtime.spawn(async move {
            let mut child = child;
            let result = match child.wait().await {
                Ok(status) if status.success() => RESULT_DONE,
                Ok(status) => {
                    warn!(unit = %job_unit, %status, "Unit start job failed");
                    RESULT_FAILED
                }
                Err(e) => {
                    warn!(unit = %job_unit, error = %e, "Lost track of unit start job");
                    RESULT_FAILED
                }
            };

            if !subscribed.load(Ordering::SeqCst) {
                debug!(unit = %job_unit, result, "Not subscribed, dropping unit signal");
                return;
            }
            let change = UnitStateChange::new(job_unit, result);
            if events.send(ServiceEvent::UnitStateChanged(change)).is_err() {
                debug!("Event loop closed, dropping unit signal");
            }
        });

        info!(unit = %unit, "Unit start requested");
        Ok(())
    }
}
