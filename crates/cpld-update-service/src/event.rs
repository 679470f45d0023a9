//! Events processed by the daemon

use cpld_firmware_update::{InterfacesAdded, RequestedActivation, UnitStateChange};
use serde::{Deserialize, Serialize};

/// One unit of work for the event loop
///
/// Notifications from the image service, the unit manager and the running
/// image watch share the queue with client requests, so the repository sees
/// them strictly one after another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// The image service announced an uploaded image
    ImageAdded(InterfacesAdded),

    /// A client set `RequestedActivation`
    RequestActivation {
        /// Version id
        id: String,
        /// Requested state
        requested: RequestedActivation,
    },

    /// A client invoked `Delete` on a version
    Delete {
        /// Version id
        id: String,
    },

    /// A client invoked `DeleteAll`
    DeleteAll,

    /// A client invoked `Reset` on the factory-reset object
    FactoryReset,

    /// The chassis power state changed
    PowerState {
        /// New `CurrentPowerState` value
        state: String,
    },

    /// The unit manager reported a finished unit
    UnitStateChanged(UnitStateChange),

    /// The running-image link was (re)created
    FunctionalChanged {
        /// Id the link resolves to
        id: Option<String>,
    },
}

impl ServiceEvent {
    /// Parse one line of the JSON control channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a valid event.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpld_firmware_update::UnitResult;

    #[test]
    fn test_parse_request_activation() -> Result<(), serde_json::Error> {
        let event = ServiceEvent::from_json_line(
            r#"{"type":"request_activation","id":"2a1022fe","requested":"Active"}"#,
        )?;
        assert_eq!(
            event,
            ServiceEvent::RequestActivation {
                id: "2a1022fe".to_string(),
                requested: RequestedActivation::Active,
            }
        );
        Ok(())
    }

    #[test]
    fn test_parse_unit_events() -> Result<(), serde_json::Error> {
        let event = ServiceEvent::from_json_line(
            r#"{"type":"unit_state_changed","unit":"obmc-cpld-update-fw@2a1022fe.service","result":"Failed"}"#,
        )?;
        let ServiceEvent::UnitStateChanged(change) = event else {
            return Err(serde::de::Error::custom("wrong variant"));
        };
        assert_eq!(change.result, UnitResult::Failed);

        let event = ServiceEvent::from_json_line("  {\"type\":\"delete_all\"}\n")?;
        assert_eq!(event, ServiceEvent::DeleteAll);
        Ok(())
    }

    #[test]
    fn test_parse_image_added() -> Result<(), serde_json::Error> {
        let line = serde_json::to_string(&ServiceEvent::ImageAdded(InterfacesAdded::image(
            "/xyz/openbmc_project/software/upload",
            "CPLD",
            "2.0",
            "/tmp/images/upload",
        )))?;
        let event = ServiceEvent::from_json_line(&line)?;
        assert!(matches!(event, ServiceEvent::ImageAdded(msg) if msg.object_path.ends_with("upload")));
        Ok(())
    }

    #[test]
    fn test_reject_unknown_event() {
        assert!(ServiceEvent::from_json_line(r#"{"type":"reboot"}"#).is_err());
        assert!(ServiceEvent::from_json_line("not json").is_err());
    }
}
