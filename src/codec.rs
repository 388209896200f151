//! Redfish leak-detector payload decoding.
//!
//! Decodes the `LeakDetector` resource into a [`DetectorStatus`] and maps the
//! textual health/state vocabularies onto gauge values. The mappings are total:
//! anything outside the known vocabulary becomes [`UNKNOWN_VALUE`] instead of an
//! error, so an unrecognized reading still shows up as a sample.

use std::str::FromStr;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Gauge value for an unrecognized health or state string.
pub const UNKNOWN_VALUE: f64 = -1.0;

/// Failure to decode a leak-detector payload.
#[derive(Debug, Error)]
#[error("invalid leak detector payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// `Status` block of a Redfish resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceStatus {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Health")]
    pub health: String,
}

/// Decoded leak-detector resource.
///
/// Covers both payload shapes served by BMCs: the one carrying `Name` and
/// `DetectorState`, and the one carrying `LeakDetectorType`. Fields absent from
/// the payload decode to empty strings; only `Id` is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetectorStatus {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "LeakDetectorType", default)]
    pub detector_type: String,
    #[serde(rename = "DetectorState", default)]
    pub detector_state: String,
    #[serde(rename = "Status", default)]
    pub status: ResourceStatus,
}

impl DetectorStatus {
    /// Health gauge value, see [`health_to_value`].
    pub fn health_value(&self) -> f64 {
        health_to_value(&self.status.health)
    }

    /// State gauge value, see [`state_to_value`].
    pub fn state_value(&self) -> f64 {
        state_to_value(&self.status.state)
    }

    /// Binary status value, see [`binary_status_value`].
    pub fn binary_value(&self) -> f64 {
        binary_status_value(self)
    }
}

/// Decode a leak-detector payload.
///
/// # Errors
/// Returns [`DecodeError`] for malformed JSON, a non-object document, mistyped
/// fields, or a missing `Id`.
pub fn decode(body: &[u8]) -> Result<DetectorStatus, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// Redfish `Status.Health` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Health {
    #[strum(serialize = "OK")]
    Ok,
    Warning,
    Critical,
}

impl Health {
    /// Gauge value for this health level.
    pub fn value(self) -> f64 {
        match self {
            Self::Ok => 0.0,
            Self::Warning => 1.0,
            Self::Critical => 2.0,
        }
    }
}

/// Redfish `Status.State` subset reported for leak detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum State {
    Enabled,
    Disabled,
}

impl State {
    /// Gauge value for this state.
    pub fn value(self) -> f64 {
        match self {
            Self::Enabled => 1.0,
            Self::Disabled => 0.0,
        }
    }
}

/// Map a health string to `OK=0`, `Warning=1`, `Critical=2`, otherwise `-1`.
pub fn health_to_value(health: &str) -> f64 {
    Health::from_str(health).map_or(UNKNOWN_VALUE, Health::value)
}

/// Map a state string to `Enabled=1`, `Disabled=0`, otherwise `-1`.
pub fn state_to_value(state: &str) -> f64 {
    State::from_str(state).map_or(UNKNOWN_VALUE, State::value)
}

/// `1.0` when both the detector state and health read `OK`, `0.0` otherwise.
pub fn binary_status_value(status: &DetectorStatus) -> f64 {
    if status.detector_state == "OK" && status.status.health == "OK" {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(detector_state: &str, health: &str) -> DetectorStatus {
        DetectorStatus {
            id: "D0".to_string(),
            name: "CP0".to_string(),
            detector_type: String::new(),
            detector_state: detector_state.to_string(),
            status: ResourceStatus {
                state: "Enabled".to_string(),
                health: health.to_string(),
            },
        }
    }

    #[test]
    fn test_health_to_value_known() {
        assert_eq!(health_to_value("OK"), 0.0);
        assert_eq!(health_to_value("Warning"), 1.0);
        assert_eq!(health_to_value("Critical"), 2.0);
    }

    #[test]
    fn test_health_to_value_unknown() {
        for input in ["", "ok", "WARNING", "Degraded", " OK", "Critical\n"] {
            assert_eq!(health_to_value(input), UNKNOWN_VALUE, "input {input:?}");
        }
    }

    #[test]
    fn test_state_to_value() {
        assert_eq!(state_to_value("Enabled"), 1.0);
        assert_eq!(state_to_value("Disabled"), 0.0);
        assert_eq!(state_to_value(""), UNKNOWN_VALUE);
        assert_eq!(state_to_value("StandbyOffline"), UNKNOWN_VALUE);
        assert_eq!(state_to_value("enabled"), UNKNOWN_VALUE);
    }

    #[test]
    fn test_binary_status_value() {
        assert_eq!(binary_status_value(&status("OK", "OK")), 1.0);
        assert_eq!(binary_status_value(&status("OK", "Warning")), 0.0);
        assert_eq!(binary_status_value(&status("Critical", "OK")), 0.0);
        assert_eq!(binary_status_value(&status("Unavailable", "Critical")), 0.0);
        assert_eq!(binary_status_value(&status("", "")), 0.0);
    }

    #[test]
    fn test_decode_binary_payload() {
        let body = br#"{"Id":"D0","Name":"CP0","DetectorState":"OK","Status":{"Health":"OK"}}"#;
        let decoded = decode(body).unwrap();

        assert_eq!(decoded.id, "D0");
        assert_eq!(decoded.name, "CP0");
        assert_eq!(decoded.detector_state, "OK");
        assert_eq!(decoded.status.health, "OK");
        assert_eq!(decoded.status.state, "");
        assert_eq!(decoded.binary_value(), 1.0);
    }

    #[test]
    fn test_decode_enumerated_payload() {
        let body = br#"{
            "@odata.id": "/redfish/v1/Chassis/Chassis_0/ThermalSubsystem/LeakDetection/LeakDetectors/D1",
            "Id": "D1",
            "LeakDetectorType": "Manifold",
            "Status": {"Health": "Critical", "State": "Enabled"}
        }"#;
        let decoded = decode(body).unwrap();

        assert_eq!(decoded.detector_type, "Manifold");
        assert_eq!(decoded.health_value(), 2.0);
        assert_eq!(decoded.state_value(), 1.0);
        assert_eq!(decoded.name, "");
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode(b"").is_err());
        assert!(decode(b"not json").is_err());
        assert!(decode(b"[1,2,3]").is_err());
        assert!(decode(br#"{"Name":"CP0"}"#).is_err());
        assert!(decode(br#"{"Id":7}"#).is_err());
        assert!(decode(br#"{"Id":"D0","Status":"OK"}"#).is_err());
    }

    #[test]
    fn test_decode_error_message() {
        let err = decode(b"{").unwrap_err();
        assert!(err.to_string().starts_with("invalid leak detector payload"));
    }

    #[test]
    fn test_vocabulary_display() {
        assert_eq!(Health::Ok.to_string(), "OK");
        assert_eq!(Health::Critical.as_ref(), "Critical");
        assert_eq!(State::Disabled.to_string(), "Disabled");
    }
}
