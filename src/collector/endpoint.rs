//! Polled endpoint paths.

use std::fmt;

/// Redfish collection holding a chassis' leak detectors.
const LEAK_DETECTORS_PATH: &str = "ThermalSubsystem/LeakDetection/LeakDetectors";

/// Relative path of one polled resource.
///
/// Always starts with `/`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint from a relative path, adding the leading `/` if missing.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        if path.starts_with('/') {
            Self(path)
        } else {
            Self(format!("/{path}"))
        }
    }

    /// Leak detector `detector` of chassis `chassis`.
    pub fn leak_detector(chassis: &str, detector: &str) -> Self {
        Self(format!(
            "/redfish/v1/Chassis/{chassis}/{LEAK_DETECTORS_PATH}/{detector}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, usually the resource id.
    pub fn resource_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_detector_path() {
        let endpoint = Endpoint::leak_detector("Chassis_0", "Chassis_0_LeakDetector_0_ColdPlate");
        assert_eq!(
            endpoint.as_str(),
            "/redfish/v1/Chassis/Chassis_0/ThermalSubsystem/LeakDetection/LeakDetectors/Chassis_0_LeakDetector_0_ColdPlate"
        );
        assert_eq!(endpoint.resource_id(), "Chassis_0_LeakDetector_0_ColdPlate");
    }

    #[test]
    fn test_new_adds_leading_slash() {
        assert_eq!(Endpoint::new("redfish/v1").as_str(), "/redfish/v1");
        assert_eq!(Endpoint::new("/redfish/v1").as_str(), "/redfish/v1");
        assert_eq!(Endpoint::new("/redfish/v1").to_string(), "/redfish/v1");
    }
}
