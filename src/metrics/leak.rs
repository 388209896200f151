//! Leak-detector metric group.

use crate::metrics::{MetricRegistry, MetricsError};

/// Group holding all leak-detector gauges.
pub const LEAK_GROUP: &str = "leak";

/// Binary detector status, labeled by `name` and `id`.
pub const LEAK_DETECTOR_STATUS: &str = "leak_detector_status";

/// Health code (`OK=0`, `Warning=1`, `Critical=2`, unknown `-1`), labeled by
/// `detector_id` and `type`.
pub const LEAK_DETECTOR_HEALTH: &str = "leak_detector_health";

/// State code (`Enabled=1`, `Disabled=0`, unknown `-1`), labeled by
/// `detector_id` and `type`.
pub const LEAK_DETECTOR_STATE: &str = "leak_detector_state";

/// Labels of [`LEAK_DETECTOR_STATUS`].
pub const STATUS_LABELS: [&str; 2] = ["name", "id"];

/// Labels of [`LEAK_DETECTOR_HEALTH`] and [`LEAK_DETECTOR_STATE`].
pub const DETECTOR_LABELS: [&str; 2] = ["detector_id", "type"];

/// Install the leak-detector gauges into `registry`.
///
/// # Errors
/// Returns `MetricsError` if any of the gauges is already registered.
pub fn register(registry: &MetricRegistry) -> Result<(), MetricsError> {
    registry.register_gauge(
        LEAK_GROUP,
        LEAK_DETECTOR_STATUS,
        "Leak detector status (1 = detector state and health OK, 0 otherwise)",
        &STATUS_LABELS,
    )?;
    registry.register_gauge(
        LEAK_GROUP,
        LEAK_DETECTOR_HEALTH,
        "Leak detector health (0 = OK, 1 = Warning, 2 = Critical, -1 = unknown)",
        &DETECTOR_LABELS,
    )?;
    registry.register_gauge(
        LEAK_GROUP,
        LEAK_DETECTOR_STATE,
        "Leak detector state (1 = Enabled, 0 = Disabled, -1 = unknown)",
        &DETECTOR_LABELS,
    )?;
    Ok(())
}
