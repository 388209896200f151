//! Redfish leak-detector plugin.
//!
//! Polls every configured `LeakDetector` resource and publishes either the
//! binary `leak_detector_status` gauge or the `leak_detector_health` /
//! `leak_detector_state` code gauges, depending on the [`LeakVariant`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::codec;
use crate::collector::{Endpoint, EndpointFetch, Handler, HandlerError, ScrapeTask};
use crate::metrics::MetricResolver;
use crate::metrics::leak::{
    LEAK_DETECTOR_HEALTH, LEAK_DETECTOR_STATE, LEAK_DETECTOR_STATUS, LEAK_GROUP,
};
use crate::plugin::{Plugin, PluginError, ScrapeContext};

/// Chassis polled when none is configured.
pub const DEFAULT_CHASSIS_ID: &str = "Chassis_0";

/// Detectors polled when none are configured.
pub const DEFAULT_DETECTORS: [&str; 4] = [
    "Chassis_0_LeakDetector_0_ColdPlate",
    "Chassis_0_LeakDetector_0_Manifold",
    "Chassis_0_LeakDetector_1_ColdPlate",
    "Chassis_0_LeakDetector_1_Manifold",
];

/// Which gauges a leak-detector scrape publishes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeakVariant {
    /// `leak_detector_status{name,id}`: 1 when state and health are OK.
    #[default]
    Status,
    /// `leak_detector_health` and `leak_detector_state` codes by detector id and type.
    Health,
}

/// Plugin polling a fixed list of leak-detector endpoints.
#[derive(Debug, Clone)]
pub struct LeakDetectorPlugin {
    variant: LeakVariant,
    endpoints: Vec<Endpoint>,
}

impl LeakDetectorPlugin {
    pub fn new(variant: LeakVariant, endpoints: Vec<Endpoint>) -> Self {
        Self { variant, endpoints }
    }

    /// Poll `detectors` of `chassis`.
    pub fn for_chassis<S: AsRef<str>>(variant: LeakVariant, chassis: &str, detectors: &[S]) -> Self {
        let endpoints = detectors
            .iter()
            .map(|d| Endpoint::leak_detector(chassis, d.as_ref()))
            .collect();
        Self::new(variant, endpoints)
    }

    /// Poll the four default detectors of `Chassis_0`.
    pub fn with_defaults(variant: LeakVariant) -> Self {
        Self::for_chassis(variant, DEFAULT_CHASSIS_ID, &DEFAULT_DETECTORS)
    }

    pub fn variant(&self) -> LeakVariant {
        self.variant
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    fn handler(&self, metrics: &Arc<dyn MetricResolver>) -> Arc<dyn Handler> {
        match self.variant {
            LeakVariant::Status => Arc::new(StatusHandler::new(Arc::clone(metrics))),
            LeakVariant::Health => Arc::new(HealthStateHandler::new(Arc::clone(metrics))),
        }
    }
}

impl Plugin for LeakDetectorPlugin {
    fn name(&self) -> &str {
        match self.variant {
            LeakVariant::Status => "leak_detector.status",
            LeakVariant::Health => "leak_detector.health",
        }
    }

    fn apply(&self, ctx: &ScrapeContext<'_>) -> Result<(), PluginError> {
        if self.endpoints.is_empty() {
            return Err(PluginError::NoEndpoints(self.name().to_owned()));
        }

        let handlers = vec![self.handler(ctx.metrics)];
        for endpoint in &self.endpoints {
            let fetch = EndpointFetch::new(
                Arc::clone(ctx.transport),
                ctx.base_url.clone(),
                endpoint.clone(),
                ctx.credentials.cloned(),
                ctx.cancel.clone(),
            );
            ctx.pool
                .add_task(ScrapeTask::new(endpoint.as_str(), fetch, handlers.clone()));
        }

        tracing::debug!(
            plugin = self.name(),
            tasks = self.endpoints.len(),
            "Leak detector scrapes scheduled"
        );
        Ok(())
    }
}

/// Writes `leak_detector_status{name,id}`.
pub struct StatusHandler {
    metrics: Arc<dyn MetricResolver>,
}

impl StatusHandler {
    pub fn new(metrics: Arc<dyn MetricResolver>) -> Self {
        Self { metrics }
    }
}

impl Handler for StatusHandler {
    fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let status = codec::decode(body)?;
        write_gauge(
            self.metrics.as_ref(),
            LEAK_DETECTOR_STATUS,
            &[status.name.as_str(), status.id.as_str()],
            status.binary_value(),
        );
        Ok(())
    }
}

/// Writes `leak_detector_health` and `leak_detector_state`, both labeled
/// `{detector_id,type}`.
pub struct HealthStateHandler {
    metrics: Arc<dyn MetricResolver>,
}

impl HealthStateHandler {
    pub fn new(metrics: Arc<dyn MetricResolver>) -> Self {
        Self { metrics }
    }
}

impl Handler for HealthStateHandler {
    fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let status = codec::decode(body)?;
        let labels = [status.id.as_str(), status.detector_type.as_str()];
        write_gauge(
            self.metrics.as_ref(),
            LEAK_DETECTOR_HEALTH,
            &labels,
            status.health_value(),
        );
        write_gauge(
            self.metrics.as_ref(),
            LEAK_DETECTOR_STATE,
            &labels,
            status.state_value(),
        );
        Ok(())
    }
}

/// Best-effort gauge write: misses and label errors are logged, not returned.
fn write_gauge(metrics: &dyn MetricResolver, name: &str, labels: &[&str], value: f64) {
    let Some(gauge) = metrics.resolve_gauge(LEAK_GROUP, name) else {
        tracing::debug!(group = LEAK_GROUP, metric = name, "Metric not registered, skipping");
        return;
    };
    if let Err(e) = gauge.set(labels, value) {
        tracing::debug!(metric = name, error = %e, "Metric write skipped");
    }
}
