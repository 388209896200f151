//! Group-keyed metric registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::core::Collector as _;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, TextEncoder};

use crate::metrics::MetricsError;

/// Lookup contract for scrape handlers.
///
/// Plugins depend on this trait rather than on [`MetricRegistry`], so they only
/// know metrics by logical name. Resolution never fails loudly: an absent group,
/// an absent metric, or an entry that is not a gauge all yield `None`.
pub trait MetricResolver: Send + Sync + 'static {
    /// Resolve a gauge family by group and metric name.
    fn resolve_gauge(&self, group: &str, name: &str) -> Option<GaugeHandle>;
}

/// A registered metric family.
#[derive(Clone)]
pub enum MetricEntry {
    /// Gauge family with its declared label names.
    Gauge(GaugeHandle),
    /// Counter family.
    Counter(IntCounterVec),
}

impl std::fmt::Debug for MetricEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gauge(handle) => f.debug_tuple("Gauge").field(handle).finish(),
            Self::Counter(_) => f.write_str("Counter"),
        }
    }
}

/// Handle to a gauge family.
///
/// Cloning is cheap and every clone writes to the same series. Writes are
/// last-write-wins per label tuple; the backend synchronizes concurrent callers.
#[derive(Clone)]
pub struct GaugeHandle {
    name: Arc<str>,
    labels: Arc<[String]>,
    vec: GaugeVec,
}

impl std::fmt::Debug for GaugeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeHandle")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl GaugeHandle {
    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared label names, in order.
    pub fn label_names(&self) -> &[String] {
        &self.labels
    }

    /// Set the series identified by `labels` to `value`.
    ///
    /// An unseen label tuple creates a new series.
    ///
    /// # Errors
    /// Returns `MetricsError::LabelArity` if the number of label values differs
    /// from the declared label names. Nothing is written in that case.
    pub fn set(&self, labels: &[&str], value: f64) -> Result<(), MetricsError> {
        self.check_arity(labels)?;
        self.vec.get_metric_with_label_values(labels)?.set(value);
        Ok(())
    }

    /// Read the current value of a series without creating it.
    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        if labels.len() != self.labels.len() {
            return None;
        }

        let wanted: HashMap<&str, &str> = self
            .labels
            .iter()
            .map(String::as_str)
            .zip(labels.iter().copied())
            .collect();

        self.vec
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == wanted.len()
                    && pairs
                        .iter()
                        .all(|p| wanted.get(p.get_name()) == Some(&p.get_value()))
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of live series in this family.
    pub fn series_count(&self) -> usize {
        self.vec
            .collect()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }

    fn check_arity(&self, labels: &[&str]) -> Result<(), MetricsError> {
        if labels.len() == self.labels.len() {
            Ok(())
        } else {
            Err(MetricsError::LabelArity {
                name: self.name.to_string(),
                expected: self.labels.len(),
                actual: labels.len(),
            })
        }
    }
}

/// Owning metric store: group name → metric name → entry.
///
/// Entries are created by the exporter at startup and stay registered for the
/// life of the process, so a resolved handle never goes stale. Every family is
/// also registered with an inner `prometheus::Registry` for exposition.
pub struct MetricRegistry {
    groups: RwLock<HashMap<String, HashMap<String, MetricEntry>>>,
    backend: prometheus::Registry,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MetricRegistry")
            .field("group_count", &groups.len())
            .finish_non_exhaustive()
    }
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            backend: prometheus::Registry::new(),
        }
    }

    /// Register a gauge family under `group`.
    ///
    /// # Errors
    /// Returns `MetricsError::Duplicate` if the group already holds `name`, or
    /// `MetricsError::Prometheus` if the backend rejects the family (invalid
    /// name, or the same name registered under another group).
    pub fn register_gauge(
        &self,
        group: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<GaugeHandle, MetricsError> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        ensure_vacant(&groups, group, name)?;

        let vec = GaugeVec::new(Opts::new(name, help), labels)?;
        self.backend.register(Box::new(vec.clone()))?;

        let handle = GaugeHandle {
            name: Arc::from(name),
            labels: labels.iter().map(|l| (*l).to_owned()).collect(),
            vec,
        };
        groups
            .entry(group.to_owned())
            .or_default()
            .insert(name.to_owned(), MetricEntry::Gauge(handle.clone()));

        tracing::debug!(group, metric = name, "Gauge registered");
        Ok(handle)
    }

    /// Register a counter family under `group`.
    ///
    /// # Errors
    /// Same conditions as [`register_gauge`](Self::register_gauge).
    pub fn register_counter(
        &self,
        group: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<IntCounterVec, MetricsError> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        ensure_vacant(&groups, group, name)?;

        let vec = IntCounterVec::new(Opts::new(name, help), labels)?;
        self.backend.register(Box::new(vec.clone()))?;

        groups
            .entry(group.to_owned())
            .or_default()
            .insert(name.to_owned(), MetricEntry::Counter(vec.clone()));

        tracing::debug!(group, metric = name, "Counter registered");
        Ok(vec)
    }

    /// Look up an entry of any shape.
    pub fn entry(&self, group: &str, name: &str) -> Option<MetricEntry> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(group)?.get(name).cloned()
    }

    /// Names of all registered groups.
    pub fn group_names(&self) -> Vec<String> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Render every family in the Prometheus text exposition format.
    ///
    /// # Errors
    /// Returns `MetricsError::Prometheus` if encoding fails.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.backend.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| MetricsError::Prometheus(prometheus::Error::Msg(e.to_string())))
    }
}

impl MetricResolver for MetricRegistry {
    fn resolve_gauge(&self, group: &str, name: &str) -> Option<GaugeHandle> {
        match self.entry(group, name)? {
            MetricEntry::Gauge(handle) => Some(handle),
            MetricEntry::Counter(_) => None,
        }
    }
}

fn ensure_vacant(
    groups: &HashMap<String, HashMap<String, MetricEntry>>,
    group: &str,
    name: &str,
) -> Result<(), MetricsError> {
    if groups.get(group).is_some_and(|g| g.contains_key(name)) {
        return Err(MetricsError::Duplicate {
            group: group.to_owned(),
            name: name.to_owned(),
        });
    }
    Ok(())
}
