//! Metric Registry
//!
//! Label-keyed gauge store that scrape handlers write into. Handlers never see
//! the concrete store: they ask a [`MetricResolver`] for a handle by group and
//! metric name, and a miss is simply `None`.
//!
//! # Components
//!
//! - [`MetricRegistry`]: Owning store backed by a `prometheus` registry
//! - [`MetricResolver`]: Lookup contract handed to plugins
//! - [`GaugeHandle`]: Label-parameterized gauge sink
//! - [`leak`]: Leak-detector metric group definitions

mod error;
pub mod leak;
mod registry;

pub use error::MetricsError;
pub use registry::{GaugeHandle, MetricEntry, MetricRegistry, MetricResolver};
