//! Leakwatch - Redfish Leak-Detector Telemetry
//!
//! Polls the leak detectors of a baseboard management controller over the
//! Redfish API and publishes their status as Prometheus gauges. It can be
//! used as a library, or run as a standalone binary with the `leakwatch`
//! executable.
//!
//! # Architecture
//!
//! - **Codec**: Leak-detector JSON payloads to numeric gauge values
//! - **Metrics**: Grouped gauge registry backed by `prometheus`
//! - **Collector**: Scrape tasks, handlers and a bounded task pool
//! - **Transport**: Retrying, cancellable HTTP GET with basic auth
//! - **Plugin**: Per-resource scrape scheduling (leak detectors)
//! - **Exporter**: Config-driven scrape loop tying it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use leakwatch::{AppConfig, Exporter};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("configs/leakwatch.yaml")?;
//! let exporter = Exporter::new(&config)?;
//!
//! let report = exporter.scrape_once(&CancellationToken::new()).await;
//! println!("{report}");
//! print!("{}", exporter.registry().encode_text()?);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod collector;
pub mod config;
pub mod exporter;
pub mod metrics;
pub mod plugin;
pub mod transport;

pub use codec::{DecodeError, DetectorStatus};
pub use collector::{DiagnosticsSink, PoolReport, ScrapeTask, TaskPool};
pub use config::{AppConfig, ConfigError};
pub use exporter::{Exporter, ExporterError};
pub use metrics::{MetricRegistry, MetricResolver, MetricsError};
pub use plugin::{LeakDetectorPlugin, LeakVariant, Plugin};
pub use transport::{Credentials, RetryPolicy, Transport, TransportError};
