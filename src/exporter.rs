//! Exporter host.
//!
//! Owns the transport, the metric registry and the configured plugins, and
//! drives one fresh [`TaskPool`] per scrape cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::IntCounterVec;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::collector::{DiagnosticsSink, PoolReport, TaskPool, TracingSink};
use crate::config::{AppConfig, ConfigError};
use crate::metrics::{GaugeHandle, MetricRegistry, MetricResolver, MetricsError, leak};
use crate::plugin::{Plugin, PluginError, ScrapeContext};
use crate::transport::{Credentials, Transport};

/// Group holding the exporter's own metrics.
pub const SELF_GROUP: &str = "leakwatch";

/// Scrape cycles by result (`success` or `partial`).
pub const SCRAPE_TOTAL: &str = "leakwatch_scrape_total";

/// Wall time of the last scrape cycle.
pub const SCRAPE_DURATION: &str = "leakwatch_scrape_duration_seconds";

/// Errors building an [`Exporter`].
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
}

/// Periodic scraper for one management controller.
pub struct Exporter {
    base_url: Url,
    credentials: Option<Credentials>,
    transport: Arc<Transport>,
    registry: Arc<MetricRegistry>,
    plugins: Vec<Box<dyn Plugin>>,
    sink: Arc<dyn DiagnosticsSink>,
    concurrency: usize,
    interval: Duration,
    scrape_total: IntCounterVec,
    scrape_duration: GaugeHandle,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("base_url", &self.base_url.as_str())
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("concurrency", &self.concurrency)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Build an exporter from a validated configuration.
    ///
    /// # Errors
    /// Returns `ExporterError` if the config is invalid, the HTTP client
    /// cannot be built, or metric registration fails.
    pub fn new(config: &AppConfig) -> Result<Self, ExporterError> {
        config.validate()?;

        let base_url = config.target.url()?;
        let transport = Arc::new(Transport::new(&config.transport_config())?);

        let registry = Arc::new(MetricRegistry::new());
        leak::register(&registry)?;
        let scrape_total = registry.register_counter(
            SELF_GROUP,
            SCRAPE_TOTAL,
            "Scrape cycles by result",
            &["result"],
        )?;
        let scrape_duration = registry.register_gauge(
            SELF_GROUP,
            SCRAPE_DURATION,
            "Duration of the last scrape cycle in seconds",
            &[],
        )?;

        let plugin = config.leak_detectors.plugin();
        tracing::info!(
            base_url = %base_url,
            plugin = plugin.name(),
            endpoints = plugin.endpoints().len(),
            concurrency = config.scrape.concurrency,
            interval = ?config.scrape.interval,
            "Exporter configured"
        );

        Ok(Self {
            base_url,
            credentials: config.target.credentials(),
            transport,
            registry,
            plugins: vec![Box::new(plugin)],
            sink: Arc::new(TracingSink),
            concurrency: config.scrape.concurrency,
            interval: config.scrape.interval,
            scrape_total,
            scrape_duration,
        })
    }

    /// Replace the diagnostics sink (default: [`TracingSink`]).
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Add another plugin to every scrape cycle.
    pub fn with_plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Registry holding every published metric.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Run one scrape cycle and wait for all of its tasks.
    ///
    /// A plugin that fails to schedule is logged and skipped; the others
    /// still run, and the cycle counts as `partial`.
    pub async fn scrape_once(&self, cancel: &CancellationToken) -> PoolReport {
        let start = Instant::now();
        let pool = TaskPool::new(self.concurrency, cancel.clone(), Arc::clone(&self.sink));
        let metrics: Arc<dyn MetricResolver> = self.registry.clone();

        let ctx = ScrapeContext {
            base_url: &self.base_url,
            cancel,
            transport: &self.transport,
            metrics: &metrics,
            credentials: self.credentials.as_ref(),
            pool: &pool,
        };
        let mut unscheduled = 0;
        for plugin in &self.plugins {
            if let Err(e) = plugin.apply(&ctx) {
                tracing::error!(plugin = plugin.name(), error = %e, "Plugin failed to schedule");
                unscheduled += 1;
            }
        }

        let report = pool.wait().await;
        let elapsed = start.elapsed();

        let result = if unscheduled == 0 && report.all_succeeded() {
            "success"
        } else {
            "partial"
        };
        self.scrape_total.with_label_values(&[result]).inc();
        if let Err(e) = self.scrape_duration.set(&[], elapsed.as_secs_f64()) {
            tracing::debug!(error = %e, "Scrape duration not recorded");
        }

        tracing::info!(
            %report,
            unscheduled,
            duration_ms = elapsed.as_millis(),
            "Scrape cycle finished"
        );
        report
    }

    /// Scrape on the configured interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.interval, "Exporter started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.scrape_once(&cancel).await;
        }
        tracing::info!("Exporter stopped");
    }
}
