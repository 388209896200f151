//! Scrape plugins.
//!
//! A plugin is registered once per scrape cycle: it receives a
//! [`ScrapeContext`] and enqueues one [`ScrapeTask`](crate::collector::ScrapeTask)
//! per endpoint it polls. Plugins only see the metric store through
//! [`MetricResolver`], and credentials arrive as an opaque optional value.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::collector::TaskPool;
use crate::metrics::MetricResolver;
use crate::transport::{Credentials, Transport};

pub mod leak;

pub use leak::{HealthStateHandler, LeakDetectorPlugin, LeakVariant, StatusHandler};

/// Errors a plugin can return from [`Plugin::apply`].
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin has nothing to poll.
    #[error("plugin '{0}' has no endpoints")]
    NoEndpoints(String),

    /// Plugin configuration is unusable.
    #[error("plugin config error: {0}")]
    Config(String),
}

/// Everything a plugin needs to schedule its scrapes.
#[derive(Clone, Copy)]
pub struct ScrapeContext<'a> {
    /// Base URL of the management controller.
    pub base_url: &'a Url,
    /// Cancellation signal owned by the exporter.
    pub cancel: &'a CancellationToken,
    /// Shared retrying HTTP transport.
    pub transport: &'a Arc<Transport>,
    /// Metric lookup by group and name.
    pub metrics: &'a Arc<dyn MetricResolver>,
    /// Basic-auth credentials, if any.
    pub credentials: Option<&'a Credentials>,
    /// Pool the plugin's tasks are submitted to.
    pub pool: &'a TaskPool,
}

impl std::fmt::Debug for ScrapeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeContext")
            .field("base_url", &self.base_url.as_str())
            .field("has_credentials", &self.credentials.is_some())
            .field("pool", self.pool)
            .finish_non_exhaustive()
    }
}

/// A pluggable set of scrapes.
pub trait Plugin: Send + Sync + 'static {
    /// Plugin name for diagnostics.
    fn name(&self) -> &str;

    /// Enqueue this plugin's scrape tasks into `ctx.pool`.
    ///
    /// # Errors
    /// Returns `PluginError` if the plugin cannot schedule anything.
    fn apply(&self, ctx: &ScrapeContext<'_>) -> Result<(), PluginError>;
}
