//! Configuration module for Leakwatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Target settings (BMC base URL, credentials, TLS verification)
//! - Scrape settings (interval, request timeout, concurrency)
//! - Retry policy for transient transport failures
//! - Leak-detector endpoints and published variant

mod app;
mod validation;

pub use app::{AppConfig, LeakDetectorsConfig, ScrapeConfig, TargetConfig};
pub use validation::{
    ConfigError, expand_env_vars, parse_base_url, parse_duration, validate_path_segment,
};

// Re-export constants
pub use app::{DEFAULT_INTERVAL, MAX_RETRY_BACKOFF, MIN_INTERVAL};
