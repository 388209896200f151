//! Application configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::collector::DEFAULT_CONCURRENCY;
use crate::plugin::{LeakDetectorPlugin, LeakVariant};
use crate::plugin::leak::{DEFAULT_CHASSIS_ID, DEFAULT_DETECTORS};
use crate::transport::{Credentials, DEFAULT_TIMEOUT, RetryPolicy, TransportConfig};

use super::validation::{ConfigError, expand_env_vars, parse_base_url, validate_path_segment};

// =============================================================================
// Constants
// =============================================================================

/// Default scrape interval (30 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum allowed scrape interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum allowed retry backoff (5 minutes).
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chassis_id() -> String {
    DEFAULT_CHASSIS_ID.to_string()
}

fn default_detectors() -> Vec<String> {
    DEFAULT_DETECTORS.iter().map(|d| (*d).to_string()).collect()
}

// =============================================================================
// Target Configuration
// =============================================================================

/// Management controller to poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL, e.g. `https://10.0.0.5`.
    pub base_url: String,

    /// Basic-auth user; `${VAR}` and `${VAR:-default}` are expanded.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password; `${VAR}` and `${VAR:-default}` are expanded.
    #[serde(default)]
    pub password: Option<String>,

    /// Skip TLS certificate verification (self-signed BMC certificates).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TargetConfig {
    /// Parsed base URL.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an unusable URL.
    pub fn url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.base_url)
    }

    /// Credentials after environment expansion.
    ///
    /// `None` when the user is missing or expands to an empty string; a
    /// missing password becomes an empty one.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = expand_env_vars(self.username.as_deref()?);
        if username.is_empty() {
            return None;
        }
        let password = self
            .password
            .as_deref()
            .map(expand_env_vars)
            .unwrap_or_default();
        Some(Credentials::new(username, password))
    }
}

// =============================================================================
// Scrape Configuration
// =============================================================================

/// Scrape cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Time between scrape cycles (default: 30s, minimum: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum concurrent scrape tasks (default: 8).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

// =============================================================================
// Leak Detector Configuration
// =============================================================================

/// Leak-detector endpoints and the gauges they publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakDetectorsConfig {
    /// `status` (binary gauge) or `health` (health/state codes).
    #[serde(default)]
    pub variant: LeakVariant,

    /// Chassis holding the detectors (default: `Chassis_0`).
    #[serde(default = "default_chassis_id")]
    pub chassis_id: String,

    /// Detector resource ids.
    #[serde(default = "default_detectors")]
    pub detectors: Vec<String>,
}

impl Default for LeakDetectorsConfig {
    fn default() -> Self {
        Self {
            variant: LeakVariant::default(),
            chassis_id: default_chassis_id(),
            detectors: default_detectors(),
        }
    }
}

impl LeakDetectorsConfig {
    /// Validate chassis and detector ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path_segment("leak_detectors.chassis_id", &self.chassis_id)?;

        if self.detectors.is_empty() {
            return Err(ConfigError::ValidationError(
                "leak_detectors.detectors cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for detector in &self.detectors {
            validate_path_segment("leak_detectors.detectors entry", detector)?;
            if !seen.insert(detector) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate leak detector: '{}'",
                    detector
                )));
            }
        }
        Ok(())
    }

    /// Plugin polling the configured detectors.
    pub fn plugin(&self) -> LeakDetectorPlugin {
        LeakDetectorPlugin::for_chassis(self.variant, &self.chassis_id, &self.detectors)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Management controller to poll.
    pub target: TargetConfig,

    /// Scrape cycle settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Retry policy for transient transport failures.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Leak-detector endpoints.
    #[serde(default)]
    pub leak_detectors: LeakDetectorsConfig,
}

impl AppConfig {
    /// Configuration polling `base_url` with every other setting at its default.
    pub fn for_target(base_url: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                base_url: base_url.into(),
                ..TargetConfig::default()
            },
            scrape: ScrapeConfig::default(),
            retry: RetryPolicy::default(),
            leak_detectors: LeakDetectorsConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    /// Returns `ConfigError` if the document cannot be parsed or validated.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target.url()?;

        if self.scrape.interval < MIN_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "scrape.interval must be at least {:?}",
                MIN_INTERVAL
            )));
        }

        if self.scrape.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "scrape.timeout must be positive".to_string(),
            ));
        }

        if self.scrape.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "scrape.concurrency must be positive".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be positive".to_string(),
            ));
        }

        for (field, value) in [
            ("retry.initial_backoff", self.retry.initial_backoff),
            ("retry.max_backoff", self.retry.max_backoff),
        ] {
            if value > MAX_RETRY_BACKOFF {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be at most {:?}",
                    field, MAX_RETRY_BACKOFF
                )));
            }
        }

        self.leak_detectors.validate()?;

        Ok(())
    }

    /// Transport options derived from the target, scrape and retry sections.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.scrape.timeout,
            retry: self.retry,
            accept_invalid_certs: self.target.accept_invalid_certs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
target:
  base_url: https://10.0.0.5
  username: admin
  password: ${NONEXISTENT_LEAKWATCH_PASSWORD:-changeme}
  accept_invalid_certs: true
scrape:
  interval: 1m
  timeout: 5s
  concurrency: 2
retry:
  max_attempts: 3
  initial_backoff: 50ms
  max_backoff: 1s
leak_detectors:
  variant: health
  chassis_id: Chassis_1
  detectors:
    - Chassis_1_LeakDetector_0_Manifold
"#;

    #[test]
    fn test_load_full_config() {
        let config = AppConfig::from_yaml(FULL_CONFIG).unwrap();

        assert_eq!(config.target.url().unwrap().as_str(), "https://10.0.0.5/");
        assert!(config.target.accept_invalid_certs);
        assert_eq!(config.scrape.interval, Duration::from_secs(60));
        assert_eq!(config.scrape.timeout, Duration::from_secs(5));
        assert_eq!(config.scrape.concurrency, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.leak_detectors.variant, LeakVariant::Health);
        assert_eq!(config.leak_detectors.chassis_id, "Chassis_1");
        assert_eq!(config.leak_detectors.detectors.len(), 1);
        assert_eq!(
            config.leak_detectors.plugin().endpoints()[0].as_str(),
            "/redfish/v1/Chassis/Chassis_1/ThermalSubsystem/LeakDetection/LeakDetectors/Chassis_1_LeakDetector_0_Manifold"
        );

        let creds = config.target.credentials().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "changeme");

        let transport = config.transport_config();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.retry.max_attempts, 3);
        assert!(transport.accept_invalid_certs);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_yaml("target:\n  base_url: http://bmc.local\n").unwrap();

        assert_eq!(config.scrape.interval, DEFAULT_INTERVAL);
        assert_eq!(config.scrape.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.scrape.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.leak_detectors.variant, LeakVariant::Status);
        assert_eq!(config.leak_detectors.chassis_id, "Chassis_0");
        assert_eq!(config.leak_detectors.detectors.len(), 4);
        assert!(config.target.credentials().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leakwatch.yaml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.leak_detectors.chassis_id, "Chassis_1");

        let missing = AppConfig::load(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = AppConfig::from_yaml("target: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::for_target("https://bmc.local");
        assert!(config.validate().is_ok());

        config.scrape.interval = Duration::from_millis(100);
        assert!(config.validate().unwrap_err().to_string().contains("scrape.interval"));
        config.scrape.interval = DEFAULT_INTERVAL;

        config.scrape.concurrency = 0;
        assert!(config.validate().is_err());
        config.scrape.concurrency = 1;

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 1;

        config.leak_detectors.detectors.push("Chassis_0_LeakDetector_0_ColdPlate".to_string());
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("duplicate leak detector")
        );
        config.leak_detectors.detectors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_huge_backoff() {
        let yaml = "target:\n  base_url: https://bmc.local\nretry:\n  initial_backoff: 300000000000years\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("retry.initial_backoff"));

        let mut config = AppConfig::for_target("https://bmc.local");
        config.retry.max_backoff = MAX_RETRY_BACKOFF + Duration::from_secs(1);
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("retry.max_backoff")
        );

        config.retry.max_backoff = MAX_RETRY_BACKOFF;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let config = AppConfig::for_target("not a url");
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("invalid base_url")
        );
    }

    #[test]
    fn test_empty_username_means_no_credentials() {
        let target = TargetConfig {
            base_url: "https://bmc.local".to_string(),
            username: Some("${NONEXISTENT_LEAKWATCH_USER}".to_string()),
            password: Some("secret".to_string()),
            accept_invalid_certs: false,
        };
        assert!(target.credentials().is_none());

        let target = TargetConfig {
            username: Some("root".to_string()),
            password: None,
            ..target
        };
        let creds = target.credentials().unwrap();
        assert_eq!(creds.password, "");
    }
}
