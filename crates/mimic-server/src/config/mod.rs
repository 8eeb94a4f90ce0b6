//! Configuration for the mock server.
//!
//! Resolution order: built-in defaults, then the config file (YAML or JSON),
//! then CLI overrides. File sections merge field-wise onto the defaults, so
//! a file that only sets `latency.min_ms` keeps the default `max_ms`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is not
/// given.
const DEFAULT_CONFIG_FILE: &str = "mimic.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the OpenAPI spec. Required once merging is complete.
    pub spec: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// Serve the mock over TLS when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Watch the spec file and hot-reload routes on change.
    pub watch: bool,
    /// Keep the resource store across hot-reloads.
    pub preserve_state_on_reload: bool,
    /// Route CRUD methods through the resource store instead of generating
    /// a fresh body per request.
    pub stateful: bool,
    pub endpoints: EndpointsConfig,
    pub data: DataConfig,
    pub latency: LatencyConfig,
    pub chaos: ChaosConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Paths of the built-in admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub health: String,
    pub logs: String,
    pub state: String,
    pub reset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub array_min: usize,
    pub array_max: usize,
    /// Seed for deterministic data generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Uniform random delay added to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Probabilistic forced-failure injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub enabled: bool,
    pub failure_rate: f64,
    pub status_codes: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: None,
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            watch: false,
            preserve_state_on_reload: true,
            stateful: true,
            endpoints: EndpointsConfig::default(),
            data: DataConfig::default(),
            latency: LatencyConfig::default(),
            chaos: ChaosConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            logs: "/__mock__/logs".to_string(),
            state: "/__mock__/state".to_string(),
            reset: "/__mock__/reset".to_string(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            array_min: 1,
            array_max: 5,
            seed: None,
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_rate: 0.1,
            status_codes: vec![500],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

/// CLI-provided values layered on top of the file config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub spec: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub watch: Option<bool>,
    pub stateful: Option<bool>,
    pub seed: Option<u64>,
}

impl Config {
    /// Resolve the effective configuration: defaults <- file <- overrides.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self, anyhow::Error> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(ref spec) = overrides.spec {
            self.spec = Some(spec.clone());
        }
        if let Some(ref host) = overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(watch) = overrides.watch {
            self.watch = watch;
        }
        if let Some(stateful) = overrides.stateful {
            self.stateful = stateful;
        }
        if let Some(seed) = overrides.seed {
            self.data.seed = Some(seed);
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.spec.is_none() {
            anyhow::bail!("spec path is required: pass --spec or set `spec` in the config file");
        }
        if !(0.0..=1.0).contains(&self.chaos.failure_rate) {
            anyhow::bail!(
                "chaos.failure_rate must be between 0.0 and 1.0, got {}",
                self.chaos.failure_rate
            );
        }
        if self.latency.min_ms > self.latency.max_ms {
            anyhow::bail!(
                "latency.min_ms ({}) must not exceed latency.max_ms ({})",
                self.latency.min_ms,
                self.latency.max_ms
            );
        }
        if self.data.array_min > self.data.array_max {
            anyhow::bail!(
                "data.array_min ({}) must not exceed data.array_max ({})",
                self.data.array_min,
                self.data.array_max
            );
        }
        Ok(())
    }

    /// Path the server expects the spec at; `validate` guarantees presence.
    pub fn spec_path(&self) -> &Path {
        self.spec.as_deref().expect("validated config has a spec path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert!(config.stateful);
        assert!(config.preserve_state_on_reload);
        assert_eq!(config.endpoints.health, "/health");
        assert_eq!(config.chaos.status_codes, vec![500]);
        assert_eq!(config.logging.max_entries, 500);
    }

    #[test]
    fn test_partial_file_merges_onto_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "spec: api.yaml\nport: 8080\nlatency:\n  min_ms: 5\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.latency.min_ms, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.latency.max_ms, 0);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = Config {
            spec: Some(PathBuf::from("from-file.yaml")),
            ..Config::default()
        };
        config.apply(&Overrides {
            spec: Some(PathBuf::from("from-cli.yaml")),
            port: Some(9999),
            stateful: Some(false),
            seed: Some(42),
            ..Overrides::default()
        });

        assert_eq!(config.spec.unwrap(), PathBuf::from("from-cli.yaml"));
        assert_eq!(config.port, 9999);
        assert!(!config.stateful);
        assert_eq!(config.data.seed, Some(42));
    }

    #[test]
    fn test_missing_spec_fails_validation() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("spec path is required"));
    }

    #[test]
    fn test_bad_failure_rate_rejected() {
        let config = Config {
            spec: Some(PathBuf::from("api.yaml")),
            chaos: ChaosConfig {
                failure_rate: 1.5,
                ..ChaosConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_latency_bounds_rejected() {
        let config = Config {
            spec: Some(PathBuf::from("api.yaml")),
            latency: LatencyConfig {
                min_ms: 10,
                max_ms: 5,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
