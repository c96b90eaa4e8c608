// Local crates
use crate::aggregator::aggregator::AggregatorConfig;
use crate::categorizer::categorizer::CategoryConfig;
use crate::filter::filter::FilterConfig;
use crate::parser::fields::field;
use crate::tailer::models::TailerOptions;

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("weblog.path must not be empty")]
    EmptyPath,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tailer: TailerConfig,
    pub weblog: WebLogConfig,
}

impl Config {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading weblog configuration file"
        );

        let config_str = match fs::read_to_string(path_ref) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read configuration file");
                return Err(e)
                    .with_context(|| format!("Failed to read config file at {:?}", path_ref));
            }
        };
        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to load config from {:?}", path_ref))?;

        tracing::trace!(configuration_file_path = %path_ref.display(), "Weblog configuration file loaded successfully");
        Ok(config)
    }

    /// Parse and structurally validate a TOML document.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = match toml::from_str(config_str) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML configuration");
                return Err(e).context("Failed to parse TOML configuration");
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.update_every_secs == 0 {
            return Err(ConfigError::Zero("general.update_every_secs"));
        }
        if self.tailer.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("tailer.poll_interval_ms"));
        }
        if self.tailer.channel_capacity == 0 {
            return Err(ConfigError::Zero("tailer.channel_capacity"));
        }
        self.weblog.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// Collection cadence.
    pub update_every_secs: u64,
    /// Directory for JSON log files. Logs only go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            update_every_secs: 1,
            log_dir: None,
        }
    }
}

impl GeneralConfig {
    pub fn update_every(&self) -> Duration {
        Duration::from_secs(self.update_every_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TailerConfig {
    pub poll_interval_ms: u64,
    /// Lines buffered between the tailer and the ingest task.
    pub channel_capacity: usize,
    pub read_from_start: bool,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            channel_capacity: 1024,
            read_from_start: false,
        }
    }
}

impl TailerConfig {
    pub fn options(&self) -> TailerOptions {
        TailerOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_from_start: self.read_from_start,
            ..TailerOptions::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_user_category_field() -> String {
    field::USER_DEFINED.to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WebLogConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub filter: FilterConfig,
    /// URL categories, first match wins.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    /// User categories, first match wins.
    #[serde(default)]
    pub user_categories: Vec<CategoryConfig>,
    #[serde(default = "default_user_category_field")]
    pub user_category_field: String,
    /// Overrides pattern learning when set.
    #[serde(default)]
    pub custom_log_format: Option<String>,
    /// Millisecond bucket bounds for response time histograms.
    #[serde(default)]
    pub histogram: Option<Vec<u64>>,
    #[serde(default = "default_true")]
    pub response_codes_aggregate: bool,
    #[serde(default = "default_true")]
    pub all_time_ips: bool,
}

impl WebLogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: FilterConfig::default(),
            categories: Vec::new(),
            user_categories: Vec::new(),
            user_category_field: default_user_category_field(),
            custom_log_format: None,
            histogram: None,
            response_codes_aggregate: true,
            all_time_ips: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            response_codes_aggregate: self.response_codes_aggregate,
            all_time_ips: self.all_time_ips,
            histogram: self.histogram.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::matcher::MatchRule;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [weblog]
            path = "/var/log/nginx/access.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.general.update_every_secs, 1);
        assert_eq!(config.tailer.channel_capacity, 1024);
        assert!(!config.tailer.read_from_start);
        assert!(config.weblog.response_codes_aggregate);
        assert!(config.weblog.all_time_ips);
        assert_eq!(config.weblog.user_category_field, "user_defined");
        assert!(config.weblog.filter.is_empty());
        assert_eq!(config.weblog, WebLogConfig::new("/var/log/nginx/access.log"));
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml_str(
            r#"
            [general]
            update_every_secs = 5
            log_dir = "/tmp/weblog"

            [tailer]
            poll_interval_ms = 100
            read_from_start = true

            [weblog]
            path = "access.log"
            custom_log_format = '$remote_addr - - "$request" $status $body_bytes_sent'
            histogram = [1, 10, 100, 1000]
            response_codes_aggregate = false
            all_time_ips = false

            [weblog.filter]
            exclude = { suffix = ".png" }
            expression = "status >= 200"

            [[weblog.categories]]
            name = "api"
            match = { prefix = "/api" }

            [[weblog.user_categories]]
            name = "ios"
            match = { substring = "iPhone" }
            "#,
        )
        .unwrap();

        assert_eq!(config.general.update_every(), Duration::from_secs(5));
        assert_eq!(config.tailer.options().poll_interval, Duration::from_millis(100));
        assert_eq!(config.weblog.filter.exclude, Some(MatchRule::Suffix(".png".into())));
        assert_eq!(config.weblog.categories[0].name, "api");
        assert_eq!(config.weblog.user_categories[0].name, "ios");

        let agg = config.weblog.aggregator_config();
        assert_eq!(agg.histogram, Some(vec![1, 10, 100, 1000]));
        assert!(!agg.response_codes_aggregate);
        assert!(!agg.all_time_ips);
    }

    #[test]
    fn structural_errors_are_rejected() {
        assert!(Config::from_toml_str("[weblog]\npath = \"\"").is_err());
        assert!(
            Config::from_toml_str("[general]\nupdate_every_secs = 0\n[weblog]\npath = \"a\"")
                .is_err()
        );
        assert!(Config::from_toml_str("[general]\n").is_err());
        assert_eq!(WebLogConfig::new("").validate(), Err(ConfigError::EmptyPath));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weblog.toml");
        std::fs::write(&path, "[weblog]\npath = \"x.log\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.weblog.path, PathBuf::from("x.log"));
        assert!(Config::load(dir.path().join("missing.toml")).is_err());
    }
}
