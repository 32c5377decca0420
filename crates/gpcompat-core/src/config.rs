//! Configuration schema (gpcompat.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Query log input settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Path to the session query log (newline-delimited JSON, `.gz` allowed)
    pub query_log: Option<PathBuf>,

    /// Reconstruct sessions in memory before checking (log is not ordered)
    pub need_sort: bool,

    /// Also check queries from transactions that failed on the source engine
    pub include_failed: bool,

    /// Maximum number of requests to read, 0 means unlimited
    pub requests_limit: usize,

    /// Print a progress line every N queries
    pub progress_every: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            query_log: None,
            need_sort: false,
            include_failed: true,
            requests_limit: 0,
            progress_every: 100,
        }
    }
}

/// Target engine connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Comma-separated list of connection strings
    pub connection: String,

    /// Connections opened per target, defaults to the check concurrency
    pub pool_size: Option<usize>,

    /// Timeout for bringing up the connection pool
    pub connect_timeout_secs: u64,

    /// Connect over TLS
    pub tls: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            connection: "host=localhost port=5432 user=root dbname=local".to_string(),
            pool_size: None,
            connect_timeout_secs: 10,
            tls: false,
        }
    }
}

impl TargetConfig {
    /// Individual connection strings, blanks removed
    pub fn connection_strings(&self) -> Vec<String> {
        self.connection
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Checker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// How many queries may be checked in parallel
    pub concurrency: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

/// Known-issue rule files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules used to detect known issues, empty to skip
    pub rules_file: Option<PathBuf>,

    /// Where rules with refreshed counts are written, may equal `rules_file`
    pub write_updated_rules: Option<PathBuf>,

    /// Order written rules by descending observed count
    pub sort_by_count: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules_file: Some(PathBuf::from("issues.yaml")),
            write_updated_rules: Some(PathBuf::from("issues_stat.yaml")),
            sort_by_count: true,
        }
    }
}

/// Reporting and snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Full stats file with query examples, empty to skip
    pub stats_file: Option<PathBuf>,

    /// Checkpoint interval in processed queries, 0 disables checkpoints
    pub write_stats_every: u64,

    /// Print known issues instead of unknown ones at the end of the run
    pub print_known_issues: bool,

    /// Print the example query for known issues
    pub print_query_for_known_issues: bool,

    /// Log unknown issues as they are found
    pub print_progress: bool,

    /// Print the end-of-run summary
    pub print_stats: bool,

    /// How many issues the summary lists
    pub top_issues: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stats_file: None,
            write_stats_every: 10_000,
            print_known_issues: false,
            print_query_for_known_issues: true,
            print_progress: false,
            print_stats: true,
            top_issues: 10,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Reject settings the run cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check.concurrency < 1 {
            return Err(ConfigError::Invalid(format!(
                "can't start less than 1 checker, got: {}",
                self.check.concurrency
            )));
        }

        if self.query_log().is_none() {
            return Err(ConfigError::Invalid("query log path is required".to_string()));
        }

        if self.target.connection_strings().is_empty() {
            return Err(ConfigError::Invalid("target connection is required".to_string()));
        }

        Ok(())
    }

    pub fn query_log(&self) -> Option<&Path> {
        non_empty(&self.input.query_log)
    }

    pub fn rules_file(&self) -> Option<&Path> {
        non_empty(&self.rules.rules_file)
    }

    pub fn updated_rules_file(&self) -> Option<&Path> {
        non_empty(&self.rules.write_updated_rules)
    }

    pub fn stats_file(&self) -> Option<&Path> {
        non_empty(&self.output.stats_file)
    }

    /// Connections per target
    pub fn pool_size(&self) -> usize {
        self.target.pool_size.unwrap_or(self.check.concurrency).max(1)
    }
}

/// An empty path disables the file it names
fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_log() -> Config {
        let mut config = Config::default();
        config.input.query_log = Some(PathBuf::from("sessions.json.gz"));
        config
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.check.concurrency, 5);
        assert!(config.input.include_failed);
        assert_eq!(config.output.write_stats_every, 10_000);
        assert_eq!(config.rules_file(), Some(Path::new("issues.yaml")));
        assert_eq!(config.stats_file(), None);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = with_log();
        config.check.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_query_log_is_rejected() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.input.query_log = Some(PathBuf::new());
        assert!(config.validate().is_err());

        assert!(with_log().validate().is_ok());
    }

    #[test]
    fn empty_paths_disable_files() {
        let config = Config::from_toml(
            r#"
            [rules]
            rules_file = ""
            write_updated_rules = "out.yaml"
            "#,
        )
        .unwrap();

        assert_eq!(config.rules_file(), None);
        assert_eq!(config.updated_rules_file(), Some(Path::new("out.yaml")));
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::from_toml(
            r#"
            [input]
            query_log = "log.json"
            need_sort = true

            [check]
            concurrency = 12
            "#,
        )
        .unwrap();

        assert!(config.input.need_sort);
        assert!(config.input.include_failed);
        assert_eq!(config.input.progress_every, 100);
        assert_eq!(config.check.concurrency, 12);
        assert_eq!(config.pool_size(), 12);
    }

    #[test]
    fn connection_list_is_split() {
        let mut config = Config::default();
        config.target.connection = "host=a, host=b,,".to_string();
        assert_eq!(config.target.connection_strings(), vec!["host=a", "host=b"]);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = with_log();
        let toml = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }
}
