use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::expand_tilde;

const CONFIG_FILE_NAME: &str = ".bqiam.toml";

/// Keys written by earlier releases of the tool, mapped to their current names.
const LEGACY_KEYS: [(&str, &str); 3] = [
    ("BigqueryProjects", "bigquery_projects"),
    ("CacheFile", "cache_file"),
    ("CacheRefreshHour", "cache_refresh_hour"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
    #[error("crawl_concurrency must be greater than zero")]
    ZeroConcurrency,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
pub struct Config {
    /// Projects the cache crawl and the completion list are restricted to.
    pub bigquery_projects: Vec<String>,
    pub cache_file: PathBuf,
    /// Age in hours after which `dataset` offers to rebuild the cache.
    pub cache_refresh_hour: u64,
    pub completion_file: PathBuf,
    /// Maximum number of candidates printed by `complete`.
    pub completion_display_size_limit: usize,
    /// Number of projects crawled concurrently.
    pub crawl_concurrency: usize,
    pub debug: DebugConfig,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bigquery_projects: vec![],
            cache_file: PathBuf::from("~/.bqiam-cache-file.toml"),
            cache_refresh_hour: 24,
            completion_file: PathBuf::from("~/.bqiam-completion-file.toml"),
            completion_display_size_limit: 100,
            crawl_concurrency: 8,
            debug: DebugConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
pub struct DebugConfig {
    /// Include file names and line numbers in log lines.
    pub extended_logs: bool,
}

#[derive(Clone, Copy, Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// `~/.bqiam.toml`, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Load the configuration from defaults, the config file and the environment,
    /// in increasing precedence.
    ///
    /// An explicitly given file must exist. The default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(read_file(&expand_tilde(path))?),
            None => match Self::default_path() {
                Some(default) if default.exists() => Some(read_file(&default)?),
                _ => None,
            },
        };

        let mut config =
            figment::Figment::from(figment::providers::Serialized::defaults(Config::default()));
        if let Some(file) = file {
            config = config.merge(figment::providers::Serialized::defaults(file));
        }

        #[cfg(not(test))]
        let prefixes = &["BQIAM__"];
        #[cfg(test)]
        let prefixes = &["BQIAM_TEST__"];

        for prefix in prefixes {
            let env = figment::providers::Env::prefixed(prefix).split("__");
            config = config.merge(env);
        }

        let config = config.extract::<Config>().map_err(Box::new)?;
        if config.crawl_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        tracing::debug!(
            projects = config.bigquery_projects.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Location of the metadata cache with `~` expanded.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        expand_tilde(&self.cache_file)
    }

    /// Location of the completion list with `~` expanded.
    #[must_use]
    pub fn completion_path(&self) -> PathBuf {
        expand_tilde(&self.completion_file)
    }
}

fn read_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut table = toml::from_str::<toml::Table>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    for (legacy, current) in LEGACY_KEYS {
        if let Some(value) = table.remove(legacy) {
            table.entry(current).or_insert(value);
        }
    }
    Ok(table)
}
