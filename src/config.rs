use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{Threshold, ThresholdMode};
use crate::error::KiraError;
use crate::metadata::{DEFAULT_BUNDLE_SIZE, DEFAULT_GRAPHQL_URL};
use crate::pipeline::PipelineOptions;
use crate::search::DEFAULT_SEARCH_URL;

pub const DEFAULT_CONFIG_FILE: &str = "kira-ph.json";
pub const DEFAULT_RESULT_CAP: usize = 500;
pub const DEFAULT_MAX_HITS: usize = 2;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub threshold: Option<ThresholdEntry>,
    #[serde(default)]
    pub result_cap: Option<usize>,
    #[serde(default)]
    pub bundle_size: Option<usize>,
    #[serde(default)]
    pub max_hits: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub search_timeout_secs: Option<u64>,
    #[serde(default)]
    pub metadata_timeout_secs: Option<u64>,
    #[serde(default)]
    pub inchikey_map: Option<String>,
    #[serde(default)]
    pub endpoints: Option<EndpointsEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ThresholdEntry {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EndpointsEntry {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub graphql: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub threshold_mode: Option<ThresholdMode>,
    pub threshold: Option<f64>,
    pub result_cap: Option<usize>,
    pub bundle_size: Option<usize>,
    pub max_hits: Option<usize>,
    pub workers: Option<usize>,
    pub inchikey_map: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub threshold: Threshold,
    pub result_cap: usize,
    pub bundle_size: usize,
    pub max_hits: usize,
    pub workers: usize,
    pub search_timeout_secs: u64,
    pub metadata_timeout_secs: u64,
    pub inchikey_map: Option<Utf8PathBuf>,
    pub search_url: String,
    pub graphql_url: String,
}

impl ResolvedConfig {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            threshold: self.threshold,
            result_cap: self.result_cap,
            bundle_size: self.bundle_size,
            max_hits: self.max_hits,
            workers: self.workers,
        }
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(KiraError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default(), None, overrides);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        let base_dir = Utf8PathBuf::from_path_buf(config_path.clone())
            .ok()
            .and_then(|p| p.parent().map(Utf8Path::to_path_buf));
        Self::resolve_config(config, base_dir.as_deref(), overrides)
    }

    pub fn resolve_config(
        config: Config,
        base_dir: Option<&Utf8Path>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let threshold_entry = config.threshold.unwrap_or_default();

        let mode = match (overrides.threshold_mode, threshold_entry.mode) {
            (Some(mode), _) => mode,
            (None, Some(mode)) => mode.parse()?,
            (None, None) => Threshold::default().mode(),
        };
        let value = overrides
            .threshold
            .or(threshold_entry.value)
            .unwrap_or_else(|| default_threshold_value(mode));
        let threshold = Threshold::new(mode, value)?;

        let result_cap = positive(
            "result_cap",
            overrides.result_cap.or(config.result_cap),
            DEFAULT_RESULT_CAP,
        )?;
        let bundle_size = positive(
            "bundle_size",
            overrides.bundle_size.or(config.bundle_size),
            DEFAULT_BUNDLE_SIZE,
        )?;
        let max_hits = positive(
            "max_hits",
            overrides.max_hits.or(config.max_hits),
            DEFAULT_MAX_HITS,
        )?;
        let workers = positive("workers", overrides.workers.or(config.workers), 1)?;
        let search_timeout_secs = positive_secs(
            "search_timeout_secs",
            config.search_timeout_secs,
            DEFAULT_SEARCH_TIMEOUT_SECS,
        )?;
        let metadata_timeout_secs = positive_secs(
            "metadata_timeout_secs",
            config.metadata_timeout_secs,
            DEFAULT_METADATA_TIMEOUT_SECS,
        )?;

        let inchikey_map = overrides.inchikey_map.or_else(|| {
            config.inchikey_map.map(|value| {
                let path = Utf8PathBuf::from(value);
                match base_dir {
                    Some(dir) if path.is_relative() && !dir.as_str().is_empty() => dir.join(path),
                    _ => path,
                }
            })
        });

        let endpoints = config.endpoints.unwrap_or_default();
        Ok(ResolvedConfig {
            schema_version,
            threshold,
            result_cap,
            bundle_size,
            max_hits,
            workers,
            search_timeout_secs,
            metadata_timeout_secs,
            inchikey_map,
            search_url: endpoints
                .search
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            graphql_url: endpoints
                .graphql
                .unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
        })
    }
}

fn default_threshold_value(mode: ThresholdMode) -> f64 {
    match mode {
        ThresholdMode::Evalue => Threshold::default().value(),
        ThresholdMode::Identity => 0.9,
    }
}

fn positive(name: &str, value: Option<usize>, default: usize) -> Result<usize, KiraError> {
    match value {
        Some(0) => Err(KiraError::InvalidOption {
            name: name.to_string(),
            message: "must be at least 1".to_string(),
        }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn positive_secs(name: &str, value: Option<u64>, default: u64) -> Result<u64, KiraError> {
    match value {
        Some(0) => Err(KiraError::InvalidOption {
            name: name.to_string(),
            message: "timeout must be at least one second".to_string(),
        }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}
