use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrthoError;

pub const KEGG_KO_SOURCE: &str = "kegg_ko";
pub const SSDB_BEST_SOURCE: &str = "ssdb_best";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_kegg_base_url")]
    pub kegg_base_url: String,
    #[serde(default = "default_ssdb_base_url")]
    pub ssdb_base_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_store_batch_size")]
    pub store_batch_size: usize,
    #[serde(default = "default_progress_ttl_secs")]
    pub progress_ttl_secs: u64,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub pairwise_sources: Vec<PairwiseSourceConfig>,
    #[serde(default = "default_model_organisms")]
    pub model_organisms: Vec<String>,
}

/// Additional pairwise source served in the SSDB table shape from another host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairwiseSourceConfig {
    pub name: String,
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kegg_base_url: default_kegg_base_url(),
            ssdb_base_url: default_ssdb_base_url(),
            requests_per_second: default_requests_per_second(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_in_flight: default_max_in_flight(),
            quality_threshold: default_quality_threshold(),
            store_batch_size: default_store_batch_size(),
            progress_ttl_secs: default_progress_ttl_secs(),
            sources: default_sources(),
            pairwise_sources: Vec::new(),
            model_organisms: default_model_organisms(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), OrthoError> {
        if self.requests_per_second == 0 {
            return Err(OrthoError::InvalidConfig(
                "requests_per_second must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(OrthoError::InvalidConfig(
                "max_attempts must be positive".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(OrthoError::InvalidConfig(
                "max_in_flight must be positive".to_string(),
            ));
        }
        if self.store_batch_size == 0 {
            return Err(OrthoError::InvalidConfig(
                "store_batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.quality_threshold) {
            return Err(OrthoError::InvalidConfig(format!(
                "quality_threshold {} is outside 0-100",
                self.quality_threshold
            )));
        }
        if self.sources.is_empty() {
            return Err(OrthoError::InvalidConfig(
                "at least one ortholog source is required".to_string(),
            ));
        }

        let mut known: BTreeSet<&str> = [KEGG_KO_SOURCE, SSDB_BEST_SOURCE].into_iter().collect();
        for extra in &self.pairwise_sources {
            if !known.insert(extra.name.as_str()) {
                return Err(OrthoError::InvalidConfig(format!(
                    "duplicate source name: {}",
                    extra.name
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for name in &self.sources {
            if !known.contains(name.as_str()) {
                return Err(OrthoError::InvalidConfig(format!("unknown source: {name}")));
            }
            if !seen.insert(name.as_str()) {
                return Err(OrthoError::InvalidConfig(format!(
                    "source listed twice: {name}"
                )));
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), OrthoError> {
        if let Ok(value) = std::env::var("KIRA_OM_KEGG_BASE_URL") {
            if !value.trim().is_empty() {
                self.kegg_base_url = value.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var("KIRA_OM_RPS") {
            self.requests_per_second = value
                .trim()
                .parse()
                .map_err(|_| OrthoError::InvalidConfig(format!("KIRA_OM_RPS={value}")))?;
        }
        if let Ok(value) = std::env::var("KIRA_OM_MAX_IN_FLIGHT") {
            self.max_in_flight = value.trim().parse().map_err(|_| {
                OrthoError::InvalidConfig(format!("KIRA_OM_MAX_IN_FLIGHT={value}"))
            })?;
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `kira-om.json` (or an explicit path), then environment overrides.
    /// The default file is optional; an explicit path must exist.
    pub fn resolve(path: Option<&str>) -> Result<Settings, OrthoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("kira-om.json"),
        };

        let mut settings = if path.is_none() && !config_path.exists() {
            Settings::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| OrthoError::ConfigRead(config_path.clone()))?;
            Self::parse(&content)?
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Settings, OrthoError> {
        serde_json::from_str(content).map_err(|err| OrthoError::ConfigParse(err.to_string()))
    }
}

fn default_kegg_base_url() -> String {
    "https://rest.kegg.jp".to_string()
}

fn default_ssdb_base_url() -> String {
    "https://www.kegg.jp".to_string()
}

fn default_requests_per_second() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_in_flight() -> usize {
    10
}

fn default_quality_threshold() -> f64 {
    40.0
}

fn default_store_batch_size() -> usize {
    500
}

fn default_progress_ttl_secs() -> u64 {
    24 * 60 * 60
}

pub fn default_sources() -> Vec<String> {
    vec![KEGG_KO_SOURCE.to_string(), SSDB_BEST_SOURCE.to_string()]
}

pub fn default_model_organisms() -> Vec<String> {
    ["hsa", "mmu", "rno", "dre", "dme", "cel", "sce", "ath", "eco", "bsu"]
        .iter()
        .map(|code| code.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_config_defaults() {
        let settings = ConfigLoader::parse("{}").unwrap();
        assert_eq!(settings.requests_per_second, 3);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.max_in_flight, 10);
        assert_eq!(settings.quality_threshold, 40.0);
        assert_eq!(settings.sources, default_sources());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn reject_unknown_source() {
        let settings = ConfigLoader::parse(r#"{"sources": ["kegg_ko", "oma"]}"#).unwrap();
        assert_matches!(settings.validate(), Err(OrthoError::InvalidConfig(_)));
    }
}
