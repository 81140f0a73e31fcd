//! Application configuration for reelfill.
//!
//! User config lives at `~/.reelfill/reelfill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReelfillError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "reelfill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".reelfill";

// ---------------------------------------------------------------------------
// Config structs (matching reelfill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker pool and checkpoint cadence.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Input and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote API settings.
    #[serde(default)]
    pub tmdb: TmdbConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Completed items between periodic checkpoint saves.
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,

    /// Per-request timeout for remote lookups, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            save_interval: default_save_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_workers() -> usize {
    10
}
fn default_save_interval() -> u64 {
    100
}
fn default_request_timeout() -> u64 {
    60
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Links table (`movieId,imdbId,tmdbId`).
    #[serde(default = "default_links_file")]
    pub links_file: String,

    /// Ratings table (`userId,movieId,rating,timestamp`).
    #[serde(default = "default_ratings_file")]
    pub ratings_file: String,

    /// Checkpoint snapshot of enriched records.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    /// Ids without a remote counterpart. Overwritten on every run.
    #[serde(default = "default_missing_file")]
    pub missing_file: String,

    /// Downstream libSQL database.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            links_file: default_links_file(),
            ratings_file: default_ratings_file(),
            checkpoint_file: default_checkpoint_file(),
            missing_file: default_missing_file(),
            database: default_database(),
        }
    }
}

fn default_links_file() -> String {
    "ml-latest/links.csv".into()
}
fn default_ratings_file() -> String {
    "ml-latest/ratings.csv".into()
}
fn default_checkpoint_file() -> String {
    "movies.checkpoint.json".into()
}
fn default_missing_file() -> String {
    "missing_movie_ids.json".into()
}
fn default_database() -> String {
    "reelfill.db".into()
}

/// `[tmdb]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API root, e.g. `https://api.themoviedb.org/3`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Prefix prepended to poster paths.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Language requested for detail lookups.
    #[serde(default = "default_language")]
    pub language: String,

    /// Optional HTTP(S) proxy for all remote requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            image_base_url: default_image_base_url(),
            language: default_language(),
            proxy: None,
        }
    }
}

fn default_api_key_env() -> String {
    "TMDB_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.themoviedb.org/3".into()
}
fn default_image_base_url() -> String {
    "https://www.themoviedb.org/t/p/w300_and_h450_bestv2".into()
}
fn default_language() -> String {
    "zh-CN".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed worker pool size.
    pub workers: usize,
    /// Save a checkpoint every `save_interval` completions (0 disables).
    pub save_interval: u64,
    /// Checkpoint snapshot path.
    pub checkpoint_path: PathBuf,
    /// Missing-id list path.
    pub missing_path: PathBuf,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.pipeline.workers,
            save_interval: config.pipeline.save_interval,
            checkpoint_path: PathBuf::from(&config.paths.checkpoint_file),
            missing_path: PathBuf::from(&config.paths.missing_file),
        }
    }
}

/// Runtime settings for building remote API clients.
#[derive(Debug, Clone)]
pub struct TmdbSettings {
    pub api_key: String,
    pub base_url: String,
    pub image_base_url: String,
    pub language: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl TmdbSettings {
    /// Resolve settings from the config, reading the API key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            api_key: api_key(config)?,
            base_url: config.tmdb.base_url.clone(),
            image_base_url: config.tmdb.image_base_url.clone(),
            language: config.tmdb.language.clone(),
            proxy: config.tmdb.proxy.clone(),
            timeout: Duration::from_secs(config.pipeline.request_timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.reelfill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReelfillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.reelfill/reelfill.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReelfillError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ReelfillError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReelfillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReelfillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReelfillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the TMDB API key from the env var named in the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.tmdb.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ReelfillError::config(format!(
            "TMDB API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://www.themoviedb.org/settings/api"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("checkpoint_file"));
        assert!(toml_str.contains("TMDB_API_KEY"));
        assert!(!toml_str.contains("proxy"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.workers, 10);
        assert_eq!(parsed.pipeline.save_interval, 100);
        assert_eq!(parsed.tmdb.api_key_env, "TMDB_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pipeline]
workers = 4

[tmdb]
proxy = "http://127.0.0.1:41091"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.request_timeout_secs, 60);
        assert_eq!(config.tmdb.proxy.as_deref(), Some("http://127.0.0.1:41091"));
        assert_eq!(config.paths.links_file, "ml-latest/links.csv");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.workers, 10);
        assert_eq!(pipeline.save_interval, 100);
        assert_eq!(pipeline.checkpoint_path, PathBuf::from("movies.checkpoint.json"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Unique env var name so parallel tests do not interfere
        config.tmdb.api_key_env = "REELFILL_TEST_NONEXISTENT_KEY_12345".into();
        let result = TmdbSettings::from_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
