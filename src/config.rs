//! Configuration for datalift paths and pipeline settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DATALIFT_HOME, DATALIFT_WATCH)
//! 2. Config file (.datalift/config.yaml)
//! 3. Defaults (~/.datalift)
//!
//! Config file discovery:
//! - Searches current directory and parents for .datalift/config.yaml
//! - Paths in the config file are relative to the config file's parent

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub alert: Option<AlertConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
    /// Drop directory watched for inbound files
    pub watch: Option<String>,
    /// Directory artifacts are published into
    pub publish: Option<String>,
    /// Directory holding one schema YAML per dataset kind
    pub schemas: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub workers: Option<usize>,
    /// Bound on the work queue; absent means unbounded
    pub queue_capacity: Option<usize>,
    pub stability_delay_secs: Option<u64>,
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to datalift home (engine state)
    pub home: PathBuf,
    /// Drop directory watched for inbound files
    pub watch_dir: PathBuf,
    /// Publish handoff directory
    pub publish_dir: PathBuf,
    /// Schema definitions directory
    pub schemas_dir: PathBuf,
    /// Pipeline settings
    pub pipeline: PipelineSettings,
    /// Alert webhook, if configured
    pub alert_webhook: Option<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub queue_capacity: Option<usize>,
    pub stability_delay_secs: u64,
    pub extensions: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: None,
            stability_delay_secs: 5,
            extensions: vec![
                "csv".to_string(),
                "tsv".to_string(),
                "txt".to_string(),
                "json".to_string(),
            ],
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".datalift").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".datalift");

    let config_file = find_config_file();

    let (home, watch_dir, publish_dir, schemas_dir, pipeline, alert_webhook) =
        if let Some(ref config_path) = config_file {
            let config = load_config_file(config_path)?;

            // Base directory is the parent of .datalift/
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));

            let home = if let Ok(env_home) = std::env::var("DATALIFT_HOME") {
                PathBuf::from(env_home)
            } else if let Some(ref home_path) = config.paths.home {
                let datalift_dir = config_path.parent().unwrap_or(Path::new("."));
                resolve_path(datalift_dir, home_path)
            } else {
                default_home.clone()
            };

            let watch_dir = if let Ok(env_watch) = std::env::var("DATALIFT_WATCH") {
                PathBuf::from(env_watch)
            } else if let Some(ref watch_path) = config.paths.watch {
                resolve_path(base_dir, watch_path)
            } else {
                home.join("inbox")
            };

            let publish_dir = config
                .paths
                .publish
                .as_ref()
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or_else(|| home.join("outbox"));

            let schemas_dir = config
                .paths
                .schemas
                .as_ref()
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or_else(|| home.join("schemas"));

            let defaults = PipelineSettings::default();
            let pipeline = match config.pipeline {
                Some(p) => PipelineSettings {
                    workers: p.workers.unwrap_or(defaults.workers).max(1),
                    queue_capacity: p.queue_capacity,
                    stability_delay_secs: p
                        .stability_delay_secs
                        .unwrap_or(defaults.stability_delay_secs),
                    extensions: p.extensions.unwrap_or(defaults.extensions),
                },
                None => defaults,
            };

            let alert_webhook = config.alert.and_then(|a| a.webhook_url);

            (home, watch_dir, publish_dir, schemas_dir, pipeline, alert_webhook)
        } else {
            let home = std::env::var("DATALIFT_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_home.clone());

            let watch_dir = std::env::var("DATALIFT_WATCH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join("inbox"));

            let publish_dir = home.join("outbox");
            let schemas_dir = home.join("schemas");

            (
                home,
                watch_dir,
                publish_dir,
                schemas_dir,
                PipelineSettings::default(),
                None,
            )
        };

    Ok(ResolvedConfig {
        home,
        watch_dir,
        publish_dir,
        schemas_dir,
        pipeline,
        alert_webhook,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the datalift home directory (engine state)
pub fn datalift_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the state store directory ($DATALIFT_HOME/state)
pub fn state_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("state"))
}

/// Get the local artifacts directory ($DATALIFT_HOME/artifacts)
pub fn artifacts_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("artifacts"))
}

/// Get the schemas directory
pub fn schemas_dir() -> Result<PathBuf> {
    Ok(config()?.schemas_dir.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let datalift_dir = temp.path().join(".datalift");
        std::fs::create_dir_all(&datalift_dir).unwrap();

        let config_path = datalift_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  watch: ./inbox
  publish: ./outbox
pipeline:
  workers: 4
  queue_capacity: 64
  stability_delay_secs: 2
alert:
  webhook_url: "https://hooks.example/datalift"
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.watch, Some("./inbox".to_string()));

        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.workers, Some(4));
        assert_eq!(pipeline.queue_capacity, Some(64));

        assert_eq!(
            config.alert.unwrap().webhook_url,
            Some("https://hooks.example/datalift".to_string())
        );
    }

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.workers, 2);
        assert!(settings.queue_capacity.is_none());
        assert!(settings.extensions.contains(&"csv".to_string()));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./inbox"),
            PathBuf::from("/home/user/project/inbox")
        );
    }
}
