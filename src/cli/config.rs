use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub tasks: TaskSettings,
    pub auth: AuthSettings,
}

/// HTTP server settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub rate_limit_per_minute: u32, // Applies to task-creating endpoints
}

/// Remote crawl engine settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineSettings {
    pub url: String,
    pub request_timeout_secs: u64,
}

/// Task orchestration settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskSettings {
    pub max_concurrent_crawls: usize,
    pub max_batch_urls: usize,
    pub event_buffer: usize, // Capacity of the task-event broadcast channel
    pub default_quick_timeout_secs: u64,
}

/// API key storage settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthSettings {
    /// Path of the key file; defaults to the platform data directory
    pub key_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                rate_limit_per_minute: 10,
            },
            engine: EngineSettings {
                url: "http://localhost:11235".to_string(),
                request_timeout_secs: 120,
            },
            tasks: TaskSettings {
                max_concurrent_crawls: 10,
                max_batch_urls: 10,
                event_buffer: 256,
                default_quick_timeout_secs: 60,
            },
            auth: AuthSettings { key_file: None },
        }
    }
}

impl GatewayConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "crawl-gateway", "crawl-gateway") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Default location of the API key file
    pub fn default_key_file() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "crawl-gateway", "crawl-gateway") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("./data")
        };

        path.push("api_keys.json");
        path
    }

    /// Resolved key file path
    pub fn key_file(&self) -> PathBuf {
        self.auth
            .key_file
            .clone()
            .unwrap_or_else(Self::default_key_file)
    }

    /// Load the default configuration, creating it on first run
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("gateway.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let config_dir = Self::config_dir();

        if !config_dir.exists() {
            if let Err(e) = fs::create_dir_all(&config_dir) {
                error!("Failed to create config directory: {}", e);
            }
        }

        let config_path = config_dir.join("gateway.yaml");
        self.save_to_file(&config_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}
