use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::engine::EngineResources;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upload service settings
    pub api: ApiConfig,

    /// Media engine locators
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the video/transcription service
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,

    /// Where the engine keeps its working files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3333".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let resources = EngineResources::default();
        Self {
            ffmpeg_path: resources.core,
            ffprobe_path: resources.probe,
            scratch_dir: resources.scratch_dir,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // A config in the working directory wins
        let local_config = PathBuf::from("clipscribe.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("clipscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use HTTP or HTTPS protocol");
        }

        if self.engine.ffmpeg_path.as_os_str().is_empty() {
            anyhow::bail!("engine.ffmpeg_path must not be empty");
        }

        if self.engine.ffprobe_path.as_os_str().is_empty() {
            anyhow::bail!("engine.ffprobe_path must not be empty");
        }

        Ok(())
    }

    /// Override the API base URL and re-validate
    pub fn with_api_url(mut self, base_url: Option<String>) -> Result<Self> {
        if let Some(base_url) = base_url {
            self.api.base_url = base_url;
            self.validate()?;
        }
        Ok(self)
    }

    /// Locators the media engine is loaded from
    pub fn engine_resources(&self) -> EngineResources {
        EngineResources {
            core: self.engine.ffmpeg_path.clone(),
            probe: self.engine.ffprobe_path.clone(),
            scratch_dir: self.engine.scratch_dir.clone(),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  API Base URL: {}", self.api.base_url);
        println!("  ffmpeg: {}", self.engine.ffmpeg_path.display());
        println!("  ffprobe: {}", self.engine.ffprobe_path.display());
        match &self.engine.scratch_dir {
            Some(dir) => println!("  Scratch Dir: {}", dir.display()),
            None => println!("  Scratch Dir: (system temp)"),
        }
    }
}
