use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::adapter::proxy::ProxyEndpoint;
use crate::harvest::parser::ParserRules;
use crate::harvest::retry::RetryPolicy;
use crate::harvest::runner::HarvestRequest;
use crate::harvest::state::Checkpoint;
use crate::harvest::view::LocatorScheme;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarvesterConfig {
    pub harvest: HarvestSettings,
    pub feed: FeedSettings,
    pub browser: BrowserSettings,
    pub proxy: ProxySettings,
}

/// Tunables for the harvest loop
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarvestSettings {
    /// Maximum records per run (0 = unbounded)
    pub limit: usize,
    pub max_dead_cycles: u32,
    pub gap_tolerance: u32,
    pub scroll_pixels: i64,
    /// Settle delay range after each scroll, in milliseconds
    pub settle_ms: (u64, u64),
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: u64,
}

/// Where the feed lives and how its markup is addressed
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedSettings {
    pub entry_url: String,
    pub locators: LocatorScheme,
    pub parser: ParserRules,
}

/// Browser session settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub page_load_timeout_secs: u64,
    /// Scroll in uneven chunks rather than one jump
    pub chunked_scroll: bool,
}

/// Proxy settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProxySettings {
    pub enabled: bool,
    /// URL fetched through a candidate proxy to verify it works
    pub probe_url: String,
    pub endpoints: Vec<ProxyEndpoint>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestSettings {
                limit: 1000,
                max_dead_cycles: 2,
                gap_tolerance: 2,
                scroll_pixels: 1800,
                settle_ms: (1200, 2400),
                retry_max_attempts: 3,
                retry_backoff_ms: 500,
            },
            feed: FeedSettings {
                entry_url: concat!(
                    "https://www.facebook.com/ads/library/",
                    "?active_status=active&ad_type=all&country=ALL",
                    "&is_targeted_country=false&media_type=all"
                )
                .to_string(),
                locators: LocatorScheme::default(),
                parser: ParserRules::default(),
            },
            browser: BrowserSettings {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                window_width: 1920,
                window_height: 1080,
                user_agent: None,
                page_load_timeout_secs: 30,
                chunked_scroll: true,
            },
            proxy: ProxySettings {
                enabled: false,
                probe_url: "https://api.ipify.org".to_string(),
                endpoints: vec![],
            },
        }
    }
}

impl HarvesterConfig {
    /// Build a validated harvest request from these settings.
    pub fn to_request(
        &self,
        resume_from: Option<Checkpoint>,
        checkpoint_path: Option<PathBuf>,
    ) -> Result<HarvestRequest> {
        HarvestRequest {
            limit: self.harvest.limit,
            max_dead_cycles: self.harvest.max_dead_cycles,
            gap_tolerance: self.harvest.gap_tolerance,
            scroll_pixels: self.harvest.scroll_pixels,
            settle_ms: self.harvest.settle_ms,
            retry: RetryPolicy {
                max_attempts: self.harvest.retry_max_attempts,
                backoff: Duration::from_millis(self.harvest.retry_backoff_ms),
            },
            resume_from,
            checkpoint_path,
        }
        .validated()
    }

    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "scroll-harvester", "scroll-harvester")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        // Create the sites directory if it doesn't exist
        path.push("sites");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        // Move back up to the config directory
        path.pop();
        path
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            // Create and save the default configuration
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load a configuration profile
    pub fn load_profile(profile: &str) -> Result<Self> {
        if profile == "default" {
            return Self::load_default();
        }

        let config_dir = Self::config_dir();
        let profile_path = config_dir.join("sites").join(format!("{}.yaml", profile));

        if profile_path.exists() {
            Self::load_from_file(&profile_path)
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
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
        let config_path = config_dir.join("default.yaml");

        self.save_to_file(&config_path)
    }

    /// Save the configuration as a profile
    pub async fn save_as_profile(&self, profile: &str) -> Result<()> {
        let config_dir = Self::config_dir();
        let sites_dir = config_dir.join("sites");

        if !sites_dir.exists() {
            fs::create_dir_all(&sites_dir)
                .context(format!("Failed to create sites directory: {}", sites_dir.display()))?;
        }

        let profile_path = sites_dir.join(format!("{}.yaml", profile));
        self.save_to_file(&profile_path)
    }

    /// Save the configuration to a file
    fn save_to_file(&self, path: &Path) -> Result<()> {
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

    /// List all available profiles
    pub async fn list_profiles() -> Result<Vec<String>> {
        let config_dir = Self::config_dir();
        let sites_dir = config_dir.join("sites");

        if !sites_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(sites_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(stem) = path.file_stem() {
                    if let Some(name) = stem.to_str() {
                        profiles.push(name.to_string());
                    }
                }
            }
        }

        Ok(profiles)
    }
}
