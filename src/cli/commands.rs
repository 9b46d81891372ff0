use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::adapter::proxy::ProxyPool;
use crate::adapter::webdriver::WebDriverAdapter;
use crate::cli::config::HarvesterConfig;
use crate::harvest::parser::CardParser;
use crate::harvest::runner::{CompletionReason, Harvester};
use crate::harvest::state::Checkpoint;

/// Run a harvest with the given profile and overrides.
#[allow(clippy::too_many_arguments)]
pub async fn harvest(
    url: Option<String>,
    profile: &str,
    limit: Option<usize>,
    max_dead_cycles: Option<u32>,
    gap_tolerance: Option<u32>,
    checkpoint: Option<PathBuf>,
    resume: bool,
    output: PathBuf,
) -> Result<()> {
    let mut config = HarvesterConfig::load_profile(profile)
        .context(format!("Failed to load profile '{}'", profile))?;

    // Command-line overrides take precedence over the profile
    if let Some(limit) = limit {
        config.harvest.limit = limit;
    }
    if let Some(max_dead_cycles) = max_dead_cycles {
        config.harvest.max_dead_cycles = max_dead_cycles;
    }
    if let Some(gap_tolerance) = gap_tolerance {
        config.harvest.gap_tolerance = gap_tolerance;
    }

    let resume_from = if resume {
        match &checkpoint {
            Some(path) if path.exists() => {
                let cp = Checkpoint::load(path)?;
                info!(
                    segments = cp.segments.len(),
                    total = cp.total,
                    "Resuming from checkpoint {}",
                    path.display()
                );
                Some(cp)
            }
            Some(path) => {
                warn!("Checkpoint {} not found. Starting fresh", path.display());
                None
            }
            None => {
                anyhow::bail!("--resume requires --checkpoint");
            }
        }
    } else {
        None
    };

    let request = config.to_request(resume_from, checkpoint)?;

    let proxy = if config.proxy.enabled {
        let mut pool = ProxyPool::new(config.proxy.clone());
        let endpoint = pool.next_healthy().await;
        if endpoint.is_none() {
            warn!("No healthy proxy available. Connecting directly");
        }
        endpoint
    } else {
        None
    };

    let adapter = WebDriverAdapter::connect(&config.browser, proxy.as_ref()).await?;

    let entry_url = url.as_deref().unwrap_or(&config.feed.entry_url);
    info!("Opening feed: {}", entry_url);
    adapter.goto(entry_url).await?;

    let parser = CardParser::new(config.feed.parser.clone())?;
    let harvester = Harvester::new(adapter, config.feed.locators.clone(), parser, request);
    let result = harvester.run().await;

    info!(
        records = result.records.len(),
        cycles = result.cycles,
        parse_failures = result.parse_failures,
        reason = ?result.reason,
        "Harvest finished"
    );

    let json = serde_json::to_string_pretty(&result)
        .context("Failed to serialize harvest result")?;
    std::fs::write(&output, json)
        .context(format!("Failed to write results to {}", output.display()))?;
    info!("Results written to {}", output.display());

    if result.reason == CompletionReason::Aborted {
        anyhow::bail!(
            "Harvest aborted: {}",
            result.failure.as_deref().unwrap_or("unknown failure")
        );
    }

    Ok(())
}

/// List all available configuration profiles
pub async fn list_profiles() -> Result<()> {
    let profiles = HarvesterConfig::list_profiles().await?;

    if profiles.is_empty() {
        println!("No profiles found. The default profile is created on first use.");
    } else {
        println!("Available profiles:");
        for profile in profiles {
            println!("  {}", profile);
        }
    }

    Ok(())
}

/// Save the selected configuration under a new profile name
pub async fn save_profile(source: Option<&str>, name: &str) -> Result<()> {
    let config = match source {
        Some(profile) => HarvesterConfig::load_profile(profile)
            .context(format!("Failed to load profile '{}'", profile))?,
        None => HarvesterConfig::load_default()?,
    };

    config.save_as_profile(name).await?;
    println!("Configuration saved as profile '{}'", name);

    Ok(())
}

/// Show the resolved configuration for a profile
pub async fn show_config(profile: Option<&str>) -> Result<()> {
    let config = match profile {
        Some(name) => HarvesterConfig::load_profile(name)
            .context(format!("Failed to load profile '{}'", name))?,
        None => HarvesterConfig::load_default()?,
    };

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    println!("{}", yaml);

    Ok(())
}
