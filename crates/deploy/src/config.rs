//! Deployment configuration, persisted as `Mako.toml`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    catalog::{Catalog, DEFAULT_ENTRY_POINT},
    context::{DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT, DeployerContext},
    rpc::DEFAULT_POLL_INTERVAL,
    types::Network,
};

/// The default name for the mako configuration file.
pub const MAKOCONF_FILENAME: &str = "Mako.toml";

/// Everything a deployment run needs besides the stage to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Network name, used as the key for stored deployment records.
    pub network: String,
    pub chain_id: u64,
    /// JSON-RPC endpoint. Required unless running against the simulated chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Account to deploy from. Defaults to the first account the node exposes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    pub confirmations: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Root of the compiled hardhat artifacts.
    pub artifacts_dir: PathBuf,
    /// Root of the per-network deployment records.
    pub deployments_dir: PathBuf,
    /// ERC-4337 entry point passed to the factory and paymasters.
    pub entry_point: Address,
    /// Replaces the built-in Mako catalog when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Catalog>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            chain_id: 31337,
            rpc_url: None,
            deployer: None,
            confirmations: DEFAULT_CONFIRMATIONS,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            artifacts_dir: PathBuf::from("artifacts"),
            deployments_dir: PathBuf::from("deployments"),
            entry_point: DEFAULT_ENTRY_POINT,
            catalog: None,
        }
    }
}

impl DeployConfig {
    pub fn network(&self) -> Network {
        Network {
            name: self.network.clone(),
            chain_id: self.chain_id,
        }
    }

    /// The parsed RPC endpoint, if one is configured.
    pub fn rpc_url(&self) -> Result<Option<Url>> {
        self.rpc_url
            .as_deref()
            .map(|raw| Url::parse(raw).with_context(|| format!("Invalid RPC URL: {raw}")))
            .transpose()
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The configured catalog, or the Mako catalog built around `entry_point`.
    pub fn catalog(&self) -> Catalog {
        self.catalog
            .clone()
            .unwrap_or_else(|| Catalog::mako(self.entry_point))
    }

    pub fn context(&self, deployer: Address) -> DeployerContext {
        DeployerContext::new(self.network(), deployer)
            .confirmations(self.confirmations)
            .confirmation_timeout(self.confirmation_timeout())
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Mako.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file or directory not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(MAKOCONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}
