use std::{path::PathBuf, str::FromStr};

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use mako_deploy::{ContractName, InitPolicy, RunOptions};
use tracing::level_filters::LevelFilter;

/// Default RPC endpoint of a local hardhat or anvil node.
const LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

/// Networks with a known chain id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkPreset {
    Mainnet,
    Goerli,
    Sepolia,
    Localhost,
    #[strum(default)]
    Custom(String),
}

impl NetworkPreset {
    pub fn to_chain_id(&self) -> Option<u64> {
        match self {
            NetworkPreset::Mainnet => Some(1),
            NetworkPreset::Goerli => Some(5),
            NetworkPreset::Sepolia => Some(11155111),
            NetworkPreset::Localhost => Some(31337),
            NetworkPreset::Custom(_) => None,
        }
    }

    /// Environment variable holding the RPC endpoint, e.g. `SEPOLIA_PROVIDER`.
    pub fn provider_env(&self) -> String {
        format!("{}_PROVIDER", self.to_string().to_uppercase().replace('-', "_"))
    }

    /// RPC endpoint from the environment, falling back to the local node for `localhost`.
    pub fn to_rpc_url(&self) -> Option<String> {
        match std::env::var(self.provider_env()) {
            Ok(url) if !url.is_empty() => Some(url),
            _ if *self == NetworkPreset::Localhost => Some(LOCALHOST_RPC_URL.to_string()),
            _ => None,
        }
    }
}

/// `Contract=Step` pair for `--resume-init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeInit {
    pub contract: ContractName,
    pub step: usize,
}

impl FromStr for ResumeInit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (contract, step) = s
            .split_once('=')
            .ok_or_else(|| format!("expected CONTRACT=STEP, got {s:?}"))?;
        let step: usize = step
            .parse()
            .map_err(|e| format!("invalid step in {s:?}: {e}"))?;
        if step == 0 {
            return Err("steps are numbered from 1".to_string());
        }
        Ok(Self {
            contract: contract.into(),
            step,
        })
    }
}

#[derive(Parser)]
#[command(name = "mako")]
#[command(author, version, about = "Deploy and fund the Mako contracts")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "MAKO_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Mako.toml configuration file (or a directory containing one).
    ///
    /// Values from the file are overridden by `MAKO_*` environment variables and flags.
    #[arg(long, alias = "conf", global = true, env = "MAKO_CONFIG")]
    pub config: Option<PathBuf>,

    /// The network to deploy to (mainnet, goerli, sepolia, localhost or a custom name).
    #[arg(short, long, global = true)]
    pub network: Option<NetworkPreset>,

    /// Chain id for custom networks.
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// The JSON-RPC endpoint. Defaults to `<NETWORK>_PROVIDER`.
    #[arg(long, alias = "rpc", global = true)]
    pub rpc_url: Option<String>,

    /// The account to deploy from. Defaults to the first account of the node.
    #[arg(long, global = true)]
    pub deployer: Option<Address>,

    /// Root of the compiled hardhat artifacts.
    #[arg(long, global = true)]
    pub artifacts: Option<PathBuf>,

    /// Root of the per-network deployment records.
    #[arg(long, global = true)]
    pub deployments: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a stage and run its initialization steps.
    Deploy(DeployArgs),
    /// Show the deployment order of a stage without submitting anything.
    Plan {
        /// Stage name, or `full` for every contract.
        stage: String,
    },
    /// List the available stages.
    Stages,
    /// Show the deployment records of the network.
    Status,
    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Stage name, or `full` for every contract.
    pub stage: String,

    /// Redeploy contracts even when a record exists.
    #[arg(long)]
    pub force_redeploy: bool,

    /// Redeploy contracts whose code or constructor arguments changed.
    #[arg(long)]
    pub redeploy_on_change: bool,

    /// Number of confirmations to wait for.
    #[arg(long)]
    pub confirmations: Option<u64>,

    /// Confirmation timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip the initialization steps of a contract. Can be repeated.
    #[arg(long, value_name = "CONTRACT")]
    pub skip_init: Vec<String>,

    /// Start a contract's initialization at the given step. Can be repeated.
    #[arg(long, value_name = "CONTRACT=STEP")]
    pub resume_init: Vec<ResumeInit>,

    /// Run against a simulated chain seeded with the existing records. Nothing is written.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the resulting manifest as JSON.
    #[arg(long)]
    pub manifest_out: Option<PathBuf>,

    /// Save the resolved configuration to Mako.toml before deploying.
    #[arg(long)]
    pub save_config: bool,
}

impl DeployArgs {
    pub fn run_options(&self) -> RunOptions {
        let mut init = InitPolicy::default();
        for contract in &self.skip_init {
            init = init.skip(contract.as_str());
        }
        for resume in &self.resume_init {
            init = init.resume(resume.contract.clone(), resume.step);
        }

        RunOptions {
            force_redeploy: self.force_redeploy,
            redeploy_on_change: self.redeploy_on_change,
            confirmations: self.confirmations,
            confirmation_timeout: self.timeout.map(std::time::Duration::from_secs),
            init,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_presets() {
        assert_eq!("sepolia".parse::<NetworkPreset>().unwrap().to_chain_id(), Some(11155111));
        assert_eq!(
            "my-devnet".parse::<NetworkPreset>().unwrap(),
            NetworkPreset::Custom("my-devnet".to_string())
        );
        assert_eq!(NetworkPreset::Goerli.provider_env(), "GOERLI_PROVIDER");
    }

    #[test]
    fn test_resume_init_parsing() {
        let resume: ResumeInit = "TokenPaymaster=2".parse().unwrap();
        assert_eq!(resume.contract.as_str(), "TokenPaymaster");
        assert_eq!(resume.step, 2);

        assert!("TokenPaymaster".parse::<ResumeInit>().is_err());
        assert!("TokenPaymaster=0".parse::<ResumeInit>().is_err());
    }

    #[test]
    fn test_deploy_flags_to_options() {
        let cli = Cli::try_parse_from([
            "mako",
            "deploy",
            "full",
            "--skip-init",
            "SubscriptionPaymaster",
            "--resume-init",
            "TokenPaymaster=2",
            "--timeout",
            "30",
        ])
        .unwrap();

        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };
        let options = args.run_options();
        assert_eq!(options.init.first_step(&"SubscriptionPaymaster".into()), None);
        assert_eq!(options.init.first_step(&"TokenPaymaster".into()), Some(2));
        assert_eq!(
            options.confirmation_timeout,
            Some(std::time::Duration::from_secs(30))
        );
        assert!(!options.force_redeploy);
    }
}
