//! mako is a CLI tool to deploy and fund the Mako contracts, stage by stage.

mod cli;

use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::{Cli, Command, DeployArgs, NetworkPreset};
use mako_deploy::{
    ArtifactDir, ArtifactRegistry, ChainClient, DeployConfig, DeployError, DeploymentStore,
    InterfaceProvider, JsonFileStore, JsonRpcClient, MAKOCONF_FILENAME, MemoryStore,
    Orchestrator, Planner, RunOptions, SimulatedChain, StageTag,
};

/// Exit code for errors raised before any transaction was submitted.
const EXIT_PLANNING: u8 = 2;
/// Exit code for failed deployments.
const EXIT_DEPLOYMENT: u8 = 1;
/// Exit code for failed initialization steps.
const EXIT_INITIALIZATION: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Command::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "mako", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Deploy(args) => deploy(config, args).await,
        Command::Plan { stage } => plan(&config, stage),
        Command::Stages => {
            println!("{}", stages_table(&config));
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => status(&config),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Layer defaults, the config file, `MAKO_*` environment variables and flags.
fn load_config(cli: &Cli) -> Result<DeployConfig> {
    let mut figment = Figment::from(Serialized::defaults(DeployConfig::default()));

    match &cli.config {
        Some(path) if path.is_dir() => {
            figment = figment.merge(Toml::file(path.join(MAKOCONF_FILENAME)));
        }
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        None => figment = figment.merge(Toml::file(MAKOCONF_FILENAME)),
    }

    figment = figment.merge(Env::prefixed("MAKO_").only(&[
        "network",
        "chain_id",
        "rpc_url",
        "deployer",
        "confirmations",
        "confirmation_timeout_secs",
        "poll_interval_ms",
        "artifacts_dir",
        "deployments_dir",
        "entry_point",
    ]));

    let mut config: DeployConfig = figment
        .extract()
        .context("Failed to load configuration")?;

    if let Some(network) = &cli.network {
        let network = network.to_string();
        if network != config.network {
            // The configured endpoint belongs to the configured network.
            if let Some(rpc_url) = config.rpc_url.take() {
                tracing::warn!(
                    configured = %config.network,
                    %network,
                    %rpc_url,
                    "Ignoring configured RPC URL for a different network"
                );
            }
            config.network = network;
        }
    }
    let preset: NetworkPreset = config
        .network
        .parse()
        .unwrap_or_else(|_| NetworkPreset::Custom(config.network.clone()));
    if let Some(chain_id) = cli.chain_id.or(preset.to_chain_id()) {
        config.chain_id = chain_id;
    }

    if let Some(rpc_url) = &cli.rpc_url {
        config.rpc_url = Some(rpc_url.clone());
    } else if config.rpc_url.is_none() {
        config.rpc_url = preset.to_rpc_url();
    }
    if let Some(deployer) = cli.deployer {
        config.deployer = Some(deployer);
    }
    if let Some(artifacts) = &cli.artifacts {
        config.artifacts_dir = artifacts.clone();
    }
    if let Some(deployments) = &cli.deployments {
        config.deployments_dir = deployments.clone();
    }

    Ok(config)
}

async fn deploy(config: DeployConfig, args: &DeployArgs) -> Result<ExitCode> {
    let stage: StageTag = args.stage.parse()?;
    let options = args.run_options();

    if args.save_config {
        config.save_to_file(Path::new(MAKOCONF_FILENAME))?;
    }

    let store = JsonFileStore::new(&config.deployments_dir);
    let provider = ArtifactDir::new(&config.artifacts_dir);

    tracing::info!(
        stage = %stage,
        network = %config.network(),
        artifacts = %config.artifacts_dir.display(),
        deployments = %config.deployments_dir.display(),
        dry_run = args.dry_run,
        "Loading deployment"
    );

    if args.dry_run {
        let chain = config
            .deployer
            .map(SimulatedChain::funded)
            .unwrap_or_default();
        let seeded = MemoryStore::from_records(store.records(&config.network)?);
        let registry = ArtifactRegistry::new(provider, seeded, config.network.clone());
        return execute(&config, registry, chain, &stage, &options, args).await;
    }

    let rpc_url = config.rpc_url()?.with_context(|| {
        format!(
            "No RPC URL for network {}; pass --rpc-url or set {}",
            config.network,
            config
                .network
                .parse::<NetworkPreset>()
                .map(|preset| preset.provider_env())
                .unwrap_or_else(|_| "MAKO_RPC_URL".to_string())
        )
    })?;
    let client = JsonRpcClient::new(rpc_url)?.with_poll_interval(config.poll_interval());
    client.verify_chain_id(config.chain_id).await?;

    let registry = ArtifactRegistry::new(provider, store, config.network.clone());
    execute(&config, registry, client, &stage, &options, args).await
}

async fn execute<C, P, S>(
    config: &DeployConfig,
    registry: ArtifactRegistry<P, S>,
    chain: C,
    stage: &StageTag,
    options: &RunOptions,
    args: &DeployArgs,
) -> Result<ExitCode>
where
    C: ChainClient + Sync,
    P: InterfaceProvider,
    S: DeploymentStore,
{
    let deployer = match config.deployer {
        Some(deployer) => deployer,
        None => chain.deployer_address().await?,
    };
    let orchestrator = Orchestrator::new(config.catalog(), registry, chain, config.context(deployer));

    let (manifest, code) = match orchestrator.run(stage, options).await {
        Ok(manifest) => (manifest, ExitCode::SUCCESS),
        Err(failure) => {
            tracing::error!(
                stage = %failure.stage,
                contract = ?failure.contract.as_ref().map(|c| c.as_str()),
                step = ?failure.step_index,
                "{failure}: {}",
                failure.error
            );
            let code = exit_code(&failure.error);
            (failure.manifest, code)
        }
    };

    if !manifest.order.is_empty() {
        println!("{}", manifest.to_table());
    }
    if let Some(path) = &args.manifest_out {
        manifest.save_to_file(path)?;
    }

    Ok(code)
}

fn exit_code(error: &DeployError) -> ExitCode {
    if error.is_planning_error() {
        ExitCode::from(EXIT_PLANNING)
    } else if matches!(error, DeployError::InitializationFailed { .. }) {
        ExitCode::from(EXIT_INITIALIZATION)
    } else {
        ExitCode::from(EXIT_DEPLOYMENT)
    }
}

fn plan(config: &DeployConfig, stage: &str) -> Result<ExitCode> {
    let catalog = config.catalog();
    let registry = ArtifactRegistry::new(
        ArtifactDir::new(&config.artifacts_dir),
        JsonFileStore::new(&config.deployments_dir),
        config.network.clone(),
    );

    let stage: StageTag = stage.parse()?;
    let plan = match Planner::new(&catalog).plan(&stage) {
        Ok(plan) => plan,
        Err(error) => {
            tracing::error!(stage = %stage, "{error}");
            return Ok(exit_code(&error));
        }
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["#", "Contract", "Depends on", "Init steps", "Status"]);

    let mut code = ExitCode::SUCCESS;
    for (position, entry) in plan.entries.iter().enumerate() {
        let status = match registry.resolve(&entry.spec.name) {
            Ok((_, Some(record))) => format!("deployed at {}", record.address),
            Ok((_, None)) => "new".to_string(),
            Err(error) => {
                code = exit_code(&error);
                format!("error: {error}")
            }
        };
        let steps = entry
            .steps
            .iter()
            .map(|step| format!("{}. {} {} wei", step.index, step.action, step.action.value()))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            (position + 1).to_string(),
            entry.spec.name.to_string(),
            entry
                .spec
                .dependencies()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            steps,
            status,
        ]);
    }

    println!("{table}");
    Ok(code)
}

fn stages_table(config: &DeployConfig) -> Table {
    let catalog = config.catalog();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Stage", "Contracts"]);

    for name in catalog.stage_names() {
        let contracts = match catalog.find_stage(name) {
            Some(stage) => stage.contracts.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            None => catalog.contracts.iter().map(|c| c.name.as_str()).collect(),
        };
        table.add_row(vec![name.to_string(), contracts.join(", ")]);
    }

    table
}

fn status(config: &DeployConfig) -> Result<ExitCode> {
    let store = JsonFileStore::new(&config.deployments_dir);
    let records = store.records(&config.network)?;

    if records.is_empty() {
        tracing::info!(network = %config.network(), "No deployments recorded");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Contract", "Address", "Transaction", "Deployed at"]);
    for record in records {
        let deployed_at = chrono::DateTime::from_timestamp(record.timestamp, 0)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| record.timestamp.to_string());
        table.add_row(vec![
            record.contract.to_string(),
            record.address.to_string(),
            record.transaction_hash.to_string(),
            deployed_at,
        ]);
    }

    println!("{table}");
    Ok(ExitCode::SUCCESS)
}
