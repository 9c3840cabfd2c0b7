//! Integration tests for mako-deploy.
//!
//! These tests run complete stage deployments against the simulated chain, reading
//! hardhat artifacts and writing deployment records under a temporary directory.
//! Each test uses a unique random network name so records never collide.
//! Run with: cargo test --test integration_test

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use mako_deploy::{
    ArtifactDir, ArtifactRegistry, Catalog, DEFAULT_SIM_DEPLOYER, DeployConfig, DeployError,
    DeploymentManifest, DeploymentStore, EntryState, Fault, InitPolicy, JsonFileStore,
    Orchestrator, RunOptions, SimulatedChain, StageTag,
};
use rand::Rng;
use tempdir::TempDir;

/// Constructor inputs of each Mako contract, as compiled.
const MAKO_CONTRACTS: &[(&str, &str, &[&str])] = &[
    ("MakoEnergy", "MakoEnergy.sol", &[]),
    ("MakoShard", "MakoShard.sol", &[]),
    ("MakoAccountFactory", "MakoAccountFactory.sol", &["address"]),
    ("TokenPaymaster", "paymasters/TokenPaymaster.sol", &["address", "address"]),
    (
        "SubscriptionPaymaster",
        "paymasters/SubscriptionPaymaster.sol",
        &["address", "address", "uint256"],
    ),
];

/// Generate a random network name for the test run.
fn generate_network_name(test_prefix: &str) -> String {
    let id: u32 = rand::rng().random_range(100000..=999999);
    format!("mako-{test_prefix}-{id}")
}

/// Write a hardhat artifact with the given constructor inputs.
fn write_artifact(root: &Path, source: &str, name: &str, code: u8, inputs: &[&str]) -> Result<()> {
    let dir = root.join("contracts").join(source);
    std::fs::create_dir_all(&dir)?;

    let inputs: Vec<_> = inputs
        .iter()
        .enumerate()
        .map(|(i, ty)| serde_json::json!({ "name": format!("arg{i}"), "type": ty, "internalType": ty }))
        .collect();
    let artifact = serde_json::json!({
        "_format": "hh-sol-artifact-1",
        "contractName": name,
        "sourceName": format!("contracts/{source}"),
        "abi": [
            { "type": "constructor", "inputs": inputs, "stateMutability": "nonpayable" },
            { "type": "function", "name": "deposit", "inputs": [], "outputs": [], "stateMutability": "payable" }
        ],
        "bytecode": format!("0x6080{code:02x}"),
        "deployedBytecode": "0x6080",
        "linkReferences": {},
        "deployedLinkReferences": {}
    });

    std::fs::write(dir.join(format!("{name}.json")), serde_json::to_string_pretty(&artifact)?)?;
    std::fs::write(
        dir.join(format!("{name}.dbg.json")),
        r#"{"_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/0.json"}"#,
    )?;
    Ok(())
}

/// Test setup context containing common test infrastructure.
struct TestContext {
    network_name: String,
    _temp_dir: TempDir,
    config: DeployConfig,
}

impl TestContext {
    /// Initialize a new test context with compiled artifacts and an empty deployments directory.
    fn new(test_prefix: &str) -> Result<Self> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let network_name = generate_network_name(test_prefix);
        let temp_dir = TempDir::new(&network_name).context("Failed to create temp dir")?;

        let artifacts_dir = temp_dir.path().join("artifacts");
        for (code, (name, source, inputs)) in MAKO_CONTRACTS.iter().enumerate() {
            write_artifact(&artifacts_dir, source, name, code as u8, inputs)?;
        }

        let config = DeployConfig {
            network: network_name.clone(),
            chain_id: 31337,
            artifacts_dir,
            deployments_dir: temp_dir.path().join("deployments"),
            ..Default::default()
        };

        Ok(Self {
            network_name,
            _temp_dir: temp_dir,
            config,
        })
    }

    fn store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.config.deployments_dir)
    }

    /// Build an orchestrator over the test artifacts and the given chain.
    fn orchestrator<'a>(
        &self,
        chain: &'a SimulatedChain,
    ) -> Orchestrator<&'a SimulatedChain, ArtifactDir, JsonFileStore> {
        Orchestrator::new(
            self.config.catalog(),
            ArtifactRegistry::new(
                ArtifactDir::new(&self.config.artifacts_dir),
                self.store(),
                &self.network_name,
            ),
            chain,
            self.config.context(DEFAULT_SIM_DEPLOYER),
        )
    }
}

fn paymasters_funded() -> RunOptions {
    RunOptions {
        init: InitPolicy::default()
            .skip("TokenPaymaster")
            .skip("SubscriptionPaymaster"),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_deployment_and_rerun() -> Result<()> {
    let ctx = TestContext::new("full")?;
    let chain = SimulatedChain::default();
    let orchestrator = ctx.orchestrator(&chain);

    let manifest = orchestrator
        .run(&StageTag::Full, &RunOptions::default())
        .await?;

    assert_eq!(
        manifest.order.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        vec![
            "MakoEnergy",
            "MakoShard",
            "MakoAccountFactory",
            "TokenPaymaster",
            "SubscriptionPaymaster"
        ]
    );
    assert_eq!(chain.transaction_count(), 9);

    // Records land in the hardhat-deploy layout.
    for name in ["MakoEnergy", "MakoShard", "TokenPaymaster"] {
        let path = ctx
            .config
            .deployments_dir
            .join(&ctx.network_name)
            .join(format!("{name}.json"));
        assert!(path.exists(), "Record for {name} should exist at {}", path.display());
    }
    let stored = ctx.store().records(&ctx.network_name)?;
    assert_eq!(stored.len(), 5);

    // A second run, with funding already done, submits nothing and reports the same addresses.
    let rerun = orchestrator.run(&StageTag::Full, &paymasters_funded()).await?;
    assert_eq!(chain.transaction_count(), 9);
    assert_eq!(rerun.addresses(), manifest.addresses());
    assert!(rerun.entries.values().all(|entry| entry.reused));

    Ok(())
}

#[tokio::test]
async fn test_named_stage_reuses_earlier_stage() -> Result<()> {
    let ctx = TestContext::new("stages")?;
    let chain = SimulatedChain::default();
    let orchestrator = ctx.orchestrator(&chain);

    // The MakoShard tag deploys the token paymaster stack and funds it.
    let token = orchestrator
        .run(&"MakoShard".parse()?, &RunOptions::default())
        .await?;
    assert_eq!(
        token.order.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        vec!["MakoShard", "TokenPaymaster"]
    );
    assert_eq!(chain.transaction_count(), 4);

    // The MakoEnergy tag deploys the subscription paymaster stack.
    let subscription = orchestrator
        .run(&"MakoEnergy".parse()?, &RunOptions::default())
        .await?;

    // Factory and paymaster deployed, plus the two funding calls.
    assert_eq!(chain.transaction_count(), 8);
    let shard_entry = subscription.entry(&"MakoShard".into()).unwrap();
    assert!(shard_entry.reused);
    assert_eq!(shard_entry.record, token.entry(&"MakoShard".into()).unwrap().record);
    assert_eq!(
        subscription.entry(&"SubscriptionPaymaster".into()).unwrap().state,
        EntryState::Initialized
    );

    Ok(())
}

#[tokio::test]
async fn test_initialization_failure_then_resume() -> Result<()> {
    let ctx = TestContext::new("resume")?;
    // Submissions: MakoShard, TokenPaymaster, deposit, addStake (dropped).
    let chain = SimulatedChain::default().with_fault(3, Fault::Drop);
    let orchestrator = ctx.orchestrator(&chain);
    let stage: StageTag = "TokenPaymaster".parse()?;

    let failure = orchestrator
        .run(&stage, &RunOptions::default())
        .await
        .expect_err("addStake should fail");

    assert_eq!(failure.step_index, Some(2));
    assert!(matches!(failure.error, DeployError::InitializationFailed { .. }));

    // The paymaster record was persisted before initialization started.
    let record = ctx
        .store()
        .get(&ctx.network_name, &"TokenPaymaster".into())?
        .expect("paymaster record persisted");
    assert_eq!(
        failure.manifest.record(&"TokenPaymaster".into()),
        Some(&record)
    );

    // The partial manifest can be written out for the operator.
    let manifest_path = ctx.config.deployments_dir.join("failed-run.json");
    failure.manifest.save_to_file(&manifest_path)?;
    let saved: DeploymentManifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
    assert_eq!(
        saved.entry(&"TokenPaymaster".into()).unwrap().failed_step,
        Some(2)
    );

    let resume = RunOptions {
        init: InitPolicy::default().resume("TokenPaymaster", 2),
        ..Default::default()
    };
    let manifest = orchestrator.run(&stage, &resume).await?;

    assert_eq!(chain.transaction_count(), 5);
    assert_eq!(
        manifest.record(&"TokenPaymaster".into()).map(|r| r.address),
        Some(record.address)
    );

    Ok(())
}

#[tokio::test]
async fn test_timeout_then_rerun_deploys_again() -> Result<()> {
    let ctx = TestContext::new("timeout")?;
    let chain = SimulatedChain::default().with_fault(0, Fault::Stall);
    let orchestrator = ctx.orchestrator(&chain);
    let options = RunOptions {
        confirmation_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };

    let failure = orchestrator
        .run(&"DEMO_NFT".parse()?, &options)
        .await
        .expect_err("stalled deployment should time out");
    assert!(matches!(failure.error, DeployError::ConfirmationTimeout { .. }));
    assert!(ctx.store().records(&ctx.network_name)?.is_empty());

    let manifest = orchestrator.run(&"DEMO_NFT".parse()?, &options).await?;
    assert_eq!(chain.transaction_count(), 2);
    assert!(!manifest.entry(&"MakoEnergy".into()).unwrap().reused);

    Ok(())
}

#[tokio::test]
async fn test_unknown_stage_and_missing_artifacts_submit_nothing() -> Result<()> {
    let ctx = TestContext::new("preflight")?;
    let chain = SimulatedChain::default();

    let failure = ctx
        .orchestrator(&chain)
        .run(&"NoSuchStage".parse()?, &RunOptions::default())
        .await
        .expect_err("unknown stage");
    assert!(failure.error.is_planning_error());

    std::fs::remove_dir_all(ctx.config.artifacts_dir.join("contracts/paymasters"))?;
    let failure = ctx
        .orchestrator(&chain)
        .run(&StageTag::Full, &RunOptions::default())
        .await
        .expect_err("missing paymaster artifacts");
    assert!(matches!(failure.error, DeployError::UnknownContract(ref name) if name.as_str() == "TokenPaymaster"));
    assert_eq!(chain.transaction_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_networks_are_isolated() -> Result<()> {
    let first = TestContext::new("iso-a")?;
    let mut second = TestContext::new("iso-b")?;
    // Same record store, different network key.
    second.config.deployments_dir = first.config.deployments_dir.clone();
    second.config.artifacts_dir = first.config.artifacts_dir.clone();
    second.config.catalog = Some(Catalog::default());

    let chain = SimulatedChain::default();
    first.orchestrator(&chain).run(&"DEMO_NFT".parse()?, &RunOptions::default()).await?;
    let manifest = second
        .orchestrator(&chain)
        .run(&"DEMO_NFT".parse()?, &RunOptions::default())
        .await?;

    assert!(!manifest.entry(&"MakoEnergy".into()).unwrap().reused);
    assert_eq!(chain.transaction_count(), 2);
    assert_eq!(first.store().records(&first.network_name)?.len(), 1);
    assert_eq!(first.store().records(&second.network_name)?.len(), 1);

    Ok(())
}
