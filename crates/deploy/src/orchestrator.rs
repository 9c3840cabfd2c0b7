//! Orchestrator: plans a stage, then deploys and initializes its contracts in order.

use crate::{
    catalog::{Catalog, StageTag},
    chain::ChainClient,
    context::{DeployerContext, RunOptions},
    deployer::ContractDeployer,
    error::DeployError,
    initializer::Initializer,
    manifest::{DeploymentManifest, EntryState},
    planner::{Planner, StagePlan},
    registry::{ArtifactRegistry, InterfaceProvider},
    store::DeploymentStore,
    types::ContractName,
};

/// A run that stopped before completing its plan.
///
/// The manifest holds everything that was confirmed before the failure.
#[derive(Debug, thiserror::Error)]
#[error("stage {stage} stopped{}", describe_location(.contract, .step_index))]
pub struct RunFailure {
    pub stage: String,
    pub contract: Option<ContractName>,
    pub step_index: Option<usize>,
    pub manifest: DeploymentManifest,
    #[source]
    pub error: DeployError,
}

fn describe_location(contract: &Option<ContractName>, step_index: &Option<usize>) -> String {
    match (contract, step_index) {
        (Some(contract), Some(step)) => format!(" at {contract} step {step}"),
        (Some(contract), None) => format!(" at {contract}"),
        _ => String::new(),
    }
}

/// Drives a full stage deployment.
pub struct Orchestrator<C, P, S> {
    catalog: Catalog,
    registry: ArtifactRegistry<P, S>,
    chain: C,
    ctx: DeployerContext,
}

impl<C, P, S> Orchestrator<C, P, S>
where
    C: ChainClient + Sync,
    P: InterfaceProvider,
    S: DeploymentStore,
{
    pub fn new(
        catalog: Catalog,
        registry: ArtifactRegistry<P, S>,
        chain: C,
        ctx: DeployerContext,
    ) -> Self {
        Self {
            catalog,
            registry,
            chain,
            ctx,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ArtifactRegistry<P, S> {
        &self.registry
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn context(&self) -> &DeployerContext {
        &self.ctx
    }

    /// Plan a stage and check every planned contract has a usable artifact.
    ///
    /// Nothing is submitted, so this is safe to call before [`Self::run`].
    pub fn plan(&self, stage: &StageTag) -> Result<StagePlan, DeployError> {
        let plan = Planner::new(&self.catalog).plan(stage)?;
        for entry in &plan.entries {
            self.registry.resolve(&entry.spec.name)?;
        }
        Ok(plan)
    }

    /// Deploy and initialize every contract of `stage`, in plan order.
    ///
    /// Stops at the first failure. Contracts with a matching record are reused, so a rerun
    /// after a failure only submits what is still missing.
    pub async fn run(
        &self,
        stage: &StageTag,
        options: &RunOptions,
    ) -> Result<DeploymentManifest, RunFailure> {
        let mut manifest = DeploymentManifest::new(self.registry.network(), stage.to_string());
        let fail = |manifest, contract, step_index, error| RunFailure {
            stage: stage.to_string(),
            contract,
            step_index,
            manifest,
            error,
        };

        let plan = match self.plan(stage) {
            Ok(plan) => plan,
            Err(error) => return Err(fail(manifest, None, None, error)),
        };
        if let Err(error) = options.init.validate(&plan) {
            return Err(fail(manifest, None, None, error));
        }

        let ctx = self.ctx.with_overrides(options);
        let deployer = ContractDeployer::new(&ctx, &self.chain, &self.registry);
        let initializer = Initializer::new(&ctx, &self.chain);

        tracing::info!(
            stage = %stage,
            network = %ctx.network,
            deployer = %ctx.deployer,
            contracts = plan.len(),
            "Starting deployment"
        );

        for entry in &plan.entries {
            let name = &entry.spec.name;
            manifest.begin(name);

            let outcome = match deployer
                .deploy(&entry.spec, &manifest.addresses(), options)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(contract = %name, error = %error, "Deployment failed");
                    manifest.advance(name, EntryState::DeploymentFailed);
                    return Err(fail(manifest, Some(name.clone()), None, error));
                }
            };

            let record = outcome.record.clone();
            if let Some(manifest_entry) = manifest.advance(name, EntryState::Deployed) {
                manifest_entry.record = Some(outcome.record);
                manifest_entry.reused = outcome.reused;
            }

            if entry.steps.is_empty() {
                continue;
            }

            let Some(first_step) = options.init.first_step(name) else {
                tracing::info!(contract = %name, "Skipping initialization as configured");
                continue;
            };
            if outcome.reused && first_step == 1 {
                tracing::warn!(
                    contract = %name,
                    "Running initialization for an existing deployment; pass --skip-init if it is already funded"
                );
            }

            manifest.advance(name, EntryState::Initializing);
            match initializer.initialize(&record, &entry.steps, first_step).await {
                Ok(receipts) => {
                    if let Some(manifest_entry) = manifest.advance(name, EntryState::Initialized) {
                        manifest_entry.init_receipts = receipts;
                    }
                }
                Err(error) => {
                    let step_index = match &error {
                        DeployError::InitializationFailed { step_index, .. } => Some(*step_index),
                        _ => None,
                    };
                    tracing::error!(contract = %name, step = ?step_index, error = %error, "Initialization failed");
                    if let Some(manifest_entry) =
                        manifest.advance(name, EntryState::InitializationFailed)
                    {
                        manifest_entry.failed_step = step_index;
                    }
                    return Err(fail(manifest, Some(name.clone()), step_index, error));
                }
            }
        }

        tracing::info!(stage = %stage, contracts = manifest.order.len(), "Deployment complete");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        context::InitPolicy,
        error::TxFailure,
        registry::StaticInterfaces,
        sim::{Fault, SimulatedChain},
        store::MemoryStore,
        test_utils::{interface, local_context, mako_interfaces},
        types::{ArgSlot, ArgValue, ContractSpec},
    };

    fn orchestrator<'a>(
        chain: &'a SimulatedChain,
        store: &'a MemoryStore,
    ) -> Orchestrator<&'a SimulatedChain, StaticInterfaces, &'a MemoryStore> {
        Orchestrator::new(
            Catalog::default(),
            ArtifactRegistry::new(mako_interfaces(), store, "localhost"),
            chain,
            local_context(),
        )
    }

    #[tokio::test]
    async fn test_full_run_deploys_and_initializes() {
        let chain = SimulatedChain::default();
        let store = MemoryStore::new();

        let manifest = orchestrator(&chain, &store)
            .run(&StageTag::Full, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(manifest.order.len(), 5);
        // 5 creations plus two steps for each paymaster.
        assert_eq!(chain.transaction_count(), 9);

        let token = manifest.entry(&"TokenPaymaster".into()).unwrap();
        assert_eq!(token.state, EntryState::Initialized);
        assert_eq!(token.init_receipts.len(), 2);
        assert_eq!(
            manifest.entry(&"MakoShard".into()).unwrap().state,
            EntryState::Deployed
        );

        // The paymaster was constructed with the shard address from this run.
        let shard = manifest.record(&"MakoShard".into()).unwrap().address;
        let args = &manifest.record(&"TokenPaymaster".into()).unwrap().constructor_args;
        assert_eq!(args[1], ArgValue::Address(shard));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let chain = SimulatedChain::default();
        let store = MemoryStore::new();
        let orchestrator = orchestrator(&chain, &store);

        let first = orchestrator.run(&StageTag::Full, &RunOptions::default()).await.unwrap();
        let submitted = chain.transaction_count();

        let funded = RunOptions {
            init: InitPolicy::default()
                .skip("TokenPaymaster")
                .skip("SubscriptionPaymaster"),
            ..Default::default()
        };
        let second = orchestrator.run(&StageTag::Full, &funded).await.unwrap();

        assert_eq!(chain.transaction_count(), submitted);
        assert!(second.entries.values().all(|entry| entry.reused));
        assert_eq!(
            first.addresses(),
            second.addresses(),
            "Rerun should report the same addresses"
        );
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_submission() {
        let chain = SimulatedChain::default();
        let catalog = Catalog::new(vec![
            ContractSpec::new("MakoShard").arg(ArgSlot::reference("MakoEnergy")),
            ContractSpec::new("MakoEnergy").arg(ArgSlot::reference("MakoShard")),
        ]);
        let orchestrator = Orchestrator::new(
            catalog,
            ArtifactRegistry::new(mako_interfaces(), MemoryStore::new(), "localhost"),
            &chain,
            local_context(),
        );

        let failure = orchestrator
            .run(&StageTag::Full, &RunOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::CyclicDependency(_)));
        assert!(failure.manifest.order.is_empty());
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_any_submission() {
        let chain = SimulatedChain::default();
        let interfaces = StaticInterfaces::new().with("MakoEnergy", interface(&[0x60, 0x01], &[]));
        let orchestrator = Orchestrator::new(
            Catalog::default(),
            ArtifactRegistry::new(interfaces, MemoryStore::new(), "localhost"),
            &chain,
            local_context(),
        );

        let failure = orchestrator
            .run(&StageTag::Full, &RunOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::UnknownContract(_)));
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_init_failure_keeps_deployment_and_resumes() {
        // Submissions: MakoShard, TokenPaymaster, deposit, addStake.
        let chain = SimulatedChain::default().with_fault(3, Fault::Revert);
        let store = MemoryStore::new();
        let orchestrator = orchestrator(&chain, &store);
        let stage = StageTag::Named("TokenPaymaster".to_string());

        let failure = orchestrator.run(&stage, &RunOptions::default()).await.unwrap_err();

        assert_eq!(failure.contract, Some("TokenPaymaster".into()));
        assert_eq!(failure.step_index, Some(2));
        assert!(matches!(
            failure.error,
            DeployError::InitializationFailed {
                cause: TxFailure::Reverted(_),
                ..
            }
        ));
        let entry = failure.manifest.entry(&"TokenPaymaster".into()).unwrap();
        assert_eq!(entry.state, EntryState::InitializationFailed);
        assert!(entry.record.is_some(), "Deployed contract stays in the manifest");
        assert!(failure.to_string().contains("TokenPaymaster step 2"));

        let resume = RunOptions {
            init: InitPolicy::default().resume("TokenPaymaster", 2),
            ..Default::default()
        };
        let manifest = orchestrator.run(&stage, &resume).await.unwrap();

        // Only the addStake call is resubmitted.
        assert_eq!(chain.transaction_count(), 5);
        let entry = manifest.entry(&"TokenPaymaster".into()).unwrap();
        assert!(entry.reused);
        assert_eq!(entry.state, EntryState::Initialized);
        assert_eq!(entry.init_receipts.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_init_policy() {
        let chain = SimulatedChain::default();
        let store = MemoryStore::new();
        let options = RunOptions {
            init: InitPolicy::default().skip("TokenPaymaster"),
            ..Default::default()
        };

        let manifest = orchestrator(&chain, &store)
            .run(&StageTag::Named("TokenPaymaster".to_string()), &options)
            .await
            .unwrap();

        assert_eq!(chain.transaction_count(), 2);
        assert_eq!(
            manifest.entry(&"TokenPaymaster".into()).unwrap().state,
            EntryState::Deployed
        );
    }

    #[tokio::test]
    async fn test_rerun_after_timeout_deploys_remaining() {
        // Submissions: MakoEnergy, MakoShard (stalls).
        let chain = SimulatedChain::default().with_fault(1, Fault::Stall);
        let store = MemoryStore::new();
        let orchestrator = orchestrator(&chain, &store);
        let options = RunOptions {
            confirmation_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };

        let failure = orchestrator.run(&StageTag::Full, &options).await.unwrap_err();
        assert!(matches!(failure.error, DeployError::ConfirmationTimeout { .. }));
        assert_eq!(failure.contract, Some("MakoShard".into()));
        assert!(store.get("localhost", &"MakoShard".into()).unwrap().is_none());
        assert!(store.get("localhost", &"MakoEnergy".into()).unwrap().is_some());

        let manifest = orchestrator.run(&StageTag::Full, &options).await.unwrap();
        assert!(manifest.entry(&"MakoEnergy".into()).unwrap().reused);
        assert!(!manifest.entry(&"MakoShard".into()).unwrap().reused);
        assert!(!manifest.has_failures());
    }

    #[tokio::test]
    async fn test_misspelled_init_policy_fails_before_any_submission() {
        let chain = SimulatedChain::default();
        let store = MemoryStore::new();
        let options = RunOptions {
            init: InitPolicy::default().skip("TokenPaymster"),
            ..Default::default()
        };

        let failure = orchestrator(&chain, &store)
            .run(&StageTag::Named("TokenPaymaster".to_string()), &options)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            DeployError::InvalidInitPolicy { ref contract, .. } if contract.as_str() == "TokenPaymster"
        ));
        assert!(failure.error.is_planning_error());
        assert!(failure.manifest.order.is_empty());
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_reused_contract_is_initialized_unless_skipped() {
        let chain = SimulatedChain::default();
        let store = MemoryStore::new();
        let orchestrator = orchestrator(&chain, &store);
        let stage = StageTag::Named("TokenPaymaster".to_string());

        orchestrator.run(&stage, &RunOptions::default()).await.unwrap();
        assert_eq!(chain.transaction_count(), 4);

        let manifest = orchestrator.run(&stage, &RunOptions::default()).await.unwrap();
        let entry = manifest.entry(&"TokenPaymaster".into()).unwrap();
        assert!(entry.reused);
        assert_eq!(entry.init_receipts.len(), 2);
        assert_eq!(chain.transaction_count(), 6);
    }
}
