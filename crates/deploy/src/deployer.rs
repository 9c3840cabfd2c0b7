//! Contract deployer: one creation transaction per contract, recorded only once confirmed.

use std::collections::BTreeMap;

use alloy_core::{
    dyn_abi::{DynSolValue, Specifier},
    primitives::{Address, Bytes, U256},
};
use sha2::{Digest, Sha256};

use crate::{
    chain::{ChainClient, confirm},
    context::{DeployerContext, RunOptions},
    error::{DeployError, TxFailure},
    registry::{ArtifactRegistry, ContractInterface, InterfaceProvider},
    store::DeploymentStore,
    types::{ArgSlot, ArgValue, ContractName, ContractSpec, DeploymentRecord, TxRequest},
};

/// Result of deploying a single contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub record: DeploymentRecord,
    /// `true` when an existing record was reused and nothing was submitted.
    pub reused: bool,
}

/// SHA-256 (hex) of the full creation payload.
///
/// Two payloads hash equal only if both the bytecode and the encoded arguments are equal.
pub fn code_hash(init_code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(init_code);
    hex::encode(hasher.finalize())
}

/// Substitute the addresses of already deployed contracts into the argument template.
pub fn resolve_args(
    spec: &ContractSpec,
    addresses: &BTreeMap<ContractName, Address>,
) -> Result<Vec<ArgValue>, DeployError> {
    spec.constructor_args
        .iter()
        .map(|slot| match slot {
            ArgSlot::Literal(value) => Ok(value.clone()),
            ArgSlot::Reference(dependency) => addresses
                .get(dependency)
                .map(|addr| ArgValue::Address(*addr))
                .ok_or_else(|| DeployError::DependencyUnresolved {
                    contract: spec.name.clone(),
                    dependency: dependency.clone(),
                }),
        })
        .collect()
}

/// Creation code followed by the ABI-encoded constructor arguments.
pub fn encode_creation(
    contract: &ContractName,
    interface: &ContractInterface,
    args: &[ArgValue],
) -> Result<Bytes, DeployError> {
    let invalid = |reason: String| DeployError::InvalidArgument {
        contract: contract.clone(),
        reason,
    };

    let inputs = interface
        .abi
        .constructor()
        .map(|ctor| ctor.inputs.as_slice())
        .unwrap_or_default();
    if inputs.len() != args.len() {
        return Err(invalid(format!(
            "constructor takes {} arguments, {} given",
            inputs.len(),
            args.len()
        )));
    }

    let mut values = Vec::with_capacity(args.len());
    for (param, arg) in inputs.iter().zip(args) {
        let ty = param
            .resolve()
            .map_err(|e| invalid(format!("unsupported parameter type {}: {e}", param.ty)))?;
        let value = arg.to_sol_value(&ty).ok_or_else(|| {
            invalid(format!(
                "argument {} ({arg}) does not match parameter type {}",
                param.name, param.ty
            ))
        })?;
        values.push(value);
    }

    let mut init_code = interface.creation_code.to_vec();
    if !values.is_empty() {
        init_code.extend(DynSolValue::Tuple(values).abi_encode_params());
    }
    Ok(init_code.into())
}

/// Deploys contracts from the registry through a chain client.
pub struct ContractDeployer<'a, C, P, S> {
    ctx: &'a DeployerContext,
    chain: &'a C,
    registry: &'a ArtifactRegistry<P, S>,
}

impl<'a, C, P, S> ContractDeployer<'a, C, P, S>
where
    C: ChainClient + Sync,
    P: InterfaceProvider,
    S: DeploymentStore,
{
    pub fn new(
        ctx: &'a DeployerContext,
        chain: &'a C,
        registry: &'a ArtifactRegistry<P, S>,
    ) -> Self {
        Self {
            ctx,
            chain,
            registry,
        }
    }

    /// Deploy `spec`, or reuse its existing record.
    ///
    /// `addresses` must hold every contract `spec` references. A record is written only after
    /// the creation transaction reached the configured confirmation depth.
    pub async fn deploy(
        &self,
        spec: &ContractSpec,
        addresses: &BTreeMap<ContractName, Address>,
        options: &RunOptions,
    ) -> Result<DeploymentOutcome, DeployError> {
        let (interface, existing) = self.registry.resolve(&spec.name)?;
        let creation = resolve_args(spec, addresses).and_then(|args| {
            encode_creation(&spec.name, &interface, &args).map(|init_code| (init_code, args))
        });

        if let Some(record) = existing {
            let current = creation.as_ref().ok().map(|(init_code, _)| code_hash(init_code));
            if options.force_redeploy {
                tracing::info!(contract = %spec.name, old = %record.address, "Forcing redeployment");
            } else if current.as_deref() == Some(record.code_hash.as_str()) {
                tracing::info!(contract = %spec.name, address = %record.address, "Already deployed, skipping");
                return Ok(DeploymentOutcome {
                    record,
                    reused: true,
                });
            } else if options.redeploy_on_change {
                tracing::info!(
                    contract = %spec.name,
                    old = %record.address,
                    "Creation code or arguments changed, redeploying"
                );
            } else {
                match (&current, &creation) {
                    (Some(current), _) => tracing::warn!(
                        contract = %spec.name,
                        address = %record.address,
                        recorded = %record.code_hash,
                        %current,
                        "Creation code or arguments changed since deployment; keeping existing record"
                    ),
                    (None, Err(error)) => tracing::warn!(
                        contract = %spec.name,
                        address = %record.address,
                        %error,
                        "Constructor no longer accepts the configured arguments; keeping existing record"
                    ),
                    (None, Ok(_)) => {}
                }
                return Ok(DeploymentOutcome {
                    record,
                    reused: true,
                });
            }
        }

        let (init_code, args) = creation?;
        let hash = code_hash(&init_code);

        let failed = |cause: TxFailure| DeployError::DeploymentFailed {
            contract: spec.name.clone(),
            cause,
        };

        tracing::info!(
            contract = %spec.name,
            network = %self.ctx.network,
            args = ?args.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Deploying contract"
        );

        let tx_hash = self
            .chain
            .send_transaction(TxRequest {
                from: self.ctx.deployer,
                to: None,
                value: U256::ZERO,
                data: init_code,
            })
            .await
            .map_err(|e| failed(TxFailure::Transport(e)))?;

        tracing::debug!(contract = %spec.name, %tx_hash, "Creation transaction submitted");

        let receipt = confirm(
            self.chain,
            tx_hash,
            self.ctx.confirmations,
            self.ctx.confirmation_timeout,
        )
        .await
        .map_err(|cause| match cause {
            TxFailure::TimedOut { tx_hash, waited } => DeployError::ConfirmationTimeout {
                contract: spec.name.clone(),
                tx_hash,
                waited,
            },
            cause => failed(cause),
        })?;

        let address = receipt.contract_address.ok_or_else(|| {
            failed(TxFailure::Transport(anyhow::anyhow!(
                "receipt for {tx_hash} has no contract address"
            )))
        })?;

        let record = DeploymentRecord {
            contract: spec.name.clone(),
            address,
            transaction_hash: tx_hash,
            network: self.registry.network().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            code_hash: hash,
            constructor_args: args,
        };
        self.registry
            .store()
            .put(&record)
            .map_err(DeployError::Store)?;

        tracing::info!(
            contract = %spec.name,
            %address,
            %tx_hash,
            block = receipt.block_number,
            "Contract deployed"
        );

        Ok(DeploymentOutcome {
            record,
            reused: false,
        })
    }
}
