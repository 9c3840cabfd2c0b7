//! Post-deploy initialization: funding calls executed in order against a deployed contract.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Bytes, U256, keccak256},
};

use crate::{
    chain::{ChainClient, confirm},
    context::DeployerContext,
    error::{DeployError, TxFailure},
    types::{DeploymentRecord, InitAction, InitializationStep, TxReceipt, TxRequest},
};

/// Solidity signature of the function an action calls.
pub fn signature(action: &InitAction) -> &'static str {
    match action {
        InitAction::Deposit { .. } => "deposit()",
        InitAction::AddStake { .. } => "addStake(uint32)",
    }
}

/// Calldata for an action: selector followed by the encoded arguments.
pub fn calldata(action: &InitAction) -> Bytes {
    let mut data = keccak256(signature(action))[..4].to_vec();
    if let InitAction::AddStake {
        unstake_delay_secs, ..
    } = action
    {
        let args = DynSolValue::Tuple(vec![DynSolValue::Uint(
            U256::from(*unstake_delay_secs),
            32,
        )]);
        data.extend(args.abi_encode_params());
    }
    data.into()
}

/// Runs initialization steps for deployed contracts.
pub struct Initializer<'a, C> {
    ctx: &'a DeployerContext,
    chain: &'a C,
}

impl<'a, C> Initializer<'a, C>
where
    C: ChainClient + Sync,
{
    pub fn new(ctx: &'a DeployerContext, chain: &'a C) -> Self {
        Self { ctx, chain }
    }

    /// Execute `steps` against `record.address`, starting at step `first_step` (1-based).
    ///
    /// Stops at the first failing step. Receipts of the completed steps are returned on
    /// success; on failure the error names the step that failed.
    pub async fn initialize(
        &self,
        record: &DeploymentRecord,
        steps: &[InitializationStep],
        first_step: usize,
    ) -> Result<Vec<TxReceipt>, DeployError> {
        let mut receipts = Vec::new();

        for step in steps {
            if step.index < first_step {
                tracing::debug!(
                    contract = %record.contract,
                    step = step.index,
                    action = %step.action,
                    "Step already completed, skipping"
                );
                continue;
            }

            let receipt = self
                .run_step(record, step)
                .await
                .map_err(|cause| DeployError::InitializationFailed {
                    contract: record.contract.clone(),
                    step_index: step.index,
                    action: step.action,
                    cause,
                })?;
            receipts.push(receipt);
        }

        Ok(receipts)
    }

    async fn run_step(
        &self,
        record: &DeploymentRecord,
        step: &InitializationStep,
    ) -> Result<TxReceipt, TxFailure> {
        let value = step.action.value();
        let available = self.chain.get_balance(self.ctx.deployer).await?;
        if available < value {
            return Err(TxFailure::InsufficientFunds {
                required: value,
                available,
            });
        }

        tracing::info!(
            contract = %record.contract,
            step = step.index,
            action = %step.action,
            %value,
            "Running initialization step"
        );

        let tx_hash = self
            .chain
            .send_transaction(TxRequest {
                from: self.ctx.deployer,
                to: Some(record.address),
                value,
                data: calldata(&step.action),
            })
            .await?;

        let receipt = confirm(
            self.chain,
            tx_hash,
            self.ctx.confirmations,
            self.ctx.confirmation_timeout,
        )
        .await?;

        tracing::debug!(
            contract = %record.contract,
            step = step.index,
            %tx_hash,
            "Initialization step confirmed"
        );

        Ok(receipt)
    }
}
