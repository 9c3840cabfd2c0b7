//! Error types for planning, deployment and initialization.

use std::time::Duration;

use alloy_core::primitives::{B256, U256};

use crate::types::{ContractName, InitAction};

/// Why a single transaction did not reach the required confirmation depth.
#[derive(Debug, thiserror::Error)]
pub enum TxFailure {
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error("transaction {0} was dropped before inclusion")]
    Dropped(B256),
    #[error("transaction {tx_hash} not confirmed after {waited:?}")]
    TimedOut { tx_hash: B256, waited: Duration },
    #[error("insufficient funds: step needs {required} wei, deployer holds {available} wei")]
    InsufficientFunds { required: U256, available: U256 },
    #[error("transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
}

/// Errors surfaced by the deployment engine.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("no compiled interface for contract {0}")]
    UnknownContract(ContractName),

    #[error("unknown stage {0:?}")]
    UnknownStage(String),

    #[error("cyclic constructor dependency between {}", format_cycle(.0))]
    CyclicDependency(Vec<ContractName>),

    #[error("{contract} needs the address of {dependency}, which is not deployed")]
    DependencyUnresolved {
        contract: ContractName,
        dependency: ContractName,
    },

    #[error("invalid constructor arguments for {contract}: {reason}")]
    InvalidArgument {
        contract: ContractName,
        reason: String,
    },

    #[error("invalid artifact for {contract}: {reason}")]
    InvalidArtifact {
        contract: ContractName,
        reason: String,
    },

    #[error("initialization policy for {contract}: {reason}")]
    InvalidInitPolicy {
        contract: ContractName,
        reason: String,
    },

    #[error("deployment of {contract} failed: {cause}")]
    DeploymentFailed {
        contract: ContractName,
        #[source]
        cause: TxFailure,
    },

    #[error("deployment of {contract} not confirmed after {waited:?} (tx {tx_hash})")]
    ConfirmationTimeout {
        contract: ContractName,
        tx_hash: B256,
        waited: Duration,
    },

    #[error("initialization of {contract} failed at step {step_index} ({action}): {cause}")]
    InitializationFailed {
        contract: ContractName,
        step_index: usize,
        action: InitAction,
        #[source]
        cause: TxFailure,
    },

    #[error("deployment store error: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl DeployError {
    /// Whether the error was raised before any transaction could be submitted.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownContract(_)
                | Self::UnknownStage(_)
                | Self::CyclicDependency(_)
                | Self::InvalidArtifact { .. }
                | Self::InvalidInitPolicy { .. }
        )
    }
}

fn format_cycle(names: &[ContractName]) -> String {
    names
        .iter()
        .map(ContractName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
