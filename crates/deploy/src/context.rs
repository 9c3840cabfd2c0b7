//! Per-run context and options passed explicitly through the engine.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use alloy_core::primitives::Address;

use crate::{
    error::DeployError,
    planner::StagePlan,
    types::{ContractName, Network},
};

/// Default number of confirmations to wait for.
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// Default time to wait for a transaction to be confirmed.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Identity of the deploying account on a given network.
///
/// Passed into every deployer and initializer call instead of being read from the
/// environment, so several engines can target different networks in the same process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployerContext {
    pub network: Network,
    /// The signing account, used as `from` on every transaction.
    pub deployer: Address,
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
}

impl DeployerContext {
    pub fn new(network: Network, deployer: Address) -> Self {
        Self {
            network,
            deployer,
            confirmations: DEFAULT_CONFIRMATIONS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Apply the per-run overrides from `options`.
    pub fn with_overrides(&self, options: &RunOptions) -> Self {
        Self {
            network: self.network.clone(),
            deployer: self.deployer,
            confirmations: options.confirmations.unwrap_or(self.confirmations),
            confirmation_timeout: options
                .confirmation_timeout
                .unwrap_or(self.confirmation_timeout),
        }
    }
}

/// Explicit operator decisions about initialization steps.
///
/// Nothing is skipped unless it is listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitPolicy {
    /// Contracts whose initialization is skipped entirely.
    pub skip: BTreeSet<ContractName>,
    /// First step (1-based) to run per contract; earlier steps are treated as done.
    pub resume: BTreeMap<ContractName, usize>,
}

impl InitPolicy {
    pub fn skip(mut self, contract: impl Into<ContractName>) -> Self {
        self.skip.insert(contract.into());
        self
    }

    pub fn resume(mut self, contract: impl Into<ContractName>, step: usize) -> Self {
        self.resume.insert(contract.into(), step);
        self
    }

    /// First step to run for `contract`, or `None` to skip its initialization.
    pub fn first_step(&self, contract: &ContractName) -> Option<usize> {
        if self.skip.contains(contract) {
            return None;
        }
        Some(self.resume.get(contract).copied().unwrap_or(1).max(1))
    }

    /// Reject entries that do not apply to `plan`: contracts outside the plan or without
    /// initialization steps, resume steps out of range, and contracts both skipped and
    /// resumed.
    pub fn validate(&self, plan: &StagePlan) -> Result<(), DeployError> {
        let listed = self
            .skip
            .iter()
            .map(|contract| (contract, None))
            .chain(self.resume.iter().map(|(contract, step)| (contract, Some(*step))));

        for (contract, step) in listed {
            let invalid = |reason: String| DeployError::InvalidInitPolicy {
                contract: contract.clone(),
                reason,
            };

            let steps = plan
                .position(contract)
                .map(|idx| plan.entries[idx].steps.len())
                .ok_or_else(|| invalid(format!("not part of stage {}", plan.stage)))?;
            if steps == 0 {
                return Err(invalid("has no initialization steps".to_string()));
            }
            if let Some(step) = step {
                if self.skip.contains(contract) {
                    return Err(invalid("both skipped and resumed".to_string()));
                }
                if step == 0 || step > steps {
                    return Err(invalid(format!("step {step} is outside 1..={steps}")));
                }
            }
        }

        Ok(())
    }
}

/// Options for a single orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Deploy even when a record already exists.
    pub force_redeploy: bool,
    /// Supersede existing records whose code or arguments changed.
    pub redeploy_on_change: bool,
    pub confirmations: Option<u64>,
    pub confirmation_timeout: Option<Duration>,
    pub init: InitPolicy,
}
