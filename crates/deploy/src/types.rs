//! Core data model shared by the planner, deployer and initializer.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, B256, Bytes, U256},
};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

/// Name of a deployable contract, as it appears in the compiled artifacts.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Deref, From, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContractName(String);

impl ContractName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContractName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// A concrete constructor argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl ArgValue {
    /// Convert into an ABI value, checking it against the declared parameter type.
    ///
    /// Returns `None` when the value cannot be encoded as `ty`.
    pub fn to_sol_value(&self, ty: &DynSolType) -> Option<DynSolValue> {
        match (self, ty) {
            (Self::Address(addr), DynSolType::Address) => Some(DynSolValue::Address(*addr)),
            (Self::Uint(value), DynSolType::Uint(bits)) => {
                (value.bit_len() <= *bits).then_some(DynSolValue::Uint(*value, *bits))
            }
            (Self::Bool(value), DynSolType::Bool) => Some(DynSolValue::Bool(*value)),
            (Self::String(value), DynSolType::String) => Some(DynSolValue::String(value.clone())),
            (Self::Bytes(value), DynSolType::Bytes) => Some(DynSolValue::Bytes(value.to_vec())),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "{addr}"),
            Self::Uint(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
            Self::Bytes(value) => write!(f, "0x{}", hex::encode(value)),
        }
    }
}

/// One slot of a constructor argument template.
///
/// References are kept unresolved until the referenced contract has a deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSlot {
    Literal(ArgValue),
    Reference(ContractName),
}

impl ArgSlot {
    pub fn address(addr: Address) -> Self {
        Self::Literal(ArgValue::Address(addr))
    }

    pub fn uint(value: U256) -> Self {
        Self::Literal(ArgValue::Uint(value))
    }

    pub fn reference(name: impl Into<ContractName>) -> Self {
        Self::Reference(name.into())
    }
}

/// A post-deploy funding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InitAction {
    /// `deposit()` with `amount` as call value.
    #[strum(to_string = "deposit")]
    Deposit { amount: U256 },
    /// `addStake(unstakeDelaySec)` with `amount` as call value.
    #[strum(to_string = "addStake")]
    AddStake { amount: U256, unstake_delay_secs: u32 },
}

impl InitAction {
    /// The value sent along with the call.
    pub fn value(&self) -> U256 {
        match self {
            Self::Deposit { amount } | Self::AddStake { amount, .. } => *amount,
        }
    }
}

/// Immutable definition of a deployable contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub name: ContractName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor_args: Vec<ArgSlot>,
    /// Funding calls to run after deployment, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init: Vec<InitAction>,
}

impl ContractSpec {
    pub fn new(name: impl Into<ContractName>) -> Self {
        Self {
            name: name.into(),
            constructor_args: Vec::new(),
            init: Vec::new(),
        }
    }

    /// Append a constructor argument slot.
    pub fn arg(mut self, slot: ArgSlot) -> Self {
        self.constructor_args.push(slot);
        self
    }

    /// Append a post-deploy initialization action.
    pub fn init(mut self, action: InitAction) -> Self {
        self.init.push(action);
        self
    }

    pub fn requires_init(&self) -> bool {
        !self.init.is_empty()
    }

    /// Contracts whose addresses this contract's constructor needs.
    pub fn dependencies(&self) -> impl Iterator<Item = &ContractName> {
        self.constructor_args.iter().filter_map(|slot| match slot {
            ArgSlot::Reference(name) => Some(name),
            ArgSlot::Literal(_) => None,
        })
    }
}

/// A single step of a contract's initialization sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationStep {
    pub contract: ContractName,
    /// 1-based position within the contract's sequence.
    pub index: usize,
    pub action: InitAction,
}

/// Persisted proof that a contract exists on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract: ContractName,
    pub address: Address,
    pub transaction_hash: B256,
    pub network: String,
    /// Unix timestamp (seconds) of the confirmed deployment.
    pub timestamp: i64,
    /// SHA-256 of the creation code with encoded constructor arguments.
    pub code_hash: String,
    #[serde(default)]
    pub constructor_args: Vec<ArgValue>,
}

/// A transaction to submit through the chain client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
}

/// The network a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}
