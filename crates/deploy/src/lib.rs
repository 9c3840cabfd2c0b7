//! mako-deploy - Deployment engine for the Mako contracts.
//!
//! This crate plans contract deployments in dependency order, deploys each contract
//! idempotently against a persisted record store, and runs the post-deploy funding
//! calls the paymasters need.

pub mod catalog;
pub use catalog::{Catalog, DEFAULT_ENTRY_POINT, FULL_DEPLOYMENT_STAGE, StageDef, StageTag};

mod chain;
pub use chain::{ChainClient, ConfirmationStatus, confirm, confirmation_status};

mod config;
pub use config::{DeployConfig, MAKOCONF_FILENAME};

mod context;
pub use context::{
    DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_CONFIRMATIONS, DeployerContext, InitPolicy, RunOptions,
};

mod deployer;
pub use deployer::{ContractDeployer, DeploymentOutcome, code_hash, encode_creation, resolve_args};

mod error;
pub use error::{DeployError, TxFailure};

mod initializer;
pub use initializer::{Initializer, calldata};

mod manifest;
pub use manifest::{DeploymentManifest, EntryState, ManifestEntry};

mod orchestrator;
pub use orchestrator::{Orchestrator, RunFailure};

mod planner;
pub use planner::{PlanEntry, Planner, StagePlan};

mod registry;
pub use registry::{
    ArtifactDir, ArtifactRegistry, ContractInterface, InterfaceProvider, StaticInterfaces,
};

mod rpc;
pub use rpc::{DEFAULT_POLL_INTERVAL, JsonRpcClient};

mod sim;
pub use sim::{DEFAULT_SIM_DEPLOYER, Fault, SimulatedChain, SimulatedTx};

mod store;
pub use store::{DeploymentStore, JsonFileStore, MemoryStore};

mod types;
pub use types::{
    ArgSlot, ArgValue, ContractName, ContractSpec, DeploymentRecord, InitAction,
    InitializationStep, Network, TxReceipt, TxRequest,
};

#[cfg(test)]
mod test_utils;
