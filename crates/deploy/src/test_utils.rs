//! Shared fixtures for unit tests.

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};

use crate::{
    context::DeployerContext,
    registry::{ContractInterface, StaticInterfaces},
    sim::DEFAULT_SIM_DEPLOYER,
    types::Network,
};

/// Build an interface whose constructor takes `inputs` (solidity type names).
pub fn interface(code: &[u8], inputs: &[&str]) -> ContractInterface {
    let params = inputs
        .iter()
        .enumerate()
        .map(|(i, ty)| serde_json::json!({ "name": format!("arg{i}"), "type": ty }))
        .collect::<Vec<_>>();
    let abi: JsonAbi = serde_json::from_value(serde_json::json!([{
        "type": "constructor",
        "inputs": params,
        "stateMutability": "nonpayable"
    }]))
    .expect("valid constructor abi");

    ContractInterface {
        creation_code: Bytes::copy_from_slice(code),
        abi,
    }
}

/// Interfaces for every contract of the Mako catalog.
pub fn mako_interfaces() -> StaticInterfaces {
    StaticInterfaces::new()
        .with("MakoEnergy", interface(&[0x60, 0x01], &[]))
        .with("MakoShard", interface(&[0x60, 0x02], &[]))
        .with("MakoAccountFactory", interface(&[0x60, 0x03], &["address"]))
        .with(
            "TokenPaymaster",
            interface(&[0x60, 0x04], &["address", "address"]),
        )
        .with(
            "SubscriptionPaymaster",
            interface(&[0x60, 0x05], &["address", "address", "uint256"]),
        )
}

pub fn local_context() -> DeployerContext {
    DeployerContext::new(
        Network {
            name: "localhost".to_string(),
            chain_id: 31337,
        },
        DEFAULT_SIM_DEPLOYER,
    )
}
