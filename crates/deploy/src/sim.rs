//! In-memory chain used for dry runs and tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_core::primitives::{Address, B256, U256, address, keccak256};

use crate::{
    chain::{ChainClient, ConfirmationStatus, confirmation_status},
    error::TxFailure,
    types::{TxReceipt, TxRequest},
};

/// First default account of local dev nodes (hardhat/anvil).
pub const DEFAULT_SIM_DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// Failure to inject into a simulated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Mined with a failed status.
    Revert,
    /// Never included.
    Drop,
    /// Stays pending forever.
    Stall,
}

/// A transaction accepted by the simulated chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedTx {
    pub hash: B256,
    pub request: TxRequest,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    pub fault: Option<Fault>,
}

#[derive(Debug, Default)]
struct SimState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    txs: Vec<SimulatedTx>,
    /// Faults keyed by submission index (0-based).
    faults: HashMap<usize, Fault>,
}

/// Deterministic single-node chain.
///
/// Every transaction is mined in its own block. Contract addresses follow the CREATE
/// derivation from the sender and nonce, so repeated runs produce the same addresses.
#[derive(Debug)]
pub struct SimulatedChain {
    deployer: Address,
    state: Mutex<SimState>,
}

impl SimulatedChain {
    pub fn new(deployer: Address, balance: U256) -> Self {
        let mut state = SimState::default();
        state.balances.insert(deployer, balance);
        Self {
            deployer,
            state: Mutex::new(state),
        }
    }

    /// A chain where `deployer` holds 10_000 ether, the dev node default.
    pub fn funded(deployer: Address) -> Self {
        Self::new(
            deployer,
            U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64)),
        )
    }

    /// Inject a fault into the `index`-th submitted transaction (0-based).
    pub fn with_fault(self, index: usize, fault: Fault) -> Self {
        self.inject_fault(index, fault);
        self
    }

    pub fn inject_fault(&self, index: usize, fault: Fault) {
        self.state().faults.insert(index, fault);
    }

    /// Transactions submitted so far, in order.
    pub fn submitted(&self) -> Vec<SimulatedTx> {
        self.state().txs.clone()
    }

    /// Number of the latest block.
    pub fn block_number(&self) -> u64 {
        self.state().block_number
    }

    pub fn transaction_count(&self) -> usize {
        self.state().txs.len()
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.state()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::funded(DEFAULT_SIM_DEPLOYER)
    }
}

impl ChainClient for SimulatedChain {
    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<B256> {
        let mut state = self.state();

        let balance = state.balances.get(&tx.from).copied().unwrap_or_default();
        if balance < tx.value {
            anyhow::bail!(
                "insufficient funds for transfer: have {} want {}",
                balance,
                tx.value
            );
        }

        let nonce = state.nonces.get(&tx.from).copied().unwrap_or_default();
        let hash = keccak256(
            [
                tx.from.as_slice(),
                nonce.to_be_bytes().as_slice(),
                &tx.data[..],
            ]
            .concat(),
        );
        let index = state.txs.len();
        let fault = state.faults.get(&index).copied();

        state.nonces.insert(tx.from, nonce + 1);
        state.block_number += 1;
        let block_number = state.block_number;

        let applied = fault.is_none() || fault == Some(Fault::Stall);
        let contract_address = match tx.to {
            None if applied => Some(tx.from.create(nonce)),
            _ => None,
        };
        if applied {
            state.balances.insert(tx.from, balance - tx.value);
            if let Some(recipient) = tx.to.or(contract_address) {
                *state.balances.entry(recipient).or_default() += tx.value;
            }
        }

        state.txs.push(SimulatedTx {
            hash,
            request: tx,
            block_number,
            contract_address,
            fault,
        });

        Ok(hash)
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<TxReceipt, TxFailure> {
        loop {
            let (status, tx) = {
                let mut state = self.state();
                let Some(tx) = state.txs.iter().find(|tx| tx.hash == tx_hash).cloned() else {
                    return Err(TxFailure::Transport(anyhow::anyhow!(
                        "unknown transaction {tx_hash}"
                    )));
                };

                let mined_in = match tx.fault {
                    Some(Fault::Stall | Fault::Drop) => None,
                    _ => Some(tx.block_number),
                };
                let known = tx.fault != Some(Fault::Drop);
                let status = confirmation_status(mined_in, known, state.block_number, confirmations);
                if let ConfirmationStatus::Waiting { .. } = status {
                    // Mine an empty block per poll.
                    state.block_number += 1;
                }
                (status, tx)
            };

            match status {
                ConfirmationStatus::Confirmed => {
                    return Ok(TxReceipt {
                        transaction_hash: tx_hash,
                        block_number: tx.block_number,
                        success: tx.fault != Some(Fault::Revert),
                        contract_address: tx.contract_address,
                    });
                }
                ConfirmationStatus::Dropped => return Err(TxFailure::Dropped(tx_hash)),
                ConfirmationStatus::Pending => std::future::pending::<()>().await,
                ConfirmationStatus::Waiting { .. } => tokio::task::yield_now().await,
            }
        }
    }

    async fn get_balance(&self, address: Address) -> anyhow::Result<U256> {
        Ok(self.balance_of(address))
    }

    async fn deployer_address(&self) -> anyhow::Result<Address> {
        Ok(self.deployer)
    }
}
