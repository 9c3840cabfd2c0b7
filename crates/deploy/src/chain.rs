//! Chain client abstraction used by the deployer and initializer.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, U256};

use crate::{
    error::TxFailure,
    types::{TxReceipt, TxRequest},
};

/// Transport to an EVM network.
///
/// Implementations only move transactions and receipts; ordering, retries and timeouts are
/// decided by the caller.
pub trait ChainClient {
    /// Submit a transaction, returning its hash.
    fn send_transaction(
        &self,
        tx: TxRequest,
    ) -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// Block until the transaction is `confirmations` blocks deep.
    ///
    /// Resolves to a receipt for mined transactions, including reverted ones.
    fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TxReceipt, TxFailure>> + Send;

    fn get_balance(&self, address: Address) -> impl Future<Output = anyhow::Result<U256>> + Send;

    /// The account the node signs for.
    fn deployer_address(&self) -> impl Future<Output = anyhow::Result<Address>> + Send;
}

impl<T: ChainClient + Sync> ChainClient for &T {
    fn send_transaction(
        &self,
        tx: TxRequest,
    ) -> impl Future<Output = anyhow::Result<B256>> + Send {
        (**self).send_transaction(tx)
    }

    fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TxReceipt, TxFailure>> + Send {
        (**self).wait_for_confirmation(tx_hash, confirmations)
    }

    fn get_balance(&self, address: Address) -> impl Future<Output = anyhow::Result<U256>> + Send {
        (**self).get_balance(address)
    }

    fn deployer_address(&self) -> impl Future<Output = anyhow::Result<Address>> + Send {
        (**self).deployer_address()
    }
}

/// Where a submitted transaction stands relative to the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Mined at least the requested number of blocks deep.
    Confirmed,
    /// Mined, but `depth` is still below the requested confirmations.
    Waiting { depth: u64 },
    /// Known to the node but not mined yet.
    Pending,
    /// Neither mined nor known to the node.
    Dropped,
}

/// Decide the status of a transaction mined in `mined_in` (if at all) when the chain head
/// is `head`.
///
/// The block containing the transaction counts as the first confirmation, so the depth is
/// `head - mined_in + 1`. `known` tells whether the node still holds an unmined transaction.
pub fn confirmation_status(
    mined_in: Option<u64>,
    known: bool,
    head: u64,
    confirmations: u64,
) -> ConfirmationStatus {
    match mined_in {
        Some(block) => {
            let depth = if head < block { 0 } else { head - block + 1 };
            if depth >= confirmations.max(1) {
                ConfirmationStatus::Confirmed
            } else {
                ConfirmationStatus::Waiting { depth }
            }
        }
        None if known => ConfirmationStatus::Pending,
        None => ConfirmationStatus::Dropped,
    }
}

/// Wait for confirmation, giving up after `timeout`.
///
/// A reverted receipt is turned into [`TxFailure::Reverted`].
pub async fn confirm<C: ChainClient>(
    chain: &C,
    tx_hash: B256,
    confirmations: u64,
    timeout: Duration,
) -> Result<TxReceipt, TxFailure> {
    let receipt = tokio::time::timeout(timeout, chain.wait_for_confirmation(tx_hash, confirmations))
        .await
        .map_err(|_| TxFailure::TimedOut {
            tx_hash,
            waited: timeout,
        })??;

    if !receipt.success {
        return Err(TxFailure::Reverted(tx_hash));
    }

    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_counts_the_inclusion_block() {
        assert_eq!(confirmation_status(Some(10), true, 10, 1), ConfirmationStatus::Confirmed);
        assert_eq!(
            confirmation_status(Some(10), true, 10, 3),
            ConfirmationStatus::Waiting { depth: 1 }
        );
        assert_eq!(
            confirmation_status(Some(10), true, 11, 3),
            ConfirmationStatus::Waiting { depth: 2 }
        );
        assert_eq!(confirmation_status(Some(10), true, 12, 3), ConfirmationStatus::Confirmed);
        assert_eq!(confirmation_status(Some(10), true, 20, 3), ConfirmationStatus::Confirmed);
    }

    #[test]
    fn test_head_behind_receipt_is_not_confirmed() {
        // Head lagging the receipt's block.
        assert_eq!(
            confirmation_status(Some(10), true, 9, 1),
            ConfirmationStatus::Waiting { depth: 0 }
        );
    }

    #[test]
    fn test_unmined_transactions() {
        assert_eq!(confirmation_status(None, true, 50, 1), ConfirmationStatus::Pending);
        assert_eq!(confirmation_status(None, false, 50, 1), ConfirmationStatus::Dropped);
        // Zero confirmations still needs inclusion.
        assert_eq!(confirmation_status(None, true, 50, 0), ConfirmationStatus::Pending);
        assert_eq!(confirmation_status(Some(50), true, 50, 0), ConfirmationStatus::Confirmed);
    }
}
