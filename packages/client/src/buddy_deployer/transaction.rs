use alloy_network::Ethereum;
use alloy_primitives::TxHash;
use alloy_provider::PendingTransactionBuilder;
use alloy_rpc_types_eth::TransactionReceipt;
use buddy_types::Deployed;

use crate::error::BuddyDeployerError;

/// A submitted `executeBuddyDeploy` transaction.
/// Submission succeeding says nothing about execution; `wait` does.
pub struct DeployTransaction {
    pending: PendingTransactionBuilder<Ethereum>,
}

impl std::fmt::Debug for DeployTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployTransaction")
            .field("tx_hash", self.pending.tx_hash())
            .finish()
    }
}

impl DeployTransaction {
    pub(crate) fn new(pending: PendingTransactionBuilder<Ethereum>) -> Self {
        Self { pending }
    }

    pub fn tx_hash(&self) -> TxHash {
        *self.pending.tx_hash()
    }

    pub fn with_required_confirmations(mut self, confirmations: u64) -> Self {
        self.pending = self.pending.with_required_confirmations(confirmations);
        self
    }

    /// Resolves once the transaction is mined. A failed receipt is an error.
    pub async fn wait(self) -> Result<TransactionReceipt, BuddyDeployerError> {
        let receipt = self.pending.get_receipt().await?;

        tracing::info!(
            "executeBuddyDeploy mined in block {:?} with hash {}",
            receipt.block_number,
            receipt.transaction_hash
        );

        check_receipt(receipt)
    }
}

pub(crate) fn check_receipt(
    receipt: TransactionReceipt,
) -> Result<TransactionReceipt, BuddyDeployerError> {
    match receipt.status() {
        true => Ok(receipt),
        false => Err(BuddyDeployerError::Reverted(Box::new(receipt))),
    }
}

/// The `Deployed` events a receipt carries, in log order
pub fn deployed_events(receipt: &TransactionReceipt) -> Vec<Deployed> {
    receipt
        .inner
        .logs()
        .iter()
        .filter_map(|log| log.log_decode::<Deployed>().map(|log| log.inner.data).ok())
        .collect()
}
