use alloy_primitives::{Address, Log, B256, U256};
use alloy_rpc_types_eth::Filter;
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::Deployed;

/// Filter over the indexed fields of `Deployed`.
/// `None` matches anything; `_success` is not indexed and can't be filtered on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeployedFilter {
    pub sender: Option<Address>,
    pub contract: Option<Address>,
    pub withdrawal_id: Option<U256>,
}

impl DeployedFilter {
    pub fn new(
        sender: Option<Address>,
        contract: Option<Address>,
        withdrawal_id: Option<U256>,
    ) -> Self {
        Self {
            sender,
            contract,
            withdrawal_id,
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_contract(mut self, contract: Address) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_withdrawal_id(mut self, withdrawal_id: impl Into<U256>) -> Self {
        self.withdrawal_id = Some(withdrawal_id.into());
        self
    }

    /// Topic layout of the log: signature hash, then each indexed field as a 32 byte word
    pub fn topics(&self) -> [Option<B256>; 4] {
        [
            Some(Deployed::SIGNATURE_HASH),
            self.sender.map(|sender| sender.into_word()),
            self.contract.map(|contract| contract.into_word()),
            self.withdrawal_id
                .map(|withdrawal_id| B256::from(withdrawal_id.to_be_bytes::<32>())),
        ]
    }

    pub fn matches(&self, log: &Log) -> bool {
        let topics = log.data.topics();

        topics.len() == 4
            && self
                .topics()
                .iter()
                .zip(topics)
                .all(|(expected, actual)| expected.is_none_or(|expected| expected == *actual))
    }

    /// RPC filter scoped to the contract address; the caller sets the block range
    pub fn to_rpc_filter(&self, address: Address) -> Filter {
        let [event_signature, sender, contract, withdrawal_id] = self.topics();

        let mut filter = Filter::new().address(address);

        if let Some(topic) = event_signature {
            filter = filter.event_signature(topic);
        }
        if let Some(topic) = sender {
            filter = filter.topic1(topic);
        }
        if let Some(topic) = contract {
            filter = filter.topic2(topic);
        }
        if let Some(topic) = withdrawal_id {
            filter = filter.topic3(topic);
        }

        filter
    }
}
