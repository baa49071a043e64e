use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;

use crate::{BindingError, Deployed};

/// A decoded `Deployed` event together with where it was found on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedRecord {
    pub event: Deployed,
    /// The emitting contract
    pub address: Address,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

impl DeployedRecord {
    pub fn decode(log: &Log) -> Result<Self, BindingError> {
        let event = Deployed::decode_log(&log.inner)?.data;

        Ok(Self {
            event,
            address: log.inner.address,
            block_number: log.block_number,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            transaction_index: log.transaction_index,
            log_index: log.log_index,
            removed: log.removed,
        })
    }

    pub fn sender(&self) -> Address {
        self.event._sender
    }

    pub fn contract(&self) -> Address {
        self.event._contract
    }

    pub fn withdrawal_id(&self) -> U256 {
        self.event.withdrawalId
    }

    pub fn success(&self) -> bool {
        self.event._success
    }

    /// `(block_number, log_index)`, the order logs were emitted in
    pub fn position(&self) -> Result<(u64, u64), BindingError> {
        Ok((
            self.block_number
                .ok_or(BindingError::MissingLogMetadata("block number"))?,
            self.log_index
                .ok_or(BindingError::MissingLogMetadata("log index"))?,
        ))
    }

    /// `(transaction_hash, log_index)`, unique per log on a given chain
    pub fn id(&self) -> Result<(B256, u64), BindingError> {
        Ok((
            self.transaction_hash
                .ok_or(BindingError::MissingLogMetadata("transaction hash"))?,
            self.log_index
                .ok_or(BindingError::MissingLogMetadata("log index"))?,
        ))
    }
}

impl TryFrom<&Log> for DeployedRecord {
    type Error = BindingError;

    fn try_from(log: &Log) -> Result<Self, Self::Error> {
        Self::decode(log)
    }
}

#[cfg(test)]
mod test {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn decode_rpc_log() {
        let event = Deployed {
            _sender: address!("0x1000000000000000000000000000000000000001"),
            _contract: address!("0x2000000000000000000000000000000000000002"),
            withdrawalId: U256::MAX,
            _success: false,
        };

        let log = Log {
            inner: alloy_primitives::Log {
                address: address!("0x3000000000000000000000000000000000000003"),
                data: event.encode_log_data(),
            },
            block_number: Some(10),
            log_index: Some(3),
            transaction_hash: Some(B256::repeat_byte(0x11)),
            ..Default::default()
        };

        let record = DeployedRecord::try_from(&log).unwrap();

        assert_eq!(record.sender(), event._sender);
        assert_eq!(record.contract(), event._contract);
        assert_eq!(record.withdrawal_id(), U256::MAX);
        assert!(!record.success());
        assert_eq!(record.address, log.inner.address);
        assert_eq!(record.position().unwrap(), (10, 3));
        assert_eq!(record.id().unwrap(), (B256::repeat_byte(0x11), 3));
    }

    #[test]
    fn pending_logs_have_no_position() {
        let log = Log {
            inner: alloy_primitives::Log {
                address: Address::ZERO,
                data: Deployed {
                    _sender: Address::ZERO,
                    _contract: Address::ZERO,
                    withdrawalId: U256::ZERO,
                    _success: true,
                }
                .encode_log_data(),
            },
            ..Default::default()
        };

        let record = DeployedRecord::decode(&log).unwrap();
        assert!(matches!(
            record.position(),
            Err(BindingError::MissingLogMetadata("block number"))
        ));
    }
}
