use alloy_contract::{CallBuilder, CallDecoder};
use alloy_network::Network;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockId;
use serde::{Deserialize, Serialize};

/// Transaction fields a caller may pin instead of letting the provider fill them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayableOverrides {
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    /// Legacy pricing, mutually exclusive with the EIP-1559 fields
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: Option<u64>,
    pub from: Option<Address>,
}

impl PayableOverrides {
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_max_fee_per_gas(mut self, max_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee_per_gas);
        self
    }

    pub fn with_max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: u128) -> Self {
        self.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub(crate) fn apply<P, D, N>(&self, mut call: CallBuilder<P, D, N>) -> CallBuilder<P, D, N>
    where
        P: Provider<N>,
        D: CallDecoder,
        N: Network,
    {
        if let Some(value) = self.value {
            call = call.value(value);
        }
        if let Some(gas_limit) = self.gas_limit {
            call = call.gas(gas_limit);
        }
        if let Some(gas_price) = self.gas_price {
            call = call.gas_price(gas_price);
        }
        if let Some(max_fee_per_gas) = self.max_fee_per_gas {
            call = call.max_fee_per_gas(max_fee_per_gas);
        }
        if let Some(max_priority_fee_per_gas) = self.max_priority_fee_per_gas {
            call = call.max_priority_fee_per_gas(max_priority_fee_per_gas);
        }
        if let Some(nonce) = self.nonce {
            call = call.nonce(nonce);
        }
        if let Some(from) = self.from {
            call = call.from(from);
        }
        call
    }
}

/// Overrides for read-only simulation (`eth_call`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOverrides {
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    /// Simulate against this block instead of the latest one
    pub block: Option<BlockId>,
}

impl CallOverrides {
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_block(mut self, block: impl Into<BlockId>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub(crate) fn apply<P, D, N>(&self, mut call: CallBuilder<P, D, N>) -> CallBuilder<P, D, N>
    where
        P: Provider<N>,
        D: CallDecoder,
        N: Network,
    {
        if let Some(from) = self.from {
            call = call.from(from);
        }
        if let Some(value) = self.value {
            call = call.value(value);
        }
        if let Some(gas_limit) = self.gas_limit {
            call = call.gas(gas_limit);
        }
        if let Some(block) = self.block {
            call = call.block(block);
        }
        call
    }
}
