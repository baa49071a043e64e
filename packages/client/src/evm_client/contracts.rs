use alloy_primitives::Address;

use crate::{
    buddy_deployer::BuddyDeployerClient,
    error::BuddyDeployerError,
};

use super::{EvmQueryClient, EvmSigningClient};

impl EvmSigningClient {
    pub fn buddy_deployer(&self, address: Address) -> Result<BuddyDeployerClient, BuddyDeployerError> {
        BuddyDeployerClient::new(address, self.clone())
    }
}

impl EvmQueryClient {
    pub fn buddy_deployer(&self, address: Address) -> Result<BuddyDeployerClient, BuddyDeployerError> {
        BuddyDeployerClient::new(address, self.clone())
    }
}
