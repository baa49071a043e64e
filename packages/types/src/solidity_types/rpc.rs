use alloy_provider::DynProvider;

mod buddy_deployer {
    alloy_sol_macro::sol!(
        #[allow(missing_docs)]
        #[sol(rpc)]
        #[derive(Debug, PartialEq, Eq)]
        BuddyDeployer,
        "./abi/BuddyDeployer.json"
    );
}

pub use buddy_deployer::BuddyDeployer;
pub use buddy_deployer::BuddyDeployer::{executeBuddyDeployCall, Deployed};

// signing vs. query is decided by the provider's fillers, not the instance type
pub type BuddyDeployerT = BuddyDeployer::BuddyDeployerInstance<DynProvider>;
