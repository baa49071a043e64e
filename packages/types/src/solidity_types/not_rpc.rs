mod buddy_deployer {
    alloy_sol_macro::sol!(
        #[allow(missing_docs)]
        #[derive(Debug, PartialEq, Eq)]
        BuddyDeployer,
        "./abi/BuddyDeployer.json"
    );
}

pub use buddy_deployer::BuddyDeployer;
pub use buddy_deployer::BuddyDeployer::{executeBuddyDeployCall, Deployed};
