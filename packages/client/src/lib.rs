#![allow(clippy::uninlined_format_args)]

pub mod buddy_deployer;
pub mod config;
pub mod error;
pub mod evm_client;
pub mod serde;
pub mod telemetry;

pub use buddy_deployer::{
    listeners::ListenerId,
    overrides::{CallOverrides, PayableOverrides},
    query::{DeployedStream, LogSource, QueryRange},
    transaction::{deployed_events, DeployTransaction},
    BuddyDeployerClient, SignerOrProvider,
};
pub use error::{BuddyDeployerError, EvmClientError};

// the test version of init_tracing does not take a config
// since config itself is modified from different parallel tests
// it's not gated to cfg(test) because integration tests use it as well
#[cfg(debug_assertions)]
pub fn init_tracing_tests() {
    use std::sync::LazyLock;

    // tests run on multiple threads, so only initialize once globally
    static INIT: LazyLock<std::sync::Mutex<bool>> = LazyLock::new(|| std::sync::Mutex::new(false));

    let mut init = INIT.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    if !*init {
        *init = true;
        tracing_subscriber::fmt::init();
        tracing::debug!("Tracing initialized for tests");
    }
}
