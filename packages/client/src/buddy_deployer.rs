pub mod listeners;
pub mod overrides;
pub mod query;
pub mod transaction;
mod watcher;

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types_eth::TransactionRequest;
use buddy_types::{
    BuddyDeployer, BuddyDeployerInterface, BuddyDeployerT, BytesLike, DeployedFilter,
    DeployedRecord,
};
use futures::TryStreamExt;

use crate::{
    error::BuddyDeployerError,
    evm_client::{EvmEndpoint, EvmQueryClient, EvmSigningClient},
};

use listeners::{ListenerId, ListenerRegistry};
use overrides::{CallOverrides, PayableOverrides};
use query::{query_deployed, DeployedStream, QueryRange, DEFAULT_QUERY_CHUNK_SIZE};
use transaction::DeployTransaction;
use watcher::LogWatcher;

/// What a contract handle talks through. Only a signer can submit transactions.
#[derive(Debug, Clone)]
pub enum SignerOrProvider {
    Signer(EvmSigningClient),
    Provider(EvmQueryClient),
}

impl From<EvmSigningClient> for SignerOrProvider {
    fn from(client: EvmSigningClient) -> Self {
        Self::Signer(client)
    }
}

impl From<EvmQueryClient> for SignerOrProvider {
    fn from(client: EvmQueryClient) -> Self {
        Self::Provider(client)
    }
}

impl SignerOrProvider {
    pub fn provider(&self) -> &DynProvider {
        match self {
            Self::Signer(client) => &client.provider,
            Self::Provider(client) => &client.provider,
        }
    }

    pub fn endpoint(&self) -> &EvmEndpoint {
        match self {
            Self::Signer(client) => &client.config.endpoint,
            Self::Provider(client) => &client.endpoint,
        }
    }

    pub fn signer_address(&self) -> Option<Address> {
        match self {
            Self::Signer(client) => Some(client.address()),
            Self::Provider(_) => None,
        }
    }

    pub fn is_signer(&self) -> bool {
        matches!(self, Self::Signer(_))
    }
}

/// Typed handle to a deployed BuddyDeployer contract.
///
/// Clones share the same listeners; `connect` and `attach` start fresh.
#[derive(Clone)]
pub struct BuddyDeployerClient {
    backend: SignerOrProvider,
    contract: BuddyDeployerT,
    interface: Arc<BuddyDeployerInterface>,
    listeners: ListenerRegistry,
    query_chunk_size: u64,
}

impl std::fmt::Debug for BuddyDeployerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuddyDeployerClient")
            .field("address", self.contract.address())
            .field("backend", &self.backend)
            .field("listeners", &self.listeners.count(None))
            .finish()
    }
}

impl BuddyDeployerClient {
    /// No network access; the address is not checked for code (see [`Self::deployed`])
    pub fn new(
        address: Address,
        backend: impl Into<SignerOrProvider>,
    ) -> Result<Self, BuddyDeployerError> {
        let interface = BuddyDeployerInterface::new().map_err(BuddyDeployerError::Decoding)?;
        Ok(Self::with_interface(address, backend.into(), Arc::new(interface)))
    }

    fn with_interface(
        address: Address,
        backend: SignerOrProvider,
        interface: Arc<BuddyDeployerInterface>,
    ) -> Self {
        Self {
            contract: BuddyDeployer::new(address, backend.provider().clone()),
            backend,
            interface,
            listeners: ListenerRegistry::new(),
            query_chunk_size: DEFAULT_QUERY_CHUNK_SIZE,
        }
    }

    pub fn with_query_chunk_size(mut self, query_chunk_size: u64) -> Self {
        self.query_chunk_size = query_chunk_size.max(1);
        self
    }

    /// Same contract, different signer or provider
    pub fn connect(&self, backend: impl Into<SignerOrProvider>) -> Self {
        Self::with_interface(self.address(), backend.into(), self.interface.clone())
            .with_query_chunk_size(self.query_chunk_size)
    }

    /// Same signer or provider, different contract address
    pub fn attach(&self, address: Address) -> Self {
        Self::with_interface(address, self.backend.clone(), self.interface.clone())
            .with_query_chunk_size(self.query_chunk_size)
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }

    pub fn interface(&self) -> &BuddyDeployerInterface {
        &self.interface
    }

    pub fn signer_or_provider(&self) -> &SignerOrProvider {
        &self.backend
    }

    /// Resolves once the address has code
    pub async fn deployed(&self) -> Result<&Self, BuddyDeployerError> {
        let code = self
            .backend
            .provider()
            .get_code_at(self.address())
            .await?;

        if code.is_empty() {
            return Err(BuddyDeployerError::NotContract(self.address()));
        }

        Ok(self)
    }

    /// Submits `executeBuddyDeploy(initCode)` and returns as soon as the node accepts it.
    ///
    /// Without an explicit gas limit the estimate is padded by the signer's multiplier.
    pub async fn execute_buddy_deploy(
        &self,
        init_code: impl BytesLike,
        overrides: PayableOverrides,
    ) -> Result<DeployTransaction, BuddyDeployerError> {
        let init_code = encode_init_code(init_code)?;

        let signing_client = match &self.backend {
            SignerOrProvider::Signer(client) => client,
            SignerOrProvider::Provider(_) => return Err(BuddyDeployerError::ReadOnly),
        };

        let call = overrides.apply(self.contract.executeBuddyDeploy(init_code));

        let call = match overrides.gas_limit {
            Some(_) => call,
            None => {
                let estimate = call.estimate_gas().await?;
                let gas = (estimate as f32 * signing_client.gas_estimate_multiplier()) as u64;
                tracing::debug!("Estimated {} gas for executeBuddyDeploy, using {}", estimate, gas);
                call.gas(gas)
            }
        };

        let pending = call.send().await?;

        tracing::info!(
            "Submitted executeBuddyDeploy to {} with hash {}",
            self.address(),
            pending.tx_hash()
        );

        Ok(DeployTransaction::new(pending))
    }

    /// Runs `executeBuddyDeploy` via `eth_call` without changing state. A revert is an error.
    pub async fn call_static_execute_buddy_deploy(
        &self,
        init_code: impl BytesLike,
        overrides: CallOverrides,
    ) -> Result<(), BuddyDeployerError> {
        let init_code = encode_init_code(init_code)?;

        let call = self.default_from(self.contract.executeBuddyDeploy(init_code), overrides.from);
        overrides.apply(call).call().await?;

        Ok(())
    }

    pub async fn estimate_gas_execute_buddy_deploy(
        &self,
        init_code: impl BytesLike,
        overrides: PayableOverrides,
    ) -> Result<u64, BuddyDeployerError> {
        let init_code = encode_init_code(init_code)?;

        let call = self.default_from(self.contract.executeBuddyDeploy(init_code), overrides.from);

        Ok(overrides.apply(call).estimate_gas().await?)
    }

    /// Builds the unsigned transaction without touching the network.
    /// Fields that are not overridden (nonce, fees, chain id) are left unset.
    pub fn populate_execute_buddy_deploy(
        &self,
        init_code: impl BytesLike,
        overrides: PayableOverrides,
    ) -> Result<TransactionRequest, BuddyDeployerError> {
        let init_code = encode_init_code(init_code)?;

        let call = self.default_from(self.contract.executeBuddyDeploy(init_code), overrides.from);

        Ok(overrides.apply(call).into_transaction_request())
    }

    fn default_from<'a, D>(
        &self,
        call: alloy_contract::CallBuilder<&'a DynProvider, D>,
        from: Option<Address>,
    ) -> alloy_contract::CallBuilder<&'a DynProvider, D>
    where
        D: alloy_contract::CallDecoder,
    {
        match (from, self.backend.signer_address()) {
            (None, Some(signer)) => call.from(signer),
            _ => call,
        }
    }

    /// `Deployed` filter; `None` leaves a position as a wildcard
    pub fn deployed_filter(
        &self,
        sender: Option<Address>,
        contract: Option<Address>,
        withdrawal_id: Option<U256>,
    ) -> DeployedFilter {
        DeployedFilter::new(sender, contract, withdrawal_id)
    }

    /// Historical `Deployed` events from this contract, lazily fetched in chunks
    /// and ordered by (block number, log index).
    ///
    /// `range` is a block range (numbers or tags, e.g. `..`, `100..=200`, `100..`)
    /// or a single block hash.
    pub fn query_filter(
        &self,
        filter: DeployedFilter,
        range: impl Into<QueryRange>,
    ) -> DeployedStream {
        query_deployed(
            self.backend.provider().clone(),
            self.address(),
            filter,
            range.into(),
            self.query_chunk_size,
        )
    }

    pub async fn query_filter_all(
        &self,
        filter: DeployedFilter,
        range: impl Into<QueryRange>,
    ) -> Result<Vec<DeployedRecord>, BuddyDeployerError> {
        self.query_filter(filter, range).try_collect().await
    }

    /// Calls `listener` for every future `Deployed` event matching `filter`.
    /// Must be called from within a tokio runtime.
    pub fn on<F>(&self, filter: DeployedFilter, listener: F) -> ListenerId
    where
        F: Fn(DeployedRecord) + Send + Sync + 'static,
    {
        let id = self.listeners.add(filter, false, listener);
        self.start_watcher();
        id
    }

    /// Like [`Self::on`], but the listener is removed after its first event
    pub fn once<F>(&self, filter: DeployedFilter, listener: F) -> ListenerId
    where
        F: Fn(DeployedRecord) + Send + Sync + 'static,
    {
        let id = self.listeners.add(filter, true, listener);
        self.start_watcher();
        id
    }

    /// Returns false if the listener was not registered (or already fired, for `once`)
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn remove_all_listeners(&self, filter: Option<&DeployedFilter>) -> usize {
        self.listeners.remove_all(filter)
    }

    pub fn listener_count(&self, filter: Option<&DeployedFilter>) -> usize {
        self.listeners.count(filter)
    }

    pub fn listeners(&self, filter: Option<&DeployedFilter>) -> Vec<ListenerId> {
        self.listeners.ids(filter)
    }

    /// Whether live `Deployed` logs are currently being watched for
    pub fn is_watching(&self) -> bool {
        self.listeners.watcher_running()
    }

    // the registry stops the watcher itself once its last listener is gone
    fn start_watcher(&self) {
        let provider = self.backend.provider().clone();
        let subscribe = self.backend.endpoint().supports_subscriptions();
        let filter = DeployedFilter::default().to_rpc_filter(self.address());

        self.listeners
            .ensure_watcher(|listeners| LogWatcher::spawn(provider, subscribe, filter, listeners));
    }
}

fn encode_init_code(init_code: impl BytesLike) -> Result<Bytes, BuddyDeployerError> {
    init_code
        .into_init_code()
        .map(Bytes::from)
        .map_err(BuddyDeployerError::Encoding)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use alloy_primitives::{address, B256};
    use alloy_rpc_types_eth::Log;
    use alloy_sol_types::SolEvent;
    use buddy_types::Deployed;

    use super::*;

    const CONTRACT: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

    fn deployed_log(withdrawal_id: u64) -> Log {
        Log {
            inner: alloy_primitives::Log {
                address: CONTRACT,
                data: Deployed {
                    _sender: Address::repeat_byte(0x0a),
                    _contract: Address::repeat_byte(0x0c),
                    withdrawalId: U256::from(withdrawal_id),
                    _success: true,
                }
                .encode_log_data(),
            },
            block_number: Some(withdrawal_id),
            log_index: Some(0),
            transaction_hash: Some(B256::with_last_byte(withdrawal_id as u8)),
            ..Default::default()
        }
    }

    async fn deployer() -> BuddyDeployerClient {
        crate::init_tracing_tests();

        // nothing listens here, the watcher just keeps retrying
        let client = EvmQueryClient::new(EvmEndpoint::new_http("http://127.0.0.1:1").unwrap())
            .await
            .unwrap();
        BuddyDeployerClient::new(CONTRACT, client).unwrap()
    }

    #[tokio::test]
    async fn once_listener_stops_the_watcher_after_firing() {
        let deployer = deployer().await;
        assert!(!deployer.is_watching());

        deployer.once(DeployedFilter::default(), |_| {});
        assert!(deployer.is_watching());

        assert_eq!(deployer.listeners.dispatch(&deployed_log(1)).unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(deployer.listener_count(None), 0);
        assert!(!deployer.is_watching());

        // registering again brings it back
        deployer.on(DeployedFilter::default(), |_| {});
        assert!(deployer.is_watching());
        assert_eq!(deployer.remove_all_listeners(None), 1);
        assert!(!deployer.is_watching());
    }

    #[tokio::test]
    async fn off_stops_the_watcher_with_the_last_listener() {
        let deployer = deployer().await;

        let first = deployer.on(DeployedFilter::default(), |_| {});
        let second = deployer.once(DeployedFilter::default(), |_| {});

        assert!(deployer.off(first));
        assert!(deployer.is_watching());

        assert!(deployer.off(second));
        assert!(!deployer.is_watching());
    }
}
