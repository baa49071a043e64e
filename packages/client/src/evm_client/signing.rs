use std::{sync::Arc, time::Duration};

use alloy_network::{EthereumWallet, Network};
use alloy_primitives::Address;
use alloy_provider::{
    fillers::{CachedNonceManager, NonceManager, SimpleNonceManager},
    DynProvider, Provider, ProviderBuilder,
};
use alloy_signer::k256::SecretKey;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy_transport::TransportResult;
use async_trait::async_trait;
use buddy_types::Credential;
use serde::{Deserialize, Serialize};

use super::{EvmEndpoint, EvmQueryClient};
use crate::error::EvmClientError;

/// How the signing client picks the nonce of each transaction it submits
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum NonceManagerKind {
    /// Asks the node once, then counts up locally
    #[default]
    Cached,
    /// Asks the node before every transaction, which survives other senders using the same key
    Simple,
}

#[derive(Debug, Clone)]
enum DeployNonces {
    Cached(CachedNonceManager),
    Simple(SimpleNonceManager),
}

impl From<NonceManagerKind> for DeployNonces {
    fn from(kind: NonceManagerKind) -> Self {
        match kind {
            NonceManagerKind::Cached => Self::Cached(CachedNonceManager::default()),
            NonceManagerKind::Simple => Self::Simple(SimpleNonceManager::default()),
        }
    }
}

#[async_trait]
impl NonceManager for DeployNonces {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        match self {
            Self::Cached(nonces) => nonces.get_next_nonce(provider, address).await,
            Self::Simple(nonces) => nonces.get_next_nonce(provider, address).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvmSigningClientConfig {
    pub endpoint: EvmEndpoint,
    pub credential: Credential,
    pub hd_index: Option<u32>,
    /// Pads gas estimates when no gas limit is given. Defaults to 1.25
    pub gas_estimate_multiplier: Option<f32>,
    /// How often to poll for receipts and filter changes; the provider default otherwise
    pub poll_interval: Option<Duration>,
    pub nonce_manager: NonceManagerKind,
}

impl EvmSigningClientConfig {
    pub fn new(endpoint: EvmEndpoint, credential: Credential) -> Self {
        Self {
            endpoint,
            credential,
            hd_index: None,
            gas_estimate_multiplier: None,
            poll_interval: None,
            nonce_manager: NonceManagerKind::default(),
        }
    }

    pub fn with_hd_index(mut self, hd_index: u32) -> Self {
        self.hd_index = Some(hd_index);
        self
    }

    pub fn with_gas_estimate_multiplier(mut self, gas_estimate_multiplier: f32) -> Self {
        self.gas_estimate_multiplier = Some(gas_estimate_multiplier);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    pub fn with_nonce_manager(mut self, nonce_manager: NonceManagerKind) -> Self {
        self.nonce_manager = nonce_manager;
        self
    }
}

/// Node access with a local key, as needed to submit `executeBuddyDeploy`.
///
/// Submitted transactions get their nonce, gas and chain id filled in
/// and are signed locally before being sent.
#[derive(Clone)]
pub struct EvmSigningClient {
    pub config: EvmSigningClientConfig,
    pub provider: DynProvider,
    pub signer: Arc<PrivateKeySigner>,
}

impl EvmSigningClient {
    const DEFAULT_GAS_ESTIMATE_MULTIPLIER: f32 = 1.25;

    /// Only a websocket endpoint is contacted here
    pub async fn new(config: EvmSigningClientConfig) -> Result<Self, EvmClientError> {
        let signer = make_signer(&config.credential, config.hd_index)?;
        let root = config.endpoint.connect().await?;

        let provider = ProviderBuilder::default()
            .with_nonce_management(DeployNonces::from(config.nonce_manager))
            .with_gas_estimation()
            .fetch_chain_id()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_provider(root);
        let provider = DynProvider::new(provider);

        if let Some(poll_interval) = config.poll_interval {
            provider.client().set_poll_interval(poll_interval);
        }

        tracing::debug!(
            "Signing client for {} on {}",
            signer.address(),
            config.endpoint
        );

        Ok(Self {
            config,
            provider,
            signer: Arc::new(signer),
        })
    }

    pub fn gas_estimate_multiplier(&self) -> f32 {
        self.config
            .gas_estimate_multiplier
            .unwrap_or(Self::DEFAULT_GAS_ESTIMATE_MULTIPLIER)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Same connection, minus the ability to submit
    pub fn to_query_client(&self) -> EvmQueryClient {
        EvmQueryClient {
            endpoint: self.config.endpoint.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl std::fmt::Debug for EvmSigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSigningClient")
            .field("endpoint", &self.config.endpoint)
            .field("address", &self.address())
            .field("nonce_manager", &self.config.nonce_manager)
            .finish()
    }
}

/// `credentials` is either a `0x` prefixed private key or a mnemonic phrase
pub fn make_signer(
    credentials: &str,
    hd_index: Option<u32>,
) -> Result<PrivateKeySigner, EvmClientError> {
    let hd_index = hd_index.unwrap_or_default();

    match credentials.strip_prefix("0x") {
        Some(stripped) => {
            // a raw private key can't derive additional keys
            if hd_index > 0 {
                return Err(EvmClientError::DerivationWithPrivateKey);
            }
            let private_key = const_hex::decode(stripped)
                .map_err(|e| EvmClientError::PrivateKey(e.to_string()))?;
            let secret_key = SecretKey::from_slice(&private_key)
                .map_err(|e| EvmClientError::PrivateKey(e.to_string()))?;
            Ok(PrivateKeySigner::from_signing_key(secret_key.into()))
        }
        None => MnemonicBuilder::<English>::default()
            .phrase(credentials)
            .index(hd_index)
            .map_err(|e| EvmClientError::Mnemonic(e.into()))?
            .build()
            .map_err(|e| EvmClientError::Mnemonic(e.into())),
    }
}
