pub mod contracts;
pub mod signing;

use std::{fmt, str::FromStr};

use alloy_provider::{DynProvider, ProviderBuilder, RootProvider, WsConnect};
use reqwest::Url;

use crate::error::EvmClientError;

pub use signing::{EvmSigningClient, EvmSigningClientConfig, NonceManagerKind};

/// Node endpoint. Websocket endpoints push new logs, http endpoints have to be polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmEndpoint {
    WebSocket(Url),
    Http(Url),
}

impl FromStr for EvmEndpoint {
    type Err = EvmClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| EvmClientError::ParseEndpoint(format!("{s}: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self::WebSocket(url)),
            "http" | "https" => Ok(Self::Http(url)),
            scheme => Err(EvmClientError::ParseEndpoint(format!(
                "unsupported scheme {scheme} in {s}"
            ))),
        }
    }
}

impl fmt::Display for EvmEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

impl EvmEndpoint {
    pub fn new_http(url: &str) -> Result<Self, EvmClientError> {
        match url.parse::<Self>()? {
            endpoint @ Self::Http(_) => Ok(endpoint),
            _ => Err(EvmClientError::ParseEndpoint(format!(
                "{url} is not an http(s) url"
            ))),
        }
    }

    pub fn new_ws(url: &str) -> Result<Self, EvmClientError> {
        match url.parse::<Self>()? {
            endpoint @ Self::WebSocket(_) => Ok(endpoint),
            _ => Err(EvmClientError::ParseEndpoint(format!(
                "{url} is not a ws(s) url"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            Self::WebSocket(url) | Self::Http(url) => url,
        }
    }

    pub fn supports_subscriptions(&self) -> bool {
        matches!(self, Self::WebSocket(_))
    }

    /// Bare connection, no fillers and no wallet.
    /// Only websockets connect eagerly; an http connection is not checked until first use.
    pub async fn connect(&self) -> Result<RootProvider, EvmClientError> {
        match self {
            Self::WebSocket(url) => ProviderBuilder::default()
                .connect_ws(WsConnect::new(url.as_str()))
                .await
                .map_err(|e| EvmClientError::WebSocketProvider(e.into())),
            Self::Http(url) => Ok(ProviderBuilder::default().connect_http(url.clone())),
        }
    }
}

/// Read-only node access: enough to query BuddyDeployer events and simulate calls, never to submit.
#[derive(Clone)]
pub struct EvmQueryClient {
    pub endpoint: EvmEndpoint,
    pub provider: DynProvider,
}

impl EvmQueryClient {
    pub async fn new(endpoint: EvmEndpoint) -> Result<Self, EvmClientError> {
        let provider = DynProvider::new(endpoint.connect().await?);
        Ok(Self { endpoint, provider })
    }
}

impl fmt::Debug for EvmQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmQueryClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
