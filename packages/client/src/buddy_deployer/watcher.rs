use std::{future::Future, time::Duration};

use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_transport::TransportResult;
use futures::{stream::BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::listeners::WeakListenerRegistry;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Background task feeding live `Deployed` logs into the listener registry.
/// Subscribes over websockets, polls a log filter over http, and reconnects with backoff.
/// Stops when dropped or when its registry is gone.
pub(crate) struct LogWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LogWatcher {
    pub fn spawn(
        provider: DynProvider,
        subscribe: bool,
        filter: Filter,
        listeners: WeakListenerRegistry,
    ) -> Self {
        Self::spawn_with(listeners, move || {
            open_stream(provider.clone(), subscribe, filter.clone())
        })
    }

    /// `open` is called again every time the stream ends or fails to open
    pub fn spawn_with<F, Fut>(listeners: WeakListenerRegistry, open: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = TransportResult<BoxStream<'static, Log>>> + Send + 'static,
    {
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let mut backoff = INITIAL_BACKOFF;

                loop {
                    match open().await {
                        Ok(mut logs) => {
                            backoff = INITIAL_BACKOFF;

                            loop {
                                tokio::select! {
                                    biased;
                                    _ = cancel.cancelled() => return,
                                    log = logs.next() => match log {
                                        Some(log) => {
                                            let Some(listeners) = listeners.upgrade() else {
                                                return;
                                            };
                                            if let Err(err) = listeners.dispatch(&log) {
                                                tracing::warn!("Unable to decode Deployed log: {}", err);
                                            }
                                        }
                                        None => break,
                                    }
                                }
                            }

                            tracing::warn!("Deployed log stream ended, reconnecting");
                        }
                        Err(err) => {
                            tracing::error!(
                                "Unable to watch Deployed logs, retrying in {:?}: {:?}",
                                backoff,
                                err
                            );
                        }
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        });

        Self { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || self.handle.is_finished()
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn open_stream(
    provider: DynProvider,
    subscribe: bool,
    filter: Filter,
) -> TransportResult<BoxStream<'static, Log>> {
    if subscribe {
        let subscription = provider.subscribe_logs(&filter).await?;
        tracing::info!("Watching Deployed logs (subscription)");
        Ok(subscription.into_stream().boxed())
    } else {
        let poller = provider.watch_logs(&filter).await?;
        tracing::info!("Watching Deployed logs (polling)");
        Ok(poller.into_stream().flat_map(futures::stream::iter).boxed())
    }
}
