use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use alloy_primitives::B256;
use alloy_rpc_types_eth::Log;
use buddy_types::{BindingError, DeployedFilter, DeployedRecord};
use lru::LruCache;
use slotmap::{new_key_type, SlotMap};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use super::watcher::LogWatcher;

new_key_type! {
    /// Handle returned when registering a listener, used to remove it again
    pub struct ListenerId;
}

// how many recent (tx hash, log index) pairs are remembered for de-duplication
const SEEN_LOGS_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Listeners for live `Deployed` events, plus the watcher that feeds them.
///
/// Every listener gets its own task and channel, so listeners run concurrently
/// with each other while each one sees logs in arrival order. A log that shows
/// up twice (e.g. across a resubscribe) is only delivered once, unless it was
/// reorged out in between.
///
/// The watcher is stopped as soon as the last listener goes away, whether through
/// [`Self::remove`], [`Self::remove_all`] or a `once` listener firing.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<Shared>,
}

/// Held by the watcher task, so a running watcher doesn't keep its own registry alive
#[derive(Clone)]
pub(crate) struct WeakListenerRegistry(Weak<Shared>);

struct Shared {
    registry: Mutex<Registry>,
    watcher: Mutex<Option<LogWatcher>>,
}

struct Registry {
    listeners: SlotMap<ListenerId, ListenerEntry>,
    seen: LruCache<(B256, u64), ()>,
}

struct ListenerEntry {
    filter: DeployedFilter,
    once: bool,
    tx: UnboundedSender<DeployedRecord>,
    // cleared on removal, so records already queued are dropped instead of delivered
    active: Arc<AtomicBool>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    listeners: SlotMap::with_key(),
                    seen: LruCache::new(SEEN_LOGS_CAPACITY),
                }),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Must be called from within a tokio runtime, since the listener runs on its own task
    pub fn add<F>(&self, filter: DeployedFilter, once: bool, listener: F) -> ListenerId
    where
        F: Fn(DeployedRecord) + Send + Sync + 'static,
    {
        let (tx, mut rx) = unbounded_channel::<DeployedRecord>();
        let active = Arc::new(AtomicBool::new(true));

        tokio::spawn({
            let active = active.clone();
            async move {
                while let Some(record) = rx.recv().await {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    listener(record);
                }
            }
        });

        lock(&self.inner.registry).listeners.insert(ListenerEntry {
            filter,
            once,
            tx,
            active,
        })
    }

    /// Returns false if the listener was already gone
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = match lock(&self.inner.registry).listeners.remove(id) {
            Some(entry) => {
                entry.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        };
        self.stop_watcher_if_idle();
        removed
    }

    /// Removes every listener, or only those registered with exactly `filter`
    pub fn remove_all(&self, filter: Option<&DeployedFilter>) -> usize {
        let removed = {
            let mut registry = lock(&self.inner.registry);
            let ids = registry.ids(filter);
            for id in &ids {
                if let Some(entry) = registry.listeners.remove(*id) {
                    entry.active.store(false, Ordering::SeqCst);
                }
            }
            ids.len()
        };
        self.stop_watcher_if_idle();
        removed
    }

    pub fn ids(&self, filter: Option<&DeployedFilter>) -> Vec<ListenerId> {
        lock(&self.inner.registry).ids(filter)
    }

    pub fn count(&self, filter: Option<&DeployedFilter>) -> usize {
        lock(&self.inner.registry).ids(filter).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.registry).listeners.is_empty()
    }

    pub fn watcher_running(&self) -> bool {
        lock(&self.inner.watcher)
            .as_ref()
            .is_some_and(|watcher| !watcher.is_finished())
    }

    /// Starts a watcher with `spawn` unless one is already running or there is nobody to feed.
    // both this and `stop_watcher_if_idle` check emptiness under the watcher lock,
    // so a concurrent add and remove can't strand a listener without a watcher
    pub(crate) fn ensure_watcher(&self, spawn: impl FnOnce(WeakListenerRegistry) -> LogWatcher) {
        let mut watcher = lock(&self.inner.watcher);
        if self.is_empty() {
            return;
        }
        if watcher.as_ref().is_none_or(|watcher| watcher.is_finished()) {
            *watcher = Some(spawn(WeakListenerRegistry(Arc::downgrade(&self.inner))));
        }
    }

    fn stop_watcher_if_idle(&self) {
        let mut watcher = lock(&self.inner.watcher);
        if self.is_empty() && watcher.take().is_some() {
            tracing::debug!("No Deployed listeners left, stopping watcher");
        }
    }

    /// Queues the log for every listener whose filter matches, returning how many that was.
    ///
    /// Already seen logs are skipped. A removed (reorged) log is never delivered,
    /// but it is forgotten so the same log is delivered again if it is re-included.
    pub fn dispatch(&self, log: &Log) -> Result<usize, BindingError> {
        if log.removed {
            if let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index) {
                lock(&self.inner.registry).seen.pop(&(tx_hash, log_index));
            }
            tracing::debug!("Skipping removed Deployed log: {:?}", log.transaction_hash);
            return Ok(0);
        }

        let (delivered, fired_once) = {
            let mut registry = lock(&self.inner.registry);

            if !registry
                .listeners
                .values()
                .any(|entry| entry.filter.matches(&log.inner))
            {
                return Ok(0);
            }

            let record = DeployedRecord::decode(log)?;

            if let Ok(id) = record.id() {
                if registry.seen.contains(&id) {
                    tracing::debug!("Skipping duplicate Deployed log {:?}", id);
                    return Ok(0);
                }
                registry.seen.put(id, ());
            }

            let mut delivered = 0;
            let mut fired_once = Vec::new();

            for (id, entry) in registry.listeners.iter() {
                if !entry.filter.matches(&log.inner) {
                    continue;
                }
                if entry.tx.send(record.clone()).is_ok() {
                    delivered += 1;
                }
                if entry.once {
                    fired_once.push(id);
                }
            }

            // dropping the sender lets the task drain the one queued record and exit
            for id in &fired_once {
                registry.listeners.remove(*id);
            }

            (delivered, !fired_once.is_empty())
        };

        if fired_once {
            self.stop_watcher_if_idle();
        }

        Ok(delivered)
    }
}

impl WeakListenerRegistry {
    pub fn upgrade(&self) -> Option<ListenerRegistry> {
        self.0.upgrade().map(|inner| ListenerRegistry { inner })
    }
}

impl Registry {
    fn ids(&self, filter: Option<&DeployedFilter>) -> Vec<ListenerId> {
        self.listeners
            .iter()
            .filter(|(_, entry)| filter.is_none_or(|filter| entry.filter == *filter))
            .map(|(id, _)| id)
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
