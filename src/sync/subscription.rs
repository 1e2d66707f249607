//! Subscription lifecycle: auth gating, snapshot pumping and cancellation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::store::{RecordStore, Replace};
use super::{SnapshotFeed, SnapshotSource};
use crate::auth::{AuthContext, AuthState};
use crate::errors::AppError;
use crate::models::{QueryDescriptor, Record, Snapshot};

const DELIVERY_BUFFER: usize = 8;

type Delivery<R> = Result<Arc<Snapshot<R>>, AppError>;
type Registry = Arc<Mutex<HashMap<u64, CancelHandle>>>;

/// Stops one subscription. Cloneable and safe to call any number of times.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    released: Arc<AtomicBool>,
    release: Arc<dyn Fn() + Send + Sync>,
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl CancelHandle {
    fn new(release: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            token: CancellationToken::new(),
            released: Arc::new(AtomicBool::new(false)),
            release: Arc::new(release),
        }
    }

    /// No snapshot is delivered or stored for this subscription once this returns.
    pub fn cancel(&self) {
        self.token.cancel();
        if !self.released.swap(true, Ordering::AcqRel) {
            (self.release)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Opens live queries on behalf of the current principal.
pub struct SubscriptionManager<S> {
    source: Arc<S>,
    auth: AuthContext,
    active: Registry,
    next_id: AtomicU64,
}

impl<S> SubscriptionManager<S> {
    pub fn new(source: Arc<S>, auth: AuthContext) -> Self {
        Self {
            source,
            auth,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Subscribe to a live query, feeding `store` with every snapshot.
    ///
    /// Fails with `Unauthorized` when no principal is signed in, and with the
    /// source's error when the descriptor is rejected.
    pub fn subscribe<R>(
        &self,
        descriptor: QueryDescriptor,
        store: &Arc<RecordStore<R>>,
    ) -> Result<Subscription<R>, AppError>
    where
        R: Record,
        S: SnapshotSource<R>,
    {
        let mut auth_rx = self.auth.watch();
        let principal = {
            let state = auth_rx.borrow_and_update();
            if state.loading {
                None
            } else {
                state.principal.clone()
            }
        };
        let Some(principal) = principal else {
            return Err(AppError::Unauthorized(
                "Sign in before subscribing".to_string(),
            ));
        };

        let feed = self.source.watch(&descriptor)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        store.attach(&descriptor);
        let handle = {
            let store = Arc::clone(store);
            let descriptor = descriptor.clone();
            let active = Arc::clone(&self.active);
            CancelHandle::new(move || {
                store.detach(&descriptor);
                active.lock().remove(&id);
            })
        };
        self.active.lock().insert(id, handle.clone());

        tracing::debug!(
            "Subscription {} opened on {} for {}",
            id,
            descriptor.collection(),
            principal
        );

        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        tokio::spawn(pump(
            feed,
            Arc::clone(store),
            descriptor.clone(),
            handle.clone(),
            principal,
            auth_rx,
            tx,
        ));

        Ok(Subscription {
            id,
            descriptor,
            rx,
            handle,
        })
    }

    /// Cancel every open subscription.
    pub fn teardown(&self) {
        let handles: Vec<CancelHandle> = self.active.lock().drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            tracing::info!("Tearing down {} subscriptions", handles.len());
        }
        for handle in handles {
            handle.cancel();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

impl<S> Drop for SubscriptionManager<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn pump<R: Record>(
    mut feed: SnapshotFeed<R>,
    store: Arc<RecordStore<R>>,
    descriptor: QueryDescriptor,
    handle: CancelHandle,
    principal: String,
    mut auth: watch::Receiver<AuthState>,
    tx: mpsc::Sender<Delivery<R>>,
) {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = handle.token.cancelled() => break,
            changed = auth.changed() => {
                let same_principal = changed.is_ok()
                    && auth.borrow().principal.as_deref() == Some(principal.as_str());
                if same_principal {
                    continue;
                }
                tracing::info!("Principal {} signed out; cancelling subscription", principal);
                handle.cancel();
                break;
            }
            item = feed.recv() => match item {
                Some(Ok(snapshot)) => {
                    let snapshot = Arc::new(snapshot);
                    match store.replace(&descriptor, Arc::clone(&snapshot), &handle.token) {
                        Replace::Applied => Ok(snapshot),
                        Replace::Stale => continue,
                        Replace::Detached => break,
                    }
                }
                Some(Err(e)) => Err(e),
                None => Err(AppError::Subscription(format!(
                    "Live query on {} ended",
                    descriptor.collection()
                ))),
            },
        };

        let terminal = delivery.is_err();
        if let Err(e) = &delivery {
            tracing::warn!("Subscription on {} failed: {}", descriptor.collection(), e);
        }

        tokio::select! {
            biased;
            _ = handle.token.cancelled() => break,
            sent = tx.send(delivery) => {
                if sent.is_err() {
                    handle.cancel();
                    break;
                }
            }
        }

        if terminal {
            break;
        }
    }
}

/// An open live query. Dropping it cancels.
pub struct Subscription<R> {
    id: u64,
    descriptor: QueryDescriptor,
    rx: mpsc::Receiver<Delivery<R>>,
    handle: CancelHandle,
}

impl<R: Record> Subscription<R> {
    /// Next snapshot, or the terminal error. `None` once cancelled or finished.
    pub async fn next(&mut self) -> Option<Delivery<R>> {
        if self.handle.is_cancelled() {
            return None;
        }

        let item = tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => return None,
            item = self.rx.recv() => item,
        };

        // A cancel can land while the snapshot is in flight.
        if self.handle.is_cancelled() {
            return None;
        }

        match item {
            Some(Err(e)) => {
                self.handle.cancel();
                Some(Err(e))
            }
            other => other,
        }
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }
}

impl<R> Drop for Subscription<R> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
