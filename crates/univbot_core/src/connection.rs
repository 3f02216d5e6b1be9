//! crates/univbot_core/src/connection.rs
//!
//! A lazily initialized, process-wide connection handle.
//!
//! The first caller of [`ConnectionCache::connect`] starts a connection attempt.
//! Callers that arrive while it is pending await the very same attempt, so at
//! most one attempt is ever in flight. A successful handle is kept for the
//! lifetime of the cache; a failed attempt is forgotten so the next caller
//! starts over.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::ports::PortResult;

/// Opens a new handle to some backing store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> PortResult<Self::Handle>;
}

type Attempt<H> = Shared<BoxFuture<'static, PortResult<H>>>;

enum Slot<H> {
    Empty,
    Connecting { generation: u64, attempt: Attempt<H> },
    Ready(H),
}

struct CacheState<H> {
    slot: Slot<H>,
    next_generation: u64,
}

/// Memoizes the handle produced by a [`Connector`].
pub struct ConnectionCache<C: Connector> {
    connector: Arc<C>,
    state: Mutex<CacheState<C::Handle>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                next_generation: 0,
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the cached handle, connecting first if necessary.
    pub async fn connect(&self) -> PortResult<C::Handle> {
        let (generation, attempt) = {
            let mut state = self.state.lock().await;
            let pending = match &state.slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Connecting { generation, attempt } => Some((*generation, attempt.clone())),
                Slot::Empty => None,
            };
            match pending {
                Some(pending) => pending,
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let connector = Arc::clone(&self.connector);
                    let attempt = async move { connector.connect().await }.boxed().shared();
                    state.slot = Slot::Connecting {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let result = attempt.await;

        // Only the attempt that is still current may settle the slot.
        let mut state = self.state.lock().await;
        let is_current = matches!(
            &state.slot,
            Slot::Connecting { generation: current, .. } if *current == generation
        );
        if is_current {
            state.slot = match &result {
                Ok(handle) => {
                    info!("Connected to the database with connection pooling");
                    Slot::Ready(handle.clone())
                }
                Err(_) => Slot::Empty,
            };
        }
        result
    }

    /// The handle, if a connection has already been established.
    pub async fn cached(&self) -> Option<C::Handle> {
        match &self.state.lock().await.slot {
            Slot::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }
}
