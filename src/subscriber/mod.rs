// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event subscriber and dispatcher.
//!
//! A [`Subscriber`] owns one inbound connection and a pool of workers that
//! relay every received frame to an [`EventHandler`].
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Started ──stop()──► Stopped
//! ```
//!
//! - `start` is only legal from `Created`
//! - `subscribe` / `unsubscribe` are only legal while `Started`
//! - `stop` joins every worker before returning; `Stopped` is terminal
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use event_notify::{RoutingMode, Subscriber};
//! use event_notify::transport::InprocTransport;
//!
//! # async fn example() -> event_notify::Result<()> {
//! let subscriber = Subscriber::new(
//!     Arc::new(InprocTransport::new()),
//!     &RoutingMode::direct("inproc://events"),
//! );
//!
//! subscriber.start(|frame: &[u8]| println!("{} bytes", frame.len()), 1)?;
//! subscriber.subscribe("rec.")?;
//!
//! // ...
//!
//! subscriber.stop().await;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod handler;

use std::sync::Arc;

use parking_lot::Mutex;

pub use handler::{DecodedHandler, EventHandler, SharedHandler, TopicHandler};

use self::dispatcher::{PoolStats, WorkerPool};
use crate::config::RoutingMode;
use crate::error::{Error, Result};
use crate::topic::TopicFilter;
use crate::transport::{SubscribeSocket, Transport};

/// Lifecycle state of a [`Subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Not yet started.
    Created,
    /// Workers are running.
    Started,
    /// Workers have been stopped; the subscriber cannot be restarted.
    Stopped,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Receives events from one endpoint and dispatches them to a handler.
pub struct Subscriber {
    transport: Arc<dyn Transport>,
    address: String,
    inner: Mutex<SubscriberInner>,
    /// Held across the join in `stop`, so a concurrent `stop` returns only
    /// after the workers are gone.
    pool: tokio::sync::Mutex<Option<WorkerPool>>,
}

struct SubscriberInner {
    state: SubscriberState,
    socket: Option<Arc<dyn SubscribeSocket>>,
    filter: TopicFilter,
    worker_count: usize,
    stats: Arc<PoolStats>,
}

impl Subscriber {
    /// Creates a subscriber for the routing mode's subscribe address.
    ///
    /// Nothing is opened until [`Subscriber::start`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, routing: &RoutingMode) -> Self {
        Self {
            transport,
            address: routing.subscribe_address().to_string(),
            inner: Mutex::new(SubscriberInner {
                state: SubscriberState::Created,
                socket: None,
                filter: TopicFilter::new(),
                worker_count: 0,
                stats: Arc::new(PoolStats::default()),
            }),
            pool: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the address this subscriber receives from.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        self.inner.lock().state
    }

    /// Returns `true` while workers are running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state() == SubscriberState::Started
    }

    /// Returns the number of workers started.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.lock().worker_count
    }

    /// Returns the registered subscription prefixes.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().filter.prefixes()
    }

    /// Returns the number of frames handed to the handler so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.inner.lock().stats.dispatched()
    }

    /// Returns the number of handler invocations that panicked.
    #[must_use]
    pub fn handler_panics(&self) -> u64 {
        self.inner.lock().stats.panicked()
    }

    /// Opens the connection and starts `worker_count` workers.
    ///
    /// Must be called from within a tokio runtime. Workers receive nothing
    /// until [`Subscriber::subscribe`] registers a prefix.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] if already started
    /// - [`Error::Terminated`] if already stopped
    /// - [`Error::InvalidWorkerCount`] if `worker_count` is 0
    /// - [`Error::Construction`] if there is no runtime or the connection
    ///   cannot be opened
    pub fn start<H: EventHandler>(&self, handler: H, worker_count: usize) -> Result<()> {
        self.start_shared(Arc::new(handler), worker_count)
    }

    /// Like [`Subscriber::start`], with a handler already behind an `Arc`.
    ///
    /// # Errors
    ///
    /// See [`Subscriber::start`].
    pub fn start_shared(&self, handler: SharedHandler, worker_count: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SubscriberState::Created => {}
            SubscriberState::Started => return Err(Error::AlreadyActive),
            SubscriberState::Stopped => return Err(Error::Terminated),
        }
        if worker_count == 0 {
            return Err(Error::InvalidWorkerCount);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Construction(format!("subscriber needs a tokio runtime: {e}")))?;

        let socket = self.transport.open_subscriber(&self.address).map_err(|e| {
            tracing::warn!(address = %self.address, error = %e, "Failed to open subscriber connection");
            Error::Construction(format!("cannot open subscriber on {}: {e}", self.address))
        })?;

        let mut pool_slot = self
            .pool
            .try_lock()
            .map_err(|_| Error::Construction("subscriber is shutting down".to_string()))?;

        *pool_slot = Some(WorkerPool::spawn(
            &runtime,
            &socket,
            &handler,
            worker_count,
            &inner.stats,
        ));
        inner.socket = Some(socket);
        inner.worker_count = worker_count;
        inner.state = SubscriberState::Started;

        tracing::info!(address = %self.address, workers = worker_count, "Subscriber started");
        Ok(())
    }

    /// Registers interest in topics starting with `prefix`.
    ///
    /// The empty prefix subscribes to every topic. Subscribing to the same
    /// prefix again has no further effect.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before [`Subscriber::start`]
    /// - [`Error::Terminated`] after [`Subscriber::stop`]
    /// - [`Error::Transport`] if the transport rejects the change
    pub fn subscribe(&self, prefix: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let socket = active_socket(&inner)?;
        socket.subscribe(prefix.as_bytes())?;
        inner.filter.insert(prefix);
        Ok(())
    }

    /// Removes interest in `prefix`. Other prefixes are unaffected, and an
    /// unknown prefix is ignored.
    ///
    /// # Errors
    ///
    /// Same as [`Subscriber::subscribe`].
    pub fn unsubscribe(&self, prefix: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let socket = active_socket(&inner)?;
        socket.unsubscribe(prefix.as_bytes())?;
        inner.filter.remove(prefix);
        Ok(())
    }

    /// Stops every worker and waits for them to exit.
    ///
    /// Once this returns, the handler is not invoked again. Calling `stop`
    /// again, concurrently or later, is harmless.
    pub async fn stop(&self) {
        let was_started = {
            let mut inner = self.inner.lock();
            let was_started = inner.state == SubscriberState::Started;
            inner.state = SubscriberState::Stopped;
            was_started
        };

        let mut pool_slot = self.pool.lock().await;
        if let Some(pool) = pool_slot.take() {
            pool.stop().await;
        }
        drop(pool_slot);

        let mut inner = self.inner.lock();
        inner.socket = None;
        inner.filter.clear();
        if was_started {
            tracing::info!(
                address = %self.address,
                dispatched = inner.stats.dispatched(),
                "Subscriber stopped"
            );
        }
    }
}

fn active_socket(inner: &SubscriberInner) -> Result<Arc<dyn SubscribeSocket>> {
    match (inner.state, inner.socket.as_ref()) {
        (SubscriberState::Started, Some(socket)) => Ok(Arc::clone(socket)),
        (SubscriberState::Stopped, _) => Err(Error::Terminated),
        _ => Err(Error::NotStarted),
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Subscriber")
            .field("address", &self.address)
            .field("state", &inner.state)
            .field("workers", &inner.worker_count)
            .field("subscriptions", &inner.filter.len())
            .finish_non_exhaustive()
    }
}
