// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-local transport.
//!
//! Each endpoint is a tokio broadcast channel. Every subscriber connection
//! owns one receiver of that channel, so each frame reaches each connection
//! once, and the workers sharing a connection take turns pulling from it.
//!
//! [`InprocTransport::shutdown`] closes the whole context: pending receives
//! return [`TransportError::Closed`] and later sends and opens fail.
//!
//! [`InprocTransport::global`] returns the process-wide context, so
//! independently created handles on the same address reach each other.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast, watch};

use super::{Frame, Proxy, PublishSocket, RecvFuture, SubscribeSocket, Transport};
use crate::error::{Error, TransportError};
use crate::topic::TopicFilter;

static GLOBAL: OnceLock<InprocTransport> = OnceLock::new();

/// Address scheme accepted by [`InprocTransport`].
pub const INPROC_SCHEME: &str = "inproc://";

/// Default number of frames buffered per endpoint.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// An in-process pub/sub transport.
///
/// The transport is a context: connections opened from the same context
/// (or any clone of it) to the same address see each other. Endpoints are
/// created on first use by either side.
///
/// # Capacity
///
/// Each endpoint buffers a fixed number of frames. A subscriber that falls
/// further behind than that loses the oldest frames; the loss is logged and
/// receiving continues.
///
/// # Examples
///
/// ```
/// use event_notify::transport::{InprocTransport, Transport};
///
/// let transport = InprocTransport::new();
/// let publisher = transport.open_publisher("inproc://events").unwrap();
/// let subscriber = transport.open_subscriber("inproc://events").unwrap();
/// subscriber.subscribe(b"rec.").unwrap();
///
/// assert_eq!(transport.receiver_count("inproc://events"), 1);
/// # drop((publisher, subscriber));
/// ```
#[derive(Debug, Clone)]
pub struct InprocTransport {
    inner: Arc<InprocInner>,
}

#[derive(Debug)]
struct InprocInner {
    endpoints: RwLock<HashMap<String, broadcast::Sender<Frame>>>,
    capacity: usize,
    closed: watch::Sender<bool>,
    proxies: parking_lot::Mutex<HashMap<(String, String), Proxy>>,
}

impl InprocTransport {
    /// Creates a transport with the default per-endpoint capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a transport buffering `capacity` frames per endpoint.
    ///
    /// A capacity of 0 is raised to 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(InprocInner {
                endpoints: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: watch::channel(false).0,
                proxies: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the process-wide context.
    ///
    /// Shutting the process-wide context down closes it for the rest of
    /// the process.
    #[must_use]
    pub fn global() -> Self {
        Self::global_with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Returns the process-wide context, creating it with `capacity` if
    /// this is the first use.
    ///
    /// Later calls return the existing context whatever capacity they ask
    /// for.
    #[must_use]
    pub fn global_with_capacity(capacity: usize) -> Self {
        GLOBAL
            .get_or_init(|| {
                tracing::debug!(capacity, "Creating process-wide inproc transport");
                Self::with_capacity(capacity)
            })
            .clone()
    }

    /// Returns the per-endpoint capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of endpoints created so far.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.read().len()
    }

    /// Returns the number of subscriber connections attached to `address`.
    #[must_use]
    pub fn receiver_count(&self, address: &str) -> usize {
        self.inner
            .endpoints
            .read()
            .get(address)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Returns `true` once [`InprocTransport::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Makes sure a [`Proxy`] forwards `frontend` to `backend` in this
    /// context.
    ///
    /// The proxy belongs to the context and runs until
    /// [`InprocTransport::shutdown`]. A proxy whose task has ended, for
    /// instance because its runtime was shut down, is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the context is closed or an address
    /// is invalid, or [`Error::Construction`] if a proxy must be started
    /// outside a tokio runtime.
    pub fn ensure_proxy(&self, frontend: &str, backend: &str) -> Result<(), Error> {
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }

        let key = (frontend.to_string(), backend.to_string());
        let mut proxies = self.inner.proxies.lock();
        if proxies.get(&key).is_some_and(Proxy::is_running) {
            return Ok(());
        }

        let proxy = Proxy::spawn(self, frontend, backend)?;
        proxies.insert(key, proxy);
        Ok(())
    }

    /// Returns the number of running proxies owned by this context.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.inner
            .proxies
            .lock()
            .values()
            .filter(|proxy| proxy.is_running())
            .count()
    }

    /// Closes every endpoint of this context and stops its proxies.
    ///
    /// Receivers blocked in `recv` wake up with [`TransportError::Closed`].
    /// Sends on existing connections and new opens fail the same way.
    pub fn shutdown(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }
        let proxies = std::mem::take(&mut *self.inner.proxies.lock());
        let mut endpoints = self.inner.endpoints.write();
        tracing::debug!(
            endpoints = endpoints.len(),
            proxies = proxies.len(),
            "Shutting down inproc transport"
        );
        endpoints.clear();
        drop(endpoints);
        drop(proxies);
    }

    fn endpoint(&self, address: &str) -> Result<broadcast::Sender<Frame>, TransportError> {
        validate_address(address)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        if let Some(sender) = self.inner.endpoints.read().get(address) {
            return Ok(sender.clone());
        }

        let mut endpoints = self.inner.endpoints.write();
        let sender = endpoints
            .entry(address.to_string())
            .or_insert_with(|| {
                tracing::debug!(address = %address, "Creating inproc endpoint");
                broadcast::channel(self.inner.capacity).0
            })
            .clone();
        Ok(sender)
    }
}

impl Default for InprocTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InprocTransport {
    fn open_publisher(&self, address: &str) -> Result<Arc<dyn PublishSocket>, TransportError> {
        let sender = self.endpoint(address)?;
        Ok(Arc::new(InprocPublisher {
            address: address.to_string(),
            sender,
            closed: self.inner.closed.subscribe(),
        }))
    }

    fn open_subscriber(&self, address: &str) -> Result<Arc<dyn SubscribeSocket>, TransportError> {
        let receiver = self.endpoint(address)?.subscribe();
        Ok(Arc::new(InprocSubscriber {
            address: address.to_string(),
            receiver: Mutex::new(receiver),
            filter: RwLock::new(TopicFilter::new()),
            context: Arc::clone(&self.inner),
        }))
    }
}

fn validate_address(address: &str) -> Result<(), TransportError> {
    match address.strip_prefix(INPROC_SCHEME) {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(TransportError::InvalidAddress(address.to_string())),
    }
}

struct InprocPublisher {
    address: String,
    sender: broadcast::Sender<Frame>,
    closed: watch::Receiver<bool>,
}

impl PublishSocket for InprocPublisher {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        self.sender
            .send(frame)
            .map(|_| ())
            .map_err(|_| TransportError::NoSubscribers)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

struct InprocSubscriber {
    address: String,
    receiver: Mutex<broadcast::Receiver<Frame>>,
    filter: RwLock<TopicFilter>,
    context: Arc<InprocInner>,
}

impl SubscribeSocket for InprocSubscriber {
    fn subscribe(&self, prefix: &[u8]) -> Result<(), TransportError> {
        if self.filter.write().insert(prefix) {
            tracing::debug!(
                address = %self.address,
                prefix = %String::from_utf8_lossy(prefix),
                "Subscribed to prefix"
            );
        }
        Ok(())
    }

    fn unsubscribe(&self, prefix: &[u8]) -> Result<(), TransportError> {
        if self.filter.write().remove(prefix) {
            tracing::debug!(
                address = %self.address,
                prefix = %String::from_utf8_lossy(prefix),
                "Unsubscribed from prefix"
            );
        }
        Ok(())
    }

    fn recv(&self) -> RecvFuture<'_> {
        Box::pin(async move {
            let mut closed = self.context.closed.subscribe();
            let mut receiver = self.receiver.lock().await;
            loop {
                let received = tokio::select! {
                    biased;
                    _ = closed.wait_for(|closed| *closed) => return Err(TransportError::Closed),
                    received = receiver.recv() => received,
                };
                match received {
                    Ok(frame) => {
                        if self.filter.read().matches(&frame) {
                            return Ok(frame);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            address = %self.address,
                            skipped,
                            "Subscriber lagged, frames dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(TransportError::Closed);
                    }
                }
            }
        })
    }

    fn address(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> Frame {
        Arc::from(bytes)
    }

    #[test]
    fn rejects_foreign_addresses() {
        let transport = InprocTransport::new();
        for address in ["tcp://127.0.0.1:5555", "inproc://", "events"] {
            assert!(matches!(
                transport.open_publisher(address),
                Err(TransportError::InvalidAddress(_))
            ));
        }
    }

    #[test]
    fn endpoints_are_shared_between_clones() {
        let transport = InprocTransport::new();
        let clone = transport.clone();

        let _sub = transport.open_subscriber("inproc://shared").unwrap();
        assert_eq!(clone.receiver_count("inproc://shared"), 1);
        assert_eq!(clone.endpoint_count(), 1);
    }

    #[test]
    fn send_without_subscribers_fails() {
        let transport = InprocTransport::new();
        let publisher = transport.open_publisher("inproc://lonely").unwrap();
        assert_eq!(
            publisher.send(frame(b"rec.error")),
            Err(TransportError::NoSubscribers)
        );
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(InprocTransport::with_capacity(0).capacity(), 1);
    }

    #[tokio::test]
    async fn recv_filters_by_prefix() {
        let transport = InprocTransport::new();
        let publisher = transport.open_publisher("inproc://filter").unwrap();
        let subscriber = transport.open_subscriber("inproc://filter").unwrap();
        subscriber.subscribe(b"stor.").unwrap();

        publisher.send(frame(b"rec.status.started")).unwrap();
        publisher.send(frame(b"stor.error")).unwrap();

        let received = subscriber.recv().await.unwrap();
        assert_eq!(&*received, b"stor.error");
    }

    #[tokio::test]
    async fn duplicate_subscription_delivers_once() {
        let transport = InprocTransport::new();
        let publisher = transport.open_publisher("inproc://dup").unwrap();
        let subscriber = transport.open_subscriber("inproc://dup").unwrap();
        subscriber.subscribe(b"rec.").unwrap();
        subscriber.subscribe(b"rec.").unwrap();
        subscriber.subscribe(b"rec.status.").unwrap();

        publisher.send(frame(b"rec.status.started")).unwrap();
        publisher.send(frame(b"stor.status")).unwrap();
        publisher.send(frame(b"rec.error")).unwrap();

        assert_eq!(&*subscriber.recv().await.unwrap(), b"rec.status.started");
        assert_eq!(&*subscriber.recv().await.unwrap(), b"rec.error");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let transport = InprocTransport::new();
        let publisher = transport.open_publisher("inproc://unsub").unwrap();
        let subscriber = transport.open_subscriber("inproc://unsub").unwrap();
        subscriber.subscribe(b"vsrc.").unwrap();
        subscriber.subscribe(b"venc.").unwrap();
        subscriber.unsubscribe(b"vsrc.").unwrap();
        subscriber.unsubscribe(b"never").unwrap();

        publisher.send(frame(b"vsrc.error")).unwrap();
        publisher.send(frame(b"venc.error")).unwrap();

        assert_eq!(&*subscriber.recv().await.unwrap(), b"venc.error");
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let transport = InprocTransport::with_capacity(2);
        let publisher = transport.open_publisher("inproc://lag").unwrap();
        let subscriber = transport.open_subscriber("inproc://lag").unwrap();
        subscriber.subscribe(b"").unwrap();

        for i in 0u8..5 {
            publisher.send(frame(&[i])).unwrap();
        }

        // The two newest frames survive.
        assert_eq!(&*subscriber.recv().await.unwrap(), &[3]);
        assert_eq!(&*subscriber.recv().await.unwrap(), &[4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_wakes_pending_receivers() {
        let transport = InprocTransport::new();
        let publisher = transport.open_publisher("inproc://shutdown").unwrap();
        let subscriber = transport.open_subscriber("inproc://shutdown").unwrap();
        subscriber.subscribe(b"").unwrap();

        let pending = tokio::spawn(async move { subscriber.recv().await });
        tokio::task::yield_now().await;
        transport.shutdown();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), pending)
            .await
            .expect("receiver woke up")
            .unwrap();
        assert_eq!(result, Err(TransportError::Closed));
        assert!(transport.is_closed());
        assert_eq!(transport.endpoint_count(), 0);
        assert_eq!(publisher.send(frame(b"x")), Err(TransportError::Closed));
        assert!(matches!(
            transport.open_subscriber("inproc://shutdown"),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn global_context_is_shared() {
        let first = InprocTransport::global();
        let second = InprocTransport::global_with_capacity(8);

        let _sub = first.open_subscriber("inproc://global-shared").unwrap();
        assert_eq!(second.receiver_count("inproc://global-shared"), 1);
        assert_eq!(second.capacity(), first.capacity());
    }

    #[test]
    fn ensure_proxy_needs_runtime() {
        let transport = InprocTransport::new();
        assert!(matches!(
            transport.ensure_proxy("inproc://f", "inproc://b"),
            Err(Error::Construction(_))
        ));
        assert_eq!(transport.proxy_count(), 0);
    }

    #[tokio::test]
    async fn ensure_proxy_starts_one_forwarder() {
        let transport = InprocTransport::new();
        transport.ensure_proxy("inproc://ep-front", "inproc://ep-back").unwrap();
        transport.ensure_proxy("inproc://ep-front", "inproc://ep-back").unwrap();
        assert_eq!(transport.proxy_count(), 1);
        assert_eq!(transport.receiver_count("inproc://ep-front"), 1);

        let subscriber = transport.open_subscriber("inproc://ep-back").unwrap();
        subscriber.subscribe(b"rec.").unwrap();
        let publisher = transport.open_publisher("inproc://ep-front").unwrap();
        publisher.send(frame(b"rec.error")).unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.recv())
            .await
            .expect("frame forwarded")
            .unwrap();
        assert_eq!(&*received, b"rec.error");

        transport.shutdown();
        assert_eq!(transport.proxy_count(), 0);
        assert!(matches!(
            transport.ensure_proxy("inproc://ep-front", "inproc://ep-back"),
            Err(Error::Transport(TransportError::Closed))
        ));
    }

    #[test]
    fn proxy_is_restarted_on_a_new_runtime() {
        let transport = InprocTransport::new();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            transport.ensure_proxy("inproc://rt-front", "inproc://rt-back").unwrap();
        });
        drop(runtime);
        assert_eq!(transport.proxy_count(), 0);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            transport.ensure_proxy("inproc://rt-front", "inproc://rt-back").unwrap();
            assert_eq!(transport.proxy_count(), 1);
        });
    }
}
